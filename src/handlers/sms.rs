use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{SmsLog, SmsPurchase};
use crate::services::auth::CurrentUser;
use crate::services::billing;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

// GET /api/client/sms/logs
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SmsLog>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let db = state.conn()?;
    Ok(Json(queries::list_sms_logs(&db, Some(current.user.id), limit)?))
}

// GET /api/client/sms/purchases
pub async fn list_purchases(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SmsPurchase>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let db = state.conn()?;
    Ok(Json(queries::list_sms_purchases(&db, Some(current.user.id), None, limit)?))
}

// POST /api/client/sms/purchases
#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub credits: i64,
}

pub async fn request_purchase(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(body): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<SmsPurchase>), AppError> {
    let db = state.conn()?;
    let purchase = billing::request_purchase(
        &db,
        current.user.id,
        body.credits,
        state.config.sms_unit_price,
    )?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

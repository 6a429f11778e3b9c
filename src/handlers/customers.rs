use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Client;
use crate::services::auth::CurrentUser;
use crate::state::AppState;

// GET /api/client/customers
#[derive(Deserialize)]
pub struct CustomersQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<CustomersQuery>,
) -> Result<Json<Vec<Client>>, AppError> {
    let search = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    let db = state.conn()?;
    Ok(Json(queries::list_clients(&db, current.user.id, search, limit)?))
}

// POST /api/client/customers/:id
#[derive(Deserialize)]
pub struct UpdateCustomerRequest {
    pub client_name: String,
}

pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCustomerRequest>,
) -> Result<Json<Client>, AppError> {
    let name = body.client_name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("client name is required".to_string()));
    }

    let db = state.conn()?;
    if !queries::rename_client(&db, current.user.id, id, name)? {
        return Err(AppError::NotFound("customer".to_string()));
    }
    load(&db, current.user.id, id).map(Json)
}

// DELETE /api/client/customers/:id
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = state.conn()?;
    if !queries::delete_client(&db, current.user.id, id)? {
        return Err(AppError::NotFound("customer".to_string()));
    }
    tracing::info!(user_id = current.user.id, client_id = id, "customer deleted");
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/client/customers/:id/block
pub async fn block_customer(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Client>, AppError> {
    set_blocked(&state, current.user.id, id, true).map(Json)
}

// POST /api/client/customers/:id/unblock
pub async fn unblock_customer(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Client>, AppError> {
    set_blocked(&state, current.user.id, id, false).map(Json)
}

fn set_blocked(state: &AppState, user_id: i64, id: i64, blocked: bool) -> Result<Client, AppError> {
    let db = state.conn()?;
    if !queries::set_client_blocked(&db, user_id, id, blocked)? {
        return Err(AppError::NotFound("customer".to_string()));
    }
    tracing::info!(user_id, client_id = id, blocked, "customer block state changed");
    load(&db, user_id, id)
}

fn load(db: &rusqlite::Connection, user_id: i64, id: i64) -> Result<Client, AppError> {
    queries::get_client(db, user_id, id)?.ok_or_else(|| AppError::NotFound("customer".to_string()))
}

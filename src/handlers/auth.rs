use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::client::UserResponse;
use crate::services::auth::{self, CurrentUser, VerifyOtp};
use crate::state::AppState;

// POST /api/auth/otp
#[derive(Deserialize)]
pub struct OtpRequest {
    pub phone: String,
}

pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OtpRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let phone = auth::request_otp(&state, &body.phone).await?;
    Ok(Json(serde_json::json!({"ok": true, "phone": phone})))
}

// POST /api/auth/verify
#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    created: bool,
    user: UserResponse,
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyOtp>,
) -> Result<Response, AppError> {
    let login = auth::verify_otp(&state, &body)?;
    let cookie = auth::session_cookie(&login.token, state.config.session_ttl_hours);
    let now = state.config.local_now();

    let response = LoginResponse {
        token: login.token,
        created: login.created,
        user: UserResponse::new(login.user, now),
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(response)).into_response())
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Response, AppError> {
    auth::logout(&state, &current.token)?;
    tracing::info!(user_id = current.user.id, "session closed");
    Ok((
        [(header::SET_COOKIE, auth::clear_session_cookie())],
        Json(serde_json::json!({"ok": true})),
    )
        .into_response())
}

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::db::queries;
use crate::models::SmsStatus;
use crate::state::AppState;

const DELIVERY_PATH: &str = "/webhook/sms/delivery";

// HMAC-SHA1 over the URL followed by every param as `key` + `value`, keys sorted.
fn report_mac(secret: &str, url: &str, params: &BTreeMap<String, String>) -> Option<Hmac<Sha1>> {
    let mut data = url.to_string();
    for (key, value) in params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(data.as_bytes());
    Some(mac)
}

/// Base64 signature a provider sends in `X-Sms-Signature`.
pub fn sign_delivery_report(secret: &str, url: &str, params: &BTreeMap<String, String>) -> Option<String> {
    let mac = report_mac(secret, url, params)?;
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn validate_signature(
    secret: &str,
    signature: &str,
    url: &str,
    params: &BTreeMap<String, String>,
) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    report_mac(secret, url, params).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

fn delivery_status(raw: &str) -> Option<SmsStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "delivered" | "1" => Some(SmsStatus::Delivered),
        "undelivered" | "failed" | "2" => Some(SmsStatus::Undelivered),
        _ => None,
    }
}

// POST /webhook/sms/delivery
pub async fn sms_delivery(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<BTreeMap<String, String>>,
) -> Response {
    // Empty secret means signature checks are off (local development).
    if !state.config.sms_webhook_secret.is_empty() {
        let signature = headers
            .get("x-sms-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing X-Sms-Signature header");
            return (StatusCode::FORBIDDEN, "Missing signature").into_response();
        }

        let proto = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("https");
        let host = headers
            .get("x-forwarded-host")
            .or_else(|| headers.get("host"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let url = format!("{proto}://{host}{DELIVERY_PATH}");

        if !validate_signature(&state.config.sms_webhook_secret, signature, &url, &params) {
            tracing::warn!("invalid delivery report signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let Some(message_id) = params.get("message_id").filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "message_id is required").into_response();
    };
    let Some(status) = params.get("status").and_then(|s| delivery_status(s)) else {
        return (StatusCode::BAD_REQUEST, "unknown status").into_response();
    };

    let updated = {
        let db = match state.conn() {
            Ok(db) => db,
            Err(e) => return e.into_response(),
        };
        queries::update_sms_status_by_provider_id(&db, message_id, status)
    };

    match updated {
        Ok(found) => {
            tracing::info!(message_id = %message_id, status = status.as_str(), found, "delivery report");
            Json(serde_json::json!({"ok": true, "updated": found})).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to record delivery report");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

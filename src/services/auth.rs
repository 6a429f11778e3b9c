use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::Duration;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::phone::{mask_phone, normalize_phone};
use crate::models::{NewUser, OtpCode, User};
use crate::services::sms::{self, render_template, TEMPLATE_OTP};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "ontime_session";

const OTP_TTL_SECONDS: i64 = 120;
const OTP_RESEND_SECONDS: i64 = 60;
const OTP_MAX_ATTEMPTS: i64 = 5;

/// Issues a login code for `raw_phone` and sends it by SMS.
pub async fn request_otp(state: &AppState, raw_phone: &str) -> Result<String, AppError> {
    let phone = normalize_phone(raw_phone)
        .ok_or_else(|| AppError::BadRequest("invalid phone number".to_string()))?;
    let now = state.config.local_now();
    let code = new_otp_code();

    let template = {
        let db = state.conn()?;
        if let Some(existing) = queries::get_otp(&db, &phone)? {
            let wait = OTP_RESEND_SECONDS - (now - existing.created_at).num_seconds();
            if wait > 0 {
                return Err(AppError::RateLimited(format!(
                    "try again in {wait} seconds"
                )));
            }
        }

        queries::save_otp(
            &db,
            &OtpCode {
                phone: phone.clone(),
                code: code.clone(),
                attempts: 0,
                expires_at: now + Duration::seconds(OTP_TTL_SECONDS),
                created_at: now,
            },
        )?;
        queries::get_sms_template(&db, TEMPLATE_OTP)?
    };

    let text = match template {
        Some(t) => render_template(&t.body, &[("code", code.clone())]),
        None => format!("OnTime code: {code}"),
    };

    if let Err(e) = sms::send_system(state, &phone, &text, TEMPLATE_OTP).await {
        // an unsent code must not hold the resend window
        let db = state.conn()?;
        queries::delete_otp(&db, &phone)?;
        tracing::warn!(phone = %mask_phone(&phone), error = %e, "otp send failed");
        return Err(AppError::Messaging(e.to_string()));
    }

    tracing::info!(phone = %mask_phone(&phone), "otp issued");
    Ok(phone)
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtp {
    pub phone: String,
    pub code: String,
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub job_id: Option<i64>,
}

pub struct LoginResult {
    pub token: String,
    pub user: User,
    pub created: bool,
}

/// Checks the code, signs the user up on first login, and opens a session.
pub fn verify_otp(state: &AppState, req: &VerifyOtp) -> Result<LoginResult, AppError> {
    let phone = normalize_phone(&req.phone)
        .ok_or_else(|| AppError::BadRequest("invalid phone number".to_string()))?;
    let now = state.config.local_now();
    let db = state.conn()?;

    let otp = queries::get_otp(&db, &phone)?
        .ok_or_else(|| AppError::BadRequest("no code requested for this phone".to_string()))?;

    if now >= otp.expires_at {
        queries::delete_otp(&db, &phone)?;
        return Err(AppError::Gone("code expired, request a new one".to_string()));
    }

    if otp.code != req.code.trim() {
        if otp.attempts + 1 >= OTP_MAX_ATTEMPTS {
            queries::delete_otp(&db, &phone)?;
            tracing::warn!(phone = %mask_phone(&phone), "otp burned after too many attempts");
            return Err(AppError::RateLimited(
                "too many wrong attempts, request a new code".to_string(),
            ));
        }
        queries::increment_otp_attempts(&db, &phone)?;
        return Err(AppError::BadRequest("wrong code".to_string()));
    }

    let (user, created) = match queries::get_user_by_phone(&db, &phone)? {
        Some(user) => (user, false),
        None => {
            let name = req
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| AppError::BadRequest("name is required to sign up".to_string()))?;
            if let Some(job_id) = req.job_id {
                if !queries::job_exists(&db, job_id)? {
                    return Err(AppError::BadRequest("unknown job".to_string()));
                }
            }

            let id = queries::create_user(
                &db,
                &NewUser {
                    name: name.to_string(),
                    phone: phone.clone(),
                    business_name: req.business_name.as_deref().unwrap_or("").trim().to_string(),
                    job_id: req.job_id,
                    sms_balance: state.config.trial_sms_credit,
                    trial_ends_at: Some(now + Duration::days(state.config.trial_days)),
                },
            )?;
            tracing::info!(user_id = id, phone = %mask_phone(&phone), "account created");
            let user = queries::get_user(&db, id)?
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("user vanished after insert")))?;
            (user, true)
        }
    };

    queries::delete_otp(&db, &phone)?;

    let token = new_session_token();
    queries::create_session(
        &db,
        &token,
        user.id,
        &(now + Duration::hours(state.config.session_ttl_hours)),
    )?;
    queries::delete_expired_sessions(&db, &now)?;

    tracing::info!(user_id = user.id, "session opened");
    Ok(LoginResult {
        token,
        user,
        created,
    })
}

pub fn logout(state: &AppState, token: &str) -> Result<(), AppError> {
    let db = state.conn()?;
    queries::delete_session(&db, token)?;
    Ok(())
}

pub fn session_cookie(token: &str, max_age_hours: i64) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age_hours * 3600
    )
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|t| !t.is_empty())
}

/// The logged-in business owner.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or(AppError::Unauthorized)?;
        let now = state.config.local_now();
        let user = {
            let db = state.conn()?;
            queries::get_session_user(&db, &token, &now)?
        };
        let user = user.ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser { user, token })
    }
}

fn new_otp_code() -> String {
    format!("{:06}", uuid::Uuid::new_v4().as_u128() % 1_000_000)
}

fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_otp_code_is_six_digits() {
        for _ in 0..50 {
            let code = new_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_session_token_from_bearer() {
        let p = parts(&[("authorization", "Bearer abc")]);
        assert_eq!(session_token(&p).as_deref(), Some("abc"));
    }

    #[test]
    fn test_session_token_from_cookie() {
        let p = parts(&[("cookie", "theme=dark; ontime_session=xyz; lang=fa")]);
        assert_eq!(session_token(&p).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_session_token_missing() {
        assert_eq!(session_token(&parts(&[])), None);
        assert_eq!(session_token(&parts(&[("cookie", "ontime_session=")])), None);
        assert_eq!(session_token(&parts(&[("authorization", "Basic abc")])), None);
    }

    #[test]
    fn test_session_cookie_format() {
        assert_eq!(
            session_cookie("tok", 1),
            "ontime_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"
        );
    }
}

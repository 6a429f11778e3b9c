use std::env;

use chrono::{Duration, NaiveDateTime, Utc};

const MAX_TRIAL_DAYS: i64 = 365;
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub public_base_url: String,
    pub sms_api_url: String,
    pub sms_api_key: String,
    pub sms_line_number: String,
    pub sms_webhook_secret: String,
    /// Offset of business-local time from UTC. Tehran has no DST, so a fixed offset is enough.
    pub utc_offset_minutes: i64,
    pub trial_days: i64,
    pub trial_sms_credit: i64,
    pub session_ttl_hours: i64,
    pub sms_unit_price: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "ontime.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            sms_api_url: env::var("SMS_API_URL")
                .unwrap_or_else(|_| "https://api.sms.ir".to_string()),
            sms_api_key: env::var("SMS_API_KEY").unwrap_or_default(),
            sms_line_number: env::var("SMS_LINE_NUMBER").unwrap_or_default(),
            sms_webhook_secret: env::var("SMS_WEBHOOK_SECRET").unwrap_or_default(),
            utc_offset_minutes: int_var("UTC_OFFSET_MINUTES", 210),
            trial_days: int_var("TRIAL_DAYS", 14).clamp(0, MAX_TRIAL_DAYS),
            trial_sms_credit: int_var("TRIAL_SMS_CREDIT", 20),
            session_ttl_hours: int_var("SESSION_TTL_HOURS", 720).clamp(1, MAX_SESSION_TTL_HOURS),
            sms_unit_price: int_var("SMS_UNIT_PRICE", 150),
        }
    }

    /// Current wall-clock time in business-local time.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().naive_utc() + Duration::minutes(self.utc_offset_minutes)
    }

    pub fn customer_link(&self, token: &str) -> String {
        format!(
            "{}/b/{token}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

fn int_var(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A business owner account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub business_name: String,
    pub job_id: Option<i64>,
    pub plan_key: Option<String>,
    pub sms_balance: i64,
    pub purchased_sms_credit: i64,
    pub trial_ends_at: Option<NaiveDateTime>,
    pub quota_ends_at: Option<NaiveDateTime>,
    pub availability: Option<String>,
    pub sms_on_booking: bool,
    pub sms_on_cancel: bool,
    pub sms_on_reschedule: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn display_business_name(&self) -> &str {
        if self.business_name.trim().is_empty() {
            &self.name
        } else {
            &self.business_name
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub phone: String,
    pub business_name: String,
    pub job_id: Option<i64>,
    pub sms_balance: i64,
    pub trial_ends_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct OtpCode {
    pub phone: String,
    pub code: String,
    pub attempts: i64,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

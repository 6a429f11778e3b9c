use serde::{Deserialize, Serialize};

/// Subscription tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub key: String,
    pub title: String,
    pub price: i64,
    pub sms_quota: i64,
    pub duration_days: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
}

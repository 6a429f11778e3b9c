use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An end customer of one business. Unique per (user_id, client_phone).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub user_id: i64,
    pub client_name: String,
    pub client_phone: String,
    pub total_bookings: i64,
    pub cancelled_count: i64,
    pub is_blocked: bool,
    pub created_at: NaiveDateTime,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsTemplate {
    pub key: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmsStatus {
    Sent,
    Failed,
    InsufficientCredit,
    Delivered,
    Undelivered,
}

impl SmsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsStatus::Sent => "sent",
            SmsStatus::Failed => "failed",
            SmsStatus::InsufficientCredit => "insufficient_credit",
            SmsStatus::Delivered => "delivered",
            SmsStatus::Undelivered => "undelivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(SmsStatus::Sent),
            "failed" => Some(SmsStatus::Failed),
            "insufficient_credit" => Some(SmsStatus::InsufficientCredit),
            "delivered" => Some(SmsStatus::Delivered),
            "undelivered" => Some(SmsStatus::Undelivered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub phone: String,
    pub message: String,
    pub parts: i64,
    pub kind: String,
    pub status: SmsStatus,
    pub provider_message_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewSmsLog<'a> {
    pub user_id: Option<i64>,
    pub phone: &'a str,
    pub message: &'a str,
    pub parts: i64,
    pub kind: &'a str,
    pub status: SmsStatus,
    pub provider_message_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Approved,
    Rejected,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Approved => "approved",
            PurchaseStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PurchaseStatus::Pending),
            "approved" => Some(PurchaseStatus::Approved),
            "rejected" => Some(PurchaseStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsPurchase {
    pub id: i64,
    pub user_id: i64,
    pub credits: i64,
    pub amount: i64,
    pub status: PurchaseStatus,
    pub created_at: String,
    pub decided_at: Option<String>,
}

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Customer links allow one reschedule.
pub const MAX_CUSTOMER_CHANGES: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub client_id: Option<i64>,
    pub client_name: String,
    pub client_phone: String,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub customer_token: String,
    pub token_expires_at: NaiveDateTime,
    pub change_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.booking_date.and_time(self.booking_time)
    }

    pub fn token_expired(&self, now: NaiveDateTime) -> bool {
        now >= self.token_expires_at
    }

    pub fn can_cancel(&self, now: NaiveDateTime) -> bool {
        self.status == BookingStatus::Active && !self.token_expired(now)
    }

    pub fn can_reschedule(&self, now: NaiveDateTime) -> bool {
        self.can_cancel(now) && self.change_count < MAX_CUSTOMER_CHANGES
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
    Done,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BookingStatus::Active),
            "cancelled" => Some(BookingStatus::Cancelled),
            "done" => Some(BookingStatus::Done),
            _ => None,
        }
    }
}

/// Row to insert; the database assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: i64,
    pub client_id: Option<i64>,
    pub client_name: String,
    pub client_phone: String,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: Option<String>,
    pub customer_token: String,
    pub token_expires_at: NaiveDateTime,
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Accepts `HH:MM` and drops seconds from `HH:MM:SS`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
        .and_then(|t| t.with_second(0))
}

pub fn new_customer_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

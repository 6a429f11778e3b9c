use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::booking::{DATE_FORMAT, TIME_FORMAT};
use crate::models::Booking;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Created,
    Cancelled,
    Rescheduled,
    Deleted,
}

/// Live dashboard notification for one business.
#[derive(Debug, Clone, Serialize)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub user_id: i64,
    pub booking_id: i64,
    pub booking_date: String,
    pub booking_time: String,
    pub client_name: String,
}

impl BookingEvent {
    pub fn new(kind: BookingEventKind, booking: &Booking) -> Self {
        Self {
            kind,
            user_id: booking.user_id,
            booking_id: booking.id,
            booking_date: booking.booking_date.format(DATE_FORMAT).to_string(),
            booking_time: booking.booking_time.format(TIME_FORMAT).to_string(),
            client_name: booking.client_name.clone(),
        }
    }
}

/// Sends to whoever is listening. No subscribers is not an error.
pub fn publish(tx: &broadcast::Sender<BookingEvent>, event: BookingEvent) {
    let _ = tx.send(event);
}

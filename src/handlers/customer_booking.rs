use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::client::SlotsResponse;
use crate::models::booking::{parse_date, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use crate::models::jalali::persian_time;
use crate::models::{Booking, BookingStatus, JalaliDate, User};
use crate::services::booking::{parse_slot, user_availability};
use crate::services::sms::SmsOutcome;
use crate::services::{customer_booking, scheduling};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CustomerBookingResponse {
    business_name: String,
    client_name: String,
    booking_date: String,
    booking_time: String,
    jalali_date: String,
    persian_time: String,
    notes: Option<String>,
    status: BookingStatus,
    token_expires_at: String,
    can_cancel: bool,
    can_reschedule: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sms: Option<SmsOutcome>,
}

impl CustomerBookingResponse {
    fn new(b: Booking, user: &User, now: chrono::NaiveDateTime, sms: Option<SmsOutcome>) -> Self {
        Self {
            business_name: user.display_business_name().to_string(),
            can_cancel: b.can_cancel(now),
            can_reschedule: b.can_reschedule(now),
            jalali_date: JalaliDate::from_gregorian(b.booking_date).to_persian_long(),
            persian_time: persian_time(b.booking_time),
            booking_date: b.booking_date.format(DATE_FORMAT).to_string(),
            booking_time: b.booking_time.format(TIME_FORMAT).to_string(),
            token_expires_at: b.token_expires_at.format(DATETIME_FORMAT).to_string(),
            client_name: b.client_name,
            notes: b.notes,
            status: b.status,
            sms,
        }
    }
}

// GET /api/customer-booking/:token
pub async fn view_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<CustomerBookingResponse>, AppError> {
    let now = state.config.local_now();
    let (booking, user) = {
        let db = state.conn()?;
        customer_booking::lookup(&db, &token, now)?
    };
    Ok(Json(CustomerBookingResponse::new(booking, &user, now, None)))
}

// POST /api/customer-booking/:token/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<CustomerBookingResponse>, AppError> {
    let (booking, user, sms) = customer_booking::cancel(&state, &token).await?;
    let now = state.config.local_now();
    Ok(Json(CustomerBookingResponse::new(booking, &user, now, Some(sms))))
}

// POST /api/customer-booking/:token/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub booking_date: String,
    pub booking_time: String,
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<CustomerBookingResponse>, AppError> {
    let (date, time) = parse_slot(&body.booking_date, &body.booking_time)?;
    let (booking, user, sms) = customer_booking::reschedule(&state, &token, date, time).await?;
    let now = state.config.local_now();
    Ok(Json(CustomerBookingResponse::new(booking, &user, now, Some(sms))))
}

// GET /api/customer-booking/:token/slots?date=
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

pub async fn free_slots(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = parse_date(&query.date)
        .ok_or_else(|| AppError::BadRequest("invalid date, expected YYYY-MM-DD".to_string()))?;
    let now = state.config.local_now();

    let slots = {
        let db = state.conn()?;
        let (_, user) = customer_booking::lookup(&db, &token, now)?;
        let availability = user_availability(&user);
        scheduling::free_slots(&db, user.id, date, availability.as_ref(), now)?
    };

    Ok(Json(SlotsResponse {
        date: date.format(DATE_FORMAT).to_string(),
        jalali_date: JalaliDate::from_gregorian(date).to_numeric(),
        slots: slots.iter().map(|t| t.format(TIME_FORMAT).to_string()).collect(),
    }))
}

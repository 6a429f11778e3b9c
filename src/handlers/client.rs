use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::booking::{parse_date, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use crate::models::{Availability, Booking, BookingStatus, JalaliDate, User};
use crate::services::auth::CurrentUser;
use crate::services::billing::SubscriptionStatus;
use crate::services::booking::{self, CreateBooking, UpdateBooking};
use crate::services::scheduling;
use crate::services::sms::SmsOutcome;
use crate::state::AppState;

#[derive(Serialize)]
pub struct UserResponse {
    id: i64,
    name: String,
    phone: String,
    business_name: String,
    job_id: Option<i64>,
    plan_key: Option<String>,
    sms_balance: i64,
    purchased_sms_credit: i64,
    subscription: SubscriptionStatus,
    availability: Option<Availability>,
    sms_on_booking: bool,
    sms_on_cancel: bool,
    sms_on_reschedule: bool,
    created_at: String,
}

impl UserResponse {
    pub fn new(user: User, now: NaiveDateTime) -> Self {
        let subscription = SubscriptionStatus::of(&user, now);
        let availability = booking::user_availability(&user);
        Self {
            id: user.id,
            name: user.name,
            phone: user.phone,
            business_name: user.business_name,
            job_id: user.job_id,
            plan_key: user.plan_key,
            sms_balance: user.sms_balance,
            purchased_sms_credit: user.purchased_sms_credit,
            subscription,
            availability,
            sms_on_booking: user.sms_on_booking,
            sms_on_cancel: user.sms_on_cancel,
            sms_on_reschedule: user.sms_on_reschedule,
            created_at: user.created_at.format(DATETIME_FORMAT).to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct BookingResponse {
    id: i64,
    client_id: Option<i64>,
    client_name: String,
    client_phone: String,
    booking_date: String,
    booking_time: String,
    jalali_date: String,
    notes: Option<String>,
    status: BookingStatus,
    customer_link: String,
    change_count: i32,
    created_at: String,
    updated_at: String,
}

impl BookingResponse {
    pub fn new(b: Booking, config: &AppConfig) -> Self {
        Self {
            id: b.id,
            client_id: b.client_id,
            customer_link: config.customer_link(&b.customer_token),
            jalali_date: JalaliDate::from_gregorian(b.booking_date).to_numeric(),
            booking_date: b.booking_date.format(DATE_FORMAT).to_string(),
            booking_time: b.booking_time.format(TIME_FORMAT).to_string(),
            client_name: b.client_name,
            client_phone: b.client_phone,
            notes: b.notes,
            status: b.status,
            change_count: b.change_count,
            created_at: b.created_at.format(DATETIME_FORMAT).to_string(),
            updated_at: b.updated_at.format(DATETIME_FORMAT).to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct BookingWithSms {
    booking: BookingResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    sms: Option<SmsOutcome>,
}

// GET /api/client/me
pub async fn me(State(state): State<Arc<AppState>>, current: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::new(current.user, state.config.local_now()))
}

// POST /api/client/settings
#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub job_id: Option<i64>,
    pub availability: Option<serde_json::Value>,
    pub sms_on_booking: Option<bool>,
    pub sms_on_cancel: Option<bool>,
    pub sms_on_reschedule: Option<bool>,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut user = current.user;

    if let Some(name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        user.name = name.to_string();
    }
    if let Some(business_name) = body.business_name {
        user.business_name = business_name.trim().to_string();
    }
    if let Some(value) = body.availability {
        user.availability = match value {
            serde_json::Value::Null => None,
            value => {
                let raw = value.to_string();
                Availability::from_json(&raw)
                    .map_err(|e| AppError::BadRequest(format!("invalid availability: {e}")))?;
                Some(raw)
            }
        };
    }
    if let Some(v) = body.sms_on_booking {
        user.sms_on_booking = v;
    }
    if let Some(v) = body.sms_on_cancel {
        user.sms_on_cancel = v;
    }
    if let Some(v) = body.sms_on_reschedule {
        user.sms_on_reschedule = v;
    }

    let user = {
        let db = state.conn()?;
        if let Some(job_id) = body.job_id {
            if !queries::job_exists(&db, job_id)? {
                return Err(AppError::BadRequest("unknown job".to_string()));
            }
            user.job_id = Some(job_id);
        }
        queries::save_user_settings(&db, &user)?;
        queries::get_user(&db, user.id)?.ok_or_else(|| AppError::NotFound("user".to_string()))?
    };

    tracing::info!(user_id = user.id, "settings updated");
    Ok(Json(UserResponse::new(user, state.config.local_now())))
}

// GET /api/client/stats
#[derive(Serialize)]
pub struct StatsResponse {
    today: i64,
    upcoming: i64,
    done: i64,
    cancelled: i64,
    customers: i64,
    sms_balance: i64,
    subscription: SubscriptionStatus,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<StatsResponse>, AppError> {
    let now = state.config.local_now();
    let stats = {
        let db = state.conn()?;
        booking::sweep(&db, current.user.id, now)?;
        queries::get_booking_stats(&db, current.user.id, &now)?
    };

    Ok(Json(StatsResponse {
        today: stats.today,
        upcoming: stats.upcoming,
        done: stats.done,
        cancelled: stats.cancelled,
        customers: stats.clients,
        sms_balance: current.user.sms_balance,
        subscription: SubscriptionStatus::of(&current.user, now),
    }))
}

// GET /api/client/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub date: Option<String>,
    pub phone: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("unknown status: {s}")))?,
        ),
        None => None,
    };
    let date = match query.date.as_deref().filter(|s| !s.is_empty()) {
        Some(d) => Some(parse_date(d).ok_or_else(|| AppError::BadRequest("invalid date".to_string()))?),
        None => None,
    };
    let filter = BookingFilter {
        status,
        date,
        client_phone: query
            .phone
            .as_deref()
            .and_then(crate::models::phone::normalize_phone),
        limit: query.limit.unwrap_or(100).clamp(1, 500),
    };

    let bookings = {
        let db = state.conn()?;
        booking::list_bookings(&db, &current.user, &filter, state.config.local_now())?
    };

    Ok(Json(
        bookings
            .into_iter()
            .map(|b| BookingResponse::new(b, &state.config))
            .collect(),
    ))
}

// POST /api/client/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(body): Json<CreateBooking>,
) -> Result<(StatusCode, Json<BookingWithSms>), AppError> {
    let (booking, sms) = booking::create_booking(&state, &current.user, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookingWithSms {
            booking: BookingResponse::new(booking, &state.config),
            sms: Some(sms),
        }),
    ))
}

// GET /api/client/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let db = state.conn()?;
        booking::get_booking(&db, &current.user, id, state.config.local_now())?
    };
    Ok(Json(BookingResponse::new(booking, &state.config)))
}

// PUT /api/client/bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBooking>,
) -> Result<Json<BookingWithSms>, AppError> {
    let (booking, sms) = booking::update_booking(&state, &current.user, id, &body).await?;
    Ok(Json(BookingWithSms {
        booking: BookingResponse::new(booking, &state.config),
        sms,
    }))
}

// POST /api/client/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<BookingWithSms>, AppError> {
    let (booking, sms) = booking::cancel_booking(&state, &current.user, id).await?;
    Ok(Json(BookingWithSms {
        booking: BookingResponse::new(booking, &state.config),
        sms: Some(sms),
    }))
}

// DELETE /api/client/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    booking::delete_booking(&state, &current.user, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// GET /api/client/availability?date=
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub jalali_date: String,
    pub slots: Vec<String>,
}

pub async fn free_slots(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = parse_date(&query.date)
        .ok_or_else(|| AppError::BadRequest("invalid date, expected YYYY-MM-DD".to_string()))?;
    let availability = booking::user_availability(&current.user);

    let slots = {
        let db = state.conn()?;
        scheduling::free_slots(
            &db,
            current.user.id,
            date,
            availability.as_ref(),
            state.config.local_now(),
        )?
    };

    Ok(Json(SlotsResponse {
        date: date.format(DATE_FORMAT).to_string(),
        jalali_date: JalaliDate::from_gregorian(date).to_numeric(),
        slots: slots.iter().map(|t| t.format(TIME_FORMAT).to_string()).collect(),
    }))
}

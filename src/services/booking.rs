use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::booking::{new_customer_token, parse_date, parse_time};
use crate::models::phone::{mask_phone, normalize_phone};
use crate::models::{Availability, Booking, BookingStatus, NewBooking, User};
use crate::services::billing::SubscriptionStatus;
use crate::services::events::{self, BookingEvent, BookingEventKind};
use crate::services::scheduling;
use crate::services::sms::{self, SmsOutcome};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    pub client_name: String,
    pub client_phone: String,
    pub booking_date: String,
    pub booking_time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBooking {
    pub booking_date: Option<String>,
    pub booking_time: Option<String>,
    pub notes: Option<String>,
}

/// Working hours of the business. Stored JSON is validated on save, so a
/// broken value is treated as "no hours configured".
pub fn user_availability(user: &User) -> Option<Availability> {
    let raw = user.availability.as_deref()?;
    match Availability::from_json(raw) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!(user_id = user.id, error = %e, "ignoring invalid stored availability");
            None
        }
    }
}

pub fn parse_slot(date: &str, time: &str) -> Result<(NaiveDate, NaiveTime), AppError> {
    let date = parse_date(date)
        .ok_or_else(|| AppError::BadRequest("invalid date, expected YYYY-MM-DD".to_string()))?;
    let time = parse_time(time)
        .ok_or_else(|| AppError::BadRequest("invalid time, expected HH:MM".to_string()))?;
    Ok((date, time))
}

fn clean_notes(notes: Option<&str>) -> Result<Option<String>, AppError> {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(AppError::BadRequest("notes too long".to_string()));
    }
    Ok(notes.map(str::to_string))
}

pub async fn create_booking(
    state: &AppState,
    user: &User,
    req: &CreateBooking,
) -> Result<(Booking, SmsOutcome), AppError> {
    let now = state.config.local_now();
    if !SubscriptionStatus::of(user, now).can_book() {
        return Err(AppError::PaymentRequired(
            "subscription expired, renew your plan to add bookings".to_string(),
        ));
    }

    let client_name = req.client_name.trim();
    if client_name.is_empty() || client_name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest("client name is required".to_string()));
    }
    let client_phone = normalize_phone(&req.client_phone)
        .ok_or_else(|| AppError::BadRequest("invalid client phone".to_string()))?;
    let (date, time) = parse_slot(&req.booking_date, &req.booking_time)?;
    let notes = clean_notes(req.notes.as_deref())?;
    let availability = user_availability(user);

    let booking = {
        let db = state.conn()?;

        if let Some(client) = queries::get_client_by_phone(&db, user.id, &client_phone)? {
            if client.is_blocked {
                return Err(AppError::Forbidden("this client is blocked".to_string()));
            }
        }

        scheduling::validate_booking_time(
            &db,
            user.id,
            date,
            time,
            availability.as_ref(),
            now,
            None,
        )?;

        let tx = db.unchecked_transaction()?;
        let client_id = queries::upsert_client_for_booking(&tx, user.id, client_name, &client_phone)?;
        let inserted = queries::insert_booking(
            &tx,
            &NewBooking {
                user_id: user.id,
                client_id: Some(client_id),
                client_name: client_name.to_string(),
                client_phone: client_phone.clone(),
                booking_date: date,
                booking_time: time,
                notes,
                customer_token: new_customer_token(),
                token_expires_at: date.and_time(time),
            },
            &now,
        );
        let id = match inserted {
            Ok(id) => id,
            Err(e) if queries::is_unique_violation(&e) => {
                return Err(AppError::Conflict("that time slot is already booked".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;

        queries::get_booking(&db, user.id, id)?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("booking vanished after insert")))?
    };

    tracing::info!(
        user_id = user.id,
        booking_id = booking.id,
        client = %mask_phone(&booking.client_phone),
        at = %booking.starts_at(),
        "booking created"
    );
    events::publish(
        &state.events_tx,
        BookingEvent::new(BookingEventKind::Created, &booking),
    );

    let sms = sms::notify_booking(state, user, &booking, sms::TEMPLATE_BOOKING_CREATED).await;
    Ok((booking, sms))
}

/// Sweeps past bookings to `done`, then lists.
pub fn list_bookings(
    conn: &Connection,
    user: &User,
    filter: &BookingFilter,
    now: chrono::NaiveDateTime,
) -> Result<Vec<Booking>, AppError> {
    sweep(conn, user.id, now)?;
    Ok(queries::list_bookings(conn, user.id, filter)?)
}

pub fn sweep(conn: &Connection, user_id: i64, now: chrono::NaiveDateTime) -> Result<(), AppError> {
    let swept = queries::mark_past_bookings_done(conn, user_id, &now)?;
    if swept > 0 {
        tracing::info!(user_id, swept, "past bookings marked done");
    }
    Ok(())
}

pub fn get_booking(
    conn: &Connection,
    user: &User,
    id: i64,
    now: chrono::NaiveDateTime,
) -> Result<Booking, AppError> {
    queries::mark_booking_done_if_past(conn, id, &now)?;
    queries::get_booking(conn, user.id, id)?
        .ok_or_else(|| AppError::NotFound("booking".to_string()))
}

/// Owner edit: moves the booking and/or replaces its notes. Owner moves do not
/// count against the customer's reschedule allowance.
pub async fn update_booking(
    state: &AppState,
    user: &User,
    id: i64,
    req: &UpdateBooking,
) -> Result<(Booking, Option<SmsOutcome>), AppError> {
    let now = state.config.local_now();
    let notes = clean_notes(req.notes.as_deref())?;

    let (booking, moved) = {
        let db = state.conn()?;
        let current = get_booking(&db, user, id, now)?;

        let date = match &req.booking_date {
            Some(d) => parse_date(d).ok_or_else(|| AppError::BadRequest("invalid date".to_string()))?,
            None => current.booking_date,
        };
        let time = match &req.booking_time {
            Some(t) => parse_time(t).ok_or_else(|| AppError::BadRequest("invalid time".to_string()))?,
            None => current.booking_time,
        };
        let moved = date != current.booking_date || time != current.booking_time;

        let tx = db.unchecked_transaction()?;
        if moved {
            if current.status != BookingStatus::Active {
                return Err(AppError::Conflict("only active bookings can be moved".to_string()));
            }
            let availability = user_availability(user);
            scheduling::validate_booking_time(
                &tx,
                user.id,
                date,
                time,
                availability.as_ref(),
                now,
                Some(id),
            )?;
            let starts_at = date.and_time(time);
            match queries::move_booking(&tx, id, &date, &time, &starts_at, false, &now) {
                Ok(_) => {}
                Err(e) if queries::is_unique_violation(&e) => {
                    return Err(AppError::Conflict("that time slot is already booked".to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        if req.notes.is_some() {
            queries::set_booking_notes(&tx, id, notes.as_deref(), &now)?;
        }
        tx.commit()?;

        let booking = queries::get_booking(&db, user.id, id)?
            .ok_or_else(|| AppError::NotFound("booking".to_string()))?;
        (booking, moved)
    };

    if !moved {
        return Ok((booking, None));
    }

    tracing::info!(user_id = user.id, booking_id = id, at = %booking.starts_at(), "booking moved by owner");
    events::publish(
        &state.events_tx,
        BookingEvent::new(BookingEventKind::Rescheduled, &booking),
    );
    let sms = sms::notify_booking(state, user, &booking, sms::TEMPLATE_BOOKING_RESCHEDULED).await;
    Ok((booking, Some(sms)))
}

pub async fn cancel_booking(
    state: &AppState,
    user: &User,
    id: i64,
) -> Result<(Booking, SmsOutcome), AppError> {
    let now = state.config.local_now();

    let booking = {
        let db = state.conn()?;
        let current = get_booking(&db, user, id, now)?;
        cancel_active(&db, &current, now)?;
        queries::get_booking(&db, user.id, id)?
            .ok_or_else(|| AppError::NotFound("booking".to_string()))?
    };

    tracing::info!(user_id = user.id, booking_id = id, "booking cancelled by owner");
    events::publish(
        &state.events_tx,
        BookingEvent::new(BookingEventKind::Cancelled, &booking),
    );
    let sms = sms::notify_booking(state, user, &booking, sms::TEMPLATE_BOOKING_CANCELLED).await;
    Ok((booking, sms))
}

/// `active → cancelled` plus the client's cancellation counter, in one transaction.
pub fn cancel_active(
    conn: &Connection,
    booking: &Booking,
    now: chrono::NaiveDateTime,
) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    if !queries::cancel_booking(&tx, booking.id, &now)? {
        return Err(AppError::Conflict(format!(
            "booking is {}, not active",
            booking.status.as_str()
        )));
    }
    queries::increment_client_cancelled(&tx, booking.user_id, &booking.client_phone)?;
    tx.commit()?;
    Ok(())
}

pub fn delete_booking(state: &AppState, user: &User, id: i64) -> Result<(), AppError> {
    let booking = {
        let db = state.conn()?;
        let booking = queries::get_booking(&db, user.id, id)?
            .ok_or_else(|| AppError::NotFound("booking".to_string()))?;
        queries::delete_booking(&db, user.id, id)?;
        booking
    };

    tracing::info!(user_id = user.id, booking_id = id, "booking deleted");
    events::publish(
        &state.events_tx,
        BookingEvent::new(BookingEventKind::Deleted, &booking),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::NewUser;

    fn dt(s: &str) -> chrono::NaiveDateTime {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn user_with(availability: Option<&str>) -> User {
        let conn = db::init_db(":memory:").unwrap();
        let id = queries::create_user(
            &conn,
            &NewUser {
                name: "Maryam".to_string(),
                phone: "09120000001".to_string(),
                business_name: String::new(),
                job_id: None,
                sms_balance: 0,
                trial_ends_at: None,
            },
        )
        .unwrap();
        let mut user = queries::get_user(&conn, id).unwrap().unwrap();
        user.availability = availability.map(str::to_string);
        user
    }

    #[test]
    fn test_parse_slot() {
        let (date, time) = parse_slot("2030-01-05", "10:30").unwrap();
        assert_eq!(date.and_time(time), dt("2030-01-05 10:30"));
        assert!(matches!(parse_slot("05/01/2030", "10:30"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_slot("2030-01-05", "25:00"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_clean_notes() {
        assert_eq!(clean_notes(Some("  ")).unwrap(), None);
        assert_eq!(clean_notes(Some(" color ")).unwrap().as_deref(), Some("color"));
        assert!(clean_notes(Some(&"x".repeat(MAX_NOTES_LEN + 1))).is_err());
    }

    #[test]
    fn test_user_availability() {
        assert!(user_availability(&user_with(None)).is_none());
        assert!(user_availability(&user_with(Some("{broken"))).is_none());
        let avail = user_availability(&user_with(Some(
            r#"{"slots":[{"day":"sat","start":"09:00","end":"17:00"}]}"#,
        )))
        .unwrap();
        assert_eq!(avail.slots.len(), 1);
    }

    #[test]
    fn test_cancel_active_only_once() {
        let conn = db::init_db(":memory:").unwrap();
        let user_id = queries::create_user(
            &conn,
            &NewUser {
                name: "Maryam".to_string(),
                phone: "09120000001".to_string(),
                business_name: String::new(),
                job_id: None,
                sms_balance: 0,
                trial_ends_at: None,
            },
        )
        .unwrap();
        queries::upsert_client_for_booking(&conn, user_id, "Sara", "09121234567").unwrap();
        let start = dt("2030-01-05 10:00");
        let id = queries::insert_booking(
            &conn,
            &NewBooking {
                user_id,
                client_id: None,
                client_name: "Sara".to_string(),
                client_phone: "09121234567".to_string(),
                booking_date: start.date(),
                booking_time: start.time(),
                notes: None,
                customer_token: new_customer_token(),
                token_expires_at: start,
            },
            &dt("2030-01-01 08:00"),
        )
        .unwrap();
        let booking = queries::get_booking(&conn, user_id, id).unwrap().unwrap();

        cancel_active(&conn, &booking, dt("2030-01-02 08:00")).unwrap();
        assert!(matches!(
            cancel_active(&conn, &booking, dt("2030-01-02 08:00")),
            Err(AppError::Conflict(_))
        ));

        let client = queries::get_client_by_phone(&conn, user_id, "09121234567").unwrap().unwrap();
        assert_eq!(client.cancelled_count, 1);
    }
}

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::booking::MAX_CUSTOMER_CHANGES;
use crate::models::{Booking, BookingStatus, User};
use crate::services::booking::{cancel_active, user_availability};
use crate::services::events::{self, BookingEvent, BookingEventKind};
use crate::services::scheduling;
use crate::services::sms::{self, SmsOutcome};
use crate::state::AppState;

/// Booking behind a customer link, with its business. Applies the done-sweep first.
pub fn lookup(
    conn: &Connection,
    token: &str,
    now: NaiveDateTime,
) -> Result<(Booking, User), AppError> {
    let booking = queries::get_booking_by_token(conn, token)?
        .ok_or_else(|| AppError::NotFound("booking".to_string()))?;

    let booking = if queries::mark_booking_done_if_past(conn, booking.id, &now)? {
        queries::get_booking_by_token(conn, token)?
            .ok_or_else(|| AppError::NotFound("booking".to_string()))?
    } else {
        booking
    };

    let user = queries::get_user(conn, booking.user_id)?
        .ok_or_else(|| AppError::NotFound("business".to_string()))?;
    Ok((booking, user))
}

/// Rejects links that can no longer change anything: expired (410) or not active (409).
fn ensure_changeable(booking: &Booking, now: NaiveDateTime) -> Result<(), AppError> {
    if booking.token_expired(now) {
        return Err(AppError::Gone("this link has expired".to_string()));
    }
    if booking.status != BookingStatus::Active {
        return Err(AppError::Conflict(format!(
            "booking is {}",
            booking.status.as_str()
        )));
    }
    Ok(())
}

pub async fn cancel(
    state: &AppState,
    token: &str,
) -> Result<(Booking, User, SmsOutcome), AppError> {
    let now = state.config.local_now();

    let (booking, user) = {
        let db = state.conn()?;
        let (booking, user) = lookup(&db, token, now)?;
        ensure_changeable(&booking, now)?;
        cancel_active(&db, &booking, now)?;
        let (booking, _) = lookup(&db, token, now)?;
        (booking, user)
    };

    tracing::info!(user_id = user.id, booking_id = booking.id, "booking cancelled by customer");
    events::publish(
        &state.events_tx,
        BookingEvent::new(BookingEventKind::Cancelled, &booking),
    );
    let sms = sms::notify_booking(state, &user, &booking, sms::TEMPLATE_BOOKING_CANCELLED).await;
    Ok((booking, user, sms))
}

/// Moves the booking once. Check and update share one transaction on the
/// serialized connection, and the active-slot index backs the check.
pub async fn reschedule(
    state: &AppState,
    token: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<(Booking, User, SmsOutcome), AppError> {
    let now = state.config.local_now();

    let (booking, user) = {
        let db = state.conn()?;
        let (booking, user) = lookup(&db, token, now)?;
        ensure_changeable(&booking, now)?;
        if booking.change_count >= MAX_CUSTOMER_CHANGES {
            return Err(AppError::Forbidden(
                "this booking has already been rescheduled once".to_string(),
            ));
        }

        let availability = user_availability(&user);
        let tx = db.unchecked_transaction()?;
        scheduling::validate_booking_time(
            &tx,
            user.id,
            date,
            time,
            availability.as_ref(),
            now,
            Some(booking.id),
        )?;
        let starts_at = date.and_time(time);
        match queries::move_booking(&tx, booking.id, &date, &time, &starts_at, true, &now) {
            Ok(true) => {}
            Ok(false) => return Err(AppError::Conflict("booking is no longer active".to_string())),
            Err(e) if queries::is_unique_violation(&e) => {
                return Err(AppError::Conflict("that time slot is already booked".to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;

        let (booking, _) = lookup(&db, token, now)?;
        (booking, user)
    };

    tracing::info!(
        user_id = user.id,
        booking_id = booking.id,
        at = %booking.starts_at(),
        "booking rescheduled by customer"
    );
    events::publish(
        &state.events_tx,
        BookingEvent::new(BookingEventKind::Rescheduled, &booking),
    );
    let sms = sms::notify_booking(state, &user, &booking, sms::TEMPLATE_BOOKING_RESCHEDULED).await;
    Ok((booking, user, sms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::booking::new_customer_token;
    use crate::models::{NewBooking, NewUser};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup(at: &str) -> (Connection, String) {
        let conn = db::init_db(":memory:").unwrap();
        let user_id = queries::create_user(
            &conn,
            &NewUser {
                name: "Maryam".to_string(),
                phone: "09120000001".to_string(),
                business_name: "Salon".to_string(),
                job_id: None,
                sms_balance: 0,
                trial_ends_at: None,
            },
        )
        .unwrap();
        let token = new_customer_token();
        let start = dt(at);
        queries::insert_booking(
            &conn,
            &NewBooking {
                user_id,
                client_id: None,
                client_name: "Sara".to_string(),
                client_phone: "09121234567".to_string(),
                booking_date: start.date(),
                booking_time: start.time(),
                notes: None,
                customer_token: token.clone(),
                token_expires_at: start,
            },
            &dt("2030-01-01 08:00"),
        )
        .unwrap();
        (conn, token)
    }

    #[test]
    fn test_lookup_unknown_token() {
        let (conn, _) = setup("2030-01-05 10:00");
        assert!(matches!(
            lookup(&conn, "nope", dt("2030-01-02 00:00")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_sweeps_past_booking() {
        let (conn, token) = setup("2030-01-05 10:00");
        let (booking, user) = lookup(&conn, &token, dt("2030-01-05 10:30")).unwrap();
        assert_eq!(booking.status, BookingStatus::Done);
        assert_eq!(user.business_name, "Salon");
    }

    #[test]
    fn test_expired_link_is_gone_before_status_check() {
        let (conn, token) = setup("2030-01-05 10:00");
        let now = dt("2030-01-05 10:30");
        let (booking, _) = lookup(&conn, &token, now).unwrap();
        assert!(matches!(ensure_changeable(&booking, now), Err(AppError::Gone(_))));
    }

    #[test]
    fn test_cancelled_booking_is_conflict() {
        let (conn, token) = setup("2030-01-05 10:00");
        let now = dt("2030-01-02 00:00");
        let (booking, _) = lookup(&conn, &token, now).unwrap();
        ensure_changeable(&booking, now).unwrap();
        cancel_active(&conn, &booking, now).unwrap();

        let (booking, _) = lookup(&conn, &token, now).unwrap();
        assert!(matches!(ensure_changeable(&booking, now), Err(AppError::Conflict(_))));
    }
}

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::Availability;

#[derive(Debug)]
pub enum SchedulingError {
    InPast,
    OutsideBusinessHours { hours: String },
    Conflict,
    Database(anyhow::Error),
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::InPast => write!(f, "that time has already passed"),
            SchedulingError::OutsideBusinessHours { hours } => {
                write!(f, "that time is outside business hours ({hours})")
            }
            SchedulingError::Conflict => write!(f, "that time slot is already booked"),
            SchedulingError::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for SchedulingError {}

/// Checks that `date time` is bookable for the business: not in the past, inside working
/// hours when any are configured, and not held by another active booking.
pub fn validate_booking_time(
    conn: &Connection,
    user_id: i64,
    date: NaiveDate,
    time: NaiveTime,
    availability: Option<&Availability>,
    now: NaiveDateTime,
    exclude_id: Option<i64>,
) -> Result<(), SchedulingError> {
    if date.and_time(time) <= now {
        return Err(SchedulingError::InPast);
    }

    if let Some(avail) = availability {
        if !avail.is_empty() && !avail.is_open(date, time) {
            return Err(SchedulingError::OutsideBusinessHours {
                hours: avail.to_human_readable(),
            });
        }
    }

    let taken = queries::find_active_booking_at(conn, user_id, &date, &time, exclude_id)
        .map_err(SchedulingError::Database)?;
    if taken.is_some() {
        return Err(SchedulingError::Conflict);
    }

    Ok(())
}

/// Open, future, untaken slot start times of `date`. Empty without working hours.
pub fn free_slots(
    conn: &Connection,
    user_id: i64,
    date: NaiveDate,
    availability: Option<&Availability>,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<NaiveTime>> {
    let Some(avail) = availability else {
        return Ok(vec![]);
    };

    let taken = queries::taken_times(conn, user_id, &date)?;
    Ok(avail
        .slot_times(date)
        .into_iter()
        .filter(|t| date.and_time(*t) > now && !taken.contains(t))
        .collect())
}

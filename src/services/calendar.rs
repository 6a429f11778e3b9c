use chrono::{Duration, NaiveDateTime};

use crate::models::Booking;

/// Calendar entries carry no duration of their own; one slot is shown as this long.
const DEFAULT_DURATION_MINUTES: i64 = 30;

/// `utc_offset_minutes` converts the stored local `updated_at` into the UTC `DTSTAMP`.
pub fn generate_ics(
    booking: &Booking,
    business_name: &str,
    link: &str,
    utc_offset_minutes: i64,
) -> String {
    let start = booking.starts_at();
    let dtstart = ics_time(&start);
    let dtend = ics_time(&(start + Duration::minutes(DEFAULT_DURATION_MINUTES)));
    let dtstamp = format!(
        "{}Z",
        ics_time(&(booking.updated_at - Duration::minutes(utc_offset_minutes)))
    );
    let uid = format!("{}@ontime", booking.customer_token);

    let summary = escape(&format!("Appointment at {business_name}"));
    let description = escape(booking.notes.as_deref().unwrap_or(link));

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//OnTime//Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         URL:{link}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

fn ics_time(dt: &NaiveDateTime) -> String {
    dt.format("%Y%m%dT%H%M%S").to_string()
}

// RFC 5545 text escaping
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\r', "\\n")
        .replace('\n', "\\n")
}

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::blog::NewBlogPost;
use crate::models::booking::{DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use crate::models::{
    BlogPost, Booking, BookingStatus, Client, Job, NewBooking, NewSmsLog, NewUser, OtpCode, Plan,
    PurchaseStatus, SmsLog, SmsPurchase, SmsStatus, SmsTemplate, User,
};

// ── Users ──

const USER_COLUMNS: &str = "id, name, phone, business_name, job_id, plan_key, sms_balance, \
     purchased_sms_credit, trial_ends_at, quota_ends_at, availability, sms_on_booking, \
     sms_on_cancel, sms_on_reschedule, created_at";

pub fn create_user(conn: &Connection, user: &NewUser) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO users (name, phone, business_name, job_id, sms_balance, trial_ends_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.name,
            user.phone,
            user.business_name,
            user.job_id,
            user.sms_balance,
            user.trial_ends_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
}

pub fn get_user_by_phone(conn: &Connection, phone: &str) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1");
    Ok(conn.query_row(&sql, params![phone], user_from_row).optional()?)
}

pub fn list_users(
    conn: &Connection,
    search: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<User>> {
    let pattern = search.map(|s| format!("%{}%", s.trim()));
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE ?1 IS NULL OR name LIKE ?1 OR phone LIKE ?1 OR business_name LIKE ?1
         ORDER BY id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pattern, limit], user_from_row)?;

    let mut users = vec![];
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

/// Persists the owner-editable profile fields.
pub fn save_user_settings(conn: &Connection, user: &User) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET
           name = ?2,
           business_name = ?3,
           job_id = ?4,
           availability = ?5,
           sms_on_booking = ?6,
           sms_on_cancel = ?7,
           sms_on_reschedule = ?8
         WHERE id = ?1",
        params![
            user.id,
            user.name,
            user.business_name,
            user.job_id,
            user.availability,
            user.sms_on_booking,
            user.sms_on_cancel,
            user.sms_on_reschedule,
        ],
    )?;
    Ok(count > 0)
}

/// Persists the operator-controlled subscription and credit fields.
pub fn save_user_billing(conn: &Connection, user: &User) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET
           plan_key = ?2,
           sms_balance = ?3,
           purchased_sms_credit = ?4,
           trial_ends_at = ?5,
           quota_ends_at = ?6
         WHERE id = ?1",
        params![
            user.id,
            user.plan_key,
            user.sms_balance,
            user.purchased_sms_credit,
            user.trial_ends_at.as_ref().map(fmt_datetime),
            user.quota_ends_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(count > 0)
}

/// Deletes the account; sessions, clients, bookings, SMS logs and purchases cascade.
pub fn delete_user(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Debits `parts` credits only if the balance covers them.
pub fn reserve_sms_credit(conn: &Connection, user_id: i64, parts: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET sms_balance = sms_balance - ?2 WHERE id = ?1 AND sms_balance >= ?2",
        params![user_id, parts],
    )?;
    Ok(count > 0)
}

pub fn refund_sms_credit(conn: &Connection, user_id: i64, parts: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET sms_balance = sms_balance + ?2 WHERE id = ?1",
        params![user_id, parts],
    )?;
    Ok(())
}

pub fn add_purchased_sms_credit(
    conn: &Connection,
    user_id: i64,
    credits: i64,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET
           sms_balance = sms_balance + ?2,
           purchased_sms_credit = purchased_sms_credit + ?2
         WHERE id = ?1",
        params![user_id, credits],
    )?;
    Ok(count > 0)
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        business_name: row.get(3)?,
        job_id: row.get(4)?,
        plan_key: row.get(5)?,
        sms_balance: row.get(6)?,
        purchased_sms_credit: row.get(7)?,
        trial_ends_at: opt_datetime_col(row, 8)?,
        quota_ends_at: opt_datetime_col(row, 9)?,
        availability: row.get(10)?,
        sms_on_booking: row.get(11)?,
        sms_on_cancel: row.get(12)?,
        sms_on_reschedule: row.get(13)?,
        created_at: datetime_col(row, 14)?,
    })
}

// ── Sessions ──

pub fn create_session(
    conn: &Connection,
    token: &str,
    user_id: i64,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, fmt_datetime(expires_at)],
    )?;
    Ok(())
}

pub fn get_session_user(
    conn: &Connection,
    token: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<User>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE id = (SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2)"
    );
    Ok(conn
        .query_row(&sql, params![token, fmt_datetime(now)], user_from_row)
        .optional()?)
}

pub fn delete_session(conn: &Connection, token: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(count > 0)
}

pub fn delete_expired_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![fmt_datetime(now)],
    )?;
    Ok(count)
}

// ── OTP codes ──

pub fn get_otp(conn: &Connection, phone: &str) -> anyhow::Result<Option<OtpCode>> {
    Ok(conn
        .query_row(
            "SELECT phone, code, attempts, expires_at, created_at FROM otp_codes WHERE phone = ?1",
            params![phone],
            |row| {
                Ok(OtpCode {
                    phone: row.get(0)?,
                    code: row.get(1)?,
                    attempts: row.get(2)?,
                    expires_at: datetime_col(row, 3)?,
                    created_at: datetime_col(row, 4)?,
                })
            },
        )
        .optional()?)
}

pub fn save_otp(conn: &Connection, otp: &OtpCode) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO otp_codes (phone, code, attempts, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(phone) DO UPDATE SET
           code = excluded.code,
           attempts = excluded.attempts,
           expires_at = excluded.expires_at,
           created_at = excluded.created_at",
        params![
            otp.phone,
            otp.code,
            otp.attempts,
            fmt_datetime(&otp.expires_at),
            fmt_datetime(&otp.created_at),
        ],
    )?;
    Ok(())
}

pub fn increment_otp_attempts(conn: &Connection, phone: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE otp_codes SET attempts = attempts + 1 WHERE phone = ?1",
        params![phone],
    )?;
    Ok(())
}

pub fn delete_otp(conn: &Connection, phone: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM otp_codes WHERE phone = ?1", params![phone])?;
    Ok(())
}

// ── Clients ──

const CLIENT_COLUMNS: &str =
    "id, user_id, client_name, client_phone, total_bookings, cancelled_count, is_blocked, created_at";

/// Records one more booking for the client, creating the row on first contact.
pub fn upsert_client_for_booking(
    conn: &Connection,
    user_id: i64,
    client_name: &str,
    client_phone: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO clients (user_id, client_name, client_phone, total_bookings)
         VALUES (?1, ?2, ?3, 1)
         ON CONFLICT(user_id, client_phone) DO UPDATE SET
           client_name = excluded.client_name,
           total_bookings = total_bookings + 1",
        params![user_id, client_name, client_phone],
    )?;

    let id = conn.query_row(
        "SELECT id FROM clients WHERE user_id = ?1 AND client_phone = ?2",
        params![user_id, client_phone],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_client(conn: &Connection, user_id: i64, id: i64) -> anyhow::Result<Option<Client>> {
    let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE user_id = ?1 AND id = ?2");
    Ok(conn
        .query_row(&sql, params![user_id, id], client_from_row)
        .optional()?)
}

pub fn get_client_by_phone(
    conn: &Connection,
    user_id: i64,
    phone: &str,
) -> anyhow::Result<Option<Client>> {
    let sql =
        format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE user_id = ?1 AND client_phone = ?2");
    Ok(conn
        .query_row(&sql, params![user_id, phone], client_from_row)
        .optional()?)
}

pub fn list_clients(
    conn: &Connection,
    user_id: i64,
    search: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Client>> {
    let pattern = search.map(|s| format!("%{}%", s.trim()));
    let sql = format!(
        "SELECT {CLIENT_COLUMNS} FROM clients
         WHERE user_id = ?1 AND (?2 IS NULL OR client_name LIKE ?2 OR client_phone LIKE ?2)
         ORDER BY total_bookings DESC, id DESC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let clients = stmt
        .query_map(params![user_id, pattern, limit], client_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(clients)
}

pub fn rename_client(
    conn: &Connection,
    user_id: i64,
    id: i64,
    client_name: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE clients SET client_name = ?3 WHERE user_id = ?1 AND id = ?2",
        params![user_id, id, client_name],
    )?;
    Ok(count > 0)
}

pub fn set_client_blocked(
    conn: &Connection,
    user_id: i64,
    id: i64,
    blocked: bool,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE clients SET is_blocked = ?3 WHERE user_id = ?1 AND id = ?2",
        params![user_id, id, blocked],
    )?;
    Ok(count > 0)
}

pub fn delete_client(conn: &Connection, user_id: i64, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM clients WHERE user_id = ?1 AND id = ?2",
        params![user_id, id],
    )?;
    Ok(count > 0)
}

pub fn increment_client_cancelled(
    conn: &Connection,
    user_id: i64,
    client_phone: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE clients SET cancelled_count = cancelled_count + 1
         WHERE user_id = ?1 AND client_phone = ?2",
        params![user_id, client_phone],
    )?;
    Ok(())
}

fn client_from_row(row: &Row) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        user_id: row.get(1)?,
        client_name: row.get(2)?,
        client_phone: row.get(3)?,
        total_bookings: row.get(4)?,
        cancelled_count: row.get(5)?,
        is_blocked: row.get(6)?,
        created_at: datetime_col(row, 7)?,
    })
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, client_id, client_name, client_phone, booking_date, \
     booking_time, notes, status, customer_token, token_expires_at, change_count, created_at, updated_at";

pub fn insert_booking(
    conn: &Connection,
    booking: &NewBooking,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let now = fmt_datetime(now);
    conn.execute(
        "INSERT INTO bookings (user_id, client_id, client_name, client_phone, booking_date, booking_time,
                               notes, status, customer_token, token_expires_at, change_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?9, 0, ?10, ?10)",
        params![
            booking.user_id,
            booking.client_id,
            booking.client_name,
            booking.client_phone,
            fmt_date(&booking.booking_date),
            fmt_time(&booking.booking_time),
            booking.notes,
            booking.customer_token,
            fmt_datetime(&booking.token_expires_at),
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking(conn: &Connection, user_id: i64, id: i64) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 AND id = ?2");
    Ok(conn
        .query_row(&sql, params![user_id, id], booking_from_row)
        .optional()?)
}

pub fn get_booking_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_token = ?1");
    Ok(conn
        .query_row(&sql, params![token], booking_from_row)
        .optional()?)
}

/// Id of the active booking holding exactly this slot, ignoring `exclude_id`.
pub fn find_active_booking_at(
    conn: &Connection,
    user_id: i64,
    date: &NaiveDate,
    time: &NaiveTime,
    exclude_id: Option<i64>,
) -> anyhow::Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM bookings
             WHERE user_id = ?1 AND booking_date = ?2 AND booking_time = ?3
               AND status = 'active' AND (?4 IS NULL OR id != ?4)
             LIMIT 1",
            params![user_id, fmt_date(date), fmt_time(time), exclude_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn taken_times(
    conn: &Connection,
    user_id: i64,
    date: &NaiveDate,
) -> anyhow::Result<Vec<NaiveTime>> {
    let mut stmt = conn.prepare(
        "SELECT booking_time FROM bookings
         WHERE user_id = ?1 AND booking_date = ?2 AND status = 'active'
         ORDER BY booking_time ASC",
    )?;
    let rows = stmt.query_map(params![user_id, fmt_date(date)], |row| time_col(row, 0))?;

    let mut times = vec![];
    for row in rows {
        times.push(row?);
    }
    Ok(times)
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub date: Option<NaiveDate>,
    pub client_phone: Option<String>,
    pub limit: i64,
}

pub fn list_bookings(
    conn: &Connection,
    user_id: i64,
    filter: &BookingFilter,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE user_id = ?1
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR booking_date = ?3)
           AND (?4 IS NULL OR client_phone = ?4)
         ORDER BY booking_date DESC, booking_time DESC
         LIMIT ?5"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            user_id,
            filter.status.map(|s| s.as_str()),
            filter.date.as_ref().map(fmt_date),
            filter.client_phone,
            filter.limit,
        ],
        booking_from_row,
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// `active → cancelled`. Returns false when the booking was not active.
pub fn cancel_booking(conn: &Connection, id: i64, now: &NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'cancelled', updated_at = ?2
         WHERE id = ?1 AND status = 'active'",
        params![id, fmt_datetime(now)],
    )?;
    Ok(count > 0)
}

/// Moves an active booking to a new slot. `count_change` marks a customer reschedule.
pub fn move_booking(
    conn: &Connection,
    id: i64,
    date: &NaiveDate,
    time: &NaiveTime,
    token_expires_at: &NaiveDateTime,
    count_change: bool,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           booking_date = ?2,
           booking_time = ?3,
           token_expires_at = ?4,
           change_count = change_count + ?5,
           updated_at = ?6
         WHERE id = ?1 AND status = 'active'",
        params![
            id,
            fmt_date(date),
            fmt_time(time),
            fmt_datetime(token_expires_at),
            i32::from(count_change),
            fmt_datetime(now),
        ],
    )?;
    Ok(count > 0)
}

pub fn set_booking_notes(
    conn: &Connection,
    id: i64,
    notes: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET notes = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, notes, fmt_datetime(now)],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, user_id: i64, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM bookings WHERE user_id = ?1 AND id = ?2",
        params![user_id, id],
    )?;
    Ok(count > 0)
}

/// Every active booking of the business whose start time has passed becomes `done`.
pub fn mark_past_bookings_done(
    conn: &Connection,
    user_id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'done', updated_at = ?3
         WHERE user_id = ?1 AND status = 'active'
           AND (booking_date || ' ' || booking_time) < ?2",
        params![user_id, fmt_slot(now), fmt_datetime(now)],
    )?;
    Ok(count)
}

pub fn mark_booking_done_if_past(
    conn: &Connection,
    id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'done', updated_at = ?3
         WHERE id = ?1 AND status = 'active'
           AND (booking_date || ' ' || booking_time) < ?2",
        params![id, fmt_slot(now), fmt_datetime(now)],
    )?;
    Ok(count > 0)
}

pub struct BookingStats {
    pub today: i64,
    pub upcoming: i64,
    pub done: i64,
    pub cancelled: i64,
    pub clients: i64,
}

pub fn get_booking_stats(
    conn: &Connection,
    user_id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<BookingStats> {
    let today = fmt_date(&now.date());
    let slot_now = fmt_slot(now);

    let (today_count, upcoming, done, cancelled): (i64, i64, i64, i64) = conn.query_row(
        "SELECT
           COALESCE(SUM(booking_date = ?2 AND status != 'cancelled'), 0),
           COALESCE(SUM(status = 'active' AND (booking_date || ' ' || booking_time) >= ?3), 0),
           COALESCE(SUM(status = 'done'), 0),
           COALESCE(SUM(status = 'cancelled'), 0)
         FROM bookings WHERE user_id = ?1",
        params![user_id, today, slot_now],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let clients: i64 = conn.query_row(
        "SELECT COUNT(*) FROM clients WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(BookingStats {
        today: today_count,
        upcoming,
        done,
        cancelled,
        clients,
    })
}

fn booking_from_row(row: &Row) -> rusqlite::Result<Booking> {
    let status: String = row.get(8)?;
    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        client_id: row.get(2)?,
        client_name: row.get(3)?,
        client_phone: row.get(4)?,
        booking_date: date_col(row, 5)?,
        booking_time: time_col(row, 6)?,
        notes: row.get(7)?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(8, "status".into(), Type::Text))?,
        customer_token: row.get(9)?,
        token_expires_at: datetime_col(row, 10)?,
        change_count: row.get(11)?,
        created_at: datetime_col(row, 12)?,
        updated_at: datetime_col(row, 13)?,
    })
}

// ── SMS ──

pub fn get_sms_template(conn: &Connection, key: &str) -> anyhow::Result<Option<SmsTemplate>> {
    Ok(conn
        .query_row(
            "SELECT key, title, body FROM sms_templates WHERE key = ?1",
            params![key],
            |row| {
                Ok(SmsTemplate {
                    key: row.get(0)?,
                    title: row.get(1)?,
                    body: row.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn list_sms_templates(conn: &Connection) -> anyhow::Result<Vec<SmsTemplate>> {
    let mut stmt = conn.prepare("SELECT key, title, body FROM sms_templates ORDER BY key ASC")?;
    let templates = stmt
        .query_map([], |row| {
            Ok(SmsTemplate {
                key: row.get(0)?,
                title: row.get(1)?,
                body: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(templates)
}

pub fn update_sms_template(
    conn: &Connection,
    key: &str,
    title: &str,
    body: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE sms_templates SET title = ?2, body = ?3 WHERE key = ?1",
        params![key, title, body],
    )?;
    Ok(count > 0)
}

pub fn insert_sms_log(conn: &Connection, log: &NewSmsLog) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO sms_logs (user_id, phone, message, parts, kind, status, provider_message_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            log.user_id,
            log.phone,
            log.message,
            log.parts,
            log.kind,
            log.status.as_str(),
            log.provider_message_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_sms_status_by_provider_id(
    conn: &Connection,
    provider_message_id: &str,
    status: SmsStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE sms_logs SET status = ?2 WHERE provider_message_id = ?1",
        params![provider_message_id, status.as_str()],
    )?;
    Ok(count > 0)
}

pub fn list_sms_logs(
    conn: &Connection,
    user_id: Option<i64>,
    limit: i64,
) -> anyhow::Result<Vec<SmsLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, phone, message, parts, kind, status, provider_message_id, created_at
         FROM sms_logs WHERE ?1 IS NULL OR user_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |row| {
        let status: String = row.get(6)?;
        Ok(SmsLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            phone: row.get(2)?,
            message: row.get(3)?,
            parts: row.get(4)?,
            kind: row.get(5)?,
            status: SmsStatus::parse(&status)
                .ok_or_else(|| rusqlite::Error::InvalidColumnType(6, "status".into(), Type::Text))?,
            provider_message_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    let mut logs = vec![];
    for row in rows {
        logs.push(row?);
    }
    Ok(logs)
}

// ── SMS purchases ──

const PURCHASE_COLUMNS: &str = "id, user_id, credits, amount, status, created_at, decided_at";

pub fn insert_sms_purchase(
    conn: &Connection,
    user_id: i64,
    credits: i64,
    amount: i64,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO sms_purchases (user_id, credits, amount, status) VALUES (?1, ?2, ?3, 'pending')",
        params![user_id, credits, amount],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_sms_purchase(conn: &Connection, id: i64) -> anyhow::Result<Option<SmsPurchase>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM sms_purchases WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], purchase_from_row)
        .optional()?)
}

pub fn list_sms_purchases(
    conn: &Connection,
    user_id: Option<i64>,
    status: Option<PurchaseStatus>,
    limit: i64,
) -> anyhow::Result<Vec<SmsPurchase>> {
    let sql = format!(
        "SELECT {PURCHASE_COLUMNS} FROM sms_purchases
         WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)
         ORDER BY id DESC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let purchases = stmt
        .query_map(
            params![user_id, status.map(|s| s.as_str()), limit],
            purchase_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(purchases)
}

/// Moves a pending purchase to its final status. False when it was already decided.
pub fn decide_sms_purchase(
    conn: &Connection,
    id: i64,
    status: PurchaseStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE sms_purchases SET status = ?2, decided_at = datetime('now')
         WHERE id = ?1 AND status = 'pending'",
        params![id, status.as_str()],
    )?;
    Ok(count > 0)
}

fn purchase_from_row(row: &Row) -> rusqlite::Result<SmsPurchase> {
    let status: String = row.get(4)?;
    Ok(SmsPurchase {
        id: row.get(0)?,
        user_id: row.get(1)?,
        credits: row.get(2)?,
        amount: row.get(3)?,
        status: PurchaseStatus::parse(&status)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(4, "status".into(), Type::Text))?,
        created_at: row.get(5)?,
        decided_at: row.get(6)?,
    })
}

// ── Plans & jobs ──

pub fn list_plans(conn: &Connection, active_only: bool) -> anyhow::Result<Vec<Plan>> {
    let mut stmt = conn.prepare(
        "SELECT key, title, price, sms_quota, duration_days, is_active FROM plans
         WHERE ?1 = 0 OR is_active = 1
         ORDER BY price ASC",
    )?;
    let plans = stmt
        .query_map(params![active_only], plan_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(plans)
}

pub fn get_plan(conn: &Connection, key: &str) -> anyhow::Result<Option<Plan>> {
    Ok(conn
        .query_row(
            "SELECT key, title, price, sms_quota, duration_days, is_active FROM plans WHERE key = ?1",
            params![key],
            plan_from_row,
        )
        .optional()?)
}

pub fn save_plan(conn: &Connection, plan: &Plan) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO plans (key, title, price, sms_quota, duration_days, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(key) DO UPDATE SET
           title = excluded.title,
           price = excluded.price,
           sms_quota = excluded.sms_quota,
           duration_days = excluded.duration_days,
           is_active = excluded.is_active",
        params![
            plan.key,
            plan.title,
            plan.price,
            plan.sms_quota,
            plan.duration_days,
            plan.is_active,
        ],
    )?;
    Ok(())
}

pub fn delete_plan(conn: &Connection, key: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM plans WHERE key = ?1", params![key])?;
    Ok(count > 0)
}

fn plan_from_row(row: &Row) -> rusqlite::Result<Plan> {
    Ok(Plan {
        key: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        sms_quota: row.get(3)?,
        duration_days: row.get(4)?,
        is_active: row.get(5)?,
    })
}

pub fn list_jobs(conn: &Connection) -> anyhow::Result<Vec<Job>> {
    let mut stmt = conn.prepare("SELECT id, title FROM jobs ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Job {
            id: row.get(0)?,
            title: row.get(1)?,
        })
    })?;

    let mut jobs = vec![];
    for row in rows {
        jobs.push(row?);
    }
    Ok(jobs)
}

pub fn job_exists(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_job(conn: &Connection, title: &str) -> anyhow::Result<i64> {
    conn.execute("INSERT INTO jobs (title) VALUES (?1)", params![title])?;
    Ok(conn.last_insert_rowid())
}

pub fn update_job(conn: &Connection, id: i64, title: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE jobs SET title = ?2 WHERE id = ?1",
        params![id, title],
    )?;
    Ok(count > 0)
}

pub fn delete_job(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Blog ──

const BLOG_COLUMNS: &str = "id, slug, title, summary, body, published, created_at, updated_at";

pub fn list_blog_posts(
    conn: &Connection,
    published_only: bool,
    limit: i64,
) -> anyhow::Result<Vec<BlogPost>> {
    let sql = format!(
        "SELECT {BLOG_COLUMNS} FROM blog_posts
         WHERE ?1 = 0 OR published = 1
         ORDER BY created_at DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params![published_only, limit], blog_post_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(posts)
}

pub fn get_blog_post_by_slug(
    conn: &Connection,
    slug: &str,
    published_only: bool,
) -> anyhow::Result<Option<BlogPost>> {
    let sql = format!(
        "SELECT {BLOG_COLUMNS} FROM blog_posts WHERE slug = ?1 AND (?2 = 0 OR published = 1)"
    );
    Ok(conn
        .query_row(&sql, params![slug, published_only], blog_post_from_row)
        .optional()?)
}

pub fn insert_blog_post(conn: &Connection, post: &NewBlogPost) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO blog_posts (slug, title, summary, body, published) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![post.slug, post.title, post.summary, post.body, post.published],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_blog_post(conn: &Connection, id: i64, post: &NewBlogPost) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE blog_posts SET
           slug = ?2, title = ?3, summary = ?4, body = ?5, published = ?6,
           updated_at = datetime('now')
         WHERE id = ?1",
        params![id, post.slug, post.title, post.summary, post.body, post.published],
    )?;
    Ok(count > 0)
}

pub fn delete_blog_post(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM blog_posts WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

fn blog_post_from_row(row: &Row) -> rusqlite::Result<BlogPost> {
    Ok(BlogPost {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        body: row.get(4)?,
        published: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// ── Platform stats ──

pub struct PlatformStats {
    pub users: i64,
    pub paying_users: i64,
    pub trial_users: i64,
    pub bookings_total: i64,
    pub bookings_today: i64,
    pub sms_parts_this_month: i64,
    pub pending_purchases: i64,
}

/// `now` is business-local; `month_start_utc` matches the UTC defaults of `sms_logs.created_at`.
pub fn get_platform_stats(
    conn: &Connection,
    now: &NaiveDateTime,
    month_start_utc: &str,
) -> anyhow::Result<PlatformStats> {
    let now_str = fmt_datetime(now);

    let (users, paying_users, trial_users): (i64, i64, i64) = conn.query_row(
        "SELECT
           COUNT(*),
           COALESCE(SUM(quota_ends_at IS NOT NULL AND quota_ends_at > ?1), 0),
           COALESCE(SUM((quota_ends_at IS NULL OR quota_ends_at <= ?1)
                        AND trial_ends_at IS NOT NULL AND trial_ends_at > ?1), 0)
         FROM users",
        params![now_str],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let (bookings_total, bookings_today): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(booking_date = ?1), 0) FROM bookings",
        params![fmt_date(&now.date())],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let sms_parts_this_month: i64 = conn.query_row(
        "SELECT COALESCE(SUM(parts), 0) FROM sms_logs
         WHERE status IN ('sent', 'delivered', 'undelivered') AND created_at >= ?1",
        params![month_start_utc],
        |row| row.get(0),
    )?;

    let pending_purchases: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sms_purchases WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;

    Ok(PlatformStats {
        users,
        paying_users,
        trial_users,
        bookings_total,
        bookings_today,
        sms_parts_this_month,
        pending_purchases,
    })
}

// ── Column helpers ──

pub fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn fmt_time(time: &NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// `YYYY-MM-DD HH:MM`, comparable with `booking_date || ' ' || booking_time`.
fn fmt_slot(dt: &NaiveDateTime) -> String {
    format!("{} {}", fmt_date(&dt.date()), fmt_time(&dt.time()))
}

fn datetime_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn opt_datetime_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let s: String = row.get(idx)?;
    NaiveTime::parse_from_str(&s, TIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn conversion_error(idx: usize, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// True when `err` is the active-slot unique index (or another uniqueness constraint) firing.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::booking::new_customer_token;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup() -> (Connection, i64) {
        let conn = db::init_db(":memory:").unwrap();
        let user_id = create_user(
            &conn,
            &NewUser {
                name: "Maryam".to_string(),
                phone: "09120000001".to_string(),
                business_name: "Salon Maryam".to_string(),
                job_id: None,
                sms_balance: 10,
                trial_ends_at: Some(dt("2030-12-01 00:00")),
            },
        )
        .unwrap();
        (conn, user_id)
    }

    fn insert(conn: &Connection, user_id: i64, at: &str) -> i64 {
        let start = dt(at);
        insert_booking(
            conn,
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
        .unwrap()
    }

    #[test]
    fn test_user_round_trip() {
        let (conn, user_id) = setup();
        let user = get_user(&conn, user_id).unwrap().unwrap();
        assert_eq!(user.phone, "09120000001");
        assert_eq!(user.sms_balance, 10);
        assert!(user.sms_on_booking);
        assert_eq!(user.trial_ends_at, Some(dt("2030-12-01 00:00")));
        assert!(get_user_by_phone(&conn, "09120000001").unwrap().is_some());
        assert!(get_user(&conn, 999).unwrap().is_none());
    }

    #[test]
    fn test_reserve_sms_credit_never_goes_negative() {
        let (conn, user_id) = setup();
        assert!(reserve_sms_credit(&conn, user_id, 6).unwrap());
        assert!(!reserve_sms_credit(&conn, user_id, 6).unwrap());
        assert_eq!(get_user(&conn, user_id).unwrap().unwrap().sms_balance, 4);
        refund_sms_credit(&conn, user_id, 6).unwrap();
        assert_eq!(get_user(&conn, user_id).unwrap().unwrap().sms_balance, 10);
    }

    #[test]
    fn test_client_upsert_counts_bookings() {
        let (conn, user_id) = setup();
        let first = upsert_client_for_booking(&conn, user_id, "Sara", "09121234567").unwrap();
        let second = upsert_client_for_booking(&conn, user_id, "Sara K.", "09121234567").unwrap();
        assert_eq!(first, second);

        let client = get_client(&conn, user_id, first).unwrap().unwrap();
        assert_eq!(client.total_bookings, 2);
        assert_eq!(client.client_name, "Sara K.");
        assert!(!client.is_blocked);
    }

    #[test]
    fn test_active_slot_is_unique_per_business() {
        let (conn, user_id) = setup();
        insert(&conn, user_id, "2030-01-05 10:00");

        let start = dt("2030-01-05 10:00");
        let err = insert_booking(
            &conn,
            &NewBooking {
                user_id,
                client_id: None,
                client_name: "Neda".to_string(),
                client_phone: "09351234567".to_string(),
                booking_date: start.date(),
                booking_time: start.time(),
                notes: None,
                customer_token: new_customer_token(),
                token_expires_at: start,
            },
            &dt("2030-01-01 08:00"),
        )
        .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_cancelled_slot_can_be_reused() {
        let (conn, user_id) = setup();
        let id = insert(&conn, user_id, "2030-01-05 10:00");
        assert!(cancel_booking(&conn, id, &dt("2030-01-01 09:00")).unwrap());
        assert!(!cancel_booking(&conn, id, &dt("2030-01-01 09:00")).unwrap());
        insert(&conn, user_id, "2030-01-05 10:00");
    }

    #[test]
    fn test_find_active_booking_at_excludes_self() {
        let (conn, user_id) = setup();
        let id = insert(&conn, user_id, "2030-01-05 10:00");
        let start = dt("2030-01-05 10:00");
        assert_eq!(
            find_active_booking_at(&conn, user_id, &start.date(), &start.time(), None).unwrap(),
            Some(id)
        );
        assert_eq!(
            find_active_booking_at(&conn, user_id, &start.date(), &start.time(), Some(id)).unwrap(),
            None
        );
    }

    #[test]
    fn test_mark_past_bookings_done() {
        let (conn, user_id) = setup();
        let past = insert(&conn, user_id, "2030-01-05 09:00");
        let exact = insert(&conn, user_id, "2030-01-05 10:00");
        let future = insert(&conn, user_id, "2030-01-05 11:00");

        let swept = mark_past_bookings_done(&conn, user_id, &dt("2030-01-05 10:00")).unwrap();
        assert_eq!(swept, 1);

        let status = |id| get_booking(&conn, user_id, id).unwrap().unwrap().status;
        assert_eq!(status(past), BookingStatus::Done);
        assert_eq!(status(exact), BookingStatus::Active);
        assert_eq!(status(future), BookingStatus::Active);
    }

    #[test]
    fn test_move_booking_counts_customer_changes() {
        let (conn, user_id) = setup();
        let id = insert(&conn, user_id, "2030-01-05 10:00");
        let to = dt("2030-01-06 12:30");
        assert!(move_booking(&conn, id, &to.date(), &to.time(), &to, true, &dt("2030-01-01 09:00")).unwrap());

        let booking = get_booking(&conn, user_id, id).unwrap().unwrap();
        assert_eq!(booking.starts_at(), to);
        assert_eq!(booking.token_expires_at, to);
        assert_eq!(booking.change_count, 1);
    }

    #[test]
    fn test_list_bookings_filters() {
        let (conn, user_id) = setup();
        let a = insert(&conn, user_id, "2030-01-05 10:00");
        insert(&conn, user_id, "2030-01-06 10:00");
        cancel_booking(&conn, a, &dt("2030-01-01 09:00")).unwrap();

        let all = list_bookings(&conn, user_id, &BookingFilter { limit: 50, ..Default::default() }).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].booking_date.to_string(), "2030-01-06");

        let cancelled = list_bookings(
            &conn,
            user_id,
            &BookingFilter {
                status: Some(BookingStatus::Cancelled),
                limit: 50,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a);
    }

    #[test]
    fn test_delete_user_cascades() {
        let (conn, user_id) = setup();
        insert(&conn, user_id, "2030-01-05 10:00");
        upsert_client_for_booking(&conn, user_id, "Sara", "09121234567").unwrap();
        create_session(&conn, "tok", user_id, &dt("2030-02-01 00:00")).unwrap();

        assert!(delete_user(&conn, user_id).unwrap());

        let remaining: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM bookings) + (SELECT COUNT(*) FROM clients) + (SELECT COUNT(*) FROM sessions)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_session_expiry() {
        let (conn, user_id) = setup();
        create_session(&conn, "tok", user_id, &dt("2030-02-01 00:00")).unwrap();
        assert!(get_session_user(&conn, "tok", &dt("2030-01-31 23:59")).unwrap().is_some());
        assert!(get_session_user(&conn, "tok", &dt("2030-02-01 00:00")).unwrap().is_none());
        assert_eq!(delete_expired_sessions(&conn, &dt("2030-02-01 00:00")).unwrap(), 1);
    }

    #[test]
    fn test_purchase_decided_once() {
        let (conn, user_id) = setup();
        let id = insert_sms_purchase(&conn, user_id, 100, 15000).unwrap();
        assert!(decide_sms_purchase(&conn, id, PurchaseStatus::Approved).unwrap());
        assert!(!decide_sms_purchase(&conn, id, PurchaseStatus::Rejected).unwrap());
        let purchase = get_sms_purchase(&conn, id).unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Approved);
        assert!(purchase.decided_at.is_some());
    }
}

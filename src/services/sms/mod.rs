pub mod smsir;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::jalali::{persian_time, JalaliDate};
use crate::models::phone::mask_phone;
use crate::models::{Booking, NewSmsLog, SmsStatus, User};
use crate::state::AppState;

pub const TEMPLATE_OTP: &str = "otp";
pub const TEMPLATE_BOOKING_CREATED: &str = "booking_created";
pub const TEMPLATE_BOOKING_CANCELLED: &str = "booking_cancelled";
pub const TEMPLATE_BOOKING_RESCHEDULED: &str = "booking_rescheduled";

#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Sends one message and returns the provider's message id.
    async fn send(&self, to: &str, text: &str) -> anyhow::Result<String>;
}

/// Writes messages to the log instead of sending them. Used when no API key is configured.
pub struct LogSmsProvider;

#[async_trait]
impl SmsProvider for LogSmsProvider {
    async fn send(&self, to: &str, text: &str) -> anyhow::Result<String> {
        tracing::info!(to = %mask_phone(to), text = %text, "sms (log only)");
        Ok(format!("log-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Result of a notification attempt, reported to the caller instead of failing it.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmsOutcome {
    Sent,
    Disabled,
    InsufficientCredit,
    Failed,
}

// GSM 03.38 basic alphabet; everything outside it (Persian included) forces UCS-2.
const GSM_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";
const GSM_EXTENDED: &str = "^{}\\[~]|€\u{0c}";

/// Number of billable parts: GSM 160 single / 153 concatenated, UCS-2 70 / 67.
pub fn sms_parts(text: &str) -> i64 {
    let gsm_len = text.chars().try_fold(0usize, |len, c| {
        if GSM_BASIC.contains(c) {
            Some(len + 1)
        } else if GSM_EXTENDED.contains(c) {
            Some(len + 2)
        } else {
            None
        }
    });

    let (len, single, multi) = match gsm_len {
        Some(len) => (len, 160, 153),
        None => (text.encode_utf16().count(), 70, 67),
    };

    if len <= single {
        1
    } else {
        len.div_ceil(multi) as i64
    }
}

/// Replaces `{key}` placeholders. Unknown placeholders are left as they are.
/// Values are inserted as-is and never expanded again.
pub fn render_template(body: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Placeholder values shared by every booking notification.
pub fn booking_vars(state: &AppState, user: &User, booking: &Booking) -> Vec<(&'static str, String)> {
    vec![
        ("client_name", booking.client_name.clone()),
        ("business_name", user.display_business_name().to_string()),
        (
            "date",
            JalaliDate::from_gregorian(booking.booking_date).to_persian_long(),
        ),
        ("time", persian_time(booking.booking_time)),
        ("link", state.config.customer_link(&booking.customer_token)),
    ]
}

/// Sends a templated booking notification to the customer, charged to the business.
pub async fn notify_booking(
    state: &AppState,
    user: &User,
    booking: &Booking,
    template_key: &str,
) -> SmsOutcome {
    let enabled = match template_key {
        TEMPLATE_BOOKING_CREATED => user.sms_on_booking,
        TEMPLATE_BOOKING_CANCELLED => user.sms_on_cancel,
        TEMPLATE_BOOKING_RESCHEDULED => user.sms_on_reschedule,
        _ => true,
    };
    if !enabled {
        return SmsOutcome::Disabled;
    }

    let template = {
        let db = match state.conn() {
            Ok(db) => db,
            Err(e) => {
                tracing::error!(error = %e, "failed to load sms template");
                return SmsOutcome::Failed;
            }
        };
        queries::get_sms_template(&db, template_key)
    };
    let template = match template {
        Ok(Some(t)) => t,
        Ok(None) => {
            tracing::warn!(key = %template_key, "sms template missing");
            return SmsOutcome::Failed;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load sms template");
            return SmsOutcome::Failed;
        }
    };

    let text = render_template(&template.body, &booking_vars(state, user, booking));
    send_charged(state, user.id, &booking.client_phone, &text, template_key).await
}

/// Reserves credits for `text`, sends it, and refunds on provider failure.
/// Every attempt is written to the SMS log.
pub async fn send_charged(
    state: &AppState,
    user_id: i64,
    phone: &str,
    text: &str,
    kind: &str,
) -> SmsOutcome {
    let parts = sms_parts(text);

    let reserved = {
        let db = match state.conn() {
            Ok(db) => db,
            Err(e) => {
                tracing::error!(error = %e, "sms credit reservation failed");
                return SmsOutcome::Failed;
            }
        };
        match queries::reserve_sms_credit(&db, user_id, parts) {
            Ok(true) => true,
            Ok(false) => {
                write_log(
                    &db,
                    &NewSmsLog {
                        user_id: Some(user_id),
                        phone,
                        message: text,
                        parts,
                        kind,
                        status: SmsStatus::InsufficientCredit,
                        provider_message_id: None,
                    },
                );
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "sms credit reservation failed");
                return SmsOutcome::Failed;
            }
        }
    };

    if !reserved {
        tracing::info!(user_id, parts, kind = %kind, "sms skipped, insufficient credit");
        return SmsOutcome::InsufficientCredit;
    }

    let result = state.sms.send(phone, text).await;

    let Ok(db) = state.conn() else {
        return SmsOutcome::Failed;
    };
    match result {
        Ok(message_id) => {
            tracing::info!(user_id, to = %mask_phone(phone), parts, kind = %kind, "sms sent");
            write_log(
                &db,
                &NewSmsLog {
                    user_id: Some(user_id),
                    phone,
                    message: text,
                    parts,
                    kind,
                    status: SmsStatus::Sent,
                    provider_message_id: Some(&message_id),
                },
            );
            SmsOutcome::Sent
        }
        Err(e) => {
            tracing::error!(error = %e, user_id, kind = %kind, "sms send failed, refunding");
            if let Err(e) = queries::refund_sms_credit(&db, user_id, parts) {
                tracing::error!(error = %e, "failed to refund sms credit");
            }
            write_log(
                &db,
                &NewSmsLog {
                    user_id: Some(user_id),
                    phone,
                    message: text,
                    parts,
                    kind,
                    status: SmsStatus::Failed,
                    provider_message_id: None,
                },
            );
            SmsOutcome::Failed
        }
    }
}

fn write_log(db: &Connection, log: &NewSmsLog<'_>) {
    if let Err(e) = queries::insert_sms_log(db, log) {
        tracing::error!(error = %e, status = log.status.as_str(), "failed to write sms log");
    }
}

/// Platform message not charged to any business (login codes).
pub async fn send_system(state: &AppState, phone: &str, text: &str, kind: &str) -> anyhow::Result<()> {
    let parts = sms_parts(text);
    let result = state.sms.send(phone, text).await;

    let (status, message_id) = match &result {
        Ok(id) => (SmsStatus::Sent, Some(id.as_str())),
        Err(_) => (SmsStatus::Failed, None),
    };
    {
        let db = state.conn().map_err(|e| anyhow::anyhow!("{e}"))?;
        queries::insert_sms_log(
            &db,
            &NewSmsLog {
                user_id: None,
                phone,
                message: text,
                parts,
                kind,
                status,
                provider_message_id: message_id,
            },
        )?;
    }

    result.map(|_| ())
}

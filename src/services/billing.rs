use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Plan, PurchaseStatus, SmsPurchase, User};

const MAX_PURCHASE_CREDITS: i64 = 100_000;
/// Longest period a single plan may grant.
pub const MAX_PLAN_DAYS: i64 = 3660;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial { ends_at: NaiveDateTime },
    Active { plan_key: String, ends_at: NaiveDateTime },
    Expired,
}

impl SubscriptionStatus {
    pub fn of(user: &User, now: NaiveDateTime) -> Self {
        if let Some(ends_at) = user.quota_ends_at.filter(|t| *t > now) {
            return SubscriptionStatus::Active {
                plan_key: user.plan_key.clone().unwrap_or_default(),
                ends_at,
            };
        }
        match user.trial_ends_at.filter(|t| *t > now) {
            Some(ends_at) => SubscriptionStatus::Trial { ends_at },
            None => SubscriptionStatus::Expired,
        }
    }

    pub fn can_book(&self) -> bool {
        !matches!(self, SubscriptionStatus::Expired)
    }
}

/// Extends the paid period from whichever is later, now or the current end,
/// and adds the plan's SMS quota.
pub fn apply_plan(user: &mut User, plan: &Plan, now: NaiveDateTime) -> Result<(), AppError> {
    let base = user.quota_ends_at.filter(|t| *t > now).unwrap_or(now);
    let ends_at = Duration::try_days(plan.duration_days)
        .and_then(|d| base.checked_add_signed(d))
        .ok_or_else(|| {
            AppError::BadRequest(format!("plan duration out of range: {} days", plan.duration_days))
        })?;
    let sms_balance = user
        .sms_balance
        .checked_add(plan.sms_quota)
        .ok_or_else(|| AppError::BadRequest("sms quota out of range".to_string()))?;

    user.quota_ends_at = Some(ends_at);
    user.plan_key = Some(plan.key.clone());
    user.sms_balance = sms_balance;
    Ok(())
}

pub fn activate_plan(
    conn: &Connection,
    user_id: i64,
    plan_key: &str,
    now: NaiveDateTime,
) -> Result<User, AppError> {
    let mut user = queries::get_user(conn, user_id)?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;
    let plan = queries::get_plan(conn, plan_key)?
        .ok_or_else(|| AppError::NotFound("plan".to_string()))?;

    apply_plan(&mut user, &plan, now)?;
    queries::save_user_billing(conn, &user)?;

    tracing::info!(user_id, plan = %plan.key, ends_at = ?user.quota_ends_at, "plan activated");
    Ok(user)
}

pub fn request_purchase(
    conn: &Connection,
    user_id: i64,
    credits: i64,
    unit_price: i64,
) -> Result<SmsPurchase, AppError> {
    if !(1..=MAX_PURCHASE_CREDITS).contains(&credits) {
        return Err(AppError::BadRequest(format!(
            "credits must be between 1 and {MAX_PURCHASE_CREDITS}"
        )));
    }

    let id = queries::insert_sms_purchase(conn, user_id, credits, credits * unit_price)?;
    tracing::info!(user_id, purchase_id = id, credits, "sms purchase requested");
    queries::get_sms_purchase(conn, id)?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("purchase vanished after insert")))
}

/// Approves a pending purchase and credits the owner, atomically.
pub fn approve_purchase(conn: &Connection, id: i64) -> Result<SmsPurchase, AppError> {
    let tx = conn.unchecked_transaction()?;

    let purchase = queries::get_sms_purchase(&tx, id)?
        .ok_or_else(|| AppError::NotFound("purchase".to_string()))?;
    if !queries::decide_sms_purchase(&tx, id, PurchaseStatus::Approved)? {
        return Err(AppError::Conflict("purchase already decided".to_string()));
    }
    queries::add_purchased_sms_credit(&tx, purchase.user_id, purchase.credits)?;

    tx.commit()?;
    tracing::info!(purchase_id = id, user_id = purchase.user_id, credits = purchase.credits, "sms purchase approved");

    queries::get_sms_purchase(conn, id)?
        .ok_or_else(|| AppError::NotFound("purchase".to_string()))
}

pub fn reject_purchase(conn: &Connection, id: i64) -> Result<SmsPurchase, AppError> {
    if queries::get_sms_purchase(conn, id)?.is_none() {
        return Err(AppError::NotFound("purchase".to_string()));
    }
    if !queries::decide_sms_purchase(conn, id, PurchaseStatus::Rejected)? {
        return Err(AppError::Conflict("purchase already decided".to_string()));
    }
    tracing::info!(purchase_id = id, "sms purchase rejected");

    queries::get_sms_purchase(conn, id)?
        .ok_or_else(|| AppError::NotFound("purchase".to_string()))
}

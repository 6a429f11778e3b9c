use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::client::UserResponse;
use crate::models::blog::NewBlogPost;
use crate::models::booking::DATETIME_FORMAT;
use crate::models::{BlogPost, Job, Plan, PurchaseStatus, SmsLog, SmsPurchase, SmsTemplate};
use crate::services::billing;
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub user_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

impl ListQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(100).clamp(1, 500)
    }
}

// GET /api/admin/stats
#[derive(Serialize)]
pub struct StatsResponse {
    users: i64,
    paying_users: i64,
    trial_users: i64,
    bookings_total: i64,
    bookings_today: i64,
    sms_parts_this_month: i64,
    pending_purchases: i64,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let month_start = Utc::now().format("%Y-%m-01 00:00:00").to_string();
    let stats = {
        let db = state.conn()?;
        queries::get_platform_stats(&db, &state.config.local_now(), &month_start)?
    };

    Ok(Json(StatsResponse {
        users: stats.users,
        paying_users: stats.paying_users,
        trial_users: stats.trial_users,
        bookings_total: stats.bookings_total,
        bookings_today: stats.bookings_today,
        sms_parts_this_month: stats.sms_parts_this_month,
        pending_purchases: stats.pending_purchases,
    }))
}

// ── Users ──

// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let search = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let users = {
        let db = state.conn()?;
        queries::list_users(&db, search, query.limit())?
    };

    let now = state.config.local_now();
    Ok(Json(
        users.into_iter().map(|u| UserResponse::new(u, now)).collect(),
    ))
}

// GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let user = {
        let db = state.conn()?;
        queries::get_user(&db, id)?.ok_or_else(|| AppError::NotFound("user".to_string()))?
    };
    Ok(Json(UserResponse::new(user, state.config.local_now())))
}

// POST /api/admin/users/:id
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub sms_balance: Option<i64>,
    pub trial_ends_at: Option<String>,
    pub quota_ends_at: Option<String>,
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let user = {
        let db = state.conn()?;
        let mut user =
            queries::get_user(&db, id)?.ok_or_else(|| AppError::NotFound("user".to_string()))?;

        if let Some(name) = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            user.name = name.to_string();
        }
        if let Some(business_name) = body.business_name {
            user.business_name = business_name.trim().to_string();
        }
        if let Some(balance) = body.sms_balance {
            if balance < 0 {
                return Err(AppError::BadRequest("sms_balance cannot be negative".to_string()));
            }
            user.sms_balance = balance;
        }
        if let Some(raw) = body.trial_ends_at.as_deref() {
            user.trial_ends_at = parse_optional_datetime(raw)?;
        }
        if let Some(raw) = body.quota_ends_at.as_deref() {
            user.quota_ends_at = parse_optional_datetime(raw)?;
        }

        let tx = db.unchecked_transaction()?;
        queries::save_user_settings(&tx, &user)?;
        queries::save_user_billing(&tx, &user)?;
        tx.commit()?;
        user
    };

    tracing::info!(user_id = id, "user updated by admin");
    Ok(Json(UserResponse::new(user, state.config.local_now())))
}

/// Empty string clears the value.
fn parse_optional_datetime(raw: &str) -> Result<Option<NaiveDateTime>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("invalid datetime: {raw}")))
}

// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let deleted = {
        let db = state.conn()?;
        queries::delete_user(&db, id)?
    };
    if !deleted {
        return Err(AppError::NotFound("user".to_string()));
    }

    tracing::info!(user_id = id, "user deleted by admin");
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/admin/users/:id/plan
#[derive(Deserialize)]
pub struct ActivatePlanRequest {
    pub plan_key: String,
}

pub async fn activate_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<ActivatePlanRequest>,
) -> Result<Json<UserResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = state.config.local_now();
    let user = {
        let db = state.conn()?;
        billing::activate_plan(&db, id, &body.plan_key, now)?
    };
    Ok(Json(UserResponse::new(user, now)))
}

// ── Jobs ──

// GET /api/admin/jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Job>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(queries::list_jobs(&db)?))
}

#[derive(Deserialize)]
pub struct JobRequest {
    pub title: String,
}

// POST /api/admin/jobs
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<JobRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let title = required(&body.title, "title")?;
    let db = state.conn()?;
    let id = queries::insert_job(&db, title).map_err(unique_as_conflict("job already exists"))?;
    Ok((
        StatusCode::CREATED,
        Json(Job {
            id,
            title: title.to_string(),
        }),
    ))
}

// POST /api/admin/jobs/:id
pub async fn update_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<JobRequest>,
) -> Result<Json<Job>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let title = required(&body.title, "title")?;
    let db = state.conn()?;
    if !queries::update_job(&db, id, title).map_err(unique_as_conflict("job already exists"))? {
        return Err(AppError::NotFound("job".to_string()));
    }
    Ok(Json(Job {
        id,
        title: title.to_string(),
    }))
}

// DELETE /api/admin/jobs/:id
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    if !queries::delete_job(&db, id)? {
        return Err(AppError::NotFound("job".to_string()));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

// ── Plans ──

// GET /api/admin/plans
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Plan>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(queries::list_plans(&db, false)?))
}

// POST /api/admin/plans
pub async fn save_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(plan): Json<Plan>,
) -> Result<Json<Plan>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    required(&plan.key, "key")?;
    required(&plan.title, "title")?;
    if plan.price < 0 || plan.sms_quota < 0 {
        return Err(AppError::BadRequest(
            "price and sms_quota must be non-negative".to_string(),
        ));
    }
    if !(1..=billing::MAX_PLAN_DAYS).contains(&plan.duration_days) {
        return Err(AppError::BadRequest(format!(
            "duration_days must be between 1 and {}",
            billing::MAX_PLAN_DAYS
        )));
    }

    let db = state.conn()?;
    queries::save_plan(&db, &plan)?;
    tracing::info!(plan = %plan.key, "plan saved");
    Ok(Json(plan))
}

// DELETE /api/admin/plans/:key
pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    if !queries::delete_plan(&db, &key)? {
        return Err(AppError::NotFound("plan".to_string()));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

// ── SMS ──

// GET /api/admin/sms-templates
pub async fn list_sms_templates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SmsTemplate>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(queries::list_sms_templates(&db)?))
}

// POST /api/admin/sms-templates/:key
#[derive(Deserialize)]
pub struct TemplateRequest {
    pub title: String,
    pub body: String,
}

pub async fn update_sms_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(req): Json<TemplateRequest>,
) -> Result<Json<SmsTemplate>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let body = required(&req.body, "body")?;
    let db = state.conn()?;
    if !queries::update_sms_template(&db, &key, req.title.trim(), body)? {
        return Err(AppError::NotFound("template".to_string()));
    }
    Ok(Json(SmsTemplate {
        key,
        title: req.title.trim().to_string(),
        body: body.to_string(),
    }))
}

// GET /api/admin/sms-logs
pub async fn list_sms_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SmsLog>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(queries::list_sms_logs(&db, query.user_id, query.limit())?))
}

// GET /api/admin/sms-purchases
pub async fn list_sms_purchases(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SmsPurchase>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(
            PurchaseStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("unknown status: {s}")))?,
        ),
        None => None,
    };
    let db = state.conn()?;
    Ok(Json(queries::list_sms_purchases(
        &db,
        query.user_id,
        status,
        query.limit(),
    )?))
}

// POST /api/admin/sms-purchases/:id/approve
pub async fn approve_sms_purchase(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SmsPurchase>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(billing::approve_purchase(&db, id)?))
}

// POST /api/admin/sms-purchases/:id/reject
pub async fn reject_sms_purchase(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SmsPurchase>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(billing::reject_purchase(&db, id)?))
}

// ── Blog ──

// GET /api/admin/blog
pub async fn list_blog_posts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BlogPost>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(queries::list_blog_posts(&db, false, query.limit())?))
}

fn normalize_post(mut post: NewBlogPost) -> Result<NewBlogPost, AppError> {
    post.slug = required(&post.slug, "slug")?.to_string();
    if !post
        .slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AppError::BadRequest(
            "slug may contain lowercase letters, digits and dashes only".to_string(),
        ));
    }
    post.title = required(&post.title, "title")?.to_string();
    post.summary = post.summary.trim().to_string();
    required(&post.body, "body")?;
    Ok(post)
}

// POST /api/admin/blog
pub async fn create_blog_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(post): Json<NewBlogPost>,
) -> Result<(StatusCode, Json<BlogPost>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let post = normalize_post(post)?;

    let db = state.conn()?;
    queries::insert_blog_post(&db, &post).map_err(unique_as_conflict("slug already in use"))?;
    let created = queries::get_blog_post_by_slug(&db, &post.slug, false)?
        .ok_or_else(|| AppError::NotFound("post".to_string()))?;
    Ok((StatusCode::CREATED, Json(created)))
}

// POST /api/admin/blog/:id
pub async fn update_blog_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(post): Json<NewBlogPost>,
) -> Result<Json<BlogPost>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let post = normalize_post(post)?;

    let db = state.conn()?;
    if !queries::update_blog_post(&db, id, &post).map_err(unique_as_conflict("slug already in use"))? {
        return Err(AppError::NotFound("post".to_string()));
    }
    queries::get_blog_post_by_slug(&db, &post.slug, false)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("post".to_string()))
}

// DELETE /api/admin/blog/:id
pub async fn delete_blog_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    if !queries::delete_blog_post(&db, id)? {
        return Err(AppError::NotFound("post".to_string()));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}

fn unique_as_conflict(message: &'static str) -> impl Fn(anyhow::Error) -> AppError {
    move |e| {
        if queries::is_unique_violation(&e) {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Internal(e)
        }
    }
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BlogPost, Job, Plan};
use crate::state::AppState;

// GET /api/plans
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Plan>>, AppError> {
    let db = state.conn()?;
    Ok(Json(queries::list_plans(&db, true)?))
}

// GET /api/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Job>>, AppError> {
    let db = state.conn()?;
    Ok(Json(queries::list_jobs(&db)?))
}

// GET /api/blog
#[derive(Deserialize)]
pub struct BlogQuery {
    pub limit: Option<i64>,
}

pub async fn list_blog_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BlogQuery>,
) -> Result<Json<Vec<BlogPost>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let db = state.conn()?;
    Ok(Json(queries::list_blog_posts(&db, true, limit)?))
}

// GET /api/blog/:slug
pub async fn get_blog_post(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPost>, AppError> {
    let db = state.conn()?;
    queries::get_blog_post_by_slug(&db, &slug, true)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("post".to_string()))
}

//! Cron job management routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use suzent_core::SuzentError;
use suzent_scheduler::types::{CronJobUpdate, NewCronJob};
use suzent_scheduler::SchedulerBrain;

use crate::app::AppState;
use crate::http::{ApiError, ApiResult};

fn scheduler(state: &AppState) -> Result<&Arc<SchedulerBrain<AppState>>, ApiError> {
    state
        .scheduler()
        .ok_or_else(|| ApiError(SuzentError::Internal("scheduler not running".to_string())))
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let brain = scheduler(&state)?;
    let jobs = brain.store().list_jobs(false)?;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewCronJob>,
) -> ApiResult<impl IntoResponse> {
    if body.name.trim().is_empty() || body.prompt.trim().is_empty() {
        return Err(ApiError(SuzentError::invalid_input(
            "name/prompt",
            "name, cron_expr and prompt are required",
        )));
    }
    let brain = scheduler(&state)?;
    let job = brain.store().create_job(body)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "job": job }))))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let brain = scheduler(&state)?;
    match brain.store().get_job(id)? {
        Some(job) => Ok(Json(serde_json::json!({ "job": job }))),
        None => Err(ApiError(SuzentError::NotFound(format!("cron job {id}")))),
    }
}

pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CronJobUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    let brain = scheduler(&state)?;
    let job = brain.store().update_job(id, body)?;
    Ok(Json(serde_json::json!({ "job": job })))
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let brain = scheduler(&state)?;
    brain.store().delete_job(id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /cron/jobs/{id}/trigger — immediate execution outside the tick loop.
pub async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let brain = scheduler(&state)?;
    if brain.store().get_job(id)?.is_none() {
        return Err(ApiError(SuzentError::NotFound(format!("cron job {id}"))));
    }
    SchedulerBrain::trigger_now(brain, id);
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Job {id} triggered"),
    })))
}

#[derive(Deserialize)]
pub struct RunsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let brain = scheduler(&state)?;
    let runs = brain.store().list_runs(id, query.limit)?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

/// GET /cron/notifications — drain the bounded announce queue.
pub async fn drain_notifications(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let notifications = match state.scheduler() {
        Some(brain) => brain.drain_notifications(),
        None => Vec::new(),
    };
    Ok(Json(serde_json::json!({ "notifications": notifications })))
}

pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let (running, total, active) = match state.scheduler() {
        Some(brain) => {
            let jobs = brain.store().list_jobs(false)?;
            let active = jobs.iter().filter(|j| j.active).count();
            (true, jobs.len(), active)
        }
        None => (false, 0, 0),
    };
    Ok(Json(serde_json::json!({
        "scheduler_running": running,
        "total_jobs": total,
        "active_jobs": active,
    })))
}

use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::db::repository;
use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;
use crate::sync::parse_sync_date;
use crate::sync::hash::normalize_day;

#[derive(Deserialize)]
struct RoutineQueryParams {
    day: Option<String>,
}

#[derive(Deserialize)]
struct DailySyncRequest {
    date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeeklySyncRequest {
    start_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/routines", get(list_routines))
        .route("/routines/count", get(count_routines))
        .route("/routines/group/{group_id}", get(group_week))
        .route("/routines/sync/daily", post(sync_daily))
        .route("/routines/sync/weekly", post(sync_weekly))
        .route("/routines/deactivate-all", post(deactivate_all))
        .route("/courses", get(list_courses))
        .route("/rooms", get(list_rooms))
        .route("/modules", get(list_modules))
        .route("/teachers", get(list_teachers))
        .route("/groups", get(list_groups))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_routines(
    State(state): State<AppState>,
    Query(params): Query<RoutineQueryParams>
) -> Result<Json<Vec<Routine>>, AppError> {
    let day = params.day.as_deref().map(normalize_day);
    let routines = repository::fetch_routines(&state.db, day.as_deref()).await?;
    Ok(Json(routines))
}

async fn count_routines(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = repository::count_active_routines(&state.db).await?;
    Ok(Json(CountResponse { count: count.max(0) as u64 }))
}

async fn group_week(
    State(state): State<AppState>,
    Path(group_id): Path<String>
) -> Result<Json<WeekRoutine>, AppError> {
    let week = repository::fetch_group_week(&state.db, &group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Group {}", group_id)))?;
    Ok(Json(week))
}

async fn sync_daily(
    State(state): State<AppState>,
    Json(req): Json<DailySyncRequest>
) -> Result<Json<SyncResult>, AppError> {
    let raw = req
        .date
        .ok_or_else(|| AppError::Validation("date is required".to_string()))?;
    let date = parse_sync_date(&raw)?;
    let result = state.sync.sync_daily_now(date).await?;
    Ok(Json(result))
}

async fn sync_weekly(
    State(state): State<AppState>,
    Json(req): Json<WeeklySyncRequest>
) -> Result<Json<WeekSyncResult>, AppError> {
    let raw = req
        .start_date
        .ok_or_else(|| AppError::Validation("startDate is required".to_string()))?;
    let start_date = parse_sync_date(&raw)?;
    let result = state.sync.sync_weekly(start_date).await?;
    Ok(Json(result))
}

async fn deactivate_all(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = state.sync.deactivate_all().await?;
    Ok(Json(CountResponse { count }))
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(repository::fetch_courses(&state.db).await?))
}

async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, AppError> {
    Ok(Json(repository::fetch_rooms(&state.db).await?))
}

async fn list_modules(State(state): State<AppState>) -> Result<Json<Vec<Module>>, AppError> {
    Ok(Json(repository::fetch_modules(&state.db).await?))
}

async fn list_teachers(State(state): State<AppState>) -> Result<Json<Vec<Teacher>>, AppError> {
    Ok(Json(repository::fetch_teachers(&state.db).await?))
}

async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<StudentGroup>>, AppError> {
    Ok(Json(repository::fetch_groups(&state.db).await?))
}

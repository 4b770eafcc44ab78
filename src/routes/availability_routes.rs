// src/routes/availability_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
    routes::{ApiOk, parse_date},
    scheduling::{
        calendar::{MonthGrid, parse_month},
        conflict::DayAvailability,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/providers/{provider_id}/availability", get(get_availability))
        .route("/providers/{provider_id}/calendar", get(get_calendar))
}

/* ============================================================
   GET /providers/{provider_id}/availability?date=YYYY-MM-DD
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
}

pub async fn get_availability(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(provider_id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<ApiOk<DayAvailability>>, ApiError> {
    let date = parse_date("date", &q.date)?;
    let day = state.scheduler.get_availability(provider_id, date).await?;
    Ok(Json(ApiOk { data: day }))
}

/* ============================================================
   GET /providers/{provider_id}/calendar?month=YYYY-MM
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub month: String,
}

pub async fn get_calendar(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(provider_id): Path<Uuid>,
    Query(q): Query<CalendarQuery>,
) -> Result<Json<ApiOk<MonthGrid>>, ApiError> {
    let (year, month) = parse_month(&q.month)
        .ok_or_else(|| ApiError::BadRequest("VALIDATION_ERROR", "month must be YYYY-MM".into()))?;
    let grid = state.scheduler.calendar_month(provider_id, year, month).await?;
    Ok(Json(ApiOk { data: grid }))
}

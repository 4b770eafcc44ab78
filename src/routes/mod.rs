use axum::Router;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::AppState;

pub mod appointment_routes;
pub mod availability_routes;
pub mod room_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", availability_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", room_routes::router())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

pub(crate) fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("VALIDATION_ERROR", format!("{field} must be YYYY-MM-DD")))
}

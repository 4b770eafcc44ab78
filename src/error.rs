use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::AppointmentStatus;
use crate::scheduling::interval::TimeWindow;

/// Failures of the scheduling core. Every variant reaches the immediate
/// caller as a typed value; nothing here is logged or swallowed.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("room {room_id} is already assigned {existing} on {date}")]
    RoomConflict {
        room_id: Uuid,
        date: NaiveDate,
        existing: TimeWindow,
    },

    #[error("provider {provider_id} is already committed {existing} on {date}")]
    ProviderConflict {
        provider_id: Uuid,
        date: NaiveDate,
        existing: TimeWindow,
    },

    #[error("slot {window} on {date} is already taken for provider {provider_id}")]
    SlotConflict {
        provider_id: Uuid,
        date: NaiveDate,
        window: TimeWindow,
    },

    #[error("appointment {appointment_id} is {}", .status.as_str())]
    InvalidState {
        appointment_id: Uuid,
        status: AppointmentStatus,
    },

    #[error("slot {slot} on {date} for provider {provider_id} is both booked and blocked")]
    DataInconsistency {
        provider_id: Uuid,
        date: NaiveDate,
        slot: TimeWindow,
    },

    #[error("reservation store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Internal(String),
}

impl SchedulingError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulingError::NotFound { .. } => "NOT_FOUND",
            SchedulingError::RoomConflict { .. } => "ROOM_CONFLICT",
            SchedulingError::ProviderConflict { .. } => "PROVIDER_CONFLICT",
            SchedulingError::SlotConflict { .. } => "SLOT_CONFLICT",
            SchedulingError::InvalidState { .. } => "INVALID_STATE",
            SchedulingError::DataInconsistency { .. } => "DATA_INCONSISTENCY",
            SchedulingError::Unavailable(_) => "UNAVAILABLE",
            SchedulingError::Validation(_) => "VALIDATION_ERROR",
            SchedulingError::Internal(_) => "INTERNAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulingError::Unavailable(_))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Unavailable(&'static str, String),
    Server(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<SchedulingError> for ApiError {
    fn from(e: SchedulingError) -> Self {
        let code = e.code();
        match &e {
            SchedulingError::NotFound { .. } => ApiError::NotFound(code, e.to_string()),
            SchedulingError::RoomConflict { .. }
            | SchedulingError::ProviderConflict { .. }
            | SchedulingError::SlotConflict { .. }
            | SchedulingError::InvalidState { .. } => {
                tracing::info!(code, "scheduling conflict: {e}");
                ApiError::Conflict(code, e.to_string())
            }
            SchedulingError::Validation(msg) => ApiError::BadRequest(code, msg.clone()),
            SchedulingError::Unavailable(msg) => {
                tracing::warn!("reservation store unavailable: {msg}");
                ApiError::Unavailable(code, "Scheduling is temporarily unavailable, retry shortly".into())
            }
            SchedulingError::DataInconsistency { .. } => {
                tracing::error!("{e}");
                ApiError::Server(code, e.to_string())
            }
            SchedulingError::Internal(msg) => {
                tracing::error!("scheduling backend failure: {msg}");
                ApiError::Internal(msg.clone())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Unavailable(code, msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::to_error_response(code, &msg),
            )
                .into_response(),
            ApiError::Server(code, msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response(code, &msg),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}

// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ErrorObject},
    middleware::auth_context::AuthContext,
    models::{AppState, Appointment, PatientPayload, role_to_string},
    routes::{ApiOk, parse_date},
    scheduling::{
        cancellation::CancellationOutcome,
        interval::{TimeWindow, hhmm},
        service::{BlockSlot, BookSlot},
    },
};

fn ensure_can_book(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is_patient() || auth.is_front_desk() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            format!("Role {} cannot book appointments", role_to_string(auth.role)),
        ))
    }
}

fn ensure_manage(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is_front_desk() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin/manager/receptionist can cancel appointments".into(),
        ))
    }
}

fn ensure_block(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is_admin_or_manager() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin/manager can block schedule time".into(),
        ))
    }
}

const MAX_BATCH: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(book_appointment))
        .route("/appointments/blocks", post(block_time))
        .route("/appointments/cancel", post(cancel_appointments))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
}

/* ============================================================
   POST /appointments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub provider_id: Uuid,
    pub date: String,
    #[serde(with = "hhmm")]
    pub time: chrono::NaiveTime,
    pub patient_id: Option<Uuid>,
    pub note: Option<String>,
    pub room_id: Option<Uuid>,
}

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<BookRequest>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    ensure_can_book(&auth)?;
    let date = parse_date("date", &payload.date)?;

    // patients always book for themselves
    let patient_id = if auth.is_patient() {
        Some(auth.user_id)
    } else {
        payload.patient_id
    };

    let appt = state
        .scheduler
        .book_slot(BookSlot {
            provider_id: payload.provider_id,
            date,
            time: payload.time,
            patient: PatientPayload {
                patient_id,
                note: payload.note,
            },
            room_id: payload.room_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: appt })))
}

/* ============================================================
   POST /appointments/blocks
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub provider_id: Uuid,
    pub date: String,
    pub window: TimeWindow,
    pub note: Option<String>,
}

pub async fn block_time(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<BlockRequest>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    ensure_block(&auth)?;
    let date = parse_date("date", &payload.date)?;

    let block = state
        .scheduler
        .block_slot(BlockSlot {
            provider_id: payload.provider_id,
            date,
            window: payload.window,
            note: payload.note,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: block })))
}

/* ============================================================
   GET /appointments/{appointment_id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appt = state.scheduler.get_appointment(appointment_id).await?;

    // patients only see their own bookings
    if auth.is_patient() && appt.patient_id != Some(auth.user_id) {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You can only view your own appointments".into(),
        ));
    }

    Ok(Json(ApiOk { data: appt }))
}

/* ============================================================
   POST /appointments/{appointment_id}/cancel
   ============================================================ */

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub note: Option<String>,
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<ApiOk<CancellationOutcome>>, ApiError> {
    ensure_manage(&auth)?;
    let Json(payload) = payload.unwrap_or_default();

    let outcome = state
        .scheduler
        .cancel_appointment(appointment_id, payload.note.as_deref())
        .await?;

    Ok(Json(ApiOk { data: outcome }))
}

/* ============================================================
   POST /appointments/cancel (batch)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BatchCancelRequest {
    pub appointment_ids: Vec<Uuid>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchErrorDto {
    #[serde(flatten)]
    pub error: ErrorObject,
    pub retryable: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchCancelItemDto {
    pub appointment_id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CancellationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchErrorDto>,
}

pub async fn cancel_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<BatchCancelRequest>,
) -> Result<Json<ApiOk<Vec<BatchCancelItemDto>>>, ApiError> {
    ensure_manage(&auth)?;
    if payload.appointment_ids.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "appointment_ids must not be empty".into()));
    }
    if payload.appointment_ids.len() > MAX_BATCH {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("at most {MAX_BATCH} appointments per batch"),
        ));
    }

    let results = state
        .scheduler
        .cancel_appointments(&payload.appointment_ids, payload.note.as_deref())
        .await;

    let items = results
        .into_iter()
        .map(|r| match r.result {
            Ok(outcome) => BatchCancelItemDto {
                appointment_id: r.appointment_id,
                ok: true,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => BatchCancelItemDto {
                appointment_id: r.appointment_id,
                ok: false,
                outcome: None,
                error: Some(BatchErrorDto {
                    retryable: e.is_retryable(),
                    error: ErrorObject {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    },
                }),
            },
        })
        .collect();

    Ok(Json(ApiOk { data: items }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};

    use crate::routes::test_support::{DOCTOR, MANAGER, PATIENT, RECEPTION, TestApp, json_body, send, setup_test_app};

    async fn book(t: &TestApp, token: &str, time: &str) -> (StatusCode, Value) {
        let body = json!({
            "provider_id": t.doc,
            "date": "2026-10-19",
            "time": time,
            "note": "cleaning",
        });
        let response = send(&t.app, Method::POST, "/api/v1/appointments", Some(token), Some(body)).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    #[tokio::test]
    async fn patient_books_for_themselves() {
        let t = setup_test_app();

        let (status, body) = book(&t, PATIENT, "10:00").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "booked");
        assert_eq!(body["data"]["window"]["start"], "10:00");
        assert_eq!(body["data"]["window"]["end"], "10:30");
        assert!(body["data"]["patient_id"].is_string());

        let id = body["data"]["appointment_id"].as_str().unwrap().to_string();
        let response = send(&t.app, Method::GET, &format!("/api/v1/appointments/{id}"), Some(PATIENT), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn double_booking_is_a_slot_conflict() {
        let t = setup_test_app();

        let (status, _) = book(&t, RECEPTION, "11:00").await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = book(&t, PATIENT, "11:00").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SLOT_CONFLICT");
    }

    #[tokio::test]
    async fn doctors_cannot_book_or_cancel() {
        let t = setup_test_app();

        let (status, body) = book(&t, DOCTOR, "09:00").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (_, booked) = book(&t, RECEPTION, "09:00").await;
        let id = booked["data"]["appointment_id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/appointments/{id}/cancel");
        let response = send(&t.app, Method::POST, &uri, Some(DOCTOR), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn off_grid_time_is_a_validation_error() {
        let t = setup_test_app();
        let (status, body) = book(&t, RECEPTION, "10:10").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn cancel_twice_is_invalid_state() {
        let t = setup_test_app();
        let (_, booked) = book(&t, RECEPTION, "14:00").await;
        let id = booked["data"]["appointment_id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/appointments/{id}/cancel");

        let response = send(&t.app, Method::POST, &uri, Some(RECEPTION), Some(json!({ "note": "moved" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["previous_status"], "booked");
        assert_eq!(body["data"]["note"], "moved");

        let response = send(&t.app, Method::POST, &uri, Some(RECEPTION), None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_STATE");

        // the slot is bookable again
        let (status, _) = book(&t, PATIENT, "14:00").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn batch_cancel_reports_each_id_in_order() {
        let t = setup_test_app();
        let (_, a) = book(&t, RECEPTION, "09:00").await;
        let (_, b) = book(&t, RECEPTION, "09:30").await;
        let missing = uuid::Uuid::new_v4();

        let body = json!({
            "appointment_ids": [a["data"]["appointment_id"], missing, b["data"]["appointment_id"]],
            "note": "provider out sick",
        });
        let response = send(&t.app, Method::POST, "/api/v1/appointments/cancel", Some(MANAGER), Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["ok"], true);
        assert_eq!(items[1]["ok"], false);
        assert_eq!(items[1]["appointment_id"], missing.to_string());
        assert_eq!(items[1]["error"]["code"], "NOT_FOUND");
        assert_eq!(items[1]["error"]["retryable"], false);
        assert_eq!(items[2]["ok"], true);
    }

    #[tokio::test]
    async fn only_admin_or_manager_block() {
        let t = setup_test_app();
        let body = json!({
            "provider_id": t.doc,
            "date": "2026-10-19",
            "window": { "start": "12:00", "end": "13:00" },
            "note": "lunch",
        });

        let uri = "/api/v1/appointments/blocks";
        let response = send(&t.app, Method::POST, uri, Some(RECEPTION), Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&t.app, Method::POST, uri, Some(MANAGER), Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["data"]["status"], "blocked");

        let (status, body) = book(&t, PATIENT, "12:30").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SLOT_CONFLICT");

        let outside = json!({
            "provider_id": t.doc,
            "date": "2026-10-19",
            "window": { "start": "16:30", "end": "18:00" },
        });
        let response = send(&t.app, Method::POST, "/api/v1/appointments/blocks", Some(MANAGER), Some(outside)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

// src/routes/room_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, AssignmentScope, RoomAssignment},
    routes::{ApiOk, parse_date},
    scheduling::{allocator::AssignRoom, interval::TimeWindow},
};

fn ensure_manage(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is_front_desk() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin/manager/receptionist can manage room assignments".into(),
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/room_assignments", get(list_assignments).post(assign_room))
        .route("/room_assignments/{assignment_id}", delete(release_room))
}

/* ============================================================
   POST /room_assignments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AssignRoomRequest {
    pub room_id: Uuid,
    pub provider_id: Uuid,
    pub date: String,
    pub window: TimeWindow,
    pub appointment_id: Option<Uuid>,
}

pub async fn assign_room(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<AssignRoomRequest>,
) -> Result<(StatusCode, Json<ApiOk<RoomAssignment>>), ApiError> {
    ensure_manage(&auth)?;
    let date = parse_date("date", &payload.date)?;

    let assignment = state
        .scheduler
        .assign_room(AssignRoom {
            room_id: payload.room_id,
            provider_id: payload.provider_id,
            date,
            window: payload.window,
            appointment_id: payload.appointment_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: assignment })))
}

/* ============================================================
   DELETE /room_assignments/{assignment_id}
   ============================================================ */

pub async fn release_room(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(assignment_id): Path<Uuid>,
) -> Result<Json<ApiOk<RoomAssignment>>, ApiError> {
    ensure_manage(&auth)?;
    let released = state.scheduler.release_room(assignment_id).await?;
    Ok(Json(ApiOk { data: released }))
}

/* ============================================================
   GET /room_assignments?date=YYYY-MM-DD&room_id= | &provider_id=
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AssignmentsQuery {
    pub date: String,
    pub room_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

pub async fn list_assignments(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<AssignmentsQuery>,
) -> Result<Json<ApiOk<Vec<RoomAssignment>>>, ApiError> {
    let date = parse_date("date", &q.date)?;
    let scope = match (q.room_id, q.provider_id) {
        (Some(room_id), None) => AssignmentScope::Room(room_id),
        (None, Some(provider_id)) => AssignmentScope::Provider(provider_id),
        _ => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "exactly one of room_id or provider_id is required".into(),
            ));
        }
    };

    let rows = state.scheduler.list_room_assignments(scope, date).await?;
    Ok(Json(ApiOk { data: rows }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};
    use uuid::Uuid;

    use crate::routes::test_support::{DOCTOR, RECEPTION, TestApp, json_body, send, setup_test_app};

    async fn assign(t: &TestApp, start: &str, end: &str) -> (StatusCode, Value) {
        let body = json!({
            "room_id": t.room,
            "provider_id": t.doc,
            "date": "2026-10-19",
            "window": { "start": start, "end": end },
        });
        let response = send(&t.app, Method::POST, "/api/v1/room_assignments", Some(RECEPTION), Some(body)).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    #[tokio::test]
    async fn assign_list_release() {
        let t = setup_test_app();

        let (status, body) = assign(&t, "09:00", "10:00").await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["assignment_id"].as_str().unwrap().to_string();

        // back to back is fine
        let (status, _) = assign(&t, "10:00", "11:00").await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/v1/room_assignments?date=2026-10-19&room_id={}", t.room);
        let response = send(&t.app, Method::GET, &uri, Some(DOCTOR), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 2);
        assert_eq!(listed["data"][0]["window"]["start"], "09:00");

        let uri = format!("/api/v1/room_assignments/{id}");
        let response = send(&t.app, Method::DELETE, &uri, Some(RECEPTION), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&t.app, Method::DELETE, &uri, Some(RECEPTION), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn overlapping_assignment_is_a_room_conflict() {
        let t = setup_test_app();

        let (status, _) = assign(&t, "09:00", "10:00").await;
        assert_eq!(status, StatusCode::CREATED);

        // same room and same provider: the room check fires first
        let (status, body) = assign(&t, "09:30", "10:30").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ROOM_CONFLICT");
    }

    #[tokio::test]
    async fn list_needs_exactly_one_scope() {
        let t = setup_test_app();

        let response = send(&t.app, Method::GET, "/api/v1/room_assignments?date=2026-10-19", Some(DOCTOR), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let uri = format!(
            "/api/v1/room_assignments?date=2026-10-19&room_id={}&provider_id={}",
            t.room, t.doc
        );
        let response = send(&t.app, Method::GET, &uri, Some(DOCTOR), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn doctors_cannot_assign_and_unknown_room_is_not_found() {
        let t = setup_test_app();
        let body = json!({
            "room_id": t.room,
            "provider_id": t.doc,
            "date": "2026-10-19",
            "window": { "start": "09:00", "end": "10:00" },
        });
        let response = send(&t.app, Method::POST, "/api/v1/room_assignments", Some(DOCTOR), Some(body)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json!({
            "room_id": Uuid::new_v4(),
            "provider_id": t.doc,
            "date": "2026-10-19",
            "window": { "start": "09:00", "end": "10:00" },
        });
        let response = send(&t.app, Method::POST, "/api/v1/room_assignments", Some(RECEPTION), Some(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

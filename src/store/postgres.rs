// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Overlap, ReservationStore, SessionDirectory, StoreError, StoreResult};
use crate::models::{
    Appointment, AppointmentStatus, AssignmentScope, NewAppointment, NewRoomAssignment, Principal, Provider, Room,
    RoomAssignment, WorkingDays,
};
use crate::scheduling::interval::TimeWindow;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, FromRow)]
struct ProviderRow {
    provider_id: Uuid,
    display_name: String,
    work_day_first: i16,
    work_day_last: i16,
    day_start: NaiveTime,
    day_end: NaiveTime,
    slot_minutes: i32,
}

#[derive(Debug, FromRow)]
struct AppointmentRow {
    appointment_id: Uuid,
    provider_id: Uuid,
    work_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    status: AppointmentStatus,
    room_id: Option<Uuid>,
    patient_id: Option<Uuid>,
    note: Option<String>,
    cancel_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    assignment_id: Uuid,
    room_id: Uuid,
    provider_id: Uuid,
    work_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    appointment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    roles: i16,
}

fn window(start: NaiveTime, end: NaiveTime) -> StoreResult<TimeWindow> {
    TimeWindow::new(start, end).ok_or_else(|| StoreError::Backend(format!("stored window {start}-{end} is empty")))
}

impl TryFrom<ProviderRow> for Provider {
    type Error = StoreError;

    fn try_from(r: ProviderRow) -> StoreResult<Self> {
        Ok(Provider {
            provider_id: r.provider_id,
            display_name: r.display_name,
            working_days: WorkingDays {
                first: u8::try_from(r.work_day_first).map_err(|e| StoreError::Backend(format!("work_day_first: {e}")))?,
                last: u8::try_from(r.work_day_last).map_err(|e| StoreError::Backend(format!("work_day_last: {e}")))?,
            },
            day_start: r.day_start,
            day_end: r.day_end,
            slot_minutes: u32::try_from(r.slot_minutes)
                .map_err(|e| StoreError::Backend(format!("slot_minutes: {e}")))?,
        })
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRow) -> StoreResult<Self> {
        Ok(Appointment {
            appointment_id: r.appointment_id,
            provider_id: r.provider_id,
            date: r.work_date,
            window: window(r.start_time, r.end_time)?,
            status: r.status,
            room_id: r.room_id,
            patient_id: r.patient_id,
            note: r.note,
            cancel_note: r.cancel_note,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl TryFrom<AssignmentRow> for RoomAssignment {
    type Error = StoreError;

    fn try_from(r: AssignmentRow) -> StoreResult<Self> {
        Ok(RoomAssignment {
            assignment_id: r.assignment_id,
            room_id: r.room_id,
            provider_id: r.provider_id,
            date: r.work_date,
            window: window(r.start_time, r.end_time)?,
            appointment_id: r.appointment_id,
            created_at: r.created_at,
        })
    }
}

/// Exclusion violations (SQLSTATE 23P01) name the constraint that fired.
fn db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23P01") => match db.constraint() {
            Some("slot_appointment_provider_no_overlap") => StoreError::Uniqueness(Overlap::ProviderAppointment),
            Some("room_assignment_room_no_overlap") => StoreError::Uniqueness(Overlap::RoomAssignment),
            Some("room_assignment_provider_no_overlap") => StoreError::Uniqueness(Overlap::ProviderAssignment),
            _ => StoreError::Backend(format!("db error: {e}")),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("db error: {e}"))
        }
        _ => StoreError::Backend(format!("db error: {e}")),
    }
}

/// Serializes writers of one provider-day across instances until the
/// transaction ends. The exclusion constraints cover each table alone; this
/// covers appointment vs. room assignment.
async fn lock_provider_day(tx: &mut Transaction<'_, Postgres>, provider_id: Uuid, date: NaiveDate) -> StoreResult<()> {
    sqlx::query(r#"SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2::text, 0))"#)
        .bind(provider_id)
        .bind(date)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    Ok(())
}

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, provider_id, work_date, start_time, end_time, status,
    room_id, patient_id, note, cancel_note, created_at, updated_at
"#;

const ASSIGNMENT_COLUMNS: &str = r#"
    assignment_id, room_id, provider_id, work_date, start_time, end_time,
    appointment_id, created_at
"#;

#[async_trait]
impl ReservationStore for PgStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT provider_id, display_name, work_day_first, work_day_last,
                   day_start, day_end, slot_minutes
            FROM provider_schedule
            WHERE provider_id = $1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)?;

        row.map(Provider::try_from).transpose()
    }

    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<Room>> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT room_id, description
            FROM room
            WHERE room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)?;

        Ok(row.map(|(room_id, description)| Room { room_id, description }))
    }

    async fn list_appointments(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM slot_appointment \
             WHERE provider_id = $1 AND work_date = $2 \
             ORDER BY start_time ASC, created_at ASC"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(provider_id)
            .bind(date)
            .fetch_all(&self.db)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM slot_appointment WHERE appointment_id = $1");
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)?;

        row.map(Appointment::try_from).transpose()
    }

    async fn create_appointment(&self, data: NewAppointment) -> StoreResult<Appointment> {
        let mut tx = self.db.begin().await.map_err(db_error)?;

        if data.status.is_active() {
            lock_provider_day(&mut tx, data.provider_id, data.date).await?;
            let held: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM room_assignment
                    WHERE provider_id = $1 AND work_date = $2
                      AND start_time < $4 AND end_time > $3
                )
                "#,
            )
            .bind(data.provider_id)
            .bind(data.date)
            .bind(data.window.start)
            .bind(data.window.end)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
            if held {
                return Err(StoreError::Uniqueness(Overlap::ProviderAssignment));
            }
        }

        let sql = format!(
            "INSERT INTO slot_appointment \
               (provider_id, work_date, start_time, end_time, status, patient_id, note) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(data.provider_id)
            .bind(data.date)
            .bind(data.window.start)
            .bind(data.window.end)
            .bind(data.status)
            .bind(data.patient_id)
            .bind(data.note)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Appointment::try_from(row)
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        note: Option<&str>,
    ) -> StoreResult<()> {
        let updated: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE slot_appointment
            SET status = $3,
                cancel_note = COALESCE($4, cancel_note),
                updated_at = now()
            WHERE appointment_id = $1
              AND status = $2
            RETURNING appointment_id
            "#,
        )
        .bind(appointment_id)
        .bind(from)
        .bind(to)
        .bind(note)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)?;

        if updated.is_some() {
            return Ok(());
        }

        let actual: Option<AppointmentStatus> =
            sqlx::query_scalar(r#"SELECT status FROM slot_appointment WHERE appointment_id = $1"#)
                .bind(appointment_id)
                .fetch_optional(&self.db)
                .await
                .map_err(db_error)?;

        match actual {
            Some(actual) => Err(StoreError::StatusMismatch { actual }),
            None => Err(StoreError::NotFound {
                entity: "appointment",
                id: appointment_id,
            }),
        }
    }

    async fn set_appointment_room(&self, appointment_id: Uuid, room_id: Option<Uuid>) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE slot_appointment
            SET room_id = $2, updated_at = now()
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .bind(room_id)
        .execute(&self.db)
        .await
        .map_err(db_error)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "appointment",
                id: appointment_id,
            });
        }
        Ok(())
    }

    async fn list_room_assignments(&self, scope: AssignmentScope, date: NaiveDate) -> StoreResult<Vec<RoomAssignment>> {
        let (column, id) = match scope {
            AssignmentScope::Room(id) => ("room_id", id),
            AssignmentScope::Provider(id) => ("provider_id", id),
        };
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM room_assignment \
             WHERE {column} = $1 AND work_date = $2 \
             ORDER BY start_time ASC"
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(id)
            .bind(date)
            .fetch_all(&self.db)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(RoomAssignment::try_from).collect()
    }

    async fn get_room_assignment(&self, assignment_id: Uuid) -> StoreResult<Option<RoomAssignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM room_assignment WHERE assignment_id = $1");
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(assignment_id)
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)?;

        row.map(RoomAssignment::try_from).transpose()
    }

    async fn create_room_assignment(&self, data: NewRoomAssignment) -> StoreResult<RoomAssignment> {
        let mut tx = self.db.begin().await.map_err(db_error)?;
        lock_provider_day(&mut tx, data.provider_id, data.date).await?;

        let busy: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM slot_appointment
                WHERE provider_id = $1 AND work_date = $2
                  AND status IN (1, 2)
                  AND start_time < $4 AND end_time > $3
                  AND appointment_id IS DISTINCT FROM $5
            )
            "#,
        )
        .bind(data.provider_id)
        .bind(data.date)
        .bind(data.window.start)
        .bind(data.window.end)
        .bind(data.appointment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        if busy {
            return Err(StoreError::Uniqueness(Overlap::ProviderAppointment));
        }

        let sql = format!(
            "INSERT INTO room_assignment \
               (room_id, provider_id, work_date, start_time, end_time, appointment_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(data.room_id)
            .bind(data.provider_id)
            .bind(data.date)
            .bind(data.window.start)
            .bind(data.window.end)
            .bind(data.appointment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        RoomAssignment::try_from(row)
    }

    async fn delete_room_assignment(&self, assignment_id: Uuid) -> StoreResult<()> {
        let res = sqlx::query(r#"DELETE FROM room_assignment WHERE assignment_id = $1"#)
            .bind(assignment_id)
            .execute(&self.db)
            .await
            .map_err(db_error)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "room assignment",
                id: assignment_id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SessionDirectory for PgStore {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Principal>> {
        // Validate session_token + ensure dcms_user is active
        let row = sqlx::query_as::<_, SessionLookupRow>(
            r#"
            SELECT st.session_token_id, st.user_id, u.roles
            FROM session_token st
            JOIN "dcms_user" u ON u.user_id = st.user_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > now()
              AND u.is_active = true
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Touch last_seen_at (best-effort)
        let _ = sqlx::query(
            r#"
            UPDATE session_token
            SET last_seen_at = now()
            WHERE session_token_id = $1
            "#,
        )
        .bind(row.session_token_id)
        .execute(&self.db)
        .await;

        Ok(Some(Principal {
            user_id: row.user_id,
            role: row.roles,
        }))
    }
}

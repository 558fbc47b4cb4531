//! The attendance state engine: the single authority that moves a record
//! out of `absent`. Both automated writers (check-in and excuse approval)
//! funnel through `resolve_if_absent`, a one-row compare-and-set, so
//! racing writers resolve with exactly one winner and records for
//! different (session, student) pairs never contend.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};

use db::models::{
    attendance_record::{self, AttendanceStatus},
    session,
};

use crate::error::ServiceError;

/// Set the record's status if and only if it is still `absent`. Returns
/// whether this caller won the transition. The filter on the current
/// status makes the read-modify-write a single atomic statement; a loser
/// observes `false` and must treat it as a no-op, not an error.
pub async fn resolve_if_absent<C>(
    conn: &C,
    session_id: i64,
    student_id: i64,
    new_status: AttendanceStatus,
    check_in_time: Option<DateTime<Utc>>,
    verified_by_face: bool,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    let result = attendance_record::Entity::update_many()
        .set(attendance_record::ActiveModel {
            status: Set(new_status),
            check_in_time: Set(check_in_time),
            verified_by_face: Set(verified_by_face),
            ..Default::default()
        })
        .filter(attendance_record::Column::SessionId.eq(session_id))
        .filter(attendance_record::Column::StudentId.eq(student_id))
        .filter(attendance_record::Column::Status.eq(AttendanceStatus::Absent))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Instructor-driven correction. Bypasses the absent-only guard, so every
/// call is written to the audit log with the actor and both statuses.
pub async fn set_attendance_status(
    db: &DatabaseConnection,
    session_id: i64,
    student_id: i64,
    new_status: AttendanceStatus,
    actor_id: i64,
) -> Result<attendance_record::Model, ServiceError> {
    let record = attendance_record::Entity::find_by_id((session_id, student_id))
        .one(db)
        .await?
        .ok_or(ServiceError::RecordNotFound {
            student_id,
            session_id,
        })?;

    let previous = record.status;
    let mut active: attendance_record::ActiveModel = record.into();
    active.status = Set(new_status);
    let updated = active.update(db).await?;

    log::info!(
        "attendance override by user {}: session={} student={} {} -> {}",
        actor_id,
        session_id,
        student_id,
        previous,
        new_status
    );
    Ok(updated)
}

pub async fn record_for(
    db: &DatabaseConnection,
    session_id: i64,
    student_id: i64,
) -> Result<Option<attendance_record::Model>, ServiceError> {
    let record = attendance_record::Entity::find_by_id((session_id, student_id))
        .one(db)
        .await?;
    Ok(record)
}

pub async fn records_for_session(
    db: &DatabaseConnection,
    session_id: i64,
) -> Result<Vec<attendance_record::Model>, ServiceError> {
    let rows = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.eq(session_id))
        .all(db)
        .await?;
    Ok(rows)
}

pub async fn records_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<attendance_record::Model>, ServiceError> {
    let rows = attendance_record::Entity::find()
        .filter(attendance_record::Column::StudentId.eq(student_id))
        .all(db)
        .await?;
    Ok(rows)
}

pub async fn records_for_group(
    db: &DatabaseConnection,
    group_id: i64,
) -> Result<Vec<attendance_record::Model>, ServiceError> {
    let session_ids: Vec<i64> = session::Entity::find()
        .filter(session::Column::GroupId.eq(group_id))
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    if session_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.is_in(session_ids))
        .all(db)
        .await?;
    Ok(rows)
}

/// Per-status record counts for one session, for dashboard collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AttendanceSummary {
    pub absent: u64,
    pub present: u64,
    pub late: u64,
    pub excused: u64,
}

pub async fn summary_for_session(
    db: &DatabaseConnection,
    session_id: i64,
) -> Result<AttendanceSummary, ServiceError> {
    async fn count_status(
        db: &DatabaseConnection,
        session_id: i64,
        status: AttendanceStatus,
    ) -> Result<u64, ServiceError> {
        let n = attendance_record::Entity::find()
            .filter(attendance_record::Column::SessionId.eq(session_id))
            .filter(attendance_record::Column::Status.eq(status))
            .count(db)
            .await?;
        Ok(n)
    }

    Ok(AttendanceSummary {
        absent: count_status(db, session_id, AttendanceStatus::Absent).await?,
        present: count_status(db, session_id, AttendanceStatus::Present).await?,
        late: count_status(db, session_id, AttendanceStatus::Late).await?,
        excused: count_status(db, session_id, AttendanceStatus::Excused).await?,
    })
}

//! Roster ledger: session creation seeds exactly one absent attendance
//! record per student enrolled in the group at that moment, atomically
//! with the session row itself.

use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::info;

use db::models::{
    attendance_record::{self, AttendanceStatus},
    session,
};

use crate::error::ServiceError;
use crate::recognition::Enrollment;

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub group_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub grace_minutes: i32,
    pub active: bool,
}

/// Create a session and seed its roster in one transaction. A duplicate
/// (group, date, start_time) fails on the unique index before any roster
/// row exists.
pub async fn create_session(
    db: &DatabaseConnection,
    params: CreateSession,
    enrollment: &dyn Enrollment,
) -> Result<session::Model, ServiceError> {
    let students = enrollment.students_of(params.group_id).await?;

    let txn = db.begin().await?;
    let created = session::ActiveModel {
        group_id: Set(params.group_id),
        date: Set(params.date),
        start_time: Set(params.start_time),
        end_time: Set(params.end_time),
        grace_minutes: Set(params.grace_minutes),
        active: Set(params.active),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    seed_records(&txn, created.id, &students).await?;
    txn.commit().await?;

    info!(
        "created session {} for group {} with {} roster records",
        created.id,
        created.group_id,
        students.len()
    );
    Ok(created)
}

/// Seed the roster for an already-created session. Re-invocation is a
/// caller error: any existing record for the session is rejected rather
/// than silently ignored.
pub async fn initialize_session(
    db: &DatabaseConnection,
    session: &session::Model,
    student_ids: &[i64],
) -> Result<u64, ServiceError> {
    let existing = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.eq(session.id))
        .count(db)
        .await?;
    if existing > 0 {
        return Err(ServiceError::DuplicateRecord(session.id));
    }

    let txn = db.begin().await?;
    seed_records(&txn, session.id, student_ids).await?;
    txn.commit().await?;
    Ok(student_ids.len() as u64)
}

async fn seed_records<C>(conn: &C, session_id: i64, student_ids: &[i64]) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if student_ids.is_empty() {
        return Ok(());
    }
    let rows = student_ids.iter().map(|sid| attendance_record::ActiveModel {
        session_id: Set(session_id),
        student_id: Set(*sid),
        status: Set(AttendanceStatus::Absent),
        check_in_time: Set(None),
        verified_by_face: Set(false),
        created_at: Set(Utc::now()),
    });
    attendance_record::Entity::insert_many(rows).exec(conn).await?;
    Ok(())
}

pub async fn find_session(
    db: &DatabaseConnection,
    session_id: i64,
) -> Result<Option<session::Model>, ServiceError> {
    let session = session::Entity::find_by_id(session_id).one(db).await?;
    Ok(session)
}

/// Toggle whether the session accepts biometric check-ins.
pub async fn set_session_active(
    db: &DatabaseConnection,
    session_id: i64,
    active: bool,
) -> Result<session::Model, ServiceError> {
    let session = session::Entity::find_by_id(session_id)
        .one(db)
        .await?
        .ok_or(ServiceError::SessionNotFound(session_id))?;

    let mut model = session.into_active_model();
    model.active = Set(active);
    let updated = model.update(db).await?;
    Ok(updated)
}

/// Delete a session and the records it owns. Ownership release is
/// explicit: the records are enumerated and removed in the same
/// transaction, never left to an implicit cascade.
pub async fn delete_session(db: &DatabaseConnection, session_id: i64) -> Result<(), ServiceError> {
    let session = session::Entity::find_by_id(session_id)
        .one(db)
        .await?
        .ok_or(ServiceError::SessionNotFound(session_id))?;

    let txn = db.begin().await?;
    let removed = attendance_record::Entity::delete_many()
        .filter(attendance_record::Column::SessionId.eq(session_id))
        .exec(&txn)
        .await?;
    session::Entity::delete_by_id(session.id).exec(&txn).await?;
    txn.commit().await?;

    info!(
        "deleted session {} and {} owned attendance records",
        session_id, removed.rows_affected
    );
    Ok(())
}

pub async fn sessions_for_group(
    db: &DatabaseConnection,
    group_id: i64,
) -> Result<Vec<session::Model>, ServiceError> {
    let rows = session::Entity::find()
        .filter(session::Column::GroupId.eq(group_id))
        .all(db)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::DbEnrollment;
    use crate::test_support;

    #[tokio::test]
    async fn session_creation_seeds_one_absent_record_per_student() {
        let ctx = test_support::seed_class(&["alice", "bob", "carol"]).await;

        let records = crate::attendance::records_for_session(&ctx.db, ctx.session.id)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.status == AttendanceStatus::Absent));
        assert!(records.iter().all(|r| !r.verified_by_face));
        assert!(records.iter().all(|r| r.check_in_time.is_none()));
    }

    #[tokio::test]
    async fn reinitializing_a_seeded_session_is_rejected() {
        let ctx = test_support::seed_class(&["alice"]).await;

        let err = initialize_session(&ctx.db, &ctx.session, &[ctx.students[0].id])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateRecord(id) if id == ctx.session.id));

        // roster unchanged
        let records = crate::attendance::records_for_session(&ctx.db, ctx.session.id)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_session_slot_fails_before_seeding() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let enrollment = DbEnrollment::new(ctx.db.clone());

        let err = create_session(
            &ctx.db,
            CreateSession {
                group_id: ctx.group.id,
                date: ctx.session.date,
                start_time: ctx.session.start_time,
                end_time: ctx.session.end_time,
                grace_minutes: 5,
                active: false,
            },
            &enrollment,
        )
        .await;
        assert!(err.is_err());

        // exactly one session and one roster remain for the slot
        let sessions = sessions_for_group(&ctx.db, ctx.group.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        let records = crate::attendance::records_for_session(&ctx.db, ctx.session.id)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn late_enrollment_does_not_rewrite_past_sessions() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let newcomer = test_support::seed_user(&ctx.db, "late-joiner").await;
        test_support::enroll(&ctx.db, ctx.group.id, newcomer.id).await;

        let records = crate::attendance::records_for_session(&ctx.db, ctx.session.id)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn toggling_activation_gates_check_in() {
        let ctx = test_support::seed_class(&["alice"]).await;
        assert!(ctx.session.active);

        let updated = set_session_active(&ctx.db, ctx.session.id, false)
            .await
            .unwrap();
        assert!(!updated.active);

        let updated = set_session_active(&ctx.db, ctx.session.id, true)
            .await
            .unwrap();
        assert!(updated.active);
    }

    #[tokio::test]
    async fn bare_session_delete_is_blocked_while_records_exist() {
        let ctx = test_support::seed_class(&["alice"]).await;

        // the session row alone cannot be removed from under its roster
        let direct = session::Entity::delete_by_id(ctx.session.id)
            .exec(&ctx.db)
            .await;
        assert!(direct.is_err());

        let records = crate::attendance::records_for_session(&ctx.db, ctx.session.id)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);

        // the explicit path still releases both
        delete_session(&ctx.db, ctx.session.id).await.unwrap();
        assert!(find_session(&ctx.db, ctx.session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_session_releases_its_records() {
        let ctx = test_support::seed_class(&["alice", "bob"]).await;

        delete_session(&ctx.db, ctx.session.id).await.unwrap();

        assert!(find_session(&ctx.db, ctx.session.id).await.unwrap().is_none());
        let records = crate::attendance::records_for_session(&ctx.db, ctx.session.id)
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}

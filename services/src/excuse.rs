//! Excuse workflow: a student justifies an unresolved absence, the owning
//! instructor reviews it, and approval moves the attendance record to
//! `excused` through the same absent-only compare-and-set every automated
//! writer uses. The excuse update and the attendance transition commit in
//! one explicit transaction; nothing happens as a persistence side effect.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::info;

use db::models::{
    attendance_record::AttendanceStatus,
    course_group, excuse,
    excuse::ExcuseStatus,
    group_student, session,
};

use crate::attendance;
use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Create a pending excuse for an unresolved absence.
pub async fn submit_excuse(
    db: &DatabaseConnection,
    student_id: i64,
    session_id: i64,
    reason: &str,
    document_path: Option<&str>,
) -> Result<excuse::Model, ServiceError> {
    let session = session::Entity::find_by_id(session_id)
        .one(db)
        .await?
        .ok_or(ServiceError::SessionNotFound(session_id))?;

    let enrolled = group_student::Entity::find_by_id((session.group_id, student_id))
        .one(db)
        .await?
        .is_some();
    if !enrolled {
        return Err(ServiceError::NotEnrolled {
            student_id,
            group_id: session.group_id,
        });
    }

    let record = attendance::record_for(db, session_id, student_id)
        .await?
        .ok_or(ServiceError::RecordNotFound {
            student_id,
            session_id,
        })?;
    if record.status != AttendanceStatus::Absent {
        return Err(ServiceError::AttendanceNotAbsent {
            student_id,
            session_id,
        });
    }

    let duplicate = excuse::Entity::find()
        .filter(excuse::Column::StudentId.eq(student_id))
        .filter(excuse::Column::SessionId.eq(session_id))
        .one(db)
        .await?
        .is_some();
    if duplicate {
        return Err(ServiceError::DuplicateExcuse {
            student_id,
            session_id,
        });
    }

    let created = excuse::ActiveModel {
        student_id: Set(student_id),
        session_id: Set(session_id),
        reason: Set(reason.to_owned()),
        document_path: Set(document_path.map(str::to_owned)),
        status: Set(ExcuseStatus::Pending),
        reviewed_by: Set(None),
        review_comment: Set(None),
        created_at: Set(Utc::now()),
        reviewed_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(created)
}

/// Review a pending excuse. Only the owning instructor of the session's
/// group may review; approved/rejected are terminal. Approval applies the
/// absent-to-excused transition in the same transaction as the excuse
/// update; if the record resolved in the meantime the approval stands and
/// the attendance state is left as it is.
pub async fn review_excuse(
    db: &DatabaseConnection,
    reviewer_id: i64,
    excuse_id: i64,
    decision: ReviewDecision,
    comment: Option<&str>,
) -> Result<excuse::Model, ServiceError> {
    let excuse = excuse::Entity::find_by_id(excuse_id)
        .one(db)
        .await?
        .ok_or(ServiceError::ExcuseNotFound(excuse_id))?;
    let session = session::Entity::find_by_id(excuse.session_id)
        .one(db)
        .await?
        .ok_or(ServiceError::SessionNotFound(excuse.session_id))?;
    let group = course_group::Entity::find_by_id(session.group_id)
        .one(db)
        .await?
        .ok_or(ServiceError::GroupNotFound(session.group_id))?;

    if group.instructor_id != reviewer_id {
        return Err(ServiceError::NotAuthorized(reviewer_id));
    }
    if excuse.is_reviewed() {
        return Err(ServiceError::AlreadyReviewed(excuse_id));
    }

    let (student_id, session_id) = (excuse.student_id, excuse.session_id);

    let txn = db.begin().await?;
    let mut active: excuse::ActiveModel = excuse.into();
    active.status = Set(match decision {
        ReviewDecision::Approve => ExcuseStatus::Approved,
        ReviewDecision::Reject => ExcuseStatus::Rejected,
    });
    active.reviewed_by = Set(Some(reviewer_id));
    active.review_comment = Set(comment.map(str::to_owned));
    active.reviewed_at = Set(Some(Utc::now()));
    let updated = active.update(&txn).await?;

    if decision == ReviewDecision::Approve {
        let won = attendance::resolve_if_absent(
            &txn,
            session_id,
            student_id,
            AttendanceStatus::Excused,
            None,
            false,
        )
        .await?;
        if !won {
            // Record resolved between submission and review; approval
            // never regresses present/late, and an already-excused
            // record needs no second write.
            info!(
                "approved excuse {} without attendance change: record for student {} in session {} is already resolved",
                excuse_id, student_id, session_id
            );
        }
    }
    txn.commit().await?;
    Ok(updated)
}

pub async fn excuses_for_session(
    db: &DatabaseConnection,
    session_id: i64,
) -> Result<Vec<excuse::Model>, ServiceError> {
    let rows = excuse::Entity::find()
        .filter(excuse::Column::SessionId.eq(session_id))
        .order_by_asc(excuse::Column::Id)
        .all(db)
        .await?;
    Ok(rows)
}

pub async fn excuses_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<excuse::Model>, ServiceError> {
    let rows = excuse::Entity::find()
        .filter(excuse::Column::StudentId.eq(student_id))
        .order_by_asc(excuse::Column::Id)
        .all(db)
        .await?;
    Ok(rows)
}

/// Pending excuses across all sessions of a group, oldest first. Feeds
/// the instructor review queue.
pub async fn pending_excuses_for_group(
    db: &DatabaseConnection,
    group_id: i64,
) -> Result<Vec<excuse::Model>, ServiceError> {
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

    let rows = excuse::Entity::find()
        .filter(excuse::Column::SessionId.is_in(session_ids))
        .filter(excuse::Column::Status.eq(ExcuseStatus::Pending))
        .order_by_asc(excuse::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::register_encoding;
    use crate::test_support::{self, at};

    #[tokio::test]
    async fn excuse_lifecycle_approval_excuses_the_absence() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;

        let excuse = submit_excuse(&ctx.db, alice, ctx.session.id, "medical appointment", None)
            .await
            .unwrap();
        assert_eq!(excuse.status, ExcuseStatus::Pending);
        assert!(excuse.reviewed_at.is_none());

        let reviewed = review_excuse(
            &ctx.db,
            ctx.instructor.id,
            excuse.id,
            ReviewDecision::Approve,
            Some("documentation checked"),
        )
        .await
        .unwrap();
        assert_eq!(reviewed.status, ExcuseStatus::Approved);
        assert_eq!(reviewed.reviewed_by, Some(ctx.instructor.id));
        assert!(reviewed.reviewed_at.is_some());

        let record = crate::attendance::record_for(&ctx.db, ctx.session.id, alice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Excused);
        assert!(!record.verified_by_face);
    }

    #[tokio::test]
    async fn submitting_requires_enrollment() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let outsider = test_support::seed_user(&ctx.db, "outsider").await;

        let err = submit_excuse(&ctx.db, outsider.id, ctx.session.id, "reason", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotEnrolled { .. }));
    }

    #[tokio::test]
    async fn submitting_for_a_resolved_record_is_rejected() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;
        crate::attendance::resolve_if_absent(
            &ctx.db,
            ctx.session.id,
            alice,
            AttendanceStatus::Present,
            Some(Utc::now()),
            true,
        )
        .await
        .unwrap();

        let err = submit_excuse(&ctx.db, alice, ctx.session.id, "reason", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AttendanceNotAbsent { .. }));
    }

    #[tokio::test]
    async fn second_excuse_for_the_same_session_is_rejected() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;

        submit_excuse(&ctx.db, alice, ctx.session.id, "first", None)
            .await
            .unwrap();
        let err = submit_excuse(&ctx.db, alice, ctx.session.id, "second", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateExcuse { .. }));
    }

    #[tokio::test]
    async fn only_the_owning_instructor_may_review() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let stranger = test_support::seed_user(&ctx.db, "other-instructor").await;
        let excuse = submit_excuse(&ctx.db, ctx.students[0].id, ctx.session.id, "reason", None)
            .await
            .unwrap();

        let err = review_excuse(&ctx.db, stranger.id, excuse.id, ReviewDecision::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthorized(_)));

        // untouched
        let record = crate::attendance::record_for(&ctx.db, ctx.session.id, ctx.students[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn review_is_terminal() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let excuse = submit_excuse(&ctx.db, ctx.students[0].id, ctx.session.id, "reason", None)
            .await
            .unwrap();

        review_excuse(
            &ctx.db,
            ctx.instructor.id,
            excuse.id,
            ReviewDecision::Approve,
            None,
        )
        .await
        .unwrap();

        let err = review_excuse(
            &ctx.db,
            ctx.instructor.id,
            excuse.id,
            ReviewDecision::Reject,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyReviewed(_)));
    }

    #[tokio::test]
    async fn rejection_stamps_review_but_leaves_attendance_alone() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;
        let excuse = submit_excuse(&ctx.db, alice, ctx.session.id, "reason", None)
            .await
            .unwrap();

        let reviewed = review_excuse(
            &ctx.db,
            ctx.instructor.id,
            excuse.id,
            ReviewDecision::Reject,
            Some("no documentation"),
        )
        .await
        .unwrap();
        assert_eq!(reviewed.status, ExcuseStatus::Rejected);
        assert!(reviewed.reviewed_at.is_some());
        assert_eq!(reviewed.review_comment.as_deref(), Some("no documentation"));

        let record = crate::attendance::record_for(&ctx.db, ctx.session.id, alice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn approval_never_regresses_a_checked_in_record() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;
        let excuse = submit_excuse(&ctx.db, alice, ctx.session.id, "reason", None)
            .await
            .unwrap();

        // check-in lands between submission and review
        crate::attendance::resolve_if_absent(
            &ctx.db,
            ctx.session.id,
            alice,
            AttendanceStatus::Late,
            Some(Utc::now()),
            true,
        )
        .await
        .unwrap();

        let reviewed = review_excuse(
            &ctx.db,
            ctx.instructor.id,
            excuse.id,
            ReviewDecision::Approve,
            None,
        )
        .await
        .unwrap();
        assert_eq!(reviewed.status, ExcuseStatus::Approved);

        let record = crate::attendance::record_for(&ctx.db, ctx.session.id, alice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn racing_check_in_and_approval_produce_exactly_one_winner() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;
        register_encoding(&ctx.db, alice, &[0.0]).await.unwrap();
        let excuse = submit_excuse(&ctx.db, alice, ctx.session.id, "reason", None)
            .await
            .unwrap();

        let orchestrator = test_support::orchestrator(&ctx.db, at(8, 5, 0));
        let encodings = [vec![0.0]];
        let check_in = orchestrator.process_check_in(&ctx.db, ctx.session.id, &encodings);
        let approval = review_excuse(
            &ctx.db,
            ctx.instructor.id,
            excuse.id,
            ReviewDecision::Approve,
            None,
        );

        let (check_in, approval) = futures::join!(check_in, approval);
        let check_in = check_in.unwrap();
        let approval = approval.unwrap();
        assert_eq!(approval.status, ExcuseStatus::Approved);

        let record = crate::attendance::record_for(&ctx.db, ctx.session.id, alice)
            .await
            .unwrap()
            .unwrap();
        match record.status {
            // check-in won; the approval's transition was a no-op
            AttendanceStatus::Present => {
                assert_eq!(check_in.resolved.len(), 1);
                assert!(record.verified_by_face);
            }
            // approval won; the check-in observed a resolved record
            AttendanceStatus::Excused => {
                assert!(check_in.resolved.is_empty());
                assert!(!record.verified_by_face);
            }
            other => panic!("record settled on unexpected status {other}"),
        }
    }

    #[tokio::test]
    async fn pending_queue_lists_only_unreviewed_excuses_of_the_group() {
        let ctx = test_support::seed_class(&["alice", "bob"]).await;
        let (alice, bob) = (ctx.students[0].id, ctx.students[1].id);

        let first = submit_excuse(&ctx.db, alice, ctx.session.id, "one", None)
            .await
            .unwrap();
        submit_excuse(&ctx.db, bob, ctx.session.id, "two", None)
            .await
            .unwrap();
        review_excuse(
            &ctx.db,
            ctx.instructor.id,
            first.id,
            ReviewDecision::Reject,
            None,
        )
        .await
        .unwrap();

        let pending = pending_excuses_for_group(&ctx.db, ctx.group.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].student_id, bob);
    }
}

//! Append-only log of biometric check-in attempts. Appends run outside
//! any attendance transaction so a logging fault can never hold up (or be
//! held up by) an attendance mutation.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};

use db::models::verification_attempt::{self, AttemptOutcome};

use crate::error::ServiceError;

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub session_id: i64,
    pub student_id: Option<i64>,
    pub outcome: AttemptOutcome,
    pub distance: Option<f64>,
    pub note: Option<String>,
}

pub async fn record_attempt(
    db: &DatabaseConnection,
    attempt: NewAttempt,
) -> Result<verification_attempt::Model, ServiceError> {
    let model = verification_attempt::ActiveModel {
        session_id: Set(attempt.session_id),
        student_id: Set(attempt.student_id),
        outcome: Set(attempt.outcome),
        distance: Set(attempt.distance),
        note: Set(attempt.note),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model)
}

/// Rewrite a previously logged `success` attempt as `failed`. Used only
/// when a recognized identity turns out not to be on the session roster.
pub async fn demote_attempt(
    db: &DatabaseConnection,
    attempt_id: i64,
    note: &str,
) -> Result<(), ServiceError> {
    if let Some(row) = verification_attempt::Entity::find_by_id(attempt_id)
        .one(db)
        .await?
    {
        let mut active = row.into_active_model();
        active.outcome = Set(AttemptOutcome::Failed);
        active.note = Set(Some(note.to_owned()));
        active.update(db).await?;
    }
    Ok(())
}

pub async fn attempts_for_session(
    db: &DatabaseConnection,
    session_id: i64,
) -> Result<Vec<verification_attempt::Model>, ServiceError> {
    let rows = verification_attempt::Entity::find()
        .filter(verification_attempt::Column::SessionId.eq(session_id))
        .order_by_asc(verification_attempt::Column::Id)
        .all(db)
        .await?;
    Ok(rows)
}

pub async fn attempts_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<verification_attempt::Model>, ServiceError> {
    let rows = verification_attempt::Entity::find()
        .filter(verification_attempt::Column::StudentId.eq(student_id))
        .order_by_asc(verification_attempt::Column::Id)
        .all(db)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn student_history_excludes_anonymous_attempts() {
        let ctx = test_support::seed_class(&["alice"]).await;
        let alice = ctx.students[0].id;

        record_attempt(
            &ctx.db,
            NewAttempt {
                session_id: ctx.session.id,
                student_id: Some(alice),
                outcome: AttemptOutcome::Success,
                distance: Some(0.2),
                note: None,
            },
        )
        .await
        .unwrap();
        // an unmatched face carries no student
        record_attempt(
            &ctx.db,
            NewAttempt {
                session_id: ctx.session.id,
                student_id: None,
                outcome: AttemptOutcome::Failed,
                distance: None,
                note: None,
            },
        )
        .await
        .unwrap();

        let by_session = attempts_for_session(&ctx.db, ctx.session.id).await.unwrap();
        assert_eq!(by_session.len(), 2);

        let by_student = attempts_for_student(&ctx.db, alice).await.unwrap();
        assert_eq!(by_student.len(), 1);
        assert_eq!(by_student[0].outcome, AttemptOutcome::Success);
        assert_eq!(by_student[0].student_id, Some(alice));
    }
}

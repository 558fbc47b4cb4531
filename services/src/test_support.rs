//! Seed helpers shared by the service tests: one group under one
//! instructor, an enrolled roster, and a seeded session on 2026-03-02
//! from 08:00 with a 10-minute grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use db::models::{course_group, group_student, session, user};

use crate::checkin::{CheckInOrchestrator, RecognitionConfig};
use crate::recognition::{Clock, DbEncodingStore, DbEnrollment, DistanceMatcher, FaceMatcher};
use crate::session::{create_session, CreateSession};

pub struct ClassContext {
    pub db: DatabaseConnection,
    pub instructor: user::Model,
    pub group: course_group::Model,
    pub students: Vec<user::Model>,
    pub session: session::Model,
}

/// Instant on the session day.
pub fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, min, sec).unwrap()
}

pub async fn seed_user(db: &DatabaseConnection, username: &str) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_owned()),
        email: Set(format!("{username}@example.edu")),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn enroll(db: &DatabaseConnection, group_id: i64, student_id: i64) {
    group_student::ActiveModel {
        group_id: Set(group_id),
        student_id: Set(student_id),
    }
    .insert(db)
    .await
    .unwrap();
}

pub async fn seed_class(student_names: &[&str]) -> ClassContext {
    let db = db::test_utils::setup_test_db().await;

    let instructor = seed_user(&db, "instructor").await;
    let group = course_group::ActiveModel {
        code: Set("2558104".to_owned()),
        program: Set("Software Development".to_owned()),
        instructor_id: Set(instructor.id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();

    let mut students = Vec::new();
    for name in student_names {
        let student = seed_user(&db, name).await;
        enroll(&db, group.id, student.id).await;
        students.push(student);
    }

    let enrollment = DbEnrollment::new(db.clone());
    let session = create_session(
        &db,
        CreateSession {
            group_id: group.id,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            grace_minutes: 10,
            active: true,
        },
        &enrollment,
    )
    .await
    .unwrap();

    ClassContext {
        db,
        instructor,
        group,
        students,
        session,
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn orchestrator(db: &DatabaseConnection, now: DateTime<Utc>) -> CheckInOrchestrator {
    orchestrator_with_config(db, now, RecognitionConfig::default())
}

pub fn orchestrator_with_config(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    config: RecognitionConfig,
) -> CheckInOrchestrator {
    CheckInOrchestrator::new(
        config,
        Arc::new(DistanceMatcher),
        Arc::new(DbEncodingStore::new(db.clone())),
        Arc::new(DbEnrollment::new(db.clone())),
        Arc::new(FixedClock(now)),
    )
}

pub fn orchestrator_with_matcher(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    matcher: Arc<dyn FaceMatcher>,
    matcher_timeout: Duration,
) -> CheckInOrchestrator {
    CheckInOrchestrator::new(
        RecognitionConfig {
            matcher_timeout,
            ..RecognitionConfig::default()
        },
        matcher,
        Arc::new(DbEncodingStore::new(db.clone())),
        Arc::new(DbEnrollment::new(db.clone())),
        Arc::new(FixedClock(now)),
    )
}

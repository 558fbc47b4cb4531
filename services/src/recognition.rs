//! Capability seams consumed by the check-in orchestrator: the face
//! matcher, the encoding store, group enrollment, and the clock. Each has
//! a database- or system-backed implementation plus a trait so tests can
//! substitute deterministic doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};

use db::models::{face_encoding, group_student};

use crate::error::ServiceError;

/// Result of comparing one probe encoding against a candidate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatch {
    /// Index into the candidate slice handed to `compare`.
    pub index: usize,
    /// Distance to that candidate; lower is closer.
    pub distance: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("matcher fault: {0}")]
pub struct FaceMatchError(pub String);

/// Biometric comparison capability. Implementations must return the single
/// closest candidate within the threshold, never merely the first one that
/// satisfies it.
#[async_trait]
pub trait FaceMatcher: Send + Sync {
    async fn compare(
        &self,
        probe: &[f64],
        candidates: &[Vec<f64>],
        threshold: f64,
    ) -> Result<Option<FaceMatch>, FaceMatchError>;
}

/// In-process matcher over Euclidean distance between encodings.
/// Deployments with a remote matching service swap this out behind the
/// same trait.
pub struct DistanceMatcher;

impl DistanceMatcher {
    fn distance(probe: &[f64], candidate: &[f64]) -> f64 {
        probe
            .iter()
            .zip(candidate.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

#[async_trait]
impl FaceMatcher for DistanceMatcher {
    async fn compare(
        &self,
        probe: &[f64],
        candidates: &[Vec<f64>],
        threshold: f64,
    ) -> Result<Option<FaceMatch>, FaceMatchError> {
        let mut best: Option<FaceMatch> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            if candidate.len() != probe.len() {
                return Err(FaceMatchError(format!(
                    "candidate {} has dimension {}, probe has {}",
                    index,
                    candidate.len(),
                    probe.len()
                )));
            }
            let distance = Self::distance(probe, candidate);
            if distance <= threshold && best.is_none_or(|b| distance < b.distance) {
                best = Some(FaceMatch { index, distance });
            }
        }
        Ok(best)
    }
}

/// Current-time capability, injected so grace-period logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-student stored face encoding. `None` means the student has not
/// registered a face.
#[async_trait]
pub trait EncodingStore: Send + Sync {
    async fn encoding_for(&self, student_id: i64) -> Result<Option<Vec<f64>>, ServiceError>;
}

/// Encoding store backed by the `face_encodings` table. Only active rows
/// are visible to check-in.
pub struct DbEncodingStore {
    db: DatabaseConnection,
}

impl DbEncodingStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EncodingStore for DbEncodingStore {
    async fn encoding_for(&self, student_id: i64) -> Result<Option<Vec<f64>>, ServiceError> {
        let row = face_encoding::Entity::find_by_id(student_id)
            .filter(face_encoding::Column::Active.eq(true))
            .one(&self.db)
            .await?;
        match row {
            Some(row) => Ok(Some(row.vector()?)),
            None => Ok(None),
        }
    }
}

/// Store or replace a student's face encoding and reactivate it.
pub async fn register_encoding(
    db: &DatabaseConnection,
    student_id: i64,
    encoding: &[f64],
) -> Result<face_encoding::Model, ServiceError> {
    let serialized = serde_json::to_string(encoding)?;
    let now = Utc::now();

    let existing = face_encoding::Entity::find_by_id(student_id).one(db).await?;
    let model = match existing {
        Some(row) => {
            let mut active = row.into_active_model();
            active.encoding = Set(serialized);
            active.active = Set(true);
            active.updated_at = Set(now);
            active.update(db).await?
        }
        None => {
            face_encoding::ActiveModel {
                student_id: Set(student_id),
                encoding: Set(serialized),
                active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?
        }
    };
    Ok(model)
}

/// Hide a student's encoding from check-in without discarding it.
pub async fn deactivate_encoding(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<(), ServiceError> {
    if let Some(row) = face_encoding::Entity::find_by_id(student_id).one(db).await? {
        let mut active = row.into_active_model();
        active.active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;
    }
    Ok(())
}

/// Current student set of a course group.
#[async_trait]
pub trait Enrollment: Send + Sync {
    async fn students_of(&self, group_id: i64) -> Result<Vec<i64>, ServiceError>;
}

/// Enrollment backed by the `group_students` join table.
pub struct DbEnrollment {
    db: DatabaseConnection,
}

impl DbEnrollment {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Enrollment for DbEnrollment {
    async fn students_of(&self, group_id: i64) -> Result<Vec<i64>, ServiceError> {
        let members = group_student::Entity::find()
            .filter(group_student::Column::GroupId.eq(group_id))
            .all(&self.db)
            .await?;
        Ok(members.into_iter().map(|m| m.student_id).collect())
    }
}

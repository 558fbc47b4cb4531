//! Check-in orchestration: turns face-matcher results for one captured
//! frame into attendance transitions, applying the grace-period rule and
//! writing one verification-log row per detected face.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, EntityTrait};
use tokio::time::timeout;
use tracing::{info, warn};

use db::models::{
    attendance_record::{self, AttendanceStatus},
    verification_attempt::{self, AttemptOutcome},
};

use crate::attendance;
use crate::error::ServiceError;
use crate::recognition::{Clock, EncodingStore, Enrollment, FaceMatcher};
use crate::session;
use crate::verification_log::{self, NewAttempt};

/// Recognition settings, threaded in at construction instead of read from
/// ambient process state.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Matcher distance at or below which a comparison counts as a match.
    pub match_threshold: f64,
    /// Upper bound on a single matcher invocation. A timeout is logged as
    /// outcome `error` and never retried here.
    pub matcher_timeout: Duration,
    /// Whether attempts are appended to the verification log.
    pub log_attempts: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.4,
            matcher_timeout: Duration::from_secs(5),
            log_attempts: true,
        }
    }
}

impl RecognitionConfig {
    pub fn from_config(cfg: &common::config::Config) -> Self {
        Self {
            match_threshold: cfg.face_match_threshold,
            matcher_timeout: Duration::from_millis(cfg.face_match_timeout_ms),
            log_attempts: cfg.log_verifications,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedCheckIn {
    pub student_id: i64,
    pub status: AttendanceStatus,
}

/// Students whose record this frame resolved, with their new status.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CheckInResult {
    pub resolved: Vec<ResolvedCheckIn>,
}

pub struct CheckInOrchestrator {
    config: RecognitionConfig,
    matcher: Arc<dyn FaceMatcher>,
    encodings: Arc<dyn EncodingStore>,
    enrollment: Arc<dyn Enrollment>,
    clock: Arc<dyn Clock>,
}

impl CheckInOrchestrator {
    pub fn new(
        config: RecognitionConfig,
        matcher: Arc<dyn FaceMatcher>,
        encodings: Arc<dyn EncodingStore>,
        enrollment: Arc<dyn Enrollment>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            matcher,
            encodings,
            enrollment,
            clock,
        }
    }

    /// Process one captured frame against an active session. `frame`
    /// holds the encodings of the faces detected in the frame; detection
    /// itself happens upstream.
    pub async fn process_check_in(
        &self,
        db: &DatabaseConnection,
        session_id: i64,
        frame: &[Vec<f64>],
    ) -> Result<CheckInResult, ServiceError> {
        let session = session::find_session(db, session_id)
            .await?
            .ok_or(ServiceError::SessionNotFound(session_id))?;
        if !session.is_active() {
            return Err(ServiceError::SessionNotAcceptingCheckIns(session_id));
        }

        // Candidate set: enrolled students with a registered encoding.
        let mut candidate_ids = Vec::new();
        let mut candidate_encodings = Vec::new();
        for student_id in self.enrollment.students_of(session.group_id).await? {
            if let Some(encoding) = self.encodings.encoding_for(student_id).await? {
                candidate_ids.push(student_id);
                candidate_encodings.push(encoding);
            }
        }
        if candidate_ids.is_empty() {
            self.log_attempt(
                db,
                session_id,
                None,
                AttemptOutcome::NoRegisteredFace,
                None,
                Some("no enrolled student has a registered face"),
            )
            .await;
            return Err(ServiceError::NoRegisteredFaces(session_id));
        }

        if frame.is_empty() {
            self.log_attempt(
                db,
                session_id,
                None,
                AttemptOutcome::NoFaceDetected,
                None,
                Some("no face detected in the captured frame"),
            )
            .await;
            return Err(ServiceError::RecognitionFailure(
                "no face detected in the captured frame".into(),
            ));
        }

        let mut result = CheckInResult::default();
        // At most one transition per student per frame.
        let mut seen_students: HashSet<i64> = HashSet::new();

        for probe in frame {
            let compared = timeout(
                self.config.matcher_timeout,
                self.matcher
                    .compare(probe, &candidate_encodings, self.config.match_threshold),
            )
            .await;

            let matched = match compared {
                Err(_) => {
                    self.log_attempt(
                        db,
                        session_id,
                        None,
                        AttemptOutcome::Error,
                        None,
                        Some("matcher invocation timed out"),
                    )
                    .await;
                    return Err(ServiceError::RecognitionFailure(
                        "matcher invocation timed out".into(),
                    ));
                }
                Ok(Err(fault)) => {
                    self.log_attempt(
                        db,
                        session_id,
                        None,
                        AttemptOutcome::Error,
                        None,
                        Some(&fault.to_string()),
                    )
                    .await;
                    return Err(ServiceError::RecognitionFailure(fault.to_string()));
                }
                Ok(Ok(matched)) => matched,
            };

            let Some(m) = matched else {
                self.log_attempt(db, session_id, None, AttemptOutcome::Failed, None, None)
                    .await;
                continue;
            };

            let student_id = candidate_ids[m.index];
            let attempt = self
                .log_attempt(
                    db,
                    session_id,
                    Some(student_id),
                    AttemptOutcome::Success,
                    Some(m.distance),
                    None,
                )
                .await;

            if !seen_students.insert(student_id) {
                continue;
            }

            let record = attendance_record::Entity::find_by_id((session_id, student_id))
                .one(db)
                .await?;
            let Some(record) = record else {
                // A recognized face outside the session roster is not a
                // successful check-in.
                warn!(
                    "recognized student {} has no record in session {}",
                    student_id, session_id
                );
                if let Some(attempt) = attempt {
                    verification_log::demote_attempt(
                        db,
                        attempt.id,
                        "recognized face is not on the session roster",
                    )
                    .await?;
                }
                continue;
            };
            if record.is_resolved() {
                // Already present/late/excused; a later check-in never
                // overwrites it.
                continue;
            }

            let now = self.clock.now();
            let new_status = if session.within_grace(now) {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Late
            };

            let won =
                attendance::resolve_if_absent(db, session_id, student_id, new_status, Some(now), true)
                    .await?;
            if won {
                info!(
                    "check-in resolved student {} in session {} as {}",
                    student_id, session_id, new_status
                );
                result.resolved.push(ResolvedCheckIn {
                    student_id,
                    status: new_status,
                });
            }
        }

        Ok(result)
    }

    /// Best-effort log append. A logging fault is reported but never
    /// blocks the attendance path.
    async fn log_attempt(
        &self,
        db: &DatabaseConnection,
        session_id: i64,
        student_id: Option<i64>,
        outcome: AttemptOutcome,
        distance: Option<f64>,
        note: Option<&str>,
    ) -> Option<verification_attempt::Model> {
        if !self.config.log_attempts {
            return None;
        }
        match verification_log::record_attempt(
            db,
            NewAttempt {
                session_id,
                student_id,
                outcome,
                distance,
                note: note.map(str::to_owned),
            },
        )
        .await
        {
            Ok(model) => Some(model),
            Err(err) => {
                warn!("failed to append verification attempt: {}", err);
                None
            }
        }
    }
}

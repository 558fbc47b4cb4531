use sea_orm::DbErr;
use thiserror::Error;

/// Failure modes of the attendance core. Validation and authorization
/// variants perform no mutation; recognition variants always leave a
/// verification-log entry behind; consistency variants indicate a broken
/// precondition upstream and are never retried.
#[derive(Debug, Error)]
pub enum ServiceError {
    // validation
    #[error("student {student_id} is not enrolled in group {group_id}")]
    NotEnrolled { student_id: i64, group_id: i64 },
    #[error("an excuse already exists for student {student_id} in session {session_id}")]
    DuplicateExcuse { student_id: i64, session_id: i64 },
    #[error("attendance for student {student_id} in session {session_id} is not absent")]
    AttendanceNotAbsent { student_id: i64, session_id: i64 },
    #[error("excuse {0} has already been reviewed")]
    AlreadyReviewed(i64),

    // authorization
    #[error("user {0} does not own the session's group")]
    NotAuthorized(i64),

    // recognition (retryable; always mirrored in the verification log)
    #[error("session {0} is not accepting check-ins")]
    SessionNotAcceptingCheckIns(i64),
    #[error("no enrolled student in session {0} has a registered face encoding")]
    NoRegisteredFaces(i64),
    #[error("face recognition failed: {0}")]
    RecognitionFailure(String),

    // consistency
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error("group {0} not found")]
    GroupNotFound(i64),
    #[error("excuse {0} not found")]
    ExcuseNotFound(i64),
    #[error("attendance record not found for student {student_id} in session {session_id}")]
    RecordNotFound { student_id: i64, session_id: i64 },
    #[error("attendance records already initialized for session {0}")]
    DuplicateRecord(i64),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("encoding serialization error: {0}")]
    Encoding(#[from] serde_json::Error),
}

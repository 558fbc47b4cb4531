pub mod attendance_record;
pub mod course_group;
pub mod excuse;
pub mod face_encoding;
pub mod group_student;
pub mod session;
pub mod user;
pub mod verification_attempt;

pub use attendance_record::Entity as AttendanceRecord;
pub use course_group::Entity as CourseGroup;
pub use excuse::Entity as Excuse;
pub use face_encoding::Entity as FaceEncoding;
pub use group_student::Entity as GroupStudent;
pub use session::Entity as Session;
pub use user::Entity as User;
pub use verification_attempt::Entity as VerificationAttempt;

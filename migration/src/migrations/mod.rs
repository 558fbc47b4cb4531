pub mod m202602010001_create_users;
pub mod m202602010002_create_course_groups;
pub mod m202602010003_create_sessions;
pub mod m202602010004_create_attendance_records;
pub mod m202602010005_create_excuses;
pub mod m202602010006_create_verification_attempts;
pub mod m202602010007_create_face_encodings;

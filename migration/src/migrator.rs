use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202602010001_create_users::Migration),
            Box::new(migrations::m202602010002_create_course_groups::Migration),
            Box::new(migrations::m202602010003_create_sessions::Migration),
            Box::new(migrations::m202602010004_create_attendance_records::Migration),
            Box::new(migrations::m202602010005_create_excuses::Migration),
            Box::new(migrations::m202602010006_create_verification_attempts::Migration),
            Box::new(migrations::m202602010007_create_face_encodings::Migration),
        ]
    }
}

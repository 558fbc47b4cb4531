use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Minimal identity row. Account management and authentication live in an
/// outer collaborator; this table only anchors instructor and student
/// foreign keys.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::course_group::Entity")]
    OwnedGroups,
    #[sea_orm(has_many = "super::group_student::Entity")]
    Enrollments,
}

impl Related<super::course_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OwnedGroups.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Stored face encoding for one student, kept apart from the user row.
/// The vector is serialized as a JSON array of f64.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "face_encodings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,
    pub encoding: String,
    /// Inactive encodings are ignored by the encoding store.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Deserialize the stored JSON vector.
    pub fn vector(&self) -> Result<Vec<f64>, serde_json::Error> {
        serde_json::from_str(&self.encoding)
    }
}

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::entity::prelude::*;

/// One scheduled meeting of a course group requiring attendance.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub group_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Minutes after start during which a check-in still counts as present.
    pub grace_minutes: i32,
    /// Gates whether biometric check-in is currently accepted.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course_group::Entity",
        from = "Column::GroupId",
        to = "super::course_group::Column::Id"
    )]
    Group,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::course_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Scheduled start as an instant. Session wall times are stored in UTC.
    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }

    /// Last instant at which a check-in still counts as present.
    /// The deadline itself is inclusive.
    pub fn grace_deadline(&self) -> DateTime<Utc> {
        self.starts_at() + Duration::minutes(i64::from(self.grace_minutes.max(0)))
    }

    /// `true` when `now` is at or before the grace deadline.
    pub fn within_grace(&self, now: DateTime<Utc>) -> bool {
        now <= self.grace_deadline()
    }
}

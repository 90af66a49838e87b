use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Pending or delivered alert about issue activity. Reopening an issue
/// withdraws unsent notifications that reference it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub is_sent: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,

    #[sea_orm(has_many = "super::notification_issue::Entity")]
    NotificationIssue,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::notification_issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationIssue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

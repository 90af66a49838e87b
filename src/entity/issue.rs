use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::{EventStatus, EventType, LogLevel};

// The issues table also carries a `search_vector` tsvector column maintained
// through raw SQL. It is declared in the migration only; sea-orm has no
// mapping for tsvector, so it must never appear on this model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    #[sea_orm(column_name = "type")]
    pub r#type: EventType,
    pub status: EventStatus,
    pub level: LogLevel,
    pub title: String,
    pub culprit: Option<String>,
    pub metadata: Json,
    pub count: i32,
    pub first_seen: DateTimeUtc,
    pub last_seen: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,

    #[sea_orm(has_many = "super::issue_hash::Entity")]
    IssueHash,

    #[sea_orm(has_many = "super::issue_event::Entity")]
    IssueEvent,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::issue_hash::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssueHash.def()
    }
}

impl Related<super::issue_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssueEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

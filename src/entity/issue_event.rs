use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::{EventType, LogLevel};

/// A single stored occurrence of an issue. The primary key is the client
/// supplied event id, so redelivered batches cannot duplicate rows.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issue_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub issue_id: i32,
    #[sea_orm(column_name = "type")]
    pub r#type: EventType,
    pub level: LogLevel,
    /// When the event happened according to the client.
    pub timestamp: DateTimeUtc,
    /// When the ingest service accepted the event.
    pub received: DateTimeUtc,
    pub title: String,
    pub culprit: String,
    pub data: Json,
    pub tags: Json,
    pub release_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::issue::Entity",
        from = "Column::IssueId",
        to = "super::issue::Column::Id"
    )]
    Issue,

    #[sea_orm(
        belongs_to = "super::release::Entity",
        from = "Column::ReleaseId",
        to = "super::release::Column::Id"
    )]
    Release,
}

impl Related<super::issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issue.def()
    }
}

impl Related<super::release::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Release.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

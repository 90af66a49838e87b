use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Groups transaction events that share a name, span operation, and HTTP
/// method within a project. Unique on that whole tuple.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_groups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub transaction: String,
    pub op: String,
    pub method: Option<String>,
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

    #[sea_orm(has_many = "super::transaction_event::Entity")]
    TransactionEvent,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::transaction_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

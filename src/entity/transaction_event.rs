use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub group_id: i32,
    pub trace_id: Uuid,
    pub start_timestamp: DateTimeUtc,
    pub timestamp: DateTimeUtc,
    /// Wall time between start and finish, in milliseconds, floored at zero.
    pub duration: i32,
    pub data: Json,
    pub tags: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction_group::Entity",
        from = "Column::GroupId",
        to = "super::transaction_group::Column::Id"
    )]
    TransactionGroup,
}

impl Related<super::transaction_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionGroup.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

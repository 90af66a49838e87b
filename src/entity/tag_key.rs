use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Interned tag key. Tag aggregation stores key ids instead of repeating
/// strings in every counter row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tag_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub key: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::issue_tag::Entity")]
    IssueTag,
}

impl Related<super::issue_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssueTag.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

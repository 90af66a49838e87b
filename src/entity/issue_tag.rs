use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-day counter of how many events on an issue carried a given tag pair.
/// `date` is truncated to the start of the day before insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issue_tags")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub issue_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub date: DateTimeUtc,
    #[sea_orm(primary_key, auto_increment = false)]
    pub tag_key_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub tag_value_id: i32,
    pub count: i32,
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
        belongs_to = "super::tag_key::Entity",
        from = "Column::TagKeyId",
        to = "super::tag_key::Column::Id"
    )]
    TagKey,

    #[sea_orm(
        belongs_to = "super::tag_value::Entity",
        from = "Column::TagValueId",
        to = "super::tag_value::Column::Id"
    )]
    TagValue,
}

impl Related<super::issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issue.def()
    }
}

impl Related<super::tag_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TagKey.def()
    }
}

impl Related<super::tag_value::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TagValue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

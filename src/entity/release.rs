use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A released version of client code, unique per organization. Events point
/// at the release they were reported under.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "releases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    pub version: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrganizationId",
        to = "super::organization::Column::Id"
    )]
    Organization,

    #[sea_orm(has_many = "super::release_project::Entity")]
    ReleaseProject,

    #[sea_orm(has_many = "super::issue_event::Entity")]
    IssueEvent,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::release_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReleaseProject.def()
    }
}

impl Related<super::issue_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssueEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

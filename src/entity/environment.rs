use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Deployment environment name, unique per organization. Projects attach
/// through `environment_projects`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "environments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
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

    #[sea_orm(has_many = "super::environment_project::Entity")]
    EnvironmentProject,
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::environment_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EnvironmentProject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entity::{environment, environment_project};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(
                schema
                    .create_table_from_entity(environment::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // The insert-ignore path in ingestion depends on this constraint.
        manager
            .create_index(
                Index::create()
                    .name("ux_environment_organization_name")
                    .table(environment::Entity)
                    .col(environment::Column::OrganizationId)
                    .col(environment::Column::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(environment_project::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(environment_project::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(environment::Entity).to_owned())
            .await
    }
}

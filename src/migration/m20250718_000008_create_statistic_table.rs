use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entity::{project_event_statistic, project_transaction_statistic};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(
                schema
                    .create_table_from_entity(project_event_statistic::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(project_transaction_statistic::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(project_transaction_statistic::Entity)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(project_event_statistic::Entity).to_owned())
            .await
    }
}

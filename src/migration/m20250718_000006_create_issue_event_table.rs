use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entity::issue_event;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(
                schema
                    .create_table_from_entity(issue_event::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_issue_event_issue_received")
                    .table(issue_event::Entity)
                    .col(issue_event::Column::IssueId)
                    .col(issue_event::Column::Received)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(issue_event::Entity).to_owned())
            .await
    }
}

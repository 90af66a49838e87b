use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entity::{transaction_event, transaction_group};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(
                schema
                    .create_table_from_entity(transaction_group::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // get-or-create races on group tuples are settled by this
        // constraint; null methods compare distinct under it.
        manager
            .create_index(
                Index::create()
                    .name("ux_transaction_group_tuple")
                    .table(transaction_group::Entity)
                    .col(transaction_group::Column::ProjectId)
                    .col(transaction_group::Column::Transaction)
                    .col(transaction_group::Column::Op)
                    .col(transaction_group::Column::Method)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(transaction_event::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(transaction_event::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(transaction_group::Entity).to_owned())
            .await
    }
}

use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entity::{issue_tag, tag_key, tag_value};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(
                schema
                    .create_table_from_entity(tag_key::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(tag_value::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(issue_tag::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(issue_tag::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(tag_value::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(tag_key::Entity).to_owned())
            .await
    }
}

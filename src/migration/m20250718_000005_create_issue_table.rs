use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entity::{issue, issue_hash};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());
        manager
            .create_table(
                schema
                    .create_table_from_entity(issue::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_issue_project")
                    .table(issue::Entity)
                    .col(issue::Column::ProjectId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_issue_last_seen")
                    .table(issue::Entity)
                    .col(issue::Column::LastSeen)
                    .to_owned(),
            )
            .await?;

        // tsvector is not a sea-orm column type; the search document lives
        // outside the entity and is written with raw SQL.
        let db = manager.get_connection();
        db.execute_unprepared(r#"ALTER TABLE "issues" ADD COLUMN "search_vector" tsvector"#)
            .await?;
        db.execute_unprepared(
            r#"CREATE INDEX "ix_issue_search_vector" ON "issues" USING GIN ("search_vector")"#,
        )
        .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(issue_hash::Entity)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Concurrent workers racing a brand-new fingerprint are settled by
        // this constraint.
        manager
            .create_index(
                Index::create()
                    .name("ux_issue_hash_project_value")
                    .table(issue_hash::Entity)
                    .col(issue_hash::Column::ProjectId)
                    .col(issue_hash::Column::Value)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(issue_hash::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(issue::Entity).to_owned())
            .await
    }
}

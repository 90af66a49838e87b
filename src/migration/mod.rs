pub use sea_orm_migration::prelude::*;

mod m20250718_000001_create_organization_table;
mod m20250718_000002_create_project_table;
mod m20250718_000003_create_release_table;
mod m20250718_000004_create_environment_table;
mod m20250718_000005_create_issue_table;
mod m20250718_000006_create_issue_event_table;
mod m20250718_000007_create_tag_table;
mod m20250718_000008_create_statistic_table;
mod m20250718_000009_create_transaction_table;
mod m20250718_000010_create_notification_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250718_000001_create_organization_table::Migration),
            Box::new(m20250718_000002_create_project_table::Migration),
            Box::new(m20250718_000003_create_release_table::Migration),
            Box::new(m20250718_000004_create_environment_table::Migration),
            Box::new(m20250718_000005_create_issue_table::Migration),
            Box::new(m20250718_000006_create_issue_event_table::Migration),
            Box::new(m20250718_000007_create_tag_table::Migration),
            Box::new(m20250718_000008_create_statistic_table::Migration),
            Box::new(m20250718_000009_create_transaction_table::Migration),
            Box::new(m20250718_000010_create_notification_table::Migration),
        ]
    }
}

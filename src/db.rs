use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement, Value};
use sea_orm::ConnectOptions;
use std::time::Duration;
use tracing::{info, instrument};

use crate::configuration::DatabaseSettings;

#[instrument(skip(settings))]
pub async fn init_db(settings: &DatabaseSettings) -> anyhow::Result<DatabaseConnection> {
    info!("configuring database connection pool");

    let mut options = ConnectOptions::new(settings.url.clone());
    options
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(options).await?;
    info!("database connection established");

    Ok(db)
}

/// One row of a counter upsert: the key column values plus how much to add.
#[derive(Clone, Debug)]
pub struct CounterRow {
    pub keys: Vec<Value>,
    pub count: i64,
}

/// Builds a multi-row `INSERT ... ON CONFLICT ... DO UPDATE` that adds to a
/// `count` column keyed by `key_columns`. Callers must pass rows in a
/// consistent order (sorted by key) so concurrent workers take row locks in
/// the same order.
pub fn counter_upsert_statement(
    table: &str,
    key_columns: &[&str],
    rows: &[CounterRow],
) -> Statement {
    let mut placeholders = Vec::with_capacity(rows.len());
    let mut values: Vec<Value> = Vec::with_capacity(rows.len() * (key_columns.len() + 1));
    let mut index = 1;
    for row in rows {
        let slots: Vec<String> = (0..=key_columns.len())
            .map(|_| {
                let slot = format!("${index}");
                index += 1;
                slot
            })
            .collect();
        placeholders.push(format!("({})", slots.join(", ")));
        values.extend(row.keys.iter().cloned());
        values.push(row.count.into());
    }
    let columns = key_columns
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let conflict_target = columns.clone();
    let sql = format!(
        "INSERT INTO \"{table}\" ({columns}, \"count\") VALUES {} \
         ON CONFLICT ({conflict_target}) \
         DO UPDATE SET \"count\" = \"{table}\".\"count\" + EXCLUDED.\"count\"",
        placeholders.join(", "),
    );
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

/// Applies counter increments in bulk. No-op for an empty row set.
pub async fn bulk_add_counters<C: ConnectionTrait>(
    db: &C,
    table: &str,
    key_columns: &[&str],
    rows: &[CounterRow],
) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    db.execute(counter_upsert_statement(table, key_columns, rows))
        .await?;
    Ok(())
}

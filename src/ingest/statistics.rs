use chrono::{DateTime, Timelike, Utc};
use sea_orm::ConnectionTrait;
use std::collections::BTreeMap;

use crate::db::{bulk_add_counters, CounterRow};
use crate::error::Result;

/// Truncates to the start of the hour.
pub fn hour_floor(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}

/// Truncates to the start of the day.
pub fn day_floor(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    hour_floor(timestamp)
        .with_hour(0)
        .unwrap_or_else(|| hour_floor(timestamp))
}

/// Adds one hourly counter per accepted issue event.
pub async fn update_event_statistics<C: ConnectionTrait>(
    db: &C,
    occurrences: &[(i32, DateTime<Utc>)],
) -> Result<()> {
    let rows = hourly_rows(occurrences);
    bulk_add_counters(db, "project_event_statistics", &["project_id", "date"], &rows).await?;
    Ok(())
}

/// Same as [`update_event_statistics`] but for transaction events.
pub async fn update_transaction_statistics<C: ConnectionTrait>(
    db: &C,
    occurrences: &[(i32, DateTime<Utc>)],
) -> Result<()> {
    let rows = hourly_rows(occurrences);
    bulk_add_counters(
        db,
        "project_transaction_statistics",
        &["project_id", "date"],
        &rows,
    )
    .await?;
    Ok(())
}

// BTreeMap keys give the stable (project_id, date) ordering the upsert
// needs.
fn hourly_rows(occurrences: &[(i32, DateTime<Utc>)]) -> Vec<CounterRow> {
    let mut buckets: BTreeMap<(i32, DateTime<Utc>), i64> = BTreeMap::new();
    for (project_id, received) in occurrences {
        *buckets.entry((*project_id, hour_floor(*received))).or_default() += 1;
    }
    buckets
        .into_iter()
        .map(|((project_id, date), count)| CounterRow {
            keys: vec![project_id.into(), date.into()],
            count,
        })
        .collect()
}

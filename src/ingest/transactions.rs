use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use super::statistics::update_transaction_statistics;
use crate::entity::{transaction_event, transaction_group};
use crate::error::Result;
use crate::model::{EventPayload, InterchangeEvent};

/// Stores a batch of transaction events. Groups are created on demand and
/// cached for the batch; events without a usable trace id are dropped with a
/// warning instead of failing the batch.
#[tracing::instrument(skip_all, fields(events = events.len()))]
pub async fn process_transaction_events<C: ConnectionTrait>(
    db: &C,
    events: Vec<InterchangeEvent>,
) -> Result<()> {
    let mut group_cache: HashMap<(i32, String, String, Option<String>), i32> = HashMap::new();
    let mut rows = Vec::new();
    let mut occurrences = Vec::new();

    for event in events {
        let event_id = event.event_id;
        let EventPayload::Transaction(payload) = event.payload else {
            warn!("event {event_id} is not a transaction event, skipping");
            continue;
        };

        let trace = payload.contexts.get("trace");
        let Some(trace_id) = trace
            .and_then(|trace| trace.get("trace_id"))
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            warn!("transaction event {event_id} has no usable trace id, skipping");
            continue;
        };
        let op = trace_op(trace);
        let method = payload
            .request
            .as_ref()
            .and_then(|request| request.method.clone());

        let cache_key = (
            event.project_id,
            payload.transaction.clone(),
            op.clone(),
            method.clone(),
        );
        let group_id = match group_cache.get(&cache_key) {
            Some(id) => *id,
            None => {
                let id = get_or_create_transaction_group(
                    db,
                    event.project_id,
                    &payload.transaction,
                    &op,
                    method.as_deref(),
                )
                .await?;
                group_cache.insert(cache_key, id);
                id
            }
        };

        let tags: Map<String, Value> = payload
            .tags
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|value| (key.clone(), Value::String(value.clone())))
            })
            .collect();

        rows.push(transaction_event::ActiveModel {
            id: Set(event_id),
            group_id: Set(group_id),
            trace_id: Set(trace_id),
            start_timestamp: Set(payload.start_timestamp),
            timestamp: Set(payload.timestamp),
            duration: Set(duration_ms(payload.start_timestamp, payload.timestamp)),
            data: Set(json!({
                "request": payload.request,
                "sdk": payload.sdk,
                "platform": payload.platform,
            })),
            tags: Set(Value::Object(tags)),
            created_at: Set(event.received),
        });
        occurrences.push((event.project_id, event.received));
    }

    if !rows.is_empty() {
        transaction_event::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(transaction_event::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }
    update_transaction_statistics(db, &occurrences).await?;
    Ok(())
}

/// The span operation from the trace context, stringified. Absent and null
/// both map to the empty string, which is how ungrouped transactions share a
/// group.
fn trace_op(trace: Option<&Value>) -> String {
    match trace.and_then(|trace| trace.get("op")) {
        Some(Value::String(op)) => op.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let millis = (end - start).num_milliseconds().max(0);
    i32::try_from(millis).unwrap_or(i32::MAX)
}

async fn find_group<C: ConnectionTrait>(
    db: &C,
    project_id: i32,
    transaction: &str,
    op: &str,
    method: Option<&str>,
) -> Result<Option<i32>> {
    let mut query = transaction_group::Entity::find()
        .filter(transaction_group::Column::ProjectId.eq(project_id))
        .filter(transaction_group::Column::Transaction.eq(transaction))
        .filter(transaction_group::Column::Op.eq(op));
    query = match method {
        Some(method) => query.filter(transaction_group::Column::Method.eq(method)),
        None => query.filter(transaction_group::Column::Method.is_null()),
    };
    Ok(query.one(db).await?.map(|group| group.id))
}

/// Concurrent workers can race the same brand-new group tuple. The unique
/// index on (project_id, transaction, op, method) settles the race; the loser
/// reads the winner's row back.
async fn get_or_create_transaction_group<C: ConnectionTrait>(
    db: &C,
    project_id: i32,
    transaction: &str,
    op: &str,
    method: Option<&str>,
) -> Result<i32> {
    if let Some(id) = find_group(db, project_id, transaction, op, method).await? {
        return Ok(id);
    }
    let group = transaction_group::ActiveModel {
        project_id: Set(project_id),
        transaction: Set(transaction.to_owned()),
        op: Set(op.to_owned()),
        method: Set(method.map(str::to_owned)),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    match group.insert(db).await {
        Ok(group) => Ok(group.id),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            find_group(db, project_id, transaction, op, method)
                .await?
                .ok_or_else(|| {
                    DbErr::RecordNotFound(format!(
                        "transaction group for project {project_id} disappeared after conflict"
                    ))
                    .into()
                })
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn transaction_event(trace: Value) -> InterchangeEvent {
        let body = json!({
            "type": "transaction",
            "transaction": "GET /articles",
            "timestamp": "2025-07-01T10:30:01.500",
            "start_timestamp": "2025-07-01T10:30:00",
            "contexts": { "trace": trace },
            "request": { "method": "GET" },
        });
        serde_json::from_value(json!({
            "event_id": "e7a9c8f0a5f84f98b716c7f9c2d64e22",
            "project_id": 1,
            "organization_id": 1,
            "received": "2025-07-01T10:30:02Z",
            "payload": body,
        }))
        .unwrap()
    }

    #[test]
    fn trace_op_stringifies_loose_values() {
        let trace = json!({ "op": "http.server" });
        assert_eq!(trace_op(Some(&trace)), "http.server");
        let trace = json!({ "op": 7 });
        assert_eq!(trace_op(Some(&trace)), "7");
        let trace = json!({ "op": null });
        assert_eq!(trace_op(Some(&trace)), "");
        assert_eq!(trace_op(None), "");
    }

    #[test]
    fn duration_is_milliseconds_floored_at_zero() {
        let start = Utc.with_ymd_and_hms(2025, 7, 1, 10, 30, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(1500);
        assert_eq!(duration_ms(start, end), 1500);
        assert_eq!(duration_ms(end, start), 0);
    }

    #[tokio::test]
    async fn stores_event_and_creates_group_once() {
        let created_at = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // The group lookup misses, then the insert returns the new row.
            .append_query_results([Vec::<transaction_group::Model>::new()])
            .append_query_results([vec![transaction_group::Model {
                id: 5,
                project_id: 1,
                transaction: "GET /articles".to_owned(),
                op: "http.server".to_owned(),
                method: Some("GET".to_owned()),
                created_at,
            }]])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let trace = json!({
            "trace_id": "771aea9e04d34f5d8bf3dc1dfbde5c44",
            "op": "http.server",
        });
        let events = vec![transaction_event(trace.clone()), transaction_event(trace)];
        process_transaction_events(&db, events).await.unwrap();

        // find, insert-returning, bulk event insert, counter upsert. The
        // second event reuses the cached group.
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 4);
    }

    #[tokio::test]
    async fn missing_trace_id_skips_the_event() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let events = vec![transaction_event(json!({ "op": "http.server" }))];
        process_transaction_events(&db, events).await.unwrap();
        assert!(db.into_transaction_log().is_empty());
    }
}

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::statistics::day_floor;
use super::ProcessingEvent;
use crate::db::{bulk_add_counters, CounterRow};
use crate::entity::{tag_key, tag_value};
use crate::error::Result;

/// Interns every tag key and value seen in the batch, then bumps the per-day
/// `(issue, key, value)` counters.
pub async fn update_tags<C: ConnectionTrait>(db: &C, events: &[ProcessingEvent]) -> Result<()> {
    let mut keys: BTreeSet<&str> = BTreeSet::new();
    let mut values: BTreeSet<&str> = BTreeSet::new();
    for event in events {
        for (key, value) in &event.event_tags {
            keys.insert(key);
            values.insert(value);
        }
    }
    if keys.is_empty() {
        return Ok(());
    }

    let (key_ids, value_ids) = resolve_tag_ids(db, &keys, &values).await?;
    let rows = tag_rows(events, &key_ids, &value_ids);
    bulk_add_counters(
        db,
        "issue_tags",
        &["issue_id", "date", "tag_key_id", "tag_value_id"],
        &rows,
    )
    .await?;
    Ok(())
}

/// Insert-ignore the dictionary rows, then read ids back. Postgres cannot
/// return ids from an insert that ignored conflicts.
pub(crate) async fn resolve_tag_ids<C: ConnectionTrait>(
    db: &C,
    keys: &BTreeSet<&str>,
    values: &BTreeSet<&str>,
) -> Result<(HashMap<String, i32>, HashMap<String, i32>)> {
    if !keys.is_empty() {
        let rows: Vec<tag_key::ActiveModel> = keys
            .iter()
            .map(|key| tag_key::ActiveModel {
                key: Set((*key).to_owned()),
                ..Default::default()
            })
            .collect();
        tag_key::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(tag_key::Column::Key)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }
    if !values.is_empty() {
        let rows: Vec<tag_value::ActiveModel> = values
            .iter()
            .map(|value| tag_value::ActiveModel {
                value: Set((*value).to_owned()),
                ..Default::default()
            })
            .collect();
        tag_value::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(tag_value::Column::Value)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    let key_ids = tag_key::Entity::find()
        .filter(tag_key::Column::Key.is_in(keys.iter().map(|key| (*key).to_owned())))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.key, row.id))
        .collect();
    let value_ids = tag_value::Entity::find()
        .filter(tag_value::Column::Value.is_in(values.iter().map(|value| (*value).to_owned())))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.value, row.id))
        .collect();
    Ok((key_ids, value_ids))
}

fn tag_rows(
    events: &[ProcessingEvent],
    key_ids: &HashMap<String, i32>,
    value_ids: &HashMap<String, i32>,
) -> Vec<CounterRow> {
    let mut buckets: BTreeMap<(i32, DateTime<Utc>, i32, i32), i64> = BTreeMap::new();
    for event in events {
        let Some(issue_id) = event.issue_id else {
            continue;
        };
        let date = day_floor(event.received);
        for (key, value) in &event.event_tags {
            let (Some(key_id), Some(value_id)) = (key_ids.get(key), value_ids.get(value)) else {
                continue;
            };
            *buckets
                .entry((issue_id, date, *key_id, *value_id))
                .or_default() += 1;
        }
    }
    buckets
        .into_iter()
        .map(|((issue_id, date, key_id, value_id), count)| CounterRow {
            keys: vec![
                issue_id.into(),
                date.into(),
                key_id.into(),
                value_id.into(),
            ],
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::constants::EventType;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::Map;
    use uuid::Uuid;

    fn event(issue_id: Option<i32>, tags: &[(&str, &str)]) -> ProcessingEvent {
        let received = Utc.with_ymd_and_hms(2025, 7, 1, 10, 30, 0).unwrap();
        ProcessingEvent {
            event_id: Uuid::new_v4(),
            project_id: 1,
            event_type: EventType::Error,
            received,
            timestamp: received,
            title: "Oops".to_owned(),
            culprit: String::new(),
            metadata: Map::new(),
            event_data: Map::new(),
            event_tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            level: None,
            release_id: None,
            issue_hash: "abc".to_owned(),
            issue_id,
            issue_created: false,
        }
    }

    fn ids(pairs: &[(&str, i32)]) -> HashMap<String, i32> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn repeated_pairs_merge_into_one_counter_row() {
        let events = vec![
            event(Some(9), &[("browser.name", "Firefox")]),
            event(Some(9), &[("browser.name", "Firefox")]),
            event(Some(9), &[("browser.name", "Chrome")]),
        ];
        let key_ids = ids(&[("browser.name", 1)]);
        let value_ids = ids(&[("Firefox", 10), ("Chrome", 11)]);

        let rows = tag_rows(&events, &key_ids, &value_ids);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keys[3], 10.into());
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[1].keys[3], 11.into());
        assert_eq!(rows[1].count, 1);
    }

    #[test]
    fn events_without_an_issue_are_skipped() {
        let events = vec![event(None, &[("environment", "production")])];
        let key_ids = ids(&[("environment", 1)]);
        let value_ids = ids(&[("production", 2)]);
        assert!(tag_rows(&events, &key_ids, &value_ids).is_empty());
    }

    #[test]
    fn dates_bucket_to_the_start_of_day() {
        let events = vec![event(Some(3), &[("environment", "production")])];
        let key_ids = ids(&[("environment", 1)]);
        let value_ids = ids(&[("production", 2)]);
        let rows = tag_rows(&events, &key_ids, &value_ids);
        let expected = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(rows[0].keys[1], expected.into());
    }

    #[tokio::test]
    async fn resolve_reads_ids_back_after_insert() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .append_query_results([vec![tag_key::Model {
                id: 4,
                key: "environment".to_owned(),
            }]])
            .append_query_results([vec![
                tag_value::Model {
                    id: 7,
                    value: "production".to_owned(),
                },
                tag_value::Model {
                    id: 8,
                    value: "staging".to_owned(),
                },
            ]])
            .into_connection();

        let keys = BTreeSet::from(["environment"]);
        let values = BTreeSet::from(["production", "staging"]);
        let (key_ids, value_ids) = resolve_tag_ids(&db, &keys, &values).await.unwrap();
        assert_eq!(key_ids.get("environment"), Some(&4));
        assert_eq!(value_ids.get("production"), Some(&7));
        assert_eq!(value_ids.get("staging"), Some(&8));
    }
}

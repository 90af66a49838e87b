//! Batch ingestion pipeline for issue and transaction events.
//!
//! A batch flows strictly forward: resolve referenced releases and
//! environments, enrich each payload, fingerprint it, match or create the
//! owning issue, then fan out the aggregate writes (issue counters, stored
//! event rows, hourly statistics, tag counters). Only issue creation runs in
//! a database transaction; every other statement is idempotent on its own.

pub mod enrich;
pub mod fingerprint;
pub mod processors;
pub mod references;
pub mod statistics;
pub mod tags;
pub mod transactions;
pub mod user_agent;

pub use processors::{DebugFileProcessor, EventProcessors, SourcemapProcessor};
pub use transactions::process_transaction_events;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DbBackend, EntityTrait, QueryFilter, Set, SqlErr, Statement, TransactionTrait,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{error, warn};
use uuid::Uuid;

use crate::entity::constants::{EventStatus, EventType, LogLevel};
use crate::entity::{issue, issue_event, issue_hash, notification, notification_issue};
use crate::error::{ProcessEventError, Result};
use crate::model::event::{CspReport, IssueEventPayload};
use crate::model::{EventPayload, InterchangeEvent};

const MAX_ENVIRONMENT_NAME_LENGTH: usize = 255;

/// One issue event carried through the pipeline, from enrichment to storage.
#[derive(Clone, Debug)]
pub struct ProcessingEvent {
    pub event_id: Uuid,
    pub project_id: i32,
    pub event_type: EventType,
    pub received: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub culprit: String,
    pub metadata: Map<String, Value>,
    pub event_data: Map<String, Value>,
    pub event_tags: BTreeMap<String, String>,
    pub level: Option<LogLevel>,
    pub release_id: Option<i32>,
    pub issue_hash: String,
    pub issue_id: Option<i32>,
    pub issue_created: bool,
}

enum CreateOutcome {
    Created(i32),
    Raced { issue_id: i32, status: EventStatus },
}

struct IssueUpdate {
    added_count: i32,
    last_seen: DateTime<Utc>,
    search_text: String,
}

/// Ingests a batch of issue events for one organization.
///
/// Failure to create an issue drops that event alone; the rest of the batch
/// proceeds. Any other database error aborts the batch so the caller can
/// retry it whole, which is safe because every write is either keyed on the
/// client event id or a commutative counter add.
#[tracing::instrument(skip_all, fields(events = events.len()))]
pub async fn process_issue_events(
    db: &DatabaseConnection,
    processors: &EventProcessors,
    events: Vec<InterchangeEvent>,
) -> Result<()> {
    let mut wanted_releases: BTreeSet<(i32, i32, String)> = BTreeSet::new();
    let mut wanted_environments: BTreeSet<(i32, i32, String)> = BTreeSet::new();
    for event in &events {
        let Some(payload) = issue_payload(&event.payload) else {
            continue;
        };
        if let Some(release) = payload
            .release
            .as_deref()
            .filter(|release| !release.is_empty())
        {
            wanted_releases.insert((event.project_id, event.organization_id, release.to_owned()));
        }
        if let Some(environment) = payload
            .environment
            .as_deref()
            .filter(|environment| !environment.is_empty())
        {
            wanted_environments.insert((
                event.project_id,
                event.organization_id,
                environment_name(environment),
            ));
        }
    }
    let release_ids = references::get_or_create_releases(db, &wanted_releases).await?;
    references::get_or_create_environments(db, &wanted_environments).await?;

    let mut processing: Vec<ProcessingEvent> = Vec::with_capacity(events.len());
    for event in events {
        let event_type = event.payload.event_type();
        let Some((mut payload, csp)) = split_payload(event.payload) else {
            warn!("event {} is not an issue event, skipping", event.event_id);
            continue;
        };

        enrich::augment_contexts(&mut payload);
        let event_tags = enrich::generate_tags(&payload);
        let release_id = payload
            .release
            .as_deref()
            .filter(|release| !release.is_empty())
            .and_then(|version| {
                release_ids
                    .get(&(event.project_id, version.to_owned()))
                    .copied()
            });
        processors
            .apply(event.project_id, release_id, event_type, &mut payload)
            .await;

        let enriched = enrich::enrich_event(event_type, &payload, csp.as_ref());
        let issue_hash = fingerprint::generate_hash(
            &enriched.title,
            &enriched.culprit,
            event_type,
            payload.fingerprint.as_deref(),
        );

        processing.push(ProcessingEvent {
            event_id: event.event_id,
            project_id: event.project_id,
            event_type,
            received: event.received,
            timestamp: payload.timestamp.unwrap_or(event.received),
            title: enriched.title,
            culprit: enriched.culprit,
            metadata: enriched.metadata,
            event_data: enriched.event_data,
            event_tags,
            level: enriched.level,
            release_id,
            issue_hash,
            issue_id: None,
            issue_created: false,
        });
    }

    let pairs: BTreeSet<(i32, String)> = processing
        .iter()
        .map(|event| (event.project_id, event.issue_hash.clone()))
        .collect();
    let mut existing = fetch_issue_hashes(db, &pairs).await?;

    let mut created_in_batch: HashMap<(i32, String), i32> = HashMap::new();
    let mut reopen: BTreeSet<i32> = BTreeSet::new();
    for event in &mut processing {
        let key = (event.project_id, event.issue_hash.clone());
        if let Some((issue_id, status)) = existing.get(&key) {
            event.issue_id = Some(*issue_id);
            if *status == EventStatus::Resolved {
                reopen.insert(*issue_id);
            }
            continue;
        }
        if let Some(issue_id) = created_in_batch.get(&key) {
            event.issue_id = Some(*issue_id);
            continue;
        }
        match create_issue(db, event).await {
            Ok(CreateOutcome::Created(issue_id)) => {
                event.issue_id = Some(issue_id);
                event.issue_created = true;
                created_in_batch.insert(key, issue_id);
            }
            Ok(CreateOutcome::Raced { issue_id, status }) => {
                event.issue_id = Some(issue_id);
                if status == EventStatus::Resolved {
                    reopen.insert(issue_id);
                }
                existing.insert(key, (issue_id, status));
            }
            Err(err) => {
                error!(
                    "failed to create an issue for event {}: {err}",
                    event.event_id
                );
            }
        }
    }

    if !reopen.is_empty() {
        reopen_issues(db, &reopen).await?;
    }

    for (issue_id, update) in collect_issue_updates(&processing) {
        db.execute(issue_update_statement(issue_id, &update)).await?;
    }

    let rows: Vec<issue_event::ActiveModel> = processing
        .iter()
        .filter_map(|event| {
            let issue_id = event.issue_id?;
            let tags: Map<String, Value> = event
                .event_tags
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            Some(issue_event::ActiveModel {
                id: Set(event.event_id),
                issue_id: Set(issue_id),
                r#type: Set(event.event_type),
                level: Set(event.level.unwrap_or(LogLevel::Error)),
                timestamp: Set(event.timestamp),
                received: Set(event.received),
                title: Set(event.title.clone()),
                culprit: Set(event.culprit.clone()),
                data: Set(Value::Object(event.event_data.clone())),
                tags: Set(Value::Object(tags)),
                release_id: Set(event.release_id),
            })
        })
        .collect();
    if !rows.is_empty() {
        issue_event::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(issue_event::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    let occurrences: Vec<(i32, DateTime<Utc>)> = processing
        .iter()
        .filter(|event| event.issue_id.is_some())
        .map(|event| (event.project_id, event.received))
        .collect();
    statistics::update_event_statistics(db, &occurrences).await?;
    tags::update_tags(db, &processing).await?;
    Ok(())
}

// Environment rows cap the name column; longer names are silently cut.
fn environment_name(raw: &str) -> String {
    raw.chars().take(MAX_ENVIRONMENT_NAME_LENGTH).collect()
}

fn issue_payload(payload: &EventPayload) -> Option<&IssueEventPayload> {
    match payload {
        EventPayload::Default(payload) | EventPayload::Error(payload) => Some(payload),
        EventPayload::Csp(payload) => Some(&payload.base),
        EventPayload::Transaction(_) => None,
    }
}

fn split_payload(payload: EventPayload) -> Option<(IssueEventPayload, Option<CspReport>)> {
    match payload {
        EventPayload::Default(payload) | EventPayload::Error(payload) => Some((payload, None)),
        EventPayload::Csp(payload) => Some((payload.base, Some(payload.csp))),
        EventPayload::Transaction(_) => None,
    }
}

/// Looks up every `(project, hash)` pair in one query, joined to the owning
/// issue for its status.
async fn fetch_issue_hashes(
    db: &DatabaseConnection,
    pairs: &BTreeSet<(i32, String)>,
) -> Result<HashMap<(i32, String), (i32, EventStatus)>> {
    if pairs.is_empty() {
        return Ok(HashMap::new());
    }
    let mut condition = Condition::any();
    for (project_id, hash) in pairs {
        condition = condition.add(
            Condition::all()
                .add(issue_hash::Column::ProjectId.eq(*project_id))
                .add(issue_hash::Column::Value.eq(hash.clone())),
        );
    }
    let rows = issue_hash::Entity::find()
        .filter(condition)
        .find_also_related(issue::Entity)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(hash_row, issue_row)| {
            let status = issue_row
                .map(|issue| issue.status)
                .unwrap_or(EventStatus::Unresolved);
            (
                (hash_row.project_id, hash_row.value),
                (hash_row.issue_id, status),
            )
        })
        .collect())
}

async fn fetch_single_hash(
    db: &DatabaseConnection,
    project_id: i32,
    hash: &str,
) -> Result<Option<(i32, EventStatus)>> {
    let row = issue_hash::Entity::find()
        .filter(issue_hash::Column::ProjectId.eq(project_id))
        .filter(issue_hash::Column::Value.eq(hash))
        .find_also_related(issue::Entity)
        .one(db)
        .await?;
    Ok(row.map(|(hash_row, issue_row)| {
        let status = issue_row
            .map(|issue| issue.status)
            .unwrap_or(EventStatus::Unresolved);
        (hash_row.issue_id, status)
    }))
}

/// Creates an issue and its hash in one transaction. Two workers racing the
/// same brand-new fingerprint both land here; the unique constraint on
/// `(project_id, value)` lets exactly one commit, and the loser rolls back
/// and reads the winner's issue id.
async fn create_issue(db: &DatabaseConnection, event: &ProcessingEvent) -> Result<CreateOutcome> {
    let txn = db.begin().await?;
    let created = issue::ActiveModel {
        project_id: Set(event.project_id),
        r#type: Set(event.event_type),
        status: Set(EventStatus::Unresolved),
        level: Set(event.level.unwrap_or(LogLevel::Error)),
        title: Set(event.title.clone()),
        culprit: Set(Some(event.culprit.clone())),
        metadata: Set(Value::Object(event.metadata.clone())),
        count: Set(1),
        first_seen: Set(event.received),
        last_seen: Set(event.received),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let hash_row = issue_hash::ActiveModel {
        project_id: Set(event.project_id),
        issue_id: Set(created.id),
        value: Set(event.issue_hash.clone()),
        ..Default::default()
    };
    match hash_row.insert(&txn).await {
        Ok(_) => {
            seed_search_vector(&txn, created.id, &event.title, &event.culprit).await?;
            txn.commit().await?;
            Ok(CreateOutcome::Created(created.id))
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            txn.rollback().await?;
            let (issue_id, status) = fetch_single_hash(db, event.project_id, &event.issue_hash)
                .await?
                .ok_or_else(|| ProcessEventError::HashVanished {
                    project_id: event.project_id,
                    hash: event.issue_hash.clone(),
                })?;
            Ok(CreateOutcome::Raced { issue_id, status })
        }
        Err(err) => Err(err.into()),
    }
}

// tsvector has no sea-orm mapping, so the search document is maintained with
// raw SQL against the column the migration added.
async fn seed_search_vector<C: ConnectionTrait>(
    db: &C,
    issue_id: i32,
    title: &str,
    culprit: &str,
) -> Result<()> {
    let text = if culprit.is_empty() {
        title.to_owned()
    } else {
        format!("{title} {culprit}")
    };
    db.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"UPDATE "issues" SET "search_vector" = to_tsvector($1) WHERE "id" = $2"#,
        [text.into(), issue_id.into()],
    ))
    .await?;
    Ok(())
}

/// Marks resolved issues as unresolved again and drops their unsent
/// notifications, so regressions alert instead of staying silenced.
async fn reopen_issues(db: &DatabaseConnection, issue_ids: &BTreeSet<i32>) -> Result<()> {
    let ids: Vec<i32> = issue_ids.iter().copied().collect();
    issue::Entity::update_many()
        .col_expr(
            issue::Column::Status,
            Expr::value(EventStatus::Unresolved.to_value()),
        )
        .filter(issue::Column::Id.is_in(ids.clone()))
        .exec(db)
        .await?;

    let pending = Query::select()
        .column(notification_issue::Column::NotificationId)
        .from(notification_issue::Entity)
        .and_where(notification_issue::Column::IssueId.is_in(ids))
        .to_owned();
    notification::Entity::delete_many()
        .filter(notification::Column::IsSent.eq(false))
        .filter(notification::Column::Id.in_subquery(pending))
        .exec(db)
        .await?;
    Ok(())
}

/// Folds every event that joined an existing issue into one update per
/// issue: how many events were added, the newest receipt time, and the text
/// appended to the search document. Events that created their issue already
/// carry their text in the creation transaction.
fn collect_issue_updates(events: &[ProcessingEvent]) -> BTreeMap<i32, IssueUpdate> {
    let mut updates: BTreeMap<i32, IssueUpdate> = BTreeMap::new();
    for event in events {
        if event.issue_created {
            continue;
        }
        let Some(issue_id) = event.issue_id else {
            continue;
        };
        let entry = updates.entry(issue_id).or_insert_with(|| IssueUpdate {
            added_count: 0,
            last_seen: event.received,
            search_text: String::new(),
        });
        entry.added_count += 1;
        entry.last_seen = entry.last_seen.max(event.received);
        if !entry.search_text.is_empty() {
            entry.search_text.push(' ');
        }
        entry.search_text.push_str(&event.title);
        if !event.culprit.is_empty() {
            entry.search_text.push(' ');
            entry.search_text.push_str(&event.culprit);
        }
    }
    updates
}

fn issue_update_statement(issue_id: i32, update: &IssueUpdate) -> Statement {
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"UPDATE "issues" SET "count" = "count" + $1, "last_seen" = GREATEST("last_seen", $2), "search_vector" = COALESCE("search_vector", '') || to_tsvector($3) WHERE "id" = $4"#,
        [
            update.added_count.into(),
            update.last_seen.into(),
            update.search_text.clone().into(),
            issue_id.into(),
        ],
    )
}

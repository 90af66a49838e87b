use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::collections::{BTreeSet, HashMap};

use crate::entity::{environment, environment_project, release, release_project};
use crate::error::Result;

/// Ensures a release row exists for every `(project_id, organization_id,
/// version)` wanted, and links it to the project. Races with other workers
/// are absorbed by insert-ignore plus a re-read.
///
/// Returns a `(project_id, version)` to release id map for event assignment.
pub async fn get_or_create_releases<C: ConnectionTrait>(
    db: &C,
    wanted: &BTreeSet<(i32, i32, String)>,
) -> Result<HashMap<(i32, String), i32>> {
    if wanted.is_empty() {
        return Ok(HashMap::new());
    }
    let pairs: BTreeSet<(i32, String)> = wanted
        .iter()
        .map(|(_, organization_id, version)| (*organization_id, version.clone()))
        .collect();

    let mut by_org = fetch_releases(db, &pairs).await?;

    let missing: Vec<release::ActiveModel> = pairs
        .iter()
        .filter(|key| !by_org.contains_key(*key))
        .map(|(organization_id, version)| release::ActiveModel {
            organization_id: Set(*organization_id),
            version: Set(version.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        })
        .collect();
    if !missing.is_empty() {
        release::Entity::insert_many(missing)
            .on_conflict(
                OnConflict::columns([release::Column::OrganizationId, release::Column::Version])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        by_org = fetch_releases(db, &pairs).await?;
    }

    let links: Vec<release_project::ActiveModel> = wanted
        .iter()
        .filter_map(|(project_id, organization_id, version)| {
            by_org
                .get(&(*organization_id, version.clone()))
                .map(|release_id| release_project::ActiveModel {
                    release_id: Set(*release_id),
                    project_id: Set(*project_id),
                })
        })
        .collect();
    if !links.is_empty() {
        release_project::Entity::insert_many(links)
            .on_conflict(
                OnConflict::columns([
                    release_project::Column::ReleaseId,
                    release_project::Column::ProjectId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    Ok(wanted
        .iter()
        .filter_map(|(project_id, organization_id, version)| {
            by_org
                .get(&(*organization_id, version.clone()))
                .map(|release_id| ((*project_id, version.clone()), *release_id))
        })
        .collect())
}

/// Ensures environment rows exist and are linked to their projects. Nothing
/// downstream needs the ids, so none are returned.
pub async fn get_or_create_environments<C: ConnectionTrait>(
    db: &C,
    wanted: &BTreeSet<(i32, i32, String)>,
) -> Result<()> {
    if wanted.is_empty() {
        return Ok(());
    }
    let pairs: BTreeSet<(i32, String)> = wanted
        .iter()
        .map(|(_, organization_id, name)| (*organization_id, name.clone()))
        .collect();

    let mut by_org = fetch_environments(db, &pairs).await?;

    let missing: Vec<environment::ActiveModel> = pairs
        .iter()
        .filter(|key| !by_org.contains_key(*key))
        .map(|(organization_id, name)| environment::ActiveModel {
            organization_id: Set(*organization_id),
            name: Set(name.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        })
        .collect();
    if !missing.is_empty() {
        environment::Entity::insert_many(missing)
            .on_conflict(
                OnConflict::columns([
                    environment::Column::OrganizationId,
                    environment::Column::Name,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        by_org = fetch_environments(db, &pairs).await?;
    }

    let links: Vec<environment_project::ActiveModel> = wanted
        .iter()
        .filter_map(|(project_id, organization_id, name)| {
            by_org
                .get(&(*organization_id, name.clone()))
                .map(|environment_id| environment_project::ActiveModel {
                    environment_id: Set(*environment_id),
                    project_id: Set(*project_id),
                    is_hidden: Set(false),
                })
        })
        .collect();
    if !links.is_empty() {
        environment_project::Entity::insert_many(links)
            .on_conflict(
                OnConflict::columns([
                    environment_project::Column::EnvironmentId,
                    environment_project::Column::ProjectId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }
    Ok(())
}

async fn fetch_releases<C: ConnectionTrait>(
    db: &C,
    pairs: &BTreeSet<(i32, String)>,
) -> Result<HashMap<(i32, String), i32>> {
    let mut condition = Condition::any();
    for (organization_id, version) in pairs {
        condition = condition.add(
            Condition::all()
                .add(release::Column::OrganizationId.eq(*organization_id))
                .add(release::Column::Version.eq(version.clone())),
        );
    }
    let rows = release::Entity::find().filter(condition).all(db).await?;
    Ok(rows
        .into_iter()
        .map(|row| ((row.organization_id, row.version), row.id))
        .collect())
}

async fn fetch_environments<C: ConnectionTrait>(
    db: &C,
    pairs: &BTreeSet<(i32, String)>,
) -> Result<HashMap<(i32, String), i32>> {
    let mut condition = Condition::any();
    for (organization_id, name) in pairs {
        condition = condition.add(
            Condition::all()
                .add(environment::Column::OrganizationId.eq(*organization_id))
                .add(environment::Column::Name.eq(name.clone())),
        );
    }
    let rows = environment::Entity::find().filter(condition).all(db).await?;
    Ok(rows
        .into_iter()
        .map(|row| ((row.organization_id, row.name), row.id))
        .collect())
}

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::operations::{
    count_commits_per_branch, find_most_active_contributor, get_average_merge_time, get_commits,
    get_events, get_pull_requests, insert_commit, insert_event, insert_pull_request,
};
use super::{BranchCommitCount, ContributorCommitCount, MergeTimeAggregate};
use crate::event::{
    Commit, EventPayload, NewWebhookEvent, PullRequest, WebhookEvent, PULL_REQUEST_EVENT,
    PUSH_EVENT,
};
use crate::utils::timing::measure_db_query;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Provides access to the event store using sqlx operations.
#[derive(Clone)]
pub struct DbClient {
    pool: SqlitePool,
}

impl DbClient {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to the SQLite database at `url`.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL {url}"))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Cannot connect to database {url}"))?;
        Ok(Self::new(pool))
    }

    /// Applies all migrations that were not applied yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("Cannot apply database migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Stores a new event, together with its commits or pull request, in a single transaction.
    /// Events without a creation time are stamped with the current time.
    ///
    /// Saving the same event twice stores two distinct events. The returned event carries
    /// timestamps at the precision of the store, so it equals the one loaded later.
    pub async fn save(&self, event: NewWebhookEvent) -> anyhow::Result<WebhookEvent> {
        let NewWebhookEvent {
            payload,
            created_at,
        } = event;
        if let EventPayload::Other { event_type } = &payload {
            if event_type == PUSH_EVENT || event_type == PULL_REQUEST_EVENT {
                anyhow::bail!("Event type {event_type} cannot be stored without its details");
            }
        }
        let payload = trim_payload(payload);
        let created_at = trim_to_millis(created_at.unwrap_or_else(Utc::now));

        let id = measure_db_query("save_event", || async {
            let mut tx = self.pool.begin().await?;
            let id =
                insert_event(&mut *tx, payload.event_type(), payload.branch(), created_at).await?;
            match &payload {
                EventPayload::Push { commits, .. } => {
                    for (position, commit) in commits.iter().enumerate() {
                        insert_commit(&mut *tx, id, position as i64, commit).await?;
                    }
                }
                EventPayload::PullRequest { pull_request, .. } => {
                    insert_pull_request(&mut *tx, id, pull_request).await?;
                }
                EventPayload::Other { .. } => {}
            }
            tx.commit().await?;
            Ok::<_, anyhow::Error>(id)
        })
        .await?;

        Ok(WebhookEvent {
            id,
            payload,
            created_at,
        })
    }

    /// Returns all stored events, newest first.
    pub async fn list_recent(&self) -> anyhow::Result<Vec<WebhookEvent>> {
        measure_db_query("list_recent_events", || async {
            let events = get_events(&self.pool).await?;
            let mut commits = get_commits(&self.pool)
                .await?
                .into_iter()
                .into_group_map_by(|commit| commit.event_id);
            let mut pull_requests: HashMap<_, _> = get_pull_requests(&self.pool)
                .await?
                .into_iter()
                .map(|pr| (pr.event_id, pr))
                .collect();

            events
                .into_iter()
                .map(|event| {
                    let commits = commits.remove(&event.id).unwrap_or_default();
                    let pull_request = pull_requests.remove(&event.id);
                    event.into_event(commits, pull_request)
                })
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await
    }

    /// Counts commits of push events created at `since` or later, grouped by branch.
    /// Branches with the most commits come first.
    pub async fn commits_per_branch(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BranchCommitCount>> {
        measure_db_query("commits_per_branch", || {
            count_commits_per_branch(&self.pool, since)
        })
        .await
    }

    /// Finds the author with the most commits in push events created at `since` or later.
    /// Authors with the same number of commits are ordered by name.
    pub async fn most_active_contributor(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Option<ContributorCommitCount>> {
        measure_db_query("most_active_contributor", || {
            find_most_active_contributor(&self.pool, since)
        })
        .await
    }

    pub async fn average_merge_time_ms(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<MergeTimeAggregate> {
        measure_db_query("average_merge_time", || {
            get_average_merge_time(&self.pool, since)
        })
        .await
    }
}

/// The store keeps millisecond precision.
fn trim_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}

fn trim_payload(payload: EventPayload) -> EventPayload {
    match payload {
        EventPayload::Push { branch, commits } => EventPayload::Push {
            branch,
            commits: commits
                .into_iter()
                .map(|commit| Commit {
                    timestamp: trim_to_millis(commit.timestamp),
                    ..commit
                })
                .collect(),
        },
        EventPayload::PullRequest {
            branch,
            pull_request,
        } => EventPayload::PullRequest {
            branch,
            pull_request: PullRequest {
                created_at: trim_to_millis(pull_request.created_at),
                merged_at: pull_request.merged_at.map(trim_to_millis),
                ..pull_request
            },
        },
        other @ EventPayload::Other { .. } => other,
    }
}

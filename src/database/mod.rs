//! Provides access to the event store.
//!
//! Events are append-only. Timestamps are stored as milliseconds since the Unix epoch, so that
//! time windows and merge durations can be computed by the database.
use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::event::{Commit, EventPayload, PullRequest, WebhookEvent, PULL_REQUEST_EVENT, PUSH_EVENT};

pub use client::DbClient;

mod client;
mod operations;

/// Primary key of a stored event.
pub type PrimaryKey = i64;

/// Number of commits pushed to a branch.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BranchCommitCount {
    pub branch: String,
    pub commit_count: i64,
}

/// Number of commits written by a single author.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ContributorCommitCount {
    pub author: String,
    pub commit_count: i64,
}

/// Raw merge time statistics of merged pull requests.
/// `average_ms` is `None` when no merged pull request matched.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MergeTimeAggregate {
    pub average_ms: Option<f64>,
    pub merged_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: PrimaryKey,
    event_type: String,
    branch_name: Option<String>,
    created_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommitRow {
    event_id: PrimaryKey,
    message: String,
    author: String,
    timestamp: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PullRequestRow {
    event_id: PrimaryKey,
    title: String,
    author: String,
    status: String,
    created_at: i64,
    merged_at: Option<i64>,
}

fn from_millis(millis: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("Timestamp {millis} is out of range"))
}

impl EventRow {
    /// Reassembles a stored event from its rows.
    fn into_event(
        self,
        commits: Vec<CommitRow>,
        pull_request: Option<PullRequestRow>,
    ) -> anyhow::Result<WebhookEvent> {
        let EventRow {
            id,
            event_type,
            branch_name,
            created_at,
        } = self;

        let payload = match event_type.as_str() {
            PUSH_EVENT => EventPayload::Push {
                branch: branch_name.with_context(|| format!("Push event {id} has no branch"))?,
                commits: commits
                    .into_iter()
                    .map(|commit| {
                        Ok(Commit {
                            message: commit.message,
                            author: commit.author,
                            timestamp: from_millis(commit.timestamp)?,
                        })
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?,
            },
            PULL_REQUEST_EVENT => {
                let pr = pull_request
                    .with_context(|| format!("Pull request event {id} has no pull request"))?;
                EventPayload::PullRequest {
                    branch: branch_name
                        .with_context(|| format!("Pull request event {id} has no branch"))?,
                    pull_request: PullRequest {
                        title: pr.title,
                        author: pr.author,
                        status: pr.status,
                        created_at: from_millis(pr.created_at)?,
                        merged_at: pr.merged_at.map(from_millis).transpose()?,
                    },
                }
            }
            _ => EventPayload::Other { event_type },
        };

        Ok(WebhookEvent {
            id,
            payload,
            created_at: from_millis(created_at)?,
        })
    }
}

//! Decoding of GitHub webhook payloads into [`NewWebhookEvent`]s.
//!
//! Only the fields that are stored are decoded. Missing optional data is filled in by the
//! normalization policy functions below ([`default_author`], [`commit_timestamp_or`]).
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::event::{
    Commit, EventPayload, NewWebhookEvent, PullRequest, PULL_REQUEST_EVENT, PUSH_EVENT,
};

/// Commits without author information are attributed to this name.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Deserialize, Debug)]
struct WebhookPush {
    #[serde(rename = "ref")]
    git_ref: String,
    commits: Vec<WebhookCommit>,
}

#[derive(Deserialize, Debug)]
struct WebhookCommit {
    message: String,
    author: Option<WebhookCommitAuthor>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
struct WebhookCommitAuthor {
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WebhookPullRequestEvent {
    pull_request: WebhookPullRequest,
}

#[derive(Deserialize, Debug)]
struct WebhookPullRequest {
    title: String,
    user: WebhookUser,
    state: String,
    head: WebhookHead,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
struct WebhookUser {
    login: String,
}

#[derive(Deserialize, Debug)]
struct WebhookHead {
    #[serde(rename = "ref")]
    git_ref: String,
}

/// Normalizes the JSON `body` of a webhook of the given `event_type`.
///
/// `received_at` is the ingestion time, used for commits that do not carry a timestamp.
/// Unknown event types are accepted and produce [`EventPayload::Other`], but their body still
/// has to be valid JSON.
pub fn normalize_event(
    event_type: &str,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<NewWebhookEvent, serde_json::Error> {
    let payload = match event_type {
        PUSH_EVENT => {
            let push: WebhookPush = serde_json::from_slice(body)?;
            EventPayload::Push {
                branch: branch_from_ref(&push.git_ref).to_string(),
                commits: push
                    .commits
                    .into_iter()
                    .map(|commit| Commit {
                        message: commit.message,
                        author: default_author(commit.author),
                        timestamp: commit_timestamp_or(commit.timestamp, received_at),
                    })
                    .collect(),
            }
        }
        PULL_REQUEST_EVENT => {
            let event: WebhookPullRequestEvent = serde_json::from_slice(body)?;
            let pr = event.pull_request;
            EventPayload::PullRequest {
                branch: pr.head.git_ref,
                pull_request: PullRequest {
                    title: pr.title,
                    author: pr.user.login,
                    status: pr.state,
                    created_at: pr.created_at,
                    merged_at: pr.merged_at,
                },
            }
        }
        _ => {
            serde_json::from_slice::<IgnoredAny>(body)?;
            tracing::debug!("Storing event {event_type} without details");
            EventPayload::Other {
                event_type: event_type.to_string(),
            }
        }
    };
    Ok(NewWebhookEvent::new(payload))
}

/// Strips the `refs/<kind>/` prefix from a git reference.
/// `refs/heads/feature/x` becomes `feature/x`, references without the prefix are kept.
fn branch_from_ref(git_ref: &str) -> &str {
    git_ref
        .strip_prefix("refs/")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, name)| name)
        .unwrap_or(git_ref)
}

/// Commits without an author (or without an author name) get [`UNKNOWN_AUTHOR`].
fn default_author(author: Option<WebhookCommitAuthor>) -> String {
    author
        .and_then(|author| author.name)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

/// Commits without a timestamp are stamped with the ingestion time.
fn commit_timestamp_or(
    timestamp: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
) -> DateTime<Utc> {
    timestamp.unwrap_or(received_at)
}

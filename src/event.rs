use chrono::{DateTime, Utc};

use crate::database::PrimaryKey;

pub const PUSH_EVENT: &str = "push";
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// A normalized GitHub webhook notification.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// Commits were pushed to a branch.
    Push { branch: String, commits: Vec<Commit> },
    /// A pull request was opened, closed, merged or otherwise changed.
    PullRequest {
        branch: String,
        pull_request: PullRequest,
    },
    /// Any other event delivered by GitHub. Only its name is kept.
    Other { event_type: String },
}

impl EventPayload {
    /// Name of the event, as sent by GitHub in the `x-github-event` header.
    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::Push { .. } => PUSH_EVENT,
            EventPayload::PullRequest { .. } => PULL_REQUEST_EVENT,
            EventPayload::Other { event_type } => event_type,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            EventPayload::Push { branch, .. } | EventPayload::PullRequest { branch, .. } => {
                Some(branch)
            }
            EventPayload::Other { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PullRequest {
    pub title: String,
    pub author: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
}

/// An event that was not persisted yet.
/// If `created_at` is missing, the store assigns the time of insertion.
#[derive(Clone, Debug, PartialEq)]
pub struct NewWebhookEvent {
    pub payload: EventPayload,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewWebhookEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            created_at: None,
        }
    }
}

/// An event loaded from (or just written to) the event store.
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookEvent {
    pub id: PrimaryKey,
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

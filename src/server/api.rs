//! JSON API consumed by the dashboard and other clients.
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AppError, ServerStateRef, Window};
use crate::analytics::{self, MergeTimeSummary};
use crate::database::PrimaryKey;
use crate::event::{Commit, EventPayload, PullRequest, WebhookEvent};

pub(super) fn create_api_router() -> Router<ServerStateRef> {
    Router::new()
        .route("/webhook/events", get(list_events_handler))
        .route(
            "/analytics/commits-per-branch",
            get(commits_per_branch_handler),
        )
        .route(
            "/analytics/most-active-contributor",
            get(most_active_contributor_handler),
        )
        .route(
            "/analytics/average-merge-time",
            get(average_merge_time_handler),
        )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    id: PrimaryKey,
    event_type: String,
    branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_messages: Option<Vec<CommitResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pull_request: Option<PullRequestResponse>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CommitResponse {
    message: String,
    author: String,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestResponse {
    title: String,
    author: String,
    status: String,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

impl From<WebhookEvent> for EventResponse {
    fn from(event: WebhookEvent) -> Self {
        let WebhookEvent {
            id,
            payload,
            created_at,
        } = event;
        let event_type = payload.event_type().to_string();
        let branch_name = payload.branch().map(ToString::to_string);
        let (commit_messages, pull_request) = match payload {
            EventPayload::Push { commits, .. } => (
                Some(
                    commits
                        .into_iter()
                        .map(|Commit { message, author, timestamp }| CommitResponse {
                            message,
                            author,
                            timestamp,
                        })
                        .collect(),
                ),
                None,
            ),
            EventPayload::PullRequest { pull_request, .. } => {
                let PullRequest {
                    title,
                    author,
                    status,
                    created_at,
                    merged_at,
                } = pull_request;
                (
                    None,
                    Some(PullRequestResponse {
                        title,
                        author,
                        status,
                        created_at,
                        merged_at,
                    }),
                )
            }
            EventPayload::Other { .. } => (None, None),
        };
        Self {
            id,
            event_type,
            branch_name,
            commit_messages,
            pull_request,
            created_at,
        }
    }
}

/// Either a value, or an explanation why there is none.
#[derive(Serialize)]
#[serde(untagged)]
enum OrMessage<T> {
    Value(T),
    Message { message: &'static str },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BranchCommitsResponse {
    branch: String,
    commit_count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContributorResponse {
    author: String,
    commit_count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeTimeResponse {
    average_merge_time_in_hours: String,
    merged_pull_requests: i64,
}

async fn list_events_handler(
    State(state): State<ServerStateRef>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state.db().list_recent().await?;
    Ok(Json(events.into_iter().map(EventResponse::from).collect()))
}

async fn commits_per_branch_handler(
    State(state): State<ServerStateRef>,
    window: Window,
) -> Result<Json<Vec<BranchCommitsResponse>>, AppError> {
    let counts = analytics::commits_per_branch(state.db(), window.window).await?;
    Ok(Json(
        counts
            .into_iter()
            .map(|count| BranchCommitsResponse {
                branch: count.branch,
                commit_count: count.commit_count,
            })
            .collect(),
    ))
}

async fn most_active_contributor_handler(
    State(state): State<ServerStateRef>,
    window: Window,
) -> Result<Json<OrMessage<ContributorResponse>>, AppError> {
    let contributor = analytics::most_active_contributor(state.db(), window.window).await?;
    Ok(Json(match contributor {
        Some(contributor) => OrMessage::Value(ContributorResponse {
            author: contributor.author,
            commit_count: contributor.commit_count,
        }),
        None => OrMessage::Message {
            message: "No contributors found",
        },
    }))
}

async fn average_merge_time_handler(
    State(state): State<ServerStateRef>,
    window: Window,
) -> Result<Json<OrMessage<MergeTimeResponse>>, AppError> {
    let summary = analytics::average_merge_time(state.db(), window.window).await?;
    let response = match summary {
        MergeTimeSummary::Average {
            hours,
            merged_count,
        } => OrMessage::Value(MergeTimeResponse {
            average_merge_time_in_hours: format!("{hours:.2}"),
            merged_pull_requests: merged_count,
        }),
        MergeTimeSummary::NoData => OrMessage::Message {
            message: "No merged pull requests found",
        },
    };
    Ok(Json(response))
}

use askama::Template;
use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;

use crate::analytics::AnalyticsSummary;
use crate::event::{EventPayload, WebhookEvent};
use crate::utils::text::format_count;

pub struct HtmlTemplate<T>(pub T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(error) => {
                let message = format!("Failed to render template: {error:?}");
                tracing::error!("{message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub events: Vec<EventView>,
    pub window_days: u32,
    pub commits_per_branch: Vec<BranchView>,
    pub most_active_contributor: Option<ContributorView>,
    pub average_merge_time: Option<String>,
}

impl DashboardTemplate {
    pub fn new(events: Vec<WebhookEvent>, summary: AnalyticsSummary, window_days: u32) -> Self {
        Self {
            events: events.into_iter().map(EventView::from).collect(),
            window_days,
            commits_per_branch: summary
                .commits_per_branch
                .into_iter()
                .map(|count| BranchView {
                    branch: count.branch,
                    commits: format_count(count.commit_count, "commit"),
                })
                .collect(),
            most_active_contributor: summary.most_active_contributor.map(|contributor| {
                ContributorView {
                    author: contributor.author,
                    commits: format_count(contributor.commit_count, "commit"),
                }
            }),
            average_merge_time: summary.merge_time.formatted_hours(),
        }
    }
}

/// A row of the events table.
pub struct EventView {
    pub event_type: String,
    pub branch: String,
    /// `<message> by <author>` for every pushed commit.
    pub commits: Vec<String>,
    pub pull_request: Option<PullRequestView>,
    pub created_at: String,
}

pub struct PullRequestView {
    pub title: String,
    pub author: String,
    pub status: String,
    pub is_open: bool,
}

pub struct BranchView {
    pub branch: String,
    pub commits: String,
}

pub struct ContributorView {
    pub author: String,
    pub commits: String,
}

impl From<WebhookEvent> for EventView {
    fn from(event: WebhookEvent) -> Self {
        let event_type = event.payload.event_type().to_string();
        let branch = event.payload.branch().unwrap_or("N/A").to_string();
        let created_at = event.created_at.format("%Y-%m-%d %H:%M UTC").to_string();
        let (commits, pull_request) = match event.payload {
            EventPayload::Push { commits, .. } => (
                commits
                    .into_iter()
                    .map(|commit| format!("{} by {}", commit.message, commit.author))
                    .collect(),
                None,
            ),
            EventPayload::PullRequest { pull_request, .. } => (
                vec![],
                Some(PullRequestView {
                    is_open: pull_request.is_open(),
                    title: pull_request.title,
                    author: pull_request.author,
                    status: pull_request.status,
                }),
            ),
            EventPayload::Other { .. } => (vec![], None),
        };
        Self {
            event_type,
            branch,
            commits,
            pull_request,
            created_at,
        }
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {}

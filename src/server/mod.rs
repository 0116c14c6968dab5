use std::any::Any;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::analytics::{self, AnalyticsWindow};
use crate::config::AppConfig;
use crate::database::DbClient;
use crate::github::{GitHubWebhook, WebhookError, WebhookSecret};
use crate::templates::{DashboardTemplate, HtmlTemplate, NotFoundTemplate};

pub use api::EventResponse;
pub use error::AppError;

mod api;
mod error;

/// Shared server state for all axum handlers.
pub struct ServerState {
    db: DbClient,
    webhook_secret: Option<WebhookSecret>,
    config: AppConfig,
}

impl ServerState {
    /// Without a `webhook_secret`, every webhook is answered with a server error.
    pub fn new(db: DbClient, webhook_secret: Option<WebhookSecret>, config: AppConfig) -> Self {
        Self {
            db,
            webhook_secret,
            config,
        }
    }

    pub fn db(&self) -> &DbClient {
        &self.db
    }

    pub fn webhook_secret(&self) -> Option<&WebhookSecret> {
        self.webhook_secret.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

pub type ServerStateRef = Arc<ServerState>;

pub fn create_app(state: ServerState) -> Router {
    let router = Router::new()
        .route("/", get(dashboard_handler))
        .route("/health", get(health_handler))
        .route("/webhook/github", post(github_webhook_handler))
        .nest("/api", api::create_api_router())
        .fallback(not_found_handler);
    add_middleware(router).with_state(Arc::new(state))
}

/// Request tracing, the concurrency limit and panic recovery, shared by all routes.
fn add_middleware(router: Router<ServerStateRef>) -> Router<ServerStateRef> {
    router
        .layer(ConcurrencyLimitLayer::new(100))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Router panicked: {err:?}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, HtmlTemplate(NotFoundTemplate {}))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "")
}

#[derive(serde::Deserialize)]
struct WindowParams {
    days: Option<u32>,
}

/// Time window of an analytics request.
/// Read from the `days` query parameter, falling back to the configured default.
pub struct Window {
    pub days: u32,
    pub window: AnalyticsWindow,
}

#[async_trait]
impl FromRequestParts<ServerStateRef> for Window {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerStateRef,
    ) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<WindowParams>::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let days = params.days.unwrap_or(state.config().analytics.window_days);
        if days == 0 {
            return Err((
                StatusCode::BAD_REQUEST,
                "The days parameter has to be at least 1",
            )
                .into_response());
        }
        Ok(Window {
            days,
            window: AnalyticsWindow::last_days(days, Utc::now()),
        })
    }
}

async fn dashboard_handler(
    State(state): State<ServerStateRef>,
    window: Window,
) -> Result<impl IntoResponse, AppError> {
    let (events, summary) = tokio::try_join!(
        state.db().list_recent(),
        analytics::summarize(state.db(), window.window)
    )?;
    Ok(HtmlTemplate(DashboardTemplate::new(
        events,
        summary,
        window.days,
    )))
}

/// Axum handler that stores an authenticated webhook event and returns it.
pub async fn github_webhook_handler(
    State(state): State<ServerStateRef>,
    GitHubWebhook(event): GitHubWebhook,
) -> Result<Json<EventResponse>, WebhookError> {
    let event = state
        .db()
        .save(event)
        .await
        .map_err(WebhookError::PersistenceFailure)?;
    tracing::info!(
        "Stored {} event {}",
        event.payload.event_type(),
        event.id
    );
    Ok(Json(EventResponse::from(event)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use chrono::{Duration, Utc};
    use tower::ServiceExt;

    use super::{add_middleware, EventResponse};
    use crate::config::AppConfig;
    use crate::tests::{
        create_test_app, create_test_state, create_webhook_request, load_test_file,
        pull_request_event, push_event, TestApp,
    };

    #[tokio::test]
    async fn health() {
        let app = create_test_app().await;
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn not_found() {
        let app = create_test_app().await;
        let (status, body) = app.get("/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Page not found"));
    }

    #[tokio::test]
    async fn store_push_webhook() {
        let app = create_test_app().await;
        let body = load_test_file("webhook/push.json");
        let (status, response) = app.send(create_webhook_request("push", &body)).await;
        assert_eq!(status, StatusCode::OK);

        let response: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["eventType"], "push");
        assert_eq!(response["branchName"], "main");
        assert_eq!(response["commitMessages"][0]["message"], "Update README");
        assert_eq!(response["commitMessages"][0]["author"], "Jane Doe");
        assert_eq!(
            response["commitMessages"][0]["timestamp"],
            "2024-05-02T12:12:45Z"
        );
        assert!(response.get("pullRequest").is_none());

        let events = app.db().list_recent().await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn store_pull_request_webhook() {
        let app = create_test_app().await;
        let body = load_test_file("webhook/pull-request-closed.json");
        let (status, response) = app
            .send(create_webhook_request("pull_request", &body))
            .await;
        assert_eq!(status, StatusCode::OK);

        let response: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["eventType"], "pull_request");
        assert_eq!(response["branchName"], "feature/login");
        assert_eq!(response["pullRequest"]["title"], "Add login page");
        assert_eq!(response["pullRequest"]["author"], "octocat");
        assert_eq!(response["pullRequest"]["status"], "closed");
        assert_eq!(response["pullRequest"]["mergedAt"], "2024-05-01T10:00:00Z");
        assert!(response.get("commitMessages").is_none());
    }

    #[tokio::test]
    async fn store_other_webhook() {
        let app = create_test_app().await;
        let body = load_test_file("webhook/ping.json");
        let (status, response) = app.send(create_webhook_request("ping", &body)).await;
        assert_eq!(status, StatusCode::OK);

        let response: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["eventType"], "ping");
        assert!(response["branchName"].is_null());
    }

    #[tokio::test]
    async fn replayed_webhook_is_stored_twice() {
        let app = create_test_app().await;
        let body = load_test_file("webhook/push.json");
        for _ in 0..2 {
            let (status, _) = app.send(create_webhook_request("push", &body)).await;
            assert_eq!(status, StatusCode::OK);
        }
        let events = app.db().list_recent().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_ne!(events[0].id, events[1].id);
    }

    #[tokio::test]
    async fn webhook_without_signature() {
        let app = create_test_app().await;
        let request = Request::post("/webhook/github")
            .header("x-github-event", "push")
            .body(Body::from(load_test_file("webhook/push.json")))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        insta::assert_snapshot!(body, @"Missing x-hub-signature-256 header");
        assert!(app.db().list_recent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_with_wrong_signature() {
        let app = create_test_app().await;
        let mut request = create_webhook_request("push", &load_test_file("webhook/push.json"));
        request.headers_mut().insert(
            "x-hub-signature-256",
            "sha256=0000000000000000000000000000000000000000000000000000000000000000"
                .parse()
                .unwrap(),
        );
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        insta::assert_snapshot!(body, @"Invalid signature");
        assert!(app.db().list_recent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_without_configured_secret() {
        let app = TestApp::without_secret().await;
        let body = load_test_file("webhook/push.json");
        let (status, body) = app.send(create_webhook_request("push", &body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        insta::assert_snapshot!(body, @"Webhook secret is not configured");
    }

    #[tokio::test]
    async fn webhook_with_malformed_json() {
        let app = create_test_app().await;
        let (status, _) = app
            .send(create_webhook_request("push", "{\"ref\": \"refs/heads/main\""))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_when_store_fails() {
        let app = create_test_app().await;
        app.db().close().await;
        let body = load_test_file("webhook/push.json");
        let (status, body) = app.send(create_webhook_request("push", &body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        insta::assert_snapshot!(body, @"Cannot store webhook event");
    }

    #[tokio::test]
    async fn webhook_response_matches_stored_event() {
        let app = create_test_app().await;
        let body = serde_json::json!({
            "ref": "refs/heads/main",
            "commits": [{"message": "No timestamp", "author": {"name": "Jane"}}]
        })
        .to_string();
        let (status, response) = app.send(create_webhook_request("push", &body)).await;
        assert_eq!(status, StatusCode::OK);

        let response: serde_json::Value = serde_json::from_str(&response).unwrap();
        let stored = app.db().list_recent().await.unwrap().remove(0);
        let stored = serde_json::to_value(EventResponse::from(stored)).unwrap();
        assert_eq!(response, stored);
    }

    #[tokio::test]
    async fn webhook_body_over_limit() {
        let mut config = AppConfig::default();
        config.webhook.max_body_size = 64;
        let app = TestApp::with_config(config).await;
        let body = load_test_file("webhook/push.json");
        assert!(body.len() > 64);

        let (status, body) = app.send(create_webhook_request("push", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        insta::assert_snapshot!(body, @"Request body is too large or unreadable");
        assert!(app.db().list_recent().await.unwrap().is_empty());
    }

    async fn panicking_handler() -> &'static str {
        panic!("Handler failed");
    }

    #[tokio::test]
    async fn handler_panic_is_internal_error() {
        let router = Router::new().route("/panic", get(panicking_handler));
        let app = add_middleware(router).with_state(create_test_state(None).await);

        let response = app
            .oneshot(Request::get("/panic").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        insta::assert_snapshot!(String::from_utf8(body.to_vec()).unwrap(), @"Internal server error");
    }

    #[tokio::test]
    async fn list_events_newest_first() {
        let app = create_test_app().await;
        let now = Utc::now();
        app.db()
            .save(
                push_event("older")
                    .commit("Old", "Jane")
                    .created_at(now - Duration::days(2))
                    .create(),
            )
            .await
            .unwrap();
        app.db()
            .save(
                push_event("newer")
                    .commit("New", "Jane")
                    .created_at(now - Duration::days(1))
                    .create(),
            )
            .await
            .unwrap();

        let (status, body) = app.get("/api/webhook/events").await;
        assert_eq!(status, StatusCode::OK);
        let events: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(events[0]["branchName"], "newer");
        assert_eq!(events[1]["branchName"], "older");
    }

    #[tokio::test]
    async fn commits_per_branch() {
        let app = create_test_app().await;
        let now = Utc::now();
        app.db()
            .save(push_event("branchA").commits(3, "Jane").create())
            .await
            .unwrap();
        app.db()
            .save(push_event("branchB").commits(1, "John").create())
            .await
            .unwrap();
        app.db()
            .save(
                push_event("branchC")
                    .commits(5, "Jane")
                    .created_at(now - Duration::days(8))
                    .create(),
            )
            .await
            .unwrap();

        let (status, body) = app.get("/api/analytics/commits-per-branch").await;
        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"[{"branch":"branchA","commitCount":3},{"branch":"branchB","commitCount":1}]"#);

        let (_, body) = app.get("/api/analytics/commits-per-branch?days=30").await;
        insta::assert_snapshot!(body, @r#"[{"branch":"branchC","commitCount":5},{"branch":"branchA","commitCount":3},{"branch":"branchB","commitCount":1}]"#);
    }

    #[tokio::test]
    async fn analytics_reject_empty_window() {
        let app = create_test_app().await;
        let (status, _) = app.get("/api/analytics/commits-per-branch?days=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.get("/api/analytics/commits-per-branch?days=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn most_active_contributor() {
        let app = create_test_app().await;
        app.db()
            .save(
                push_event("main")
                    .commits(2, "Jane")
                    .commits(1, "John")
                    .create(),
            )
            .await
            .unwrap();
        let (status, body) = app.get("/api/analytics/most-active-contributor").await;
        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"author":"Jane","commitCount":2}"#);
    }

    #[tokio::test]
    async fn most_active_contributor_without_data() {
        let app = create_test_app().await;
        let (status, body) = app.get("/api/analytics/most-active-contributor").await;
        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"message":"No contributors found"}"#);
    }

    #[tokio::test]
    async fn average_merge_time() {
        let app = create_test_app().await;
        app.db()
            .save(pull_request_event("feature", Some(Duration::hours(2))).create())
            .await
            .unwrap();
        app.db()
            .save(pull_request_event("open", None).create())
            .await
            .unwrap();
        let (status, body) = app.get("/api/analytics/average-merge-time").await;
        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"averageMergeTimeInHours":"2.00","mergedPullRequests":1}"#);
    }

    #[tokio::test]
    async fn average_merge_time_without_data() {
        let app = create_test_app().await;
        let (status, body) = app.get("/api/analytics/average-merge-time").await;
        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"message":"No merged pull requests found"}"#);
    }

    #[tokio::test]
    async fn dashboard() {
        let app = create_test_app().await;
        app.db()
            .save(
                push_event("main")
                    .commit("Update README", "Jane")
                    .create(),
            )
            .await
            .unwrap();
        app.db()
            .save(pull_request_event("feature", Some(Duration::hours(2))).create())
            .await
            .unwrap();

        let (status, body) = app.get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("GitHub Webhook Dashboard"));
        assert!(body.contains("Update README by Jane"));
        assert!(body.contains("Commits Per Branch (Last 7 Days)"));
        assert!(body.contains("Jane: 1 commit"));
        assert!(body.contains("2.00 hours"));
    }

    #[tokio::test]
    async fn empty_dashboard() {
        let app = create_test_app().await;
        let (status, body) = app.get("/?days=14").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No webhook events received yet."));
        assert!(body.contains("Commits Per Branch (Last 14 Days)"));
        assert!(body.contains("No contributors found."));
        assert!(body.contains("No merged pull requests found."));
    }
}

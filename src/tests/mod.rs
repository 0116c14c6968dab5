use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::AppConfig;
use crate::database::DbClient;
use crate::github::WebhookSecret;
use crate::server::{ServerState, ServerStateRef};


pub use app::{create_test_app, TestApp};
pub use event::{other_event, pull_request_event, push_event};
pub use io::load_test_file;
pub use webhook::{create_webhook_request, sign_body, TEST_WEBHOOK_SECRET};

/// Creates a migrated in-memory database.
///
/// The pool holds a single connection that is never recycled, otherwise the in-memory
/// database would be lost.
pub async fn create_test_db() -> DbClient {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    let db = DbClient::new(pool);
    db.migrate().await.unwrap();
    db
}

pub async fn create_test_state(webhook_secret: Option<WebhookSecret>) -> ServerStateRef {
    Arc::new(ServerState::new(
        create_test_db().await,
        webhook_secret,
        AppConfig::default(),
    ))
}

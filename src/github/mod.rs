//! Receiving GitHub webhooks: authentication of the raw request and decoding of its payload.
pub mod payload;
pub mod webhook;

pub use webhook::{GitHubWebhook, WebhookError, WebhookSecret};

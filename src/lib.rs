//! Receives GitHub webhooks, stores them and computes repository activity analytics.
pub mod analytics;
pub mod config;
pub mod database;
pub mod event;
pub mod github;
pub mod server;
pub mod templates;
pub mod utils;

pub use config::AppConfig;
pub use database::DbClient;
pub use github::WebhookSecret;
pub use server::{create_app, ServerState};

#[cfg(test)]
mod tests;

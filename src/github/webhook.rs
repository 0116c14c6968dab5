use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::event::NewWebhookEvent;
use crate::github::payload::normalize_event;
use crate::server::ServerStateRef;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

/// Reasons why an incoming webhook was not stored.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing x-hub-signature-256 header")]
    MissingSignature,
    #[error("Missing request body")]
    MissingBody,
    /// The body exceeds the configured size limit or could not be read.
    #[error("Request body is too large or unreadable")]
    UnreadableBody,
    #[error("Missing x-github-event header")]
    MissingEventType,
    #[error("Webhook secret is not configured")]
    ServerMisconfigured,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("Cannot store webhook event")]
    PersistenceFailure(anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::MissingBody
            | WebhookError::UnreadableBody
            | WebhookError::MissingEventType
            | WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::ServerMisconfigured | WebhookError::PersistenceFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Webhook processing failed: {self:?}");
        } else {
            tracing::warn!("Webhook rejected: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

/// axum extractor for GitHub webhook events.
///
/// The raw body is authenticated before it is parsed: the signature is computed over the exact
/// bytes GitHub sent.
#[derive(Debug)]
pub struct GitHubWebhook(pub NewWebhookEvent);

#[async_trait]
impl FromRequest<ServerStateRef> for GitHubWebhook {
    type Rejection = WebhookError;

    async fn from_request(
        request: Request,
        state: &ServerStateRef,
    ) -> Result<Self, Self::Rejection> {
        let (parts, body) = request.into_parts();

        let Some(signature) = parts.headers.get(SIGNATURE_HEADER) else {
            return Err(WebhookError::MissingSignature);
        };

        // Eagerly load body
        let body = axum::body::to_bytes(body, state.config().webhook.max_body_size)
            .await
            .map_err(|error| {
                tracing::warn!("Reading webhook body failed: {error:?}");
                WebhookError::UnreadableBody
            })?;
        if body.is_empty() {
            return Err(WebhookError::MissingBody);
        }

        let Some(secret) = state.webhook_secret() else {
            return Err(WebhookError::ServerMisconfigured);
        };
        verify_gh_signature(signature.as_bytes(), &body, secret)?;

        let Some(event_type) = parts
            .headers
            .get(EVENT_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return Err(WebhookError::MissingEventType);
        };

        let event = normalize_event(event_type, &body, Utc::now())
            .map_err(WebhookError::MalformedPayload)?;
        Ok(GitHubWebhook(event))
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Verifies that `body` is properly signed by GitHub with SHA-256 and the passed `secret`.
/// `signature` is the value of the `x-hub-signature-256` header (`sha256=<hex digest>`).
pub fn verify_gh_signature(
    signature: &[u8],
    body: &[u8],
    secret: &WebhookSecret,
) -> Result<(), WebhookError> {
    let Some(signature) = signature
        .strip_prefix(b"sha256=")
        .and_then(|digest| hex::decode(digest).ok())
    else {
        return Err(WebhookError::InvalidSignature);
    };

    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .map_err(|_| WebhookError::ServerMisconfigured)?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Wrapper for a secret which is zeroed on drop and can be exposed only through the [`WebhookSecret::expose`] method.
pub struct WebhookSecret(SecretString);

impl WebhookSecret {
    pub fn new(secret: String) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret().as_str()
    }
}

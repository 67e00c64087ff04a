//! Workspace service implementations for Quill.
//!
//! This crate provides the concrete `UpdateService` implementation for the
//! three Google Workspace editing services (Docs, Sheets, Slides). Each
//! service accepts a batch-update request body via its `:batchUpdate`
//! endpoint and either returns normally on acceptance or raises a
//! `ServiceError` carrying the service's own error text, which the
//! generation-execution engine feeds back into the next corrective turn.

use async_trait::async_trait;
use quill_abstraction::{ServiceError, UpdateService};
use reqwest::Client;
use tracing::{debug, error};

/// The three Workspace editing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Google Docs (documents).
    Docs,
    /// Google Sheets (spreadsheets).
    Sheets,
    /// Google Slides (presentations).
    Slides,
}

impl ServiceKind {
    /// Returns the human-readable service name used in instructions and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ServiceKind::Docs => "Docs",
            ServiceKind::Sheets => "Sheets",
            ServiceKind::Slides => "Slides",
        }
    }

    /// Returns the default API base URL for this service.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            ServiceKind::Docs => "https://docs.googleapis.com",
            ServiceKind::Sheets => "https://sheets.googleapis.com",
            ServiceKind::Slides => "https://slides.googleapis.com",
        }
    }

    /// Returns the batchUpdate endpoint path for the given resource.
    fn batch_update_path(self, resource_id: &str) -> String {
        match self {
            ServiceKind::Docs => format!("/v1/documents/{}:batchUpdate", resource_id),
            ServiceKind::Sheets => format!("/v4/spreadsheets/{}:batchUpdate", resource_id),
            ServiceKind::Slides => format!("/v1/presentations/{}:batchUpdate", resource_id),
        }
    }
}

/// `UpdateService` implementation backed by a Workspace REST endpoint.
pub struct WorkspaceService {
    /// Which Workspace service this client targets.
    kind: ServiceKind,
    /// OAuth bearer token for authentication.
    access_token: String,
    /// The base URL for the service API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl WorkspaceService {
    /// Creates a new `WorkspaceService` for the given kind and bearer token.
    #[must_use]
    pub fn new(kind: ServiceKind, access_token: String) -> Self {
        Self {
            kind,
            access_token,
            base_url: kind.default_base_url().to_string(),
            client: Client::new(),
        }
    }

    /// Overrides the API base URL. Intended for tests against a local server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl UpdateService for WorkspaceService {
    async fn batch_update(
        &self,
        body: &serde_json::Value,
        resource_id: &str,
    ) -> Result<(), ServiceError> {
        let url = format!("{}{}", self.base_url, self.kind.batch_update_path(resource_id));

        debug!(
            service = self.kind.name(),
            resource_id = %resource_id,
            "Submitting batchUpdate request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, service = self.kind.name(), "Failed to send batchUpdate request");
                ServiceError::RequestError(format!("Network error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                service = self.kind.name(),
                error = %error_text,
                "Workspace service rejected batchUpdate"
            );
            return Err(map_http_error(status, &error_text));
        }

        debug!(service = self.kind.name(), "batchUpdate accepted");
        Ok(())
    }

    fn service_name(&self) -> &str {
        self.kind.name()
    }
}

/// Maps HTTP status codes from a Workspace service to `ServiceError` variants.
///
/// The response body is preserved as the error text: the engine embeds it
/// verbatim into the next corrective turn.
fn map_http_error(status: reqwest::StatusCode, error_text: &str) -> ServiceError {
    match status.as_u16() {
        401 | 403 => {
            ServiceError::AuthError(format!("Authentication failed ({}): {}", status, error_text))
        }
        429 => ServiceError::QuotaExceeded(error_text.to_string()),
        400..=499 => ServiceError::Rejected(error_text.to_string()),
        500..=599 => {
            ServiceError::ServerError(format!("Server error ({}): {}", status, error_text))
        }
        _ => ServiceError::RequestError(format!("Unexpected status ({}): {}", status, error_text)),
    }
}

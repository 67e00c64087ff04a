//! Gemini File API implementation.
//!
//! This module uploads reference attachments to the Gemini File API so they
//! can be referenced from generation requests. Uploads are in-memory byte
//! buffers (attachments are fetched from URLs, never persisted to disk), and
//! the client polls until the file is ACTIVE before handing it back.

use chrono::{DateTime, Utc};
use quill_abstraction::{Attachment, GeneratorError};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// File state as returned by the Gemini File API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// File is being processed by Gemini.
    Processing,
    /// File is ready to use.
    Active,
    /// File processing failed.
    Failed,
}

/// Represents a file uploaded to the Gemini File API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFile {
    /// File name/ID in format "files/{file-id}".
    pub name: String,
    /// Full URI for accessing the file.
    pub uri: String,
    /// Current state of the file.
    pub state: FileState,
    /// Expiration time (48 hours from creation).
    #[serde(rename = "expire_time", deserialize_with = "deserialize_datetime")]
    pub expire_time: DateTime<Utc>,
    /// Optional display name for the file.
    #[serde(rename = "display_name", default)]
    pub display_name: Option<String>,
    /// MIME type of the file.
    #[serde(rename = "mime_type")]
    pub mime_type: String,
}

/// Helper function to deserialize datetime string to DateTime<Utc>.
fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map_err(|e| serde::de::Error::custom(format!("Failed to parse datetime: {}", e)))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Client for interacting with the Gemini File API.
pub struct GeminiFileApi {
    /// API key for authentication.
    api_key: String,
    /// HTTP client for making requests.
    http_client: Client,
    /// Base URL for the File API.
    base_url: String,
    /// Base URL for the upload endpoint.
    upload_base_url: String,
}

impl GeminiFileApi {
    /// Creates a new `GeminiFileApi` instance with the given API key.
    #[must_use]
    pub fn with_api_key(api_key: String) -> Self {
        Self {
            api_key,
            http_client: Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            upload_base_url: "https://generativelanguage.googleapis.com/upload/v1beta".to_string(),
        }
    }

    /// Overrides both API base URLs. Intended for tests against a local server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.clone();
        self.upload_base_url = base_url;
        self
    }

    /// Uploads an attachment to the Gemini File API and waits until it is
    /// ready to be referenced from generation requests.
    ///
    /// # Errors
    /// Returns `GeneratorError` if the attachment cannot be uploaded or
    /// processed.
    pub async fn upload_attachment(
        &self,
        attachment: &Attachment,
    ) -> Result<GeminiFile, GeneratorError> {
        debug!(
            display_name = %attachment.display_name,
            mime_type = %attachment.mime_type,
            size = attachment.bytes.len(),
            "Uploading attachment to Gemini File API"
        );

        let form = Form::new()
            .part(
                "file",
                Part::bytes(attachment.bytes.clone())
                    .file_name(attachment.display_name.clone())
                    .mime_str(&attachment.mime_type)
                    .map_err(|e| {
                        GeneratorError::RequestError(format!("Failed to set MIME type: {}", e))
                    })?,
            )
            .text("display_name", attachment.display_name.clone());

        let upload_url = format!("{}/files?key={}", self.upload_base_url, self.api_key);

        let response = self
            .http_client
            .post(&upload_url)
            .header("X-Goog-Upload-Protocol", "multipart")
            .multipart(form)
            .send()
            .await
            .map_err(|e| GeneratorError::RequestError(format!("Failed to upload file: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_http_error(status, &error_text, "file upload"));
        }

        let file: GeminiFile = response.json().await.map_err(|e| {
            GeneratorError::SerializationError(format!("Failed to parse upload response: {}", e))
        })?;

        debug!(file_name = %file.name, state = ?file.state, "File uploaded successfully");

        if file.state == FileState::Processing {
            self.poll_until_active(&file.name).await
        } else {
            Ok(file)
        }
    }

    /// Retrieves file metadata by name/ID.
    ///
    /// # Errors
    /// Returns `GeneratorError` if the file cannot be retrieved.
    pub async fn get_file(&self, file_name: &str) -> Result<GeminiFile, GeneratorError> {
        debug!(file_name = %file_name, "Retrieving file metadata");

        let url = format!("{}/{}?key={}", self.base_url, file_name, self.api_key);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeneratorError::RequestError(format!("Failed to retrieve file: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_http_error(status, &error_text, "retrieve file"));
        }

        let file: GeminiFile = response.json().await.map_err(|e| {
            GeneratorError::SerializationError(format!("Failed to parse file response: {}", e))
        })?;

        Ok(file)
    }

    /// Polls file state until it becomes ACTIVE or fails.
    ///
    /// Uses exponential backoff: 1s → 2s → 4s → 8s → 10s (cap).
    /// Times out after 5 minutes.
    async fn poll_until_active(&self, file_name: &str) -> Result<GeminiFile, GeneratorError> {
        debug!(file_name = %file_name, "Starting state polling");

        let start_time = Instant::now();
        let timeout = Duration::from_secs(300);
        let mut delay = Duration::from_secs(1);
        let max_delay = Duration::from_secs(10);

        loop {
            if start_time.elapsed() > timeout {
                return Err(GeneratorError::RequestError(format!(
                    "File processing timeout after 5 minutes: {}",
                    file_name
                )));
            }

            let file = self.get_file(file_name).await?;

            match file.state {
                FileState::Active => {
                    debug!(file_name = %file_name, "File is now ACTIVE");
                    return Ok(file);
                }
                FileState::Failed => {
                    return Err(GeneratorError::ResponseError(format!(
                        "File processing failed: {}",
                        file_name
                    )));
                }
                FileState::Processing => {
                    debug!(
                        file_name = %file_name,
                        elapsed = ?start_time.elapsed(),
                        "File still processing, waiting..."
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
        }
    }
}

/// Maps HTTP status codes from the File API to `GeneratorError` variants.
fn map_http_error(
    status: reqwest::StatusCode,
    error_text: &str,
    operation: &str,
) -> GeneratorError {
    match status.as_u16() {
        401 | 403 => GeneratorError::AuthError(format!(
            "Authentication failed for {}: {}",
            operation, error_text
        )),
        429 => GeneratorError::QuotaExceeded(format!(
            "Rate limit exceeded for {}: {}",
            operation, error_text
        )),
        413 => GeneratorError::RequestError(format!(
            "File too large for {}: {}",
            operation, error_text
        )),
        500..=599 => GeneratorError::ResponseError(format!(
            "Server error for {} ({}): {}",
            operation, status, error_text
        )),
        _ => GeneratorError::RequestError(format!(
            "Unexpected error for {} ({}): {}",
            operation, status, error_text
        )),
    }
}

//! Capability abstractions for Quill.
//!
//! This crate defines the two narrow interfaces the generation-execution
//! engine depends on: a text generator that turns a conversation turn into
//! candidate content, and an update service that accepts a batch-update
//! request body. Concrete implementations live in `quill-models` and
//! `quill-services`; the engine is tested against deterministic fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when calling the text generator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorError {
    /// An error occurred during the API request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The generator returned an error or an unusable response.
    #[error("Generator Response Error: {0}")]
    ResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// Authentication with the generator failed.
    #[error("Authentication Error: {0}")]
    AuthError(String),

    /// Provider quota exceeded or rate limit hit.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// Represents an error raised by a Workspace update service on submission.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
    /// The request never reached the service (network or transport failure).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The service rejected the submitted request body.
    #[error("Rejected by service: {0}")]
    Rejected(String),

    /// Authentication with the service failed.
    #[error("Authentication Error: {0}")]
    AuthError(String),

    /// Service quota exceeded or rate limit hit.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The service reported an internal error.
    #[error("Server Error: {0}")]
    ServerError(String),
}

/// A single message sent to the generator on one attempt.
///
/// Each turn is self-contained: the engine never resends prior turns. Any
/// conversation history a generator keeps across calls is its own concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The role of the message sender (e.g., "user").
    pub role: String,
    /// The text of the message.
    pub text: String,
}

impl ConversationTurn {
    /// Creates a user-role turn with the given text.
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: "user".to_string(), text: text.into() }
    }
}

/// One piece of content inside a response candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentPart {
    /// Plain text content.
    Text(String),
    /// A reference to a file held by the generator's file store.
    File {
        /// MIME type of the referenced file.
        mime_type: String,
        /// URI of the referenced file.
        file_uri: String,
    },
}

/// One candidate produced by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCandidate {
    /// Ordered content parts of this candidate.
    pub parts: Vec<ContentPart>,
}

/// The response from one generator call: an ordered sequence of candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    /// Ordered candidates; the first is the preferred one.
    pub candidates: Vec<ResponseCandidate>,
    /// Optional: the ID of the model that produced the response.
    pub model_id: Option<String>,
}

impl GeneratedResponse {
    /// Returns the first text part of the first candidate, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates.first()?.parts.iter().find_map(|part| match part {
            ContentPart::Text(text) => Some(text.as_str()),
            ContentPart::File { .. } => None,
        })
    }
}

/// A named binary blob fetched from a reference URL.
///
/// Attachments live for a single generation run and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Raw content bytes.
    pub bytes: Vec<u8>,
    /// Declared media type of the content.
    pub mime_type: String,
    /// Display name, conventionally the originating URL.
    pub display_name: String,
}

/// A text generator bound to a fixed system instruction and response mode.
///
/// Implementations must be `Send + Sync` to allow use behind trait objects.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Sends one conversation turn and returns the candidate content.
    ///
    /// # Errors
    /// Returns a `GeneratorError` if the call fails.
    async fn generate(&self, turn: &ConversationTurn) -> Result<GeneratedResponse, GeneratorError>;
}

/// A Workspace editing service that accepts batch-update request bodies.
#[async_trait]
pub trait UpdateService: Send + Sync {
    /// Submits a batch-update request body against the given resource.
    ///
    /// Returns `Ok(())` on acceptance; no response value is consumed.
    ///
    /// # Errors
    /// Returns a `ServiceError` if the service rejects the body or the
    /// request cannot be delivered.
    async fn batch_update(
        &self,
        body: &serde_json::Value,
        resource_id: &str,
    ) -> Result<(), ServiceError>;

    /// Returns the human-readable name of the service (e.g., "Docs").
    fn service_name(&self) -> &str;
}

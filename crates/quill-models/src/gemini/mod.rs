//! Google Gemini generator implementation.
//!
//! This module provides an implementation of the `Generator` trait backed by
//! the Gemini `generateContent` API. The generator is bound at construction
//! time to a system instruction, a response MIME type, and an optional set of
//! previously uploaded files; each call sends one new conversation turn. The
//! generator keeps its own chat history across calls so that corrective turns
//! are seen in context.

pub mod file_api;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use quill_abstraction::{
    ContentPart, ConversationTurn, GeneratedResponse, Generator, GeneratorError, ResponseCandidate,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::gemini::file_api::GeminiFile;

/// A reference to a file held by the Gemini File API, attached to every turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// URI of the uploaded file.
    pub file_uri: String,
    /// MIME type of the uploaded file.
    pub mime_type: String,
}

impl From<&GeminiFile> for FileReference {
    fn from(file: &GeminiFile) -> Self {
        FileReference { file_uri: file.uri.clone(), mime_type: file.mime_type.clone() }
    }
}

/// Gemini-backed implementation of the `Generator` trait.
pub struct GeminiGenerator {
    /// The model ID (e.g., "gemini-1.5-pro").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
    /// System instruction fixed for the lifetime of this generator.
    system_instruction: Option<String>,
    /// Response MIME type requested from the model.
    response_mime_type: Option<String>,
    /// Files attached to every conversation turn.
    files: Vec<FileReference>,
    /// Conversation history accumulated across calls.
    history: Mutex<Vec<GeminiContent>>,
}

impl GeminiGenerator {
    /// Creates a new `GeminiGenerator` with the given model ID and API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self {
            model_id,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            client: Client::new(),
            system_instruction: None,
            response_mime_type: None,
            files: Vec::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Sets the system instruction sent with every request.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: String) -> Self {
        self.system_instruction = Some(instruction);
        self
    }

    /// Requests strictly machine-parseable JSON output from the model.
    #[must_use]
    pub fn with_json_response(mut self) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self
    }

    /// Attaches previously uploaded files to every conversation turn.
    #[must_use]
    pub fn with_files(mut self, files: Vec<FileReference>) -> Self {
        self.files = files;
        self
    }

    /// Overrides the API base URL. Intended for tests against a local server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Builds the content entry for one outgoing turn: attached files first,
    /// then the turn text.
    fn to_gemini_content(&self, turn: &ConversationTurn) -> GeminiContent {
        let mut parts: Vec<GeminiPart> = self
            .files
            .iter()
            .map(|file| GeminiPart::FileData {
                file_data: GeminiFileData {
                    mime_type: file.mime_type.clone(),
                    file_uri: file.file_uri.clone(),
                },
            })
            .collect();
        parts.push(GeminiPart::Text { text: turn.text.clone() });
        GeminiContent { role: turn.role.clone(), parts }
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, turn: &ConversationTurn) -> Result<GeneratedResponse, GeneratorError> {
        debug!(
            model_id = %self.model_id,
            turn_len = turn.text.len(),
            "GeminiGenerator sending conversation turn"
        );

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model_id, self.api_key
        );

        let user_content = self.to_gemini_content(turn);

        // Snapshot the history so the lock is not held across the request.
        let mut contents =
            self.history.lock().unwrap_or_else(PoisonError::into_inner).clone();
        contents.push(user_content.clone());

        let request_body = GeminiRequest {
            contents,
            generation_config: self.response_mime_type.clone().map(|mime_type| {
                GeminiGenerationConfig { response_mime_type: Some(mime_type) }
            }),
            system_instruction: self.system_instruction.clone().map(|text| {
                GeminiSystemInstruction { parts: vec![GeminiPart::Text { text }] }
            }),
        };

        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to Gemini API");
            GeneratorError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API returned error status");
            return Err(map_http_error(status, &error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini API response");
            GeneratorError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        // Record the exchange so corrective turns are seen in context.
        if let Some(candidate) = gemini_response.candidates.first() {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push(user_content);
            history.push(candidate.content.clone());
        }

        let candidates = gemini_response
            .candidates
            .into_iter()
            .map(|candidate| ResponseCandidate {
                parts: candidate.content.parts.into_iter().map(ContentPart::from).collect(),
            })
            .collect();

        Ok(GeneratedResponse { candidates, model_id: Some(self.model_id.clone()) })
    }
}

/// Maps HTTP status codes from the Gemini API to `GeneratorError` variants.
fn map_http_error(status: reqwest::StatusCode, error_text: &str) -> GeneratorError {
    match status.as_u16() {
        401 | 403 => GeneratorError::AuthError(format!(
            "Authentication failed ({}): {}",
            status, error_text
        )),
        402 | 429 => GeneratorError::QuotaExceeded(error_text.to_string()),
        500..=599 => {
            GeneratorError::ResponseError(format!("Server error ({}): {}", status, error_text))
        }
        _ => GeneratorError::ResponseError(format!("API error ({}): {}", status, error_text)),
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "systemInstruction")]
    system_instruction: Option<GeminiSystemInstruction>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "file_data")]
        file_data: GeminiFileData,
    },
}

impl From<GeminiPart> for ContentPart {
    fn from(part: GeminiPart) -> Self {
        match part {
            GeminiPart::Text { text } => ContentPart::Text(text),
            GeminiPart::FileData { file_data } => ContentPart::File {
                mime_type: file_data.mime_type,
                file_uri: file_data.file_uri,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFileData {
    #[serde(rename = "mime_type")]
    mime_type: String,
    #[serde(rename = "file_uri")]
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_with_system_instruction() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart::Text { text: "Insert sample text".to_string() }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                response_mime_type: Some("application/json".to_string()),
            }),
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: "You are an expert in creating request bodies.".to_string(),
                }],
            }),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("systemInstruction"));
        assert!(json.contains("responseMimeType"));
        assert!(json.contains("application/json"));
        assert!(json.contains("Insert sample text"));
    }

    #[test]
    fn test_request_serialization_omits_unset_fields() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart::Text { text: "Hello".to_string() }],
            }],
            generation_config: None,
            system_instruction: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("systemInstruction"));
        assert!(!json.contains("generationConfig"));
    }

    #[test]
    fn test_turn_content_places_files_before_text() {
        let generator =
            GeminiGenerator::with_api_key("gemini-1.5-pro".to_string(), "test-key".to_string())
                .with_files(vec![FileReference {
                    file_uri: "files/abc123".to_string(),
                    mime_type: "application/pdf".to_string(),
                }]);

        let content = generator.to_gemini_content(&ConversationTurn::user("Insert a table"));
        assert_eq!(content.role, "user");
        assert_eq!(content.parts.len(), 2);
        assert!(matches!(content.parts[0], GeminiPart::FileData { .. }));
        assert!(matches!(content.parts[1], GeminiPart::Text { .. }));
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"requests\":[]}"}]}}]}"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.candidates.len(), 1);
        assert_eq!(response.candidates[0].content.parts.len(), 1);
    }

    #[test]
    fn test_part_conversion() {
        let part = GeminiPart::FileData {
            file_data: GeminiFileData {
                mime_type: "application/pdf".to_string(),
                file_uri: "files/abc".to_string(),
            },
        };
        let converted = ContentPart::from(part);
        assert_eq!(
            converted,
            ContentPart::File {
                mime_type: "application/pdf".to_string(),
                file_uri: "files/abc".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_generate_against_mock_server() {
        use mockito::Server;

        let mut server = Server::new_async().await;
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"requests\":[{\"insertText\":{}}]}"}]}}]}"#;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(mockito::Matcher::UrlEncoded("key".to_string(), "test-key".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let generator =
            GeminiGenerator::with_api_key("test-model".to_string(), "test-key".to_string())
                .with_base_url(server.url())
                .with_json_response();

        let response =
            generator.generate(&ConversationTurn::user("Insert sample text")).await.unwrap();
        assert_eq!(response.first_text(), Some("{\"requests\":[{\"insertText\":{}}]}"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_keeps_history_across_calls() {
        use mockito::Server;

        let mut server = Server::new_async().await;
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"ok"}]}}]}"#;
        let _mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(2)
            .create_async()
            .await;

        let generator =
            GeminiGenerator::with_api_key("test-model".to_string(), "test-key".to_string())
                .with_base_url(server.url());

        generator.generate(&ConversationTurn::user("first")).await.unwrap();
        generator.generate(&ConversationTurn::user("second")).await.unwrap();

        let history = generator.history.lock().unwrap();
        // Two user turns and two model replies.
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "model");
    }

    #[tokio::test]
    async fn test_generate_maps_auth_error() {
        use mockito::Server;

        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_body("API key not valid")
            .create_async()
            .await;

        let generator =
            GeminiGenerator::with_api_key("test-model".to_string(), "bad-key".to_string())
                .with_base_url(server.url());

        let err = generator.generate(&ConversationTurn::user("hello")).await.unwrap_err();
        assert!(matches!(err, GeneratorError::AuthError(_)));
    }
}

//! Quill orchestrator: natural-language batch updates for Google Workspace.
//!
//! The entry point is [`generate_request_body`]. Given a prompt, a schema
//! contract, and a resource selector, it resolves the target Workspace
//! service, binds a Gemini generator to a system instruction derived from
//! the service and schema, optionally stages reference URLs as uploaded
//! files, and then drives the generation-execution loop until the service
//! accepts a submission or the retry budget is exhausted.
//!
//! Module layout:
//! - **selector**: maps candidate resource ids to exactly one service
//! - **instruction**: builds the generator's system instruction
//! - **attachments**: fetches reference URLs, tolerating partial failure
//! - **engine**: the generate-validate-execute-retry loop
//! - **schemas**: bundled schema contracts for Docs and Slides

pub mod attachments;
pub mod engine;
mod error;
pub mod instruction;
pub mod schemas;
pub mod selector;

pub use error::{GenerateError, Result};
pub use selector::{ResourceSelector, ServiceBinding};

use quill_models::{FileReference, GeminiFileApi, GeminiGenerator};
use serde_json::Value;
use tracing::{debug, warn};

/// Credentials for the two external surfaces of a generation run.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// API key for the Gemini API (generation and file upload).
    pub gemini_api_key: String,
    /// OAuth bearer token for the Workspace batchUpdate endpoints.
    pub workspace_token: String,
}

/// Parameters for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    /// Credentials for the generator and the Workspace service.
    pub credentials: Credentials,
    /// The natural-language editing instruction.
    pub prompt: String,
    /// The schema contract for the target service's request body.
    pub schema: Value,
    /// Candidate resource identifiers; the first in priority order wins.
    pub resources: ResourceSelector,
    /// Maximum number of generation attempts.
    pub retry_budget: usize,
    /// Reference URLs staged as generator attachments. May be empty.
    pub reference_urls: Vec<String>,
    /// The Gemini model ID to use.
    pub model_id: String,
}

impl GenerateParams {
    /// Default number of generation attempts.
    pub const DEFAULT_RETRY_BUDGET: usize = 5;
    /// Default Gemini model.
    pub const DEFAULT_MODEL_ID: &'static str = "gemini-1.5-pro";

    /// Creates parameters with the default retry budget and model, and no
    /// reference URLs.
    pub fn new(
        credentials: Credentials,
        prompt: impl Into<String>,
        schema: Value,
        resources: ResourceSelector,
    ) -> Self {
        Self {
            credentials,
            prompt: prompt.into(),
            schema,
            resources,
            retry_budget: Self::DEFAULT_RETRY_BUDGET,
            reference_urls: Vec::new(),
            model_id: Self::DEFAULT_MODEL_ID.to_string(),
        }
    }
}

/// Generates a batch-update request body from a natural-language prompt and
/// submits it to the resolved Workspace service.
///
/// Returns the accepted request body. Intermediate generation and submission
/// failures are absorbed into corrective turns; the only surfaced failures
/// are invalid arguments, an unresolvable service, and retry exhaustion.
///
/// # Errors
/// Returns `GenerateError::Argument` if a required input is missing or
/// empty, `GenerateError::Configuration` if no resource id is present, and
/// `GenerateError::ExhaustedRetries` if no attempt is accepted within the
/// budget.
pub async fn generate_request_body(params: GenerateParams) -> Result<Value> {
    validate(&params)?;

    let binding = selector::resolve(&params.resources, &params.credentials.workspace_token)?;
    debug!(
        service = binding.service_name,
        resource_id = %binding.resource_id,
        retry_budget = params.retry_budget,
        "Resolved generation target"
    );

    let system_instruction =
        instruction::build_system_instruction(binding.service_name, &params.schema);

    let mut generator = GeminiGenerator::with_api_key(
        params.model_id.clone(),
        params.credentials.gemini_api_key.clone(),
    )
    .with_system_instruction(system_instruction)
    .with_json_response();

    if !params.reference_urls.is_empty() {
        let files = stage_reference_files(&params).await;
        if !files.is_empty() {
            generator = generator.with_files(files);
        }
    }

    engine::run(&generator, &binding, &params.prompt, params.retry_budget).await
}

/// Fetches the reference URLs and uploads the successful ones to the Gemini
/// File API. Failures are skipped: a run without attachments is still a
/// valid run.
async fn stage_reference_files(params: &GenerateParams) -> Vec<FileReference> {
    let fetch_client = reqwest::Client::new();
    let attachments = attachments::load_attachments(&fetch_client, &params.reference_urls).await;
    if attachments.is_empty() {
        warn!("No reference URL could be fetched; proceeding without attachments");
        return Vec::new();
    }

    let file_api = GeminiFileApi::with_api_key(params.credentials.gemini_api_key.clone());
    let mut files = Vec::new();
    for attachment in &attachments {
        match file_api.upload_attachment(attachment).await {
            Ok(file) => files.push(FileReference::from(&file)),
            Err(e) => {
                warn!(
                    display_name = %attachment.display_name,
                    error = %e,
                    "Skipping attachment that failed to upload"
                );
            }
        }
    }
    files
}

/// Validates required inputs. Runs before any external call.
fn validate(params: &GenerateParams) -> Result<()> {
    if params.credentials.gemini_api_key.is_empty() {
        return Err(GenerateError::Argument("gemini_api_key must not be empty".to_string()));
    }
    if params.credentials.workspace_token.is_empty() {
        return Err(GenerateError::Argument("workspace_token must not be empty".to_string()));
    }
    if params.prompt.is_empty() {
        return Err(GenerateError::Argument("prompt must not be empty".to_string()));
    }
    if params.schema.is_null() {
        return Err(GenerateError::Argument("schema must not be null".to_string()));
    }
    if params.retry_budget == 0 {
        return Err(GenerateError::Argument("retry_budget must be positive".to_string()));
    }
    Ok(())
}

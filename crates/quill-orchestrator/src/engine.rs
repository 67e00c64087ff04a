//! The generation-execution loop.
//!
//! One state variable — the current conversation turn — is iterated for at
//! most `retry_budget` attempts. Each attempt sends the turn to the
//! generator, extracts and decodes the candidate text, checks for a
//! non-empty `requests` array, and submits the decoded body to the service.
//! The first accepted submission ends the run; every failure is translated
//! into a corrective turn for the next attempt. Correction is delegated to
//! the generator itself: no local repair or schema validation is performed
//! here, and a body the service rejects is discarded, not retained.
//!
//! The loop is strictly sequential: attempt i+1 never starts before attempt
//! i's submission outcome is known, because an accepted submission is an
//! external side effect that must not be duplicated.

use quill_abstraction::{ConversationTurn, Generator};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GenerateError, Result};
use crate::selector::ServiceBinding;

/// The outcome of a single attempt. Consumed only by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    /// The service accepted the submitted body.
    Accepted(Value),
    /// The attempt failed and will be retried with a corrective turn.
    Failed(AttemptFailure),
}

/// How an attempt failed; the input to corrective-turn construction, so an
/// accepted outcome can never reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptFailure {
    /// The response was unusable (no text part, or no non-empty `requests`
    /// array); retried with a generic corrective turn.
    Soft,
    /// The generator call, JSON decode, or submission failed; retried with a
    /// corrective turn embedding the literal error message.
    Hard(String),
}

/// Drives the generator and the service until a submission is accepted or
/// the retry budget is exhausted.
///
/// # Errors
/// Returns `GenerateError::ExhaustedRetries` if no attempt is accepted
/// within the budget.
pub async fn run(
    generator: &dyn Generator,
    binding: &ServiceBinding,
    initial_prompt: &str,
    retry_budget: usize,
) -> Result<Value> {
    let mut turn = ConversationTurn::user(initial_prompt);

    for attempt in 1..=retry_budget {
        debug!(attempt, prompt = %turn.text, "Sending generation turn");

        match run_attempt(generator, binding, &turn).await {
            AttemptOutcome::Accepted(body) => {
                debug!(attempt, service = binding.service_name, "batchUpdate accepted");
                return Ok(body);
            }
            AttemptOutcome::Failed(failure) => {
                turn = corrective_turn(&failure);
            }
        }
    }

    Err(GenerateError::ExhaustedRetries { attempts: retry_budget })
}

/// Executes one attempt end to end: generate, extract, decode, validate,
/// submit. Exactly one failure signal is observed per attempt.
async fn run_attempt(
    generator: &dyn Generator,
    binding: &ServiceBinding,
    turn: &ConversationTurn,
) -> AttemptOutcome {
    let response = match generator.generate(turn).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Generator call failed");
            return AttemptOutcome::Failed(AttemptFailure::Hard(e.to_string()));
        }
    };

    let Some(text) = response.first_text() else {
        warn!("Generator response contained no text part");
        return AttemptOutcome::Failed(AttemptFailure::Soft);
    };

    let body: Value = match serde_json::from_str(text) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Candidate text is not valid JSON");
            return AttemptOutcome::Failed(AttemptFailure::Hard(e.to_string()));
        }
    };

    if !has_requests(&body) {
        warn!("Candidate body has no non-empty requests array");
        return AttemptOutcome::Failed(AttemptFailure::Soft);
    }

    match binding.service.batch_update(&body, &binding.resource_id).await {
        Ok(()) => AttemptOutcome::Accepted(body),
        Err(e) => {
            warn!(error = %e, service = binding.service_name, "Service rejected batchUpdate");
            AttemptOutcome::Failed(AttemptFailure::Hard(e.to_string()))
        }
    }
}

/// Minimal acceptance check: the decoded body must hold a non-empty
/// `requests` array. Shape beyond that is the service's concern.
fn has_requests(body: &Value) -> bool {
    body.get("requests").and_then(Value::as_array).is_some_and(|requests| !requests.is_empty())
}

/// Translates a failed attempt into the next conversation turn.
///
/// Pure function of the failure, so the correction logic is testable without
/// any collaborator.
fn corrective_turn(failure: &AttemptFailure) -> ConversationTurn {
    match failure {
        AttemptFailure::Hard(message) => ConversationTurn::user(format!(
            "An error occurred with the generated request body: \"{}\". Please update the request body to fix this error.",
            message
        )),
        AttemptFailure::Soft => ConversationTurn::user(
            "The previous attempt failed to generate a valid request body. Please try again.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_abstraction::{
        ContentPart, GeneratedResponse, GeneratorError, ResponseCandidate, ServiceError,
        UpdateService,
    };
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Generator fake that replays a script of outcomes and records the
    /// turns it was sent.
    struct ScriptedGenerator {
        script: Mutex<VecDeque<std::result::Result<GeneratedResponse, GeneratorError>>>,
        turns: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(
            script: Vec<std::result::Result<GeneratedResponse, GeneratorError>>,
        ) -> Self {
            Self { script: Mutex::new(script.into()), turns: Mutex::new(Vec::new()) }
        }

        fn turns(&self) -> Vec<String> {
            self.turns.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            turn: &ConversationTurn,
        ) -> std::result::Result<GeneratedResponse, GeneratorError> {
            self.turns.lock().unwrap().push(turn.text.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("generator called more times than scripted")
        }
    }

    /// Service fake that replays a script of submission outcomes and records
    /// the bodies it received.
    struct ScriptedService {
        script: Mutex<VecDeque<std::result::Result<(), ServiceError>>>,
        submissions: Arc<Mutex<Vec<Value>>>,
    }

    impl ScriptedService {
        fn new(script: Vec<std::result::Result<(), ServiceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                submissions: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Handle to the recorded submissions, usable after the service is
        /// boxed into a binding.
        fn submissions_handle(&self) -> Arc<Mutex<Vec<Value>>> {
            Arc::clone(&self.submissions)
        }
    }

    #[async_trait]
    impl UpdateService for ScriptedService {
        async fn batch_update(
            &self,
            body: &Value,
            _resource_id: &str,
        ) -> std::result::Result<(), ServiceError> {
            self.submissions.lock().unwrap().push(body.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("service called more times than scripted")
        }

        fn service_name(&self) -> &str {
            "Docs"
        }
    }

    fn text_response(text: &str) -> GeneratedResponse {
        GeneratedResponse {
            candidates: vec![ResponseCandidate {
                parts: vec![ContentPart::Text(text.to_string())],
            }],
            model_id: None,
        }
    }

    fn binding_with(service: ScriptedService) -> ServiceBinding {
        ServiceBinding {
            service: Box::new(service),
            resource_id: "doc-1".to_string(),
            service_name: "Docs",
        }
    }

    const VALID_BODY: &str = r#"{"requests":[{"insertText":{"text":"sample"}}]}"#;

    #[tokio::test]
    async fn test_accepted_on_first_attempt() {
        let generator = ScriptedGenerator::new(vec![Ok(text_response(VALID_BODY))]);
        let service = ScriptedService::new(vec![Ok(())]);
        let submissions = service.submissions_handle();
        let binding = binding_with(service);

        let body = run(&generator, &binding, "Insert sample text", 5).await.unwrap();
        assert_eq!(body, serde_json::from_str::<Value>(VALID_BODY).unwrap());
        // Exactly one generator call and one submission: no second attempt
        // after acceptance.
        assert_eq!(generator.turns().len(), 1);
        assert_eq!(generator.turns()[0], "Insert sample text");
        assert_eq!(submissions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submission_failure_embeds_message_in_next_turn() {
        let generator = ScriptedGenerator::new(vec![
            Ok(text_response(VALID_BODY)),
            Ok(text_response(VALID_BODY)),
        ]);
        let service = ScriptedService::new(vec![
            Err(ServiceError::Rejected("Invalid requests[0].insertText".to_string())),
            Ok(()),
        ]);
        let binding = binding_with(service);

        let body = run(&generator, &binding, "Insert sample text", 5).await.unwrap();
        assert_eq!(body, serde_json::from_str::<Value>(VALID_BODY).unwrap());

        let turns = generator.turns();
        assert_eq!(turns.len(), 2);
        assert!(turns[1].contains("Invalid requests[0].insertText"));
        assert!(turns[1].contains("Please update the request body to fix this error."));
    }

    #[tokio::test]
    async fn test_decode_failure_embeds_decode_error() {
        let generator = ScriptedGenerator::new(vec![
            Ok(text_response("this is not json")),
            Ok(text_response(VALID_BODY)),
        ]);
        let service = ScriptedService::new(vec![Ok(())]);
        let binding = binding_with(service);

        run(&generator, &binding, "Insert sample text", 5).await.unwrap();

        let turns = generator.turns();
        assert_eq!(turns.len(), 2);
        assert!(turns[1].starts_with("An error occurred with the generated request body:"));
    }

    #[tokio::test]
    async fn test_generator_error_is_absorbed_into_corrective_turn() {
        let generator = ScriptedGenerator::new(vec![
            Err(GeneratorError::ResponseError("Server error (500): overloaded".to_string())),
            Ok(text_response(VALID_BODY)),
        ]);
        let service = ScriptedService::new(vec![Ok(())]);
        let binding = binding_with(service);

        run(&generator, &binding, "Insert sample text", 5).await.unwrap();

        let turns = generator.turns();
        assert!(turns[1].contains("Server error (500): overloaded"));
    }

    #[tokio::test]
    async fn test_empty_requests_array_is_soft_failure_without_submission() {
        let generator = ScriptedGenerator::new(vec![
            Ok(text_response(r#"{"requests":[]}"#)),
            Ok(text_response(VALID_BODY)),
        ]);
        let service = ScriptedService::new(vec![Ok(())]);
        let submissions = service.submissions_handle();
        let binding = binding_with(service);

        run(&generator, &binding, "Insert sample text", 5).await.unwrap();

        let turns = generator.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(
            turns[1],
            "The previous attempt failed to generate a valid request body. Please try again."
        );
        // Only the second body reached the service; the empty-requests body
        // was never submitted.
        assert_eq!(submissions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_text_part_is_soft_failure() {
        let generator = ScriptedGenerator::new(vec![
            Ok(GeneratedResponse { candidates: vec![], model_id: None }),
            Ok(text_response(VALID_BODY)),
        ]);
        let service = ScriptedService::new(vec![Ok(())]);
        let binding = binding_with(service);

        run(&generator, &binding, "Insert sample text", 5).await.unwrap();
        assert_eq!(generator.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_after_exactly_budget_attempts() {
        let generator = ScriptedGenerator::new(vec![
            Ok(text_response("nope")),
            Ok(text_response("nope")),
            Ok(text_response("nope")),
        ]);
        let service = ScriptedService::new(vec![]);
        let submissions = service.submissions_handle();
        let binding = binding_with(service);

        let err = run(&generator, &binding, "Insert sample text", 3).await.unwrap_err();
        assert_eq!(err, GenerateError::ExhaustedRetries { attempts: 3 });
        // Exactly retry_budget generator calls, never more.
        assert_eq!(generator.turns().len(), 3);
        assert!(submissions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_has_requests() {
        assert!(has_requests(&json!({"requests": [{"insertText": {}}]})));
        assert!(!has_requests(&json!({"requests": []})));
        assert!(!has_requests(&json!({"requests": "not an array"})));
        assert!(!has_requests(&json!({})));
        assert!(!has_requests(&json!(null)));
    }

    #[test]
    fn test_corrective_turn_for_hard_failure_quotes_message() {
        let turn = corrective_turn(&AttemptFailure::Hard("boom".to_string()));
        assert_eq!(
            turn.text,
            "An error occurred with the generated request body: \"boom\". Please update the request body to fix this error."
        );
        assert_eq!(turn.role, "user");
    }

    #[test]
    fn test_corrective_turn_for_soft_failure_is_generic() {
        let turn = corrective_turn(&AttemptFailure::Soft);
        assert_eq!(
            turn.text,
            "The previous attempt failed to generate a valid request body. Please try again."
        );
    }
}

//! System-instruction builder.
//!
//! The instruction binds the generator to its role for one run: produce
//! batch-update request bodies for the named service, conforming to the
//! supplied JSON Schema contract. The schema is embedded verbatim between
//! `<JSONSchema>` markers and never interpreted here. The instruction is
//! fixed for the lifetime of one run; only the conversation turn changes
//! between retry attempts.

use serde_json::Value;

/// Builds the system instruction for the given service and schema contract.
pub fn build_system_instruction(service_name: &str, schema: &Value) -> String {
    [
        format!(
            "You are an expert in creating request bodies for the batchUpdate method of the Google {} API.",
            service_name
        ),
        "Your task is to create a request body based on the user's prompt.".to_string(),
        "The JSON schema for the request body is as follows. Ensure your response adheres to this schema.".to_string(),
        format!("<JSONSchema>{}</JSONSchema>", schema),
    ]
    .join("\n")
}

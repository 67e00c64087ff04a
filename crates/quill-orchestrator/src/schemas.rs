//! Bundled JSON Schema contracts.
//!
//! The contracts describe the batch-update request-body shape for a given
//! Workspace service. They are opaque data: the orchestrator embeds them
//! verbatim into the system instruction and never interprets them. A Sheets
//! contract is not bundled; callers supply their own, since the schema is
//! always a parameter of the run.

use std::sync::LazyLock;

use serde_json::Value;

static DOCS_SCHEMA: LazyLock<Value> = LazyLock::new(|| parse(include_str!("../schemas/docs.json")));
static SLIDES_SCHEMA: LazyLock<Value> =
    LazyLock::new(|| parse(include_str!("../schemas/slides.json")));

fn parse(raw: &'static str) -> Value {
    serde_json::from_str(raw).expect("bundled schema is valid JSON")
}

/// The batch-update schema contract for Google Docs.
pub fn docs_schema() -> Value {
    DOCS_SCHEMA.clone()
}

/// The batch-update schema contract for Google Slides.
pub fn slides_schema() -> Value {
    SLIDES_SCHEMA.clone()
}

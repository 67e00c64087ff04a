//! Resource-to-service selection.
//!
//! A `ResourceSelector` names candidate Workspace resources; exactly one
//! service is chosen by checking the fields in a fixed priority order
//! (document, then spreadsheet, then presentation). When several ids are set,
//! the first in priority order wins; this is a policy choice, not an error.

use quill_abstraction::UpdateService;
use quill_services::{ServiceKind, WorkspaceService};

use crate::error::{GenerateError, Result};

/// Candidate Workspace resource identifiers for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSelector {
    /// The ID of a Google Document.
    pub document_id: Option<String>,
    /// The ID of a Google Spreadsheet.
    pub spreadsheet_id: Option<String>,
    /// The ID of a Google Presentation.
    pub presentation_id: Option<String>,
}

impl ResourceSelector {
    /// Selects a Google Document.
    pub fn document(id: impl Into<String>) -> Self {
        Self { document_id: Some(id.into()), ..Self::default() }
    }

    /// Selects a Google Spreadsheet.
    pub fn spreadsheet(id: impl Into<String>) -> Self {
        Self { spreadsheet_id: Some(id.into()), ..Self::default() }
    }

    /// Selects a Google Presentation.
    pub fn presentation(id: impl Into<String>) -> Self {
        Self { presentation_id: Some(id.into()), ..Self::default() }
    }
}

/// The resolved target of one generation run.
///
/// Immutable once resolved; owned by the engine for the duration of the run.
pub struct ServiceBinding {
    /// The service that accepts the batch-update submission.
    pub service: Box<dyn UpdateService>,
    /// The resource the submission targets.
    pub resource_id: String,
    /// Human-readable service name, used in the system instruction and logs.
    pub service_name: &'static str,
}

/// Picks the service kind and resource id from the selector.
///
/// The priority table below is the single source of truth for selection
/// order. Empty strings count as absent.
fn select(selector: &ResourceSelector) -> Result<(ServiceKind, &str)> {
    let candidates: [(ServiceKind, Option<&str>); 3] = [
        (ServiceKind::Docs, selector.document_id.as_deref()),
        (ServiceKind::Sheets, selector.spreadsheet_id.as_deref()),
        (ServiceKind::Slides, selector.presentation_id.as_deref()),
    ];

    for (kind, id) in candidates {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            return Ok((kind, id));
        }
    }

    Err(GenerateError::Configuration("no valid resource ID provided".to_string()))
}

/// Resolves a `ResourceSelector` into a `ServiceBinding`.
///
/// # Errors
/// Returns `GenerateError::Configuration` if no resource id is present.
pub fn resolve(selector: &ResourceSelector, access_token: &str) -> Result<ServiceBinding> {
    let (kind, resource_id) = select(selector)?;
    Ok(ServiceBinding {
        service: Box::new(WorkspaceService::new(kind, access_token.to_string())),
        resource_id: resource_id.to_string(),
        service_name: kind.name(),
    })
}

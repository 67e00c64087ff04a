//! Reference-attachment loader.
//!
//! Resolves reference URLs into in-memory attachments for one generation
//! run. Fetches are issued concurrently (one per URL, exactly once each) and
//! any failure — transport error or non-2xx status — silently skips that URL.
//! The returned sequence preserves the source order of the successful URLs;
//! total failure yields an empty sequence, never an error.

use futures::future::join_all;
use quill_abstraction::Attachment;
use reqwest::Client;
use tracing::{debug, warn};

/// Media type assumed when the response does not declare one.
const DEFAULT_MIME_TYPE: &str = "text/html";

/// Fetches the given reference URLs and returns the successful attachments
/// in source order. Each attachment is tagged with its originating URL as
/// the display name.
pub async fn load_attachments(client: &Client, urls: &[String]) -> Vec<Attachment> {
    if urls.is_empty() {
        return Vec::new();
    }

    let fetches = urls.iter().map(|url| fetch_one(client, url));
    join_all(fetches).await.into_iter().flatten().collect()
}

/// Fetches a single URL; returns `None` on any failure.
async fn fetch_one(client: &Client, url: &str) -> Option<Attachment> {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "Skipping reference URL: fetch failed");
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(url = %url, status = %status, "Skipping reference URL: non-success status");
        return None;
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %url, error = %e, "Skipping reference URL: body read failed");
            return None;
        }
    };

    debug!(url = %url, size = bytes.len(), mime_type = %mime_type, "Fetched reference URL");

    Some(Attachment {
        bytes: bytes.to_vec(),
        mime_type,
        display_name: url.to_string(),
    })
}

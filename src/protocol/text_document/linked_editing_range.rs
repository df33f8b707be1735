//! =============================================================================
//! textDocument/linkedEditingRange
//! =============================================================================
//!
//! Bridges one inbound request to the registered capability provider: resolve
//! the document, delegate with the caller's cancellation token, and normalize
//! the raw payload into the LSP shape.
//! Providers answer in the backend's loose JSON form, so a result whose
//! `ranges` field is not an array is indistinguishable from "not applicable"
//! and is reported as no result rather than an error.

use std::sync::Arc;

use anyhow::Result;
use lsp_types::{LinkedEditingRanges, Position, Uri};
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::documents::DocumentStore;
use crate::provider::LinkedEditingRangeProvider;
use crate::utils::backend_range_from_value;

/// Stateless single-step translation invoked once per request.  The document
/// registry and the provider are injected once at construction and used
/// read-only, so concurrent invocations are fully independent.
pub struct LinkedEditingRangeAdapter {
    documents: Arc<DocumentStore>,
    provider: Arc<dyn LinkedEditingRangeProvider>,
}

impl LinkedEditingRangeAdapter {
    pub fn new(documents: Arc<DocumentStore>, provider: Arc<dyn LinkedEditingRangeProvider>) -> Self {
        Self {
            documents,
            provider,
        }
    }

    /// Computes the linked editing ranges at `position`.
    ///
    /// `Ok(None)` means linked editing is unsupported at this location.
    /// Provider failures propagate unmodified; the cancellation token is
    /// forwarded verbatim and nothing here retries or caches.
    pub fn provide(
        &self,
        uri: &Uri,
        position: Position,
        token: &CancellationToken,
    ) -> Result<Option<LinkedEditingRanges>> {
        let document = self.documents.snapshot(uri)?;
        let raw = self
            .provider
            .provide_linked_editing_ranges(&document, position, token)?;
        Ok(raw.and_then(normalize_provider_result))
    }
}

/// Shapes a raw provider payload into the LSP result.  A missing or
/// non-array `ranges` field yields no result; `wordPattern` is passed
/// through untouched.
fn normalize_provider_result(body: Value) -> Option<LinkedEditingRanges> {
    let entries = body.get("ranges")?.as_array()?;
    let word_pattern = body
        .get("wordPattern")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Some(LinkedEditingRanges {
        ranges: compact_ranges(entries),
        word_pattern,
    })
}

/// Drops entries that represent absence (nulls and spans that do not parse),
/// preserving the relative order of the rest.
fn compact_ranges(entries: &[Value]) -> Vec<lsp_types::Range> {
    entries
        .iter()
        .filter_map(backend_range_from_value)
        .collect()
}

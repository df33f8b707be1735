//! =============================================================================
//! Open Document Store
//! =============================================================================
//!
//! Tracks the latest text for each open buffer.  The store is the document
//! registry the linked-editing adapter resolves URIs against: feature workers
//! read snapshots while the server loop applies sync notifications, so access
//! goes through an internal lock rather than `&mut` plumbing.

use std::cmp;
use std::collections::HashMap;
use std::sync::RwLock;

use lsp_types::{Position as LspPosition, Uri};

/// Captures the current snapshot for every open text document.
#[derive(Default)]
pub struct DocumentStore {
    docs: RwLock<HashMap<String, DocumentState>>,
}

impl DocumentStore {
    /// Inserts or replaces the document snapshot whenever the client fires
    /// textDocument/didOpen.
    pub fn open(&self, uri: &Uri, text: &str, language_id: Option<String>, version: i32) {
        let state = DocumentState::new(text, language_id, version);
        self.docs
            .write()
            .expect("document store poisoned")
            .insert(uri.to_string(), state);
    }

    /// Applies incremental text changes using the same ordering LSP specifies.
    pub fn apply_changes(
        &self,
        uri: &Uri,
        changes: &[lsp_types::TextDocumentContentChangeEvent],
        version: i32,
    ) {
        let mut docs = self.docs.write().expect("document store poisoned");
        let Some(state) = docs.get_mut(uri.as_str()) else {
            log::warn!("received didChange for unopened document {}", uri.as_str());
            return;
        };
        for change in changes {
            state.apply_change(change);
        }
        state.version = version;
    }

    /// Drops the cached snapshot as soon as the client closes the buffer.
    pub fn close(&self, uri: &Uri) {
        self.docs
            .write()
            .expect("document store poisoned")
            .remove(uri.as_str());
    }

    /// Resolves a URI to an owned snapshot of the document's current state.
    pub fn snapshot(&self, uri: &Uri) -> Result<DocumentSnapshot, DocumentError> {
        let docs = self.docs.read().expect("document store poisoned");
        docs.get(uri.as_str())
            .map(|state| DocumentSnapshot {
                uri: uri.to_string(),
                text: state.text.clone(),
                language_id: state.language_id.clone(),
                version: state.version,
            })
            .ok_or_else(|| DocumentError::NotOpen {
                uri: uri.to_string(),
            })
    }
}

/// Owned view of one open document, handed to capability providers.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub uri: String,
    pub text: String,
    pub language_id: Option<String>,
    pub version: i32,
}

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("document {uri} is not open")]
    NotOpen { uri: String },
}

struct DocumentState {
    text: String,
    language_id: Option<String>,
    line_metrics: Vec<LineMetrics>,
    version: i32,
}

impl DocumentState {
    fn new(text: &str, language_id: Option<String>, version: i32) -> Self {
        let mut state = Self {
            text: text.to_string(),
            language_id,
            line_metrics: Vec::new(),
            version,
        };
        state.recompute_metrics();
        state
    }

    fn apply_change(&mut self, change: &lsp_types::TextDocumentContentChangeEvent) {
        if let Some(range) = &change.range {
            let start = self.byte_index(&range.start);
            let end = self.byte_index(&range.end);
            if start > end || end > self.text.len() {
                log::warn!(
                    "document store received out-of-bounds change ({start}-{end} vs len {})",
                    self.text.len()
                );
                return;
            }
            self.text.replace_range(start..end, &change.text);
        } else {
            self.text = change.text.clone();
        }
        self.recompute_metrics();
    }

    fn byte_index(&self, position: &LspPosition) -> usize {
        let line_idx = self.clamp_line_idx(position.line);
        let line = &self.line_metrics[line_idx];
        let mut byte_index = line.start_byte;
        let mut remaining = cmp::min(position.character, line.content_utf16);
        let line_text = &self.text[line.start_byte..line.start_byte + line.content_bytes];
        for ch in line_text.chars() {
            if remaining == 0 {
                break;
            }
            let units = ch.len_utf16() as u32;
            if remaining < units {
                break;
            }
            remaining -= units;
            byte_index += ch.len_utf8();
        }
        byte_index
    }

    fn clamp_line_idx(&self, line: u32) -> usize {
        if self.line_metrics.is_empty() {
            return 0;
        }
        cmp::min(line as usize, self.line_metrics.len() - 1)
    }

    fn recompute_metrics(&mut self) {
        let mut metrics = Vec::new();
        let mut cursor = 0;
        let bytes = self.text.as_bytes();

        while cursor < bytes.len() {
            let line_start = cursor;
            while cursor < bytes.len() && bytes[cursor] != b'\n' && bytes[cursor] != b'\r' {
                cursor += 1;
            }
            let content_end = cursor;
            let content = &self.text[line_start..content_end];
            let content_utf16 = content.encode_utf16().count() as u32;

            if cursor < bytes.len() {
                match bytes[cursor] {
                    b'\r' => {
                        cursor += 1;
                        if cursor < bytes.len() && bytes[cursor] == b'\n' {
                            cursor += 1;
                        }
                    }
                    b'\n' => {
                        cursor += 1;
                    }
                    _ => {}
                }
            }

            metrics.push(LineMetrics {
                start_byte: line_start,
                content_bytes: content_end - line_start,
                content_utf16,
            });
        }

        if metrics.is_empty() {
            metrics.push(LineMetrics::empty());
        } else if self.text.ends_with('\n') || self.text.ends_with('\r') {
            metrics.push(LineMetrics {
                start_byte: self.text.len(),
                content_bytes: 0,
                content_utf16: 0,
            });
        }

        self.line_metrics = metrics;
    }
}

#[derive(Debug, Clone)]
struct LineMetrics {
    start_byte: usize,
    content_bytes: usize,
    content_utf16: u32,
}

impl LineMetrics {
    fn empty() -> Self {
        Self {
            start_byte: 0,
            content_bytes: 0,
            content_utf16: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn uri(s: &str) -> Uri {
        Uri::from_str(s).expect("test uri is valid")
    }

    fn change(
        start: (u32, u32),
        end: (u32, u32),
        text: &str,
    ) -> lsp_types::TextDocumentContentChangeEvent {
        lsp_types::TextDocumentContentChangeEvent {
            range: Some(lsp_types::Range {
                start: LspPosition {
                    line: start.0,
                    character: start.1,
                },
                end: LspPosition {
                    line: end.0,
                    character: end.1,
                },
            }),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn snapshot_reflects_incremental_edits() {
        let store = DocumentStore::default();
        let doc = uri("file:///tmp/sample.html");
        store.open(&doc, "<div>\n</div>\n", Some("html".to_string()), 1);

        store.apply_changes(&doc, &[change((0, 1), (0, 4), "span")], 2);

        let snapshot = store.snapshot(&doc).expect("document is open");
        assert_eq!(snapshot.text, "<span>\n</div>\n");
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.language_id.as_deref(), Some("html"));
    }

    #[test]
    fn edits_count_columns_in_utf16_units() {
        let store = DocumentStore::default();
        let doc = uri("file:///tmp/unicode.html");
        // '😀' is two UTF-16 code units, four UTF-8 bytes.
        store.open(&doc, "a😀b\n", None, 1);

        store.apply_changes(&doc, &[change((0, 3), (0, 4), "X")], 2);

        let snapshot = store.snapshot(&doc).expect("document is open");
        assert_eq!(snapshot.text, "a😀X\n");
    }

    #[test]
    fn full_sync_edit_replaces_the_document() {
        let store = DocumentStore::default();
        let doc = uri("file:///tmp/full.html");
        store.open(&doc, "old", None, 1);

        store.apply_changes(
            &doc,
            &[lsp_types::TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "new text".to_string(),
            }],
            2,
        );

        let snapshot = store.snapshot(&doc).expect("document is open");
        assert_eq!(snapshot.text, "new text");
    }

    #[test]
    fn closed_documents_do_not_resolve() {
        let store = DocumentStore::default();
        let doc = uri("file:///tmp/gone.html");
        store.open(&doc, "text", None, 1);
        store.close(&doc);

        let err = store.snapshot(&doc).expect_err("document is closed");
        assert!(matches!(err, DocumentError::NotOpen { .. }));
    }
}

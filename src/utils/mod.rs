//! =============================================================================
//! Utility Helpers
//! =============================================================================
//!
//! Coordinate conversions between the LSP wire format (0-based, UTF-16
//! columns) and the backend's 1-based line/offset space, plus URI/path glue.
//! Both the protocol handlers and the provider reuse these instead of
//! reimplementing the same conversions each time.

use std::path::Path;

use lsp_types::Position as LspPosition;
use serde_json::Value;
use url::Url;

/// The backend understands 1-based line/offset coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendPosition {
    pub line: u32,
    pub offset: u32,
}

/// Converts an LSP `Position` into the backend's coordinate space.
pub fn lsp_position_to_backend(position: &LspPosition) -> BackendPosition {
    BackendPosition {
        line: position.line + 1,
        offset: position.character + 1,
    }
}

pub fn uri_to_file_path(uri: &str) -> Option<String> {
    let parsed = Url::parse(uri).ok()?;
    parsed
        .to_file_path()
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Parses a backend `{line, offset}` record back into an LSP position.
pub fn backend_position_from_value(value: &Value) -> Option<LspPosition> {
    let line = value.get("line")?.as_u64()? as u32;
    let offset = value.get("offset")?.as_u64()? as u32;
    Some(LspPosition {
        line: line.saturating_sub(1),
        character: offset.saturating_sub(1),
    })
}

/// Parses a backend `{start, end}` span into an LSP range.  Spans missing
/// either endpoint are treated as absent.
pub fn backend_range_from_value(value: &Value) -> Option<lsp_types::Range> {
    let start = backend_position_from_value(value.get("start")?)?;
    let end = backend_position_from_value(value.get("end")?)?;
    Some(lsp_types::Range { start, end })
}

/// Builds the open-file entry for the backend's `updateOpen` command.
pub fn document_open_entry(
    uri: &str,
    text: &str,
    language_id: Option<&str>,
    workspace_root: Option<&Path>,
) -> Value {
    let file = uri_to_file_path(uri).unwrap_or_else(|| uri.to_string());
    let mut entry = serde_json::json!({
        "file": file,
        "fileContent": text,
    });

    if let Some(obj) = entry.as_object_mut() {
        if let Some(lang) = language_id {
            obj.insert("languageId".to_string(), serde_json::json!(lang));
        }
        if let Some(root) = workspace_root {
            obj.insert(
                "projectRootPath".to_string(),
                serde_json::json!(root.to_string_lossy().into_owned()),
            );
        }
    }

    entry
}

/// Translates incremental LSP edits into backend text changes.  The backend
/// applies changes front-to-back against the pre-edit buffer, so the edits
/// are emitted in reverse order.  Full-document edits carry no range and are
/// dropped; incremental sync is required.
pub fn backend_text_changes_from_edits(
    edits: &[lsp_types::TextDocumentContentChangeEvent],
) -> Vec<Value> {
    let mut changes = Vec::with_capacity(edits.len());
    for change in edits.iter().rev() {
        let Some(range) = &change.range else {
            log::warn!(
                "dropping textDocument/didChange edit without range; incremental sync is required"
            );
            continue;
        };

        let start = lsp_position_to_backend(&range.start);
        let end = lsp_position_to_backend(&range.end);
        changes.push(serde_json::json!({
            "newText": change.text,
            "start": {"line": start.line, "offset": start.offset},
            "end": {"line": end.line, "offset": end.offset},
        }));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lsp_position_to_backend_is_one_based() {
        let converted = lsp_position_to_backend(&LspPosition {
            line: 0,
            character: 0,
        });
        assert_eq!(converted, BackendPosition { line: 1, offset: 1 });

        let converted = lsp_position_to_backend(&LspPosition {
            line: 4,
            character: 15,
        });
        assert_eq!(
            converted,
            BackendPosition {
                line: 5,
                offset: 16
            }
        );
    }

    #[test]
    fn backend_range_roundtrips_to_lsp_space() {
        let span = json!({
            "start": {"line": 2, "offset": 3},
            "end": {"line": 2, "offset": 8},
        });
        let range = backend_range_from_value(&span).expect("span parses");
        assert_eq!(range.start, LspPosition { line: 1, character: 2 });
        assert_eq!(range.end, LspPosition { line: 1, character: 7 });
    }

    #[test]
    fn backend_range_with_missing_endpoint_is_absent() {
        let span = json!({"start": {"line": 1, "offset": 1}});
        assert!(backend_range_from_value(&span).is_none());
        assert!(backend_range_from_value(&json!("not-a-span")).is_none());
    }

    #[test]
    fn backend_text_changes_from_edits_skips_full_sync_edits() {
        let range = lsp_types::Range {
            start: LspPosition { line: 1, character: 2 },
            end: LspPosition { line: 1, character: 5 },
        };
        let edits = vec![
            lsp_types::TextDocumentContentChangeEvent {
                range: Some(range),
                range_length: None,
                text: "foo".to_string(),
            },
            lsp_types::TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "dropped".to_string(),
            },
        ];

        let changes = backend_text_changes_from_edits(&edits);
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0],
            json!({
                "newText": "foo",
                "start": {"line": 2, "offset": 3},
                "end": {"line": 2, "offset": 6}
            })
        );
    }

    #[test]
    fn document_open_entry_sets_project_root() {
        let root = Path::new("/tmp/project-root");
        let entry = document_open_entry(
            "file:///tmp/sample.html",
            "<div></div>",
            Some("html"),
            Some(root),
        );
        assert_eq!(entry["file"], json!("/tmp/sample.html"));
        assert_eq!(entry["fileContent"], json!("<div></div>"));
        assert_eq!(entry["languageId"], json!("html"));
        assert_eq!(
            entry["projectRootPath"],
            json!(root.to_string_lossy().to_string())
        );
    }
}

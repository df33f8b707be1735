use serde_json::json;

use crate::protocol::NotificationSpec;
use crate::utils::{backend_text_changes_from_edits, uri_to_file_path};

pub fn handle(params: &lsp_types::DidChangeTextDocumentParams) -> NotificationSpec {
    let uri = &params.text_document.uri;
    let file = uri_to_file_path(uri.as_str()).unwrap_or_else(|| uri.to_string());
    let text_changes = backend_text_changes_from_edits(&params.content_changes);

    NotificationSpec {
        command: "updateOpen",
        arguments: json!({
            "openFiles": [],
            "changedFiles": [{
                "fileName": file,
                "textChanges": text_changes,
            }],
            "closedFiles": [],
        }),
    }
}

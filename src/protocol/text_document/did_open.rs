use std::path::Path;

use serde_json::json;

use crate::protocol::NotificationSpec;
use crate::utils::document_open_entry;

pub fn handle(params: &lsp_types::DidOpenTextDocumentParams, workspace_root: &Path) -> NotificationSpec {
    let doc = &params.text_document;
    let entry = document_open_entry(
        doc.uri.as_str(),
        &doc.text,
        Some(doc.language_id.as_str()),
        Some(workspace_root),
    );

    NotificationSpec {
        command: "updateOpen",
        arguments: json!({
            "openFiles": [entry],
            "changedFiles": [],
            "closedFiles": [],
        }),
    }
}

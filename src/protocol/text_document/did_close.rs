use std::path::Path;

use serde_json::json;

use crate::protocol::NotificationSpec;
use crate::utils::uri_to_file_path;

pub fn handle(params: &lsp_types::DidCloseTextDocumentParams, workspace_root: &Path) -> NotificationSpec {
    let uri = &params.text_document.uri;
    let file = uri_to_file_path(uri.as_str()).unwrap_or_else(|| uri.to_string());

    NotificationSpec {
        command: "updateOpen",
        arguments: json!({
            "projectRootPath": workspace_root.to_string_lossy(),
            "openFiles": [],
            "changedFiles": [],
            "closedFiles": [file],
        }),
    }
}

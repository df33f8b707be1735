use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use lsp_server::{Connection, ErrorCode, Message, Request, RequestId, Response};
use lsp_types::{
    InitializeParams, InitializeResult, LinkedEditingRangeParams,
    LinkedEditingRangeServerCapabilities, PositionEncodingKind, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions,
    notification::{
        Cancel, DidChangeConfiguration, DidChangeTextDocument, DidCloseTextDocument,
        DidOpenTextDocument, Notification as LspNotification,
    },
    request::{LinkedEditingRange, Request as LspRequest},
};
use serde_json::Value;

use crate::cancel::CancelRegistry;
use crate::config::{Config, Settings};
use crate::documents::DocumentStore;
use crate::protocol::text_document::linked_editing_range::LinkedEditingRangeAdapter;
use crate::protocol::text_document::{did_change, did_close, did_open};
use crate::provider::{BackendLocator, BackendProvider};
use crate::rpc::Backend;
use crate::utils::uri_to_file_path;

/// Runs the LSP server over stdio. This is the entry-point an editor (or any
/// LSP client) will execute.
pub fn run_stdio_server(settings: Settings) -> anyhow::Result<()> {
    env_logger::init();

    let (connection, io_threads) = Connection::stdio();
    let (init_id, init_params) = connection
        .initialize_start()
        .context("waiting for initialize")?;
    let params: InitializeParams =
        serde_json::from_value(init_params).context("invalid initialize params")?;

    let workspace_root =
        workspace_root_from_params(&params).unwrap_or_else(|| std::env::current_dir().unwrap());
    let config = Config::new(settings);
    let backend = Arc::new(Backend::new(
        BackendLocator::new(workspace_root),
        config.settings().backend.clone(),
    ));
    let documents = Arc::new(DocumentStore::default());
    let adapter = Arc::new(LinkedEditingRangeAdapter::new(
        Arc::clone(&documents),
        Arc::new(BackendProvider::new(Arc::clone(&backend))),
    ));

    let init_result = InitializeResult {
        server_info: Some(lsp_types::ServerInfo {
            name: "linkedit".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        capabilities: advertised_capabilities(),
    };
    connection
        .initialize_finish(init_id, serde_json::to_value(init_result)?)
        .context("failed to send initialize result")?;

    let state = ServerState {
        config,
        backend,
        documents,
        adapter,
        cancels: Arc::new(CancelRegistry::default()),
    };
    main_loop(connection, state)?;
    io_threads.join()?;

    Ok(())
}

fn advertised_capabilities() -> ServerCapabilities {
    let text_sync = TextDocumentSyncOptions {
        open_close: Some(true),
        change: Some(TextDocumentSyncKind::INCREMENTAL),
        will_save: Some(false),
        will_save_wait_until: Some(false),
        save: Some(TextDocumentSyncSaveOptions::SaveOptions(
            lsp_types::SaveOptions::default(),
        )),
    };
    ServerCapabilities {
        position_encoding: Some(PositionEncodingKind::UTF16),
        linked_editing_range_provider: Some(LinkedEditingRangeServerCapabilities::Simple(true)),
        text_document_sync: Some(TextDocumentSyncCapability::Options(text_sync)),
        ..Default::default()
    }
}

#[allow(deprecated)]
fn workspace_root_from_params(params: &InitializeParams) -> Option<PathBuf> {
    if let Some(folder) = params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
    {
        if let Some(path) = uri_to_file_path(folder.uri.as_str()) {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(root_path) = &params.root_path {
        return Some(Path::new(root_path).to_path_buf());
    }

    None
}

struct ServerState {
    config: Config,
    backend: Arc<Backend>,
    documents: Arc<DocumentStore>,
    adapter: Arc<LinkedEditingRangeAdapter>,
    cancels: Arc<CancelRegistry>,
}

fn main_loop(connection: Connection, mut state: ServerState) -> anyhow::Result<()> {
    if let Err(err) = state.backend.start() {
        log::warn!("failed to start backend process: {err:?}");
    }

    while let Ok(message) = connection.receiver.recv() {
        match message {
            Message::Request(req) => {
                if handle_request(&connection, &state, req)? {
                    break;
                }
            }
            Message::Response(resp) => {
                log::debug!("ignoring stray response: {:?}", resp);
            }
            Message::Notification(notif) => {
                if notif.method == "exit" {
                    break;
                }
                handle_notification(&mut state, notif)?;
            }
        }
    }

    Ok(())
}

fn handle_request(
    connection: &Connection,
    state: &ServerState,
    req: Request,
) -> anyhow::Result<bool> {
    let Request { id, method, params } = req;

    if method == "shutdown" {
        let response = Response::new_ok(id, Value::Null);
        connection.sender.send(response.into())?;
        return Ok(true);
    }

    if method == "initialize" {
        // Already handled via initialize_start, but the client might resend; respond with error.
        let response = Response::new_err(
            id,
            ErrorCode::InvalidRequest as i32,
            "initialize already completed".to_string(),
        );
        connection.sender.send(response.into())?;
        return Ok(false);
    }

    if method == LinkedEditingRange::METHOD {
        match serde_json::from_value::<LinkedEditingRangeParams>(params) {
            Ok(params) => spawn_linked_editing_worker(connection, state, id, params),
            Err(err) => {
                let response = Response::new_err(
                    id,
                    ErrorCode::InvalidParams as i32,
                    format!("invalid linkedEditingRange params: {err}"),
                );
                connection.sender.send(response.into())?;
            }
        }
        return Ok(false);
    }

    let response = Response::new_err(
        id,
        ErrorCode::MethodNotFound as i32,
        format!("method {method} is not implemented"),
    );
    connection.sender.send(response.into())?;

    Ok(false)
}

/// Services one linkedEditingRange request on its own thread so slow backend
/// analysis never stalls the main loop; in-flight requests share nothing but
/// the adapter, so they stay independent of one another.
fn spawn_linked_editing_worker(
    connection: &Connection,
    state: &ServerState,
    id: RequestId,
    params: LinkedEditingRangeParams,
) {
    let sender = connection.sender.clone();
    let adapter = Arc::clone(&state.adapter);
    let cancels = Arc::clone(&state.cancels);
    let token = cancels.register(id.clone());

    let _ = thread::spawn(move || {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let response = match adapter.provide(&uri, position, &token) {
            Ok(result) => match serde_json::to_value(result) {
                Ok(value) => Response::new_ok(id.clone(), value),
                Err(err) => Response::new_err(
                    id.clone(),
                    ErrorCode::InternalError as i32,
                    format!("failed to encode linkedEditingRange result: {err}"),
                ),
            },
            Err(err) => {
                let code = if token.is_cancelled() {
                    ErrorCode::RequestCanceled
                } else {
                    ErrorCode::InternalError
                };
                Response::new_err(id.clone(), code as i32, err.to_string())
            }
        };

        cancels.complete(&id);
        if let Err(err) = sender.send(response.into()) {
            log::debug!("failed to send linkedEditingRange response: {err}");
        }
    });
}

fn handle_notification(
    state: &mut ServerState,
    notif: lsp_server::Notification,
) -> anyhow::Result<()> {
    if notif.method == DidOpenTextDocument::METHOD {
        let params: lsp_types::DidOpenTextDocumentParams = serde_json::from_value(notif.params)?;
        let doc = &params.text_document;
        state
            .documents
            .open(&doc.uri, &doc.text, Some(doc.language_id.clone()), doc.version);
        let spec = did_open::handle(&params, state.backend.workspace_root());
        if let Err(err) = state.backend.notify(spec.command, spec.arguments) {
            log::warn!("failed to dispatch didOpen: {err}");
        }
        return Ok(());
    }

    if notif.method == DidChangeTextDocument::METHOD {
        let params: lsp_types::DidChangeTextDocumentParams = serde_json::from_value(notif.params)?;
        let spec = did_change::handle(&params);
        state.documents.apply_changes(
            &params.text_document.uri,
            &params.content_changes,
            params.text_document.version,
        );
        if let Err(err) = state.backend.notify(spec.command, spec.arguments) {
            log::warn!("failed to dispatch didChange: {err}");
        }
        return Ok(());
    }

    if notif.method == DidCloseTextDocument::METHOD {
        let params: lsp_types::DidCloseTextDocumentParams = serde_json::from_value(notif.params)?;
        state.documents.close(&params.text_document.uri);
        let spec = did_close::handle(&params, state.backend.workspace_root());
        if let Err(err) = state.backend.notify(spec.command, spec.arguments) {
            log::warn!("failed to dispatch didClose: {err}");
        }
        return Ok(());
    }

    if notif.method == Cancel::METHOD {
        let params: lsp_types::CancelParams = serde_json::from_value(notif.params)?;
        let id = match params.id {
            lsp_types::NumberOrString::Number(n) => RequestId::from(n),
            lsp_types::NumberOrString::String(s) => RequestId::from(s),
        };
        if !state.cancels.cancel(&id) {
            log::debug!("cancel for unknown or completed request {id:?}");
        }
        return Ok(());
    }

    if notif.method == DidChangeConfiguration::METHOD {
        let params: lsp_types::DidChangeConfigurationParams = serde_json::from_value(notif.params)?;
        if state.config.apply_workspace_settings(&params.settings) {
            log::info!("workspace settings updated; backend launch changes apply on restart");
        }
        return Ok(());
    }

    log::debug!("notification {} ignored", notif.method);
    Ok(())
}

//! =============================================================================
//! Capability Providers
//! =============================================================================
//!
//! The linked-editing capability is supplied through a trait so the adapter
//! can be wired to the shipped backend bridge or to a test double.  This
//! module also locates the backend executable (explicit configuration, local
//! `node_modules/.bin`, and PATH fallbacks) and reports version metadata,
//! keeping the search order deterministic and testable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::Position;
use serde_json::{Value, json};

use crate::cancel::CancellationToken;
use crate::config::BackendLaunchOptions;
use crate::documents::DocumentSnapshot;
use crate::rpc::{Backend, BackendError};
use crate::utils::{lsp_position_to_backend, uri_to_file_path};

/// A language-analysis capability supplying linked editing ranges.
///
/// Implementations receive the resolved document, the request position in
/// wire coordinates, and the caller's cancellation token, which they are
/// expected to observe between waits.  `Ok(None)` means the feature is not
/// applicable at that location; a present payload is normalized by the
/// adapter, so implementations return it raw.
pub trait LinkedEditingRangeProvider: Send + Sync {
    fn provide_linked_editing_ranges(
        &self,
        document: &DocumentSnapshot,
        position: Position,
        token: &CancellationToken,
    ) -> anyhow::Result<Option<Value>>;
}

const CMD_LINKED_EDITING_RANGE: &str = "linkedEditingRange";

/// Message backends use for "nothing applicable here" failures; translated
/// into an empty result instead of an error.
const NO_CONTENT_MESSAGE: &str = "No content available.";

/// Provider implementation that forwards each request to the backend
/// language service over the RPC bridge.
pub struct BackendProvider {
    backend: Arc<Backend>,
}

impl BackendProvider {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }
}

impl LinkedEditingRangeProvider for BackendProvider {
    fn provide_linked_editing_ranges(
        &self,
        document: &DocumentSnapshot,
        position: Position,
        token: &CancellationToken,
    ) -> anyhow::Result<Option<Value>> {
        let file = uri_to_file_path(&document.uri).unwrap_or_else(|| document.uri.clone());
        let pos = lsp_position_to_backend(&position);
        let arguments = json!({
            "file": file,
            "line": pos.line,
            "offset": pos.offset,
        });

        match self.backend.request(CMD_LINKED_EDITING_RANGE, arguments, token) {
            Ok(body) => Ok(body),
            Err(BackendError::RequestFailed { message }) if message == NO_CONTENT_MESSAGE => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Captures everything needed to spawn a backend instance.
#[derive(Debug, Clone)]
pub struct BackendBinary {
    pub executable: PathBuf,
    pub version: Option<String>,
    pub source: BinarySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySource {
    Configured,
    LocalNodeModules,
    GlobalPath,
}

/// Caches the workspace root and lazily resolves the backend binary when the
/// RPC service boots up.
#[derive(Debug)]
pub struct BackendLocator {
    workspace_root: PathBuf,
}

impl BackendLocator {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let root = workspace_root
            .into()
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            workspace_root: root,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolves the backend executable by inspecting (in order):
    /// 1. The explicitly configured command path.
    /// 2. `node_modules/.bin/{name}` in workspace ancestors.
    /// 3. `{name}` on PATH (via `which`).
    pub fn resolve(&self, options: &BackendLaunchOptions) -> Result<BackendBinary, DiscoveryError> {
        if let Some(command) = &options.command {
            let executable = if command.is_absolute() || command.exists() {
                command.clone()
            } else {
                which::which(command).map_err(DiscoveryError::PathLookup)?
            };
            return Ok(BackendBinary {
                executable,
                version: None,
                source: BinarySource::Configured,
            });
        }

        if let Some(path) = self.find_local_bin(&options.command_name) {
            let version = infer_version(&path, &options.command_name);
            return Ok(BackendBinary {
                executable: path,
                version,
                source: BinarySource::LocalNodeModules,
            });
        }

        match which::which(&options.command_name) {
            Ok(path) => Ok(BackendBinary {
                executable: path,
                version: None,
                source: BinarySource::GlobalPath,
            }),
            Err(which::Error::CannotFindBinaryPath) => Err(DiscoveryError::NotFound {
                name: options.command_name.clone(),
                root: self.workspace_root.clone(),
            }),
            Err(err) => Err(DiscoveryError::PathLookup(err)),
        }
    }

    fn find_local_bin(&self, name: &str) -> Option<PathBuf> {
        find_upwards(&self.workspace_root, &["node_modules", ".bin", name])
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("unable to locate backend `{name}` starting at {root:?}")]
    NotFound { name: String, root: PathBuf },
    #[error("failed to look up backend on PATH: {0}")]
    PathLookup(which::Error),
}

fn find_upwards(start: &Path, segments: &[&str]) -> Option<PathBuf> {
    for ancestor in start.ancestors() {
        let candidate = segments
            .iter()
            .fold(PathBuf::from(ancestor), |mut acc, segment| {
                acc.push(segment);
                acc
            });

        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

fn infer_version(bin: &Path, name: &str) -> Option<String> {
    let node_modules = bin.parent()?.parent()?;
    let package_json = node_modules.join(name).join("package.json");
    let contents = fs::read_to_string(package_json).ok()?;
    let json: Value = serde_json::from_str(&contents).ok()?;
    json.get("version")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp workspace");
        let bin = dir.path().join("node_modules/.bin");
        fs::create_dir_all(&bin).expect("create .bin");
        fs::write(bin.join("linkedit-backend"), "#!/bin/sh\n").expect("write bin stub");
        let package = dir.path().join("node_modules/linkedit-backend");
        fs::create_dir_all(&package).expect("create package dir");
        fs::write(
            package.join("package.json"),
            r#"{"name":"linkedit-backend","version":"1.2.3"}"#,
        )
        .expect("write package.json");
        dir
    }

    #[test]
    fn configured_command_short_circuits_discovery() {
        let workspace = fixture_workspace();
        let explicit = workspace.path().join("custom-backend");
        fs::write(&explicit, "#!/bin/sh\n").expect("write explicit stub");

        let locator = BackendLocator::new(workspace.path());
        let options = BackendLaunchOptions {
            command: Some(explicit.clone()),
            ..BackendLaunchOptions::default()
        };

        let binary = locator.resolve(&options).expect("explicit command resolves");
        assert_eq!(binary.source, BinarySource::Configured);
        assert_eq!(binary.executable, explicit);
    }

    #[test]
    fn local_node_modules_bin_wins_over_path() {
        let workspace = fixture_workspace();
        let nested = workspace.path().join("packages/app/src");
        fs::create_dir_all(&nested).expect("create nested dir");

        let locator = BackendLocator::new(&nested);
        let binary = locator
            .resolve(&BackendLaunchOptions::default())
            .expect("workspace bin resolves");

        assert_eq!(binary.source, BinarySource::LocalNodeModules);
        assert_eq!(binary.version.as_deref(), Some("1.2.3"));
        assert!(binary.executable.ends_with("node_modules/.bin/linkedit-backend"));
    }

    #[test]
    fn missing_backend_reports_workspace_root() {
        let workspace = tempfile::tempdir().expect("temp workspace");
        let locator = BackendLocator::new(workspace.path());
        let options = BackendLaunchOptions {
            command_name: "definitely-not-installed-backend".to_string(),
            ..BackendLaunchOptions::default()
        };

        match locator.resolve(&options) {
            Err(DiscoveryError::NotFound { name, .. }) => {
                assert_eq!(name, "definitely-not-installed-backend");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}

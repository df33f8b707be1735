//! =============================================================================
//! Configuration And Settings
//! =============================================================================
//!
//! Owns every user-facing knob (backend command and arguments, request
//! deadline) and exposes typed structures that other subsystems borrow.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};

/// Command name searched for when no explicit backend path is configured.
pub const DEFAULT_BACKEND_COMMAND: &str = "linkedit-backend";

/// Settings evaluated once at startup and refreshed through
/// `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub backend: BackendLaunchOptions,
}

/// Everything needed to locate and spawn the backend language service.
#[derive(Debug, Clone)]
pub struct BackendLaunchOptions {
    /// Explicit executable path; skips discovery entirely when set.
    pub command: Option<PathBuf>,
    /// Command name used for discovery when `command` is unset.
    pub command_name: String,
    pub args: Vec<String>,
    /// Deadline applied while waiting on a single backend response; `None`
    /// disables the deadline entirely.
    pub request_timeout: Option<Duration>,
}

impl Default for BackendLaunchOptions {
    fn default() -> Self {
        Self {
            command: None,
            command_name: DEFAULT_BACKEND_COMMAND.to_string(),
            args: Vec::new(),
            request_timeout: Some(Duration::from_secs(15)),
        }
    }
}

/// Global configuration facade that hands out read-only handles to the
/// settings and absorbs `workspace/didChangeConfiguration` payloads.
#[derive(Debug, Default)]
pub struct Config {
    settings: Settings,
}

impl Config {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Applies workspace/didChangeConfiguration payloads to the cached
    /// settings. Returns `true` when any recognized option changed.  A
    /// changed backend command only takes effect on the next spawn.
    pub fn apply_workspace_settings(&mut self, settings: &Value) -> bool {
        apply_settings_tree(settings, &mut self.settings)
    }
}

fn apply_settings_tree(value: &Value, settings: &mut Settings) -> bool {
    let mut changed = false;
    if let Some(map) = value.as_object() {
        changed |= settings.update_from_map(map);

        for key in POSSIBLE_SETTING_ROOTS {
            if let Some(candidate) = map.get(*key) {
                changed |= apply_settings_tree(candidate, settings);
            }
        }

        if let Some(backend_section) = map.get("backend") {
            changed |= apply_settings_tree(backend_section, settings);
        }
    }
    changed
}

const POSSIBLE_SETTING_ROOTS: &[&str] = &[
    "linkedit",
    "linkEdit",
    "linked-editing",
    "linkedEditing",
    "linked_editing",
];

impl Settings {
    fn update_from_map(&mut self, map: &Map<String, Value>) -> bool {
        let mut changed = false;

        if let Some(value) = map.get("command").and_then(|v| v.as_str()) {
            let command = PathBuf::from(value);
            if self.backend.command.as_deref() != Some(command.as_path()) {
                self.backend.command = Some(command);
                changed = true;
            }
        }

        if let Some(value) = map.get("command_name").and_then(|v| v.as_str()) {
            if self.backend.command_name != value {
                self.backend.command_name = value.to_string();
                changed = true;
            }
        }

        if let Some(values) = map.get("args").and_then(|v| v.as_array()) {
            let args: Vec<String> = values
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect();
            if self.backend.args != args {
                self.backend.args = args;
                changed = true;
            }
        }

        if let Some(value) = map.get("request_timeout_ms").and_then(|v| v.as_u64()) {
            let timeout = (value > 0).then(|| Duration::from_millis(value));
            if self.backend.request_timeout != timeout {
                self.backend.request_timeout = timeout;
                changed = true;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workspace_settings_are_found_under_known_roots() {
        let mut config = Config::default();
        let changed = config.apply_workspace_settings(&json!({
            "linkedit": {
                "backend": {
                    "command": "/opt/backend/bin/ls",
                    "request_timeout_ms": 2500,
                }
            }
        }));

        assert!(changed);
        let backend = &config.settings().backend;
        assert_eq!(backend.command.as_deref(), Some(std::path::Path::new("/opt/backend/bin/ls")));
        assert_eq!(backend.request_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn reapplying_identical_settings_reports_no_change() {
        let mut config = Config::default();
        let payload = json!({"linkedit": {"backend": {"args": ["--strict"]}}});

        assert!(config.apply_workspace_settings(&payload));
        assert!(!config.apply_workspace_settings(&payload));
        assert_eq!(config.settings().backend.args, vec!["--strict".to_string()]);
    }

    #[test]
    fn unrecognized_payloads_leave_settings_untouched() {
        let mut config = Config::default();
        assert!(!config.apply_workspace_settings(&json!({"other-tool": {"mode": "x"}})));
        assert_eq!(
            config.settings().backend.command_name,
            DEFAULT_BACKEND_COMMAND
        );
    }
}

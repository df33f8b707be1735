//! =============================================================================
//! RPC Bridge
//! =============================================================================
//!
//! This layer glues the LSP front end to the backend language service.
//! * lazy process startup against the discovered binary
//! * sequence assignment and response correlation
//! * blocking request waits that poll the caller's cancellation token

mod pending;
pub use pending::PendingResponses;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::config::BackendLaunchOptions;
use crate::process::BackendProcess;
use crate::provider::BackendLocator;
use crate::types::{BackendRequest, BackendResponseHead};

/// Interval between cancellation checks while a request waits for its
/// response.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Facade over the backend process shared by the server loop and the feature
/// workers.  Writes are serialized behind the process lock; waits happen on
/// per-request channels so no lock is held while a response is outstanding.
pub struct Backend {
    locator: BackendLocator,
    launch: BackendLaunchOptions,
    process: Mutex<Option<BackendProcess>>,
    pending: Arc<PendingResponses>,
    seq: AtomicU64,
}

impl Backend {
    pub fn new(locator: BackendLocator, launch: BackendLaunchOptions) -> Self {
        Self {
            locator,
            launch,
            process: Mutex::new(None),
            pending: Arc::new(PendingResponses::default()),
            seq: AtomicU64::new(0),
        }
    }

    /// Bootstraps the backend process once; later calls are no-ops.
    pub fn start(&self) -> Result<(), BackendError> {
        let mut guard = self.process.lock().expect("backend process lock poisoned");
        if guard.is_some() {
            return Ok(());
        }

        let binary = self.locator.resolve(&self.launch)?;
        log::info!(
            "starting backend {:?} (version {})",
            binary.executable,
            binary.version.as_deref().unwrap_or("unknown")
        );

        let mut process = BackendProcess::new(binary, self.launch.clone());
        process.start()?;
        let rx = process.response_rx().ok_or(BackendError::NotStarted)?;
        spawn_drain(rx, Arc::clone(&self.pending));
        *guard = Some(process);
        Ok(())
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        self.locator.workspace_root()
    }

    /// Sends a fire-and-forget command (document sync traffic).
    pub fn notify(&self, command: &str, arguments: Value) -> Result<(), BackendError> {
        let seq = self.next_seq();
        let payload = serde_json::to_value(BackendRequest::new(seq, command, arguments))?;
        self.write(&payload)
    }

    /// Sends a command and blocks until its response, the configured
    /// deadline, or cancellation.  Returns the response `body`, absent when
    /// the backend answered success with no content.
    pub fn request(
        &self,
        command: &str,
        arguments: Value,
        token: &CancellationToken,
    ) -> Result<Option<Value>, BackendError> {
        let seq = self.next_seq();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.pending.register(seq, reply_tx);

        let payload = match serde_json::to_value(BackendRequest::new(seq, command, arguments)) {
            Ok(payload) => payload,
            Err(err) => {
                self.pending.forget(seq);
                return Err(err.into());
            }
        };
        if let Err(err) = self.write(&payload) {
            self.pending.forget(seq);
            return Err(err);
        }

        let deadline = self
            .launch
            .request_timeout
            .map(|timeout| Instant::now() + timeout);
        loop {
            match reply_rx.recv_timeout(POLL_INTERVAL) {
                Ok(response) => return finish_response(response),
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_cancelled() {
                        self.pending.forget(seq);
                        if let Err(err) = self.signal_cancel(seq) {
                            log::debug!("failed to signal cancellation for seq {seq}: {err}");
                        }
                        return Err(BackendError::Cancelled);
                    }
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        self.pending.forget(seq);
                        return Err(BackendError::Timeout);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.pending.forget(seq);
                    return Err(BackendError::Disconnected);
                }
            }
        }
    }

    fn write(&self, payload: &Value) -> Result<(), BackendError> {
        self.start()?;
        let mut guard = self.process.lock().expect("backend process lock poisoned");
        let process = guard.as_mut().ok_or(BackendError::NotStarted)?;
        process.write(payload)?;
        Ok(())
    }

    fn signal_cancel(&self, seq: u64) -> Result<(), BackendError> {
        let guard = self.process.lock().expect("backend process lock poisoned");
        let process = guard.as_ref().ok_or(BackendError::NotStarted)?;
        process.cancel(seq)?;
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

fn finish_response(response: Value) -> Result<Option<Value>, BackendError> {
    let head = BackendResponseHead::parse(&response).ok_or(BackendError::MalformedResponse)?;
    if head.success.unwrap_or(false) {
        let body = response.get("body").cloned().filter(|body| !body.is_null());
        Ok(body)
    } else {
        Err(BackendError::RequestFailed {
            message: head
                .message
                .unwrap_or_else(|| "backend request failed".to_string()),
        })
    }
}

/// Routes backend traffic off the reader channel: responses are delivered to
/// their registered waiter, everything else (events, stray responses) is
/// logged at trace level.  The drain exits when the reader channel closes.
fn spawn_drain(rx: Receiver<Value>, pending: Arc<PendingResponses>) {
    let _ = thread::spawn(move || {
        for payload in rx.iter() {
            let Some(head) = BackendResponseHead::parse(&payload) else {
                log::trace!("backend -> unparseable message {payload}");
                continue;
            };
            if head.is_response() {
                if let Some(seq) = head.request_seq {
                    if let Some(reply) = pending.resolve(seq) {
                        let _ = reply.send(payload);
                        continue;
                    }
                }
                log::trace!("backend -> unclaimed response {payload}");
            } else {
                log::trace!("backend -> {payload}");
            }
        }
    });
}

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Discovery(#[from] crate::provider::DiscoveryError),
    #[error("failed interaction with backend process: {0}")]
    Process(#[from] crate::process::ProcessError),
    #[error("failed to serialize backend request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("backend process not started yet")]
    NotStarted,
    #[error("backend request failed: {message}")]
    RequestFailed { message: String },
    #[error("backend response missing routing envelope")]
    MalformedResponse,
    #[error("backend request timed out")]
    Timeout,
    #[error("request cancelled by the client")]
    Cancelled,
    #[error("backend connection closed")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn successful_responses_yield_their_body() {
        let body = finish_response(json!({
            "type": "response",
            "request_seq": 1,
            "success": true,
            "body": {"ranges": []},
        }))
        .expect("success response resolves");
        assert_eq!(body, Some(json!({"ranges": []})));
    }

    #[test]
    fn success_without_body_is_no_content() {
        let body = finish_response(json!({
            "type": "response",
            "request_seq": 1,
            "success": true,
        }))
        .expect("bodyless success resolves");
        assert!(body.is_none());

        let body = finish_response(json!({
            "type": "response",
            "request_seq": 2,
            "success": true,
            "body": null,
        }))
        .expect("null body resolves");
        assert!(body.is_none());
    }

    #[test]
    fn failed_responses_carry_the_backend_message() {
        let err = finish_response(json!({
            "type": "response",
            "request_seq": 1,
            "success": false,
            "message": "No content available.",
        }))
        .expect_err("failure response errors");
        match err {
            BackendError::RequestFailed { message } => {
                assert_eq!(message, "No content available.");
            }
            other => panic!("expected RequestFailed, got {other}"),
        }
    }
}

//! =============================================================================
//! Cooperative Cancellation
//! =============================================================================
//!
//! A request's token is created by the server loop, handed to the worker that
//! services the request, and flipped when the client sends `$/cancelRequest`.
//! Providers poll the token between waits; nothing here aborts work forcibly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lsp_server::RequestId;

/// Shared cancellation flag.  Clones observe the same underlying state, so
/// the token can be forwarded to a provider verbatim while the registry keeps
/// its own handle.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tracks the token for every in-flight request so `$/cancelRequest` can be
/// routed by upstream request id.
#[derive(Default)]
pub struct CancelRegistry {
    inflight: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl CancelRegistry {
    /// Registers a fresh token for `id` and returns the clone to forward.
    pub fn register(&self, id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.inflight
            .lock()
            .expect("cancel registry poisoned")
            .insert(id, token.clone());
        token
    }

    /// Flips the token for `id`.  Returns false when the request already
    /// completed (or never existed); cancels are best-effort.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let inflight = self.inflight.lock().expect("cancel registry poisoned");
        match inflight.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the token once its request has been answered.
    pub fn complete(&self, id: &RequestId) {
        self.inflight
            .lock()
            .expect("cancel registry poisoned")
            .remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let forwarded = token.clone();
        assert!(!forwarded.is_cancelled());
        token.cancel();
        assert!(forwarded.is_cancelled());
    }

    #[test]
    fn registry_cancels_only_inflight_requests() {
        let registry = CancelRegistry::default();
        let id = RequestId::from(1);
        let token = registry.register(id.clone());

        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());

        registry.complete(&id);
        assert!(!registry.cancel(&id));
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use crossbeam_channel::Sender;
use serde_json::Value;

/// Correlation table mapping in-flight sequence numbers to the channel their
/// response should be delivered on.  Entries are removed on resolution, and
/// waiters that give up (timeout, cancellation) forget their entry so the
/// table does not accumulate dead senders.
#[derive(Default)]
pub struct PendingResponses {
    entries: Mutex<HashMap<u64, Sender<Value>>>,
}

impl PendingResponses {
    pub fn register(&self, seq: u64, reply: Sender<Value>) {
        self.entries
            .lock()
            .expect("pending table poisoned")
            .insert(seq, reply);
    }

    /// Takes the reply channel for `seq`, if a waiter is still interested.
    pub fn resolve(&self, seq: u64) -> Option<Sender<Value>> {
        self.entries
            .lock()
            .expect("pending table poisoned")
            .remove(&seq)
    }

    pub fn forget(&self, seq: u64) {
        self.entries
            .lock()
            .expect("pending table poisoned")
            .remove(&seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_takes_the_registered_sender_once() {
        let pending = PendingResponses::default();
        let (tx, rx) = crossbeam_channel::bounded(1);
        pending.register(3, tx);

        let sender = pending.resolve(3).expect("sender registered");
        sender.send(json!({"request_seq": 3})).expect("receiver alive");
        assert_eq!(rx.recv().expect("response delivered")["request_seq"], 3);

        assert!(pending.resolve(3).is_none());
    }

    #[test]
    fn forgotten_entries_are_not_resolved() {
        let pending = PendingResponses::default();
        let (tx, _rx) = crossbeam_channel::bounded(1);
        pending.register(9, tx);
        pending.forget(9);
        assert!(pending.resolve(9).is_none());
    }
}

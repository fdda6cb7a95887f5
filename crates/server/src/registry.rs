//! Shared registry of live calls (spec §5 "Shared resources": "the HTTP
//! session is shared across calls; WS connections are per session").
//! Populated as calls are answered/placed by whatever wires the opaque SIP
//! binding (spec §1 Non-goals, §6 "SIP/media") to a `CallDialogEngine`, and
//! consulted by the operator REST handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use callbridge_engine::CallDialogEngine;

/// `session_id -> CallDialogEngine` map, one entry per live call, plus an
/// alias from the native SIP call id (what the RTP frame callback carries)
/// to the same session id (what the operator REST surface carries).
#[derive(Default)]
pub struct CallRegistry {
    calls: RwLock<HashMap<String, Arc<CallDialogEngine>>>,
    call_ids: RwLock<HashMap<String, String>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-confirmed call under both its native `call_id` and
    /// its backend `session_id`.
    pub fn register(&self, session_id: String, call_id: String, engine: Arc<CallDialogEngine>) {
        self.call_ids.write().insert(call_id, session_id.clone());
        self.calls.write().insert(session_id, engine);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<CallDialogEngine>> {
        self.calls.read().get(session_id).cloned()
    }

    /// Look up by the native SIP call id instead of the backend session id.
    pub fn get_by_call_id(&self, call_id: &str) -> Option<Arc<CallDialogEngine>> {
        let session_id = self.call_ids.read().get(call_id).cloned()?;
        self.get(&session_id)
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<CallDialogEngine>> {
        let removed = self.calls.write().remove(session_id);
        if removed.is_some() {
            self.call_ids.write().retain(|_, sid| sid != session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.calls.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live engine, for graceful-shutdown drain.
    pub fn snapshot(&self) -> Vec<Arc<CallDialogEngine>> {
        self.calls.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_has_no_entries() {
        let registry = CallRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("missing").is_none());
    }
}

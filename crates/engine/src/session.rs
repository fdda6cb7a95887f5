//! The per-call `Session` record (spec §3 "Call/Session").
//!
//! Grounded on the teacher's `VoiceSession` (`voice_session.rs`): a plain
//! struct of `Arc`/`Instant` fields behind a single lock, constructed once
//! per call and owned by the dialog engine for its lifetime. The task map
//! and message queue are the spec's addition over the teacher's shape.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use callbridge_core::{DialogState, SessionId};

use crate::audio_message::AudioMessage;

/// Everything the dialog engine tracks for one call (spec §3).
pub struct Session {
    pub session_id: SessionId,
    pub conversation_id: Option<String>,
    pub user_id: String,
    pub display_name: String,
    pub bot_type: String,

    state: DialogState,
    pub call_start: Instant,
    pub speech_start: Option<Instant>,
    pub speculation_start: Option<Instant>,
    pub reply_start: Option<Instant>,

    pub queue: VecDeque<Arc<AudioMessage>>,
    pub unstable_speech_result: Option<String>,
    pub transfer_uri: Option<String>,
    pub transfer_delay_ms: Option<u64>,
    pub close_status: Option<String>,

    /// Held true while a `COMMIT` is in progress, suspending long-pause
    /// detection (spec §4.3 "external mutators").
    pub long_pause_suspended: bool,
}

impl Session {
    pub fn new(session_id: SessionId, user_id: String, display_name: String, bot_type: String) -> Self {
        Self {
            session_id,
            conversation_id: None,
            user_id,
            display_name,
            bot_type,
            state: DialogState::WaitForUser,
            call_start: Instant::now(),
            speech_start: None,
            speculation_start: None,
            reply_start: None,
            queue: VecDeque::new(),
            unstable_speech_result: None,
            transfer_uri: None,
            transfer_delay_ms: None,
            close_status: None,
            long_pause_suspended: false,
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    /// Refuses the transition if the current state is sticky (spec §4.7).
    /// Returns whether the transition was applied.
    pub fn set_state(&mut self, new_state: DialogState) -> bool {
        if self.state.is_sticky() {
            return false;
        }
        self.state = new_state;
        true
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_states_refuse_further_transitions() {
        let mut s = Session::new("sid".into(), "u".into(), "d".into(), "bot".into());
        assert!(s.set_state(DialogState::Finished));
        assert_eq!(s.state(), DialogState::Finished);
        assert!(!s.set_state(DialogState::WaitForUser));
        assert_eq!(s.state(), DialogState::Finished);
    }
}

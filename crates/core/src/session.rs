//! Shared identifiers and state enums for a call/session.
//!
//! The full `Session` record (task map, pending audio queue, timestamps)
//! lives in `callbridge-engine` next to the dialog engine that owns it;
//! this crate only holds the value types every other crate needs to name
//! a session or a state without depending on the engine crate.

use serde::{Deserialize, Serialize};

/// Backend-assigned session identifier.
pub type SessionId = String;

/// The dialog engine's state machine (spec §4.7).
///
/// `Finished` and `HangedUp` are sticky: once entered, further transition
/// requests are refused by the engine that owns this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DialogState {
    #[default]
    WaitForUser,
    SpeculativeGenerate,
    CommitGenerate,
    Finished,
    HangedUp,
}

impl DialogState {
    /// `Finished`/`HangedUp` never transition out once entered.
    pub fn is_sticky(self) -> bool {
        matches!(self, DialogState::Finished | DialogState::HangedUp)
    }
}

/// Names of the background tasks the dialog engine tracks, one handle per
/// name at a time (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskName {
    Start,
    Commit,
}

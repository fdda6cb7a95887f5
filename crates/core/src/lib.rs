//! Core types shared across the voice-call bridge:
//! audio frames and PCM conversion, the session/dialog-state vocabulary,
//! and the crate-crossing error type.

pub mod audio;
pub mod error;
pub mod session;

pub use audio::{AudioBuffer, AudioEncoding, AudioFrame, Channels, SampleRate};
pub use error::{Error, Result};
pub use session::{DialogState, SessionId, TaskName};

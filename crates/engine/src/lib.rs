//! Call Dialog Engine crate: per-call task bookkeeping (C5), lazy TTS
//! messages (C6), and the dialog state machine (C7) that ties the
//! streaming VAD processor (C3) to the backend session client (C8) and
//! the SmartPlayer (C4).

pub mod audio_message;
pub mod dialog_engine;
pub mod error;
pub mod session;
pub mod task_manager;

pub use audio_message::AudioMessage;
pub use dialog_engine::CallDialogEngine;
pub use error::EngineError;
pub use session::Session;
pub use task_manager::{TaskHandle, TaskManager};

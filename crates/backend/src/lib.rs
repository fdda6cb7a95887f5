//! Backend Session Client (C8): HTTP+WS protocol to the conversational
//! backend, plus the STT/TTS HTTP adapters the dialog engine calls through.

pub mod error;
pub mod session_client;
pub mod stt;
pub mod tts;

pub use error::BackendError;
pub use session_client::{CommitResponse, OpenedSession, SessionClient, WsEvent};
pub use stt::SttClient;
pub use tts::TtsClient;

//! Playback and WAV I/O for the call bridge: the SmartPlayer FIFO queue
//! (C4) and the WAV file layout the spec's recording and synthesis paths
//! share.

pub mod error;
pub mod player;
pub mod sip;
pub mod wav;

pub use error::MediaError;
pub use player::{AudioFile, SmartPlayer};
pub use sip::{CallBinding, CallControl, CallEvents, CallPlacer, LoopbackBinding, MediaSink, PlaybackHandle, Recorder};

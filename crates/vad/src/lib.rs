//! Voice activity detection stack for the call bridge: neural VAD
//! inference (C1), foreground-speech discrimination (C2), and the
//! streaming window/pause-classification processor (C3).

pub mod dynamic_correction;
pub mod engine;
pub mod error;
pub mod streaming;

pub use dynamic_correction::{DynamicCorrection, DynamicCorrectionConfig};
pub use engine::{VadEngine, VadHiddenState, SAMPLE_RATE, WINDOW_SAMPLES};
pub use error::VadError;
pub use streaming::{StreamingVad, VadEvent};

//! Centralized defaults mirrored by `Settings`, for code paths that need a
//! bare constant (tests, the VAD crate's own unit tests) without pulling in
//! the whole `Settings` record.

/// Audio/VAD signal-processing defaults.
pub mod audio {
    pub const SAMPLE_RATE: u32 = 16_000;
    pub const WINDOW_SAMPLES: usize = 512;
    pub const PCM16_NORMALIZE: f32 = 32768.0;
    pub const PCM16_SCALE: f32 = 32767.0;
}

/// VAD Engine + Dynamic Correction defaults (spec §4.1, §4.2, §6).
pub mod vad {
    pub const THRESHOLD: f32 = 0.65;
    pub const MIN_SPEECH_DURATION_MS: u32 = 150;
    pub const MIN_SILENCE_DURATION_MS: u32 = 300;
    pub const SPEECH_PAD_MS: u32 = 700;
    pub const SPEECH_PROB_WINDOW: usize = 3;

    pub const USE_DYNAMIC_CORRECTIONS: bool = true;
    pub const CORRECTION_ENTER_THRESHOLD: f32 = 0.6;
    pub const CORRECTION_EXIT_THRESHOLD: f32 = 0.4;

    pub const INITIAL_ADAPT_FRAMES: usize = 50;
    pub const INITIAL_NOISE_ALPHA: f32 = 0.15;
    pub const NOISE_ALPHA: f32 = 0.02;
    pub const PEAK_DECAY: f32 = 0.05;
    pub const SPEECH_PROB_THRESHOLD: f32 = 0.3;
    pub const MIN_SPEECH_FRAMES_FOR_VARIANCE: usize = 3;
    pub const TRANSITION_RANGE_THRESHOLD: f32 = 0.4;
    pub const EARLY_PROB_BOOST: f32 = 0.20;
    pub const EARLY_ENTER_THRESHOLD: f32 = 0.30;
    pub const EARLY_PHASE_FRAMES: u32 = 200;

    pub const SCORE_WEIGHT_PROB: f32 = 0.60;
    pub const SCORE_WEIGHT_SNR: f32 = 0.15;
    pub const SCORE_WEIGHT_VAR: f32 = 0.05;
    pub const SCORE_WEIGHT_ENERGY: f32 = 0.20;
}

/// Pause classification and dialog timing defaults (spec §4.3, §4.7, §6).
pub mod pause {
    pub const SHORT_PAUSE_OFFSET_MS: u32 = 200;
    pub const LONG_PAUSE_OFFSET_MS: u32 = 850;
    pub const USER_SILENCE_TIMEOUT_MS: u32 = 60_000;
    /// Minimum accumulated speech duration before a short pause is honored.
    pub const MIN_UTTERANCE_MS_FOR_SHORT_PAUSE: u32 = 2_500;
}

/// HTTP client timeout triple shared by the backend session client and the
/// STT/TTS adapters (spec §5 "Cancellation" / "Timeouts").
pub mod http {
    pub const TOTAL_TIMEOUT_SECS: u64 = 60;
    pub const CONNECT_TIMEOUT_SECS: u64 = 60;
    pub const READ_TIMEOUT_SECS: u64 = 60;
    pub const WS_RECONNECT_BACKOFF_SECS: u64 = 5;
}

/// Playback/audio-message thresholds (spec §4.6, §6).
pub mod media {
    /// WAV blobs shorter than this are "too short to play" (spec §4.6/§9 open question).
    pub const MIN_PLAYABLE_BLOB_BYTES: usize = 364;
}

/// Call-teardown and transfer timing (spec §4.7 "Soft hangup").
pub mod dialog {
    pub const SOFT_HANGUP_PAUSE_MS: u64 = 500;
    pub const DEFAULT_TRANSFER_DELAY_MS: u64 = 4_000;
    /// Minimum accumulated speech duration before a short pause is honored
    /// (spec §4.7; mirrors `pause::MIN_UTTERANCE_MS_FOR_SHORT_PAUSE`).
    pub const MIN_UTTERANCE_MS_FOR_SHORT_PAUSE: u32 = super::pause::MIN_UTTERANCE_MS_FOR_SHORT_PAUSE;
}

//! Process-wide immutable configuration record.
//!
//! Built once at startup from environment variables (spec §6) and handed
//! out by `Arc` — per Design Note "Global configuration", nothing in this
//! crate re-reads the environment per call.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// VAD + dynamic-correction tuning (spec §6 `VAD_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u32,
    #[serde(default = "default_min_silence_duration_ms")]
    pub min_silence_duration_ms: u32,
    #[serde(default = "default_speech_pad_ms")]
    pub speech_pad_ms: u32,
    #[serde(default = "default_speech_prob_window")]
    pub speech_prob_window: usize,
    #[serde(default = "default_use_dynamic_corrections")]
    pub use_dynamic_corrections: bool,
    #[serde(default = "default_correction_enter_threshold")]
    pub correction_enter_threshold: f32,
    #[serde(default = "default_correction_exit_threshold")]
    pub correction_exit_threshold: f32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: default_vad_threshold(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
            min_silence_duration_ms: default_min_silence_duration_ms(),
            speech_pad_ms: default_speech_pad_ms(),
            speech_prob_window: default_speech_prob_window(),
            use_dynamic_corrections: default_use_dynamic_corrections(),
            correction_enter_threshold: default_correction_enter_threshold(),
            correction_exit_threshold: default_correction_exit_threshold(),
        }
    }
}

fn default_vad_threshold() -> f32 {
    crate::constants::vad::THRESHOLD
}
fn default_min_speech_duration_ms() -> u32 {
    crate::constants::vad::MIN_SPEECH_DURATION_MS
}
fn default_min_silence_duration_ms() -> u32 {
    crate::constants::vad::MIN_SILENCE_DURATION_MS
}
fn default_speech_pad_ms() -> u32 {
    crate::constants::vad::SPEECH_PAD_MS
}
fn default_speech_prob_window() -> usize {
    crate::constants::vad::SPEECH_PROB_WINDOW
}
fn default_use_dynamic_corrections() -> bool {
    crate::constants::vad::USE_DYNAMIC_CORRECTIONS
}
fn default_correction_enter_threshold() -> f32 {
    crate::constants::vad::CORRECTION_ENTER_THRESHOLD
}
fn default_correction_exit_threshold() -> f32 {
    crate::constants::vad::CORRECTION_EXIT_THRESHOLD
}

/// SIP account settings (spec §6 `SIP_*`); consumed only by the opaque
/// SIP binding, never read elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SipSettings {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub caller_id: String,
    #[serde(default)]
    pub early_eoc: bool,
}

/// Process-wide settings assembled once at startup (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend_url: String,
    #[serde(default)]
    pub authorization_token: String,

    #[serde(default)]
    pub sip: SipSettings,

    #[serde(default)]
    pub vad: VadSettings,

    #[serde(default = "default_short_pause_offset_ms")]
    pub short_pause_offset_ms: u32,
    #[serde(default = "default_long_pause_offset_ms")]
    pub long_pause_offset_ms: u32,
    #[serde(default = "default_user_silence_timeout_ms")]
    pub user_silence_timeout_ms: u32,

    #[serde(default = "default_true")]
    pub interruptions_are_allowed: bool,
    #[serde(default)]
    pub sip_early_eoc: bool,
    #[serde(default)]
    pub record_audio_parts: bool,
    #[serde(default = "default_true")]
    pub is_streaming: bool,

    #[serde(default = "default_wav_dir")]
    pub wav_dir: String,
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Where the VAD ONNX model is cached on disk (spec §4.1 "downloaded
    /// on first run"); downloaded from `vad_model_url` if missing.
    #[serde(default = "default_vad_model_path")]
    pub vad_model_path: String,
    #[serde(default)]
    pub vad_model_url: String,

    /// STT runs against this URL directly instead of the backend's
    /// `/transcribe` when set (spec §6 "STT HTTP" local mode).
    #[serde(default)]
    pub local_stt_url: String,
    #[serde(default = "default_stt_lang")]
    pub stt_lang: String,
}

fn default_stt_lang() -> String {
    "en".to_string()
}

fn default_short_pause_offset_ms() -> u32 {
    crate::constants::pause::SHORT_PAUSE_OFFSET_MS
}
fn default_long_pause_offset_ms() -> u32 {
    crate::constants::pause::LONG_PAUSE_OFFSET_MS
}
fn default_user_silence_timeout_ms() -> u32 {
    crate::constants::pause::USER_SILENCE_TIMEOUT_MS
}
fn default_true() -> bool {
    true
}
fn default_wav_dir() -> String {
    "/tmp/callbridge-wav".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_vad_model_path() -> String {
    "/var/lib/callbridge/vad/silero_vad.onnx".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            authorization_token: String::new(),
            sip: SipSettings::default(),
            vad: VadSettings::default(),
            short_pause_offset_ms: default_short_pause_offset_ms(),
            long_pause_offset_ms: default_long_pause_offset_ms(),
            user_silence_timeout_ms: default_user_silence_timeout_ms(),
            interruptions_are_allowed: true,
            sip_early_eoc: false,
            record_audio_parts: false,
            is_streaming: true,
            wav_dir: default_wav_dir(),
            server_host: default_host(),
            server_port: default_port(),
            vad_model_path: default_vad_model_path(),
            vad_model_url: String::new(),
            local_stt_url: String::new(),
            stt_lang: default_stt_lang(),
        }
    }
}

impl Settings {
    /// Total silence (from speech-end) after which a short pause fires.
    pub fn short_pause_ms(&self) -> u32 {
        self.vad.min_silence_duration_ms + self.short_pause_offset_ms
    }

    /// Total silence (from speech-end) after which a long pause fires.
    pub fn long_pause_ms(&self) -> u32 {
        self.short_pause_ms() + self.long_pause_offset_ms
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "BACKEND_URL".to_string(),
                message: "must be set".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "VAD_THRESHOLD".to_string(),
                message: format!("must be in [0,1], got {}", self.vad.threshold),
            });
        }
        Ok(())
    }
}

/// Load settings from environment variables named exactly as in spec §6
/// (flat names, no prefix/separator — `BACKEND_URL`, `VAD_THRESHOLD`, …).
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .set_default("backend_url", std::env::var("BACKEND_URL").unwrap_or_default())?
        .set_default(
            "authorization_token",
            std::env::var("AUTHORIZATION_TOKEN").unwrap_or_default(),
        )?
        .add_source(Environment::default().try_parsing(true).separator("__"));

    let raw = builder.build()?;
    let mut settings: Settings = raw.try_deserialize().unwrap_or_default();

    // The flat env-var table in spec §6 doesn't nest under `VAD__*` /
    // `SIP__*`, so map it explicitly rather than relying on `Environment`'s
    // separator-based nesting.
    if let Ok(v) = std::env::var("VAD_THRESHOLD") {
        if let Ok(v) = v.parse() {
            settings.vad.threshold = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_MIN_SPEECH_DURATION_MS") {
        if let Ok(v) = v.parse() {
            settings.vad.min_speech_duration_ms = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_MIN_SILENCE_DURATION_MS") {
        if let Ok(v) = v.parse() {
            settings.vad.min_silence_duration_ms = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_SPEECH_PAD_MS") {
        if let Ok(v) = v.parse() {
            settings.vad.speech_pad_ms = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_SPEECH_PROB_WINDOW") {
        if let Ok(v) = v.parse() {
            settings.vad.speech_prob_window = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_USE_DYNAMIC_CORRECTIONS") {
        if let Ok(v) = v.parse() {
            settings.vad.use_dynamic_corrections = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_CORRECTION_ENTER_THRESHOLD") {
        if let Ok(v) = v.parse() {
            settings.vad.correction_enter_threshold = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_CORRECTION_EXIT_THRESHOLD") {
        if let Ok(v) = v.parse() {
            settings.vad.correction_exit_threshold = v;
        }
    }
    if let Ok(v) = std::env::var("SHORT_PAUSE_OFFSET_MS") {
        if let Ok(v) = v.parse() {
            settings.short_pause_offset_ms = v;
        }
    }
    if let Ok(v) = std::env::var("LONG_PAUSE_OFFSET_MS") {
        if let Ok(v) = v.parse() {
            settings.long_pause_offset_ms = v;
        }
    }
    if let Ok(v) = std::env::var("USER_SILENCE_TIMEOUT_MS") {
        if let Ok(v) = v.parse() {
            settings.user_silence_timeout_ms = v;
        }
    }
    if let Ok(v) = std::env::var("INTERRUPTIONS_ARE_ALLOWED") {
        if let Ok(v) = v.parse() {
            settings.interruptions_are_allowed = v;
        }
    }
    if let Ok(v) = std::env::var("SIP_EARLY_EOC") {
        if let Ok(v) = v.parse() {
            settings.sip_early_eoc = v;
            settings.sip.early_eoc = v;
        }
    }
    if let Ok(v) = std::env::var("RECORD_AUDIO_PARTS") {
        if let Ok(v) = v.parse() {
            settings.record_audio_parts = v;
        }
    }
    if let Ok(v) = std::env::var("IS_STREAMING") {
        if let Ok(v) = v.parse() {
            settings.is_streaming = v;
        }
    }
    if let Ok(v) = std::env::var("VAD_MODEL_PATH") {
        settings.vad_model_path = v;
    }
    settings.vad_model_url = std::env::var("VAD_MODEL_URL").unwrap_or_default();
    settings.local_stt_url = std::env::var("LOCAL_STT_URL").unwrap_or_default();
    if let Ok(v) = std::env::var("STT_LANG") {
        settings.stt_lang = v;
    }
    settings.sip.user = std::env::var("SIP_USER").unwrap_or_default();
    settings.sip.login = std::env::var("SIP_LOGIN").unwrap_or_default();
    settings.sip.domain = std::env::var("SIP_DOMAIN").unwrap_or_default();
    settings.sip.password = std::env::var("SIP_PASSWORD").unwrap_or_default();
    settings.sip.caller_id = std::env::var("SIP_CALLER_ID").unwrap_or_default();

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.vad.threshold, 0.65);
        assert_eq!(s.vad.min_speech_duration_ms, 150);
        assert_eq!(s.vad.min_silence_duration_ms, 300);
        assert_eq!(s.short_pause_offset_ms, 200);
        assert_eq!(s.long_pause_offset_ms, 850);
        assert_eq!(s.user_silence_timeout_ms, 60_000);
    }

    #[test]
    fn pause_thresholds_compose() {
        let s = Settings::default();
        assert_eq!(s.short_pause_ms(), 500);
        assert_eq!(s.long_pause_ms(), 1350);
    }

    #[test]
    fn validate_rejects_missing_backend_url() {
        let s = Settings::default();
        assert!(s.validate().is_err());
    }
}

//! STT HTTP adapter (spec §6 "STT HTTP") — local direct endpoint, or the
//! backend's `/transcribe` when no local endpoint is configured.

use std::sync::Arc;
use std::time::Duration;

use callbridge_config::Settings;

use crate::error::BackendError;
use crate::session_client::{parse_transcription, SessionClient};

pub struct SttClient {
    http: reqwest::Client,
    local_url: Option<String>,
    lang: String,
    backend: Arc<SessionClient>,
}

impl SttClient {
    pub fn new(settings: &Settings, backend: Arc<SessionClient>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                callbridge_config::constants::http::TOTAL_TIMEOUT_SECS,
            ))
            .build()?;
        let local_url = (!settings.local_stt_url.is_empty()).then(|| settings.local_stt_url.clone());
        Ok(Self {
            http,
            local_url,
            lang: settings.stt_lang.clone(),
            backend,
        })
    }

    /// Transcribe a WAV buffer. Empty transcriptions are valid, not errors.
    pub async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, BackendError> {
        match &self.local_url {
            Some(url) => self.transcribe_local(url, wav_bytes).await,
            None => self.backend.transcribe(wav_bytes).await,
        }
    }

    async fn transcribe_local(&self, url: &str, wav_bytes: Vec<u8>) -> Result<String, BackendError> {
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("lang", self.lang.clone());
        let resp = self.http.post(url).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        let text = resp.text().await?;
        Ok(parse_transcription(&text))
    }
}

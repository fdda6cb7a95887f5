//! AudioMessage (spec §4.6) — a reply-text chunk with a lazy, memoized TTS
//! future. Grounded on the teacher's pattern of spawning the expensive work
//! eagerly (`tokio::spawn`) and joining it later (`voice_session.rs`'s
//! transport/audio-output tasks); the memoization itself has no teacher
//! counterpart since the sales-bot pipeline never cached synthesis.

use std::time::Instant;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use callbridge_backend::{BackendError, TtsClient};

/// Blobs under this many bytes are "too short to play" (spec §4.6/§9).
pub use callbridge_config::constants::media::MIN_PLAYABLE_BLOB_BYTES;

/// Strip emoji (and other pictographic symbols) before synthesis (spec
/// §4.6 "Emoji-stripped before synthesis").
pub fn strip_emoji(text: &str) -> String {
    text.chars()
        .filter(|c| !is_emoji(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1FAFF
        | 0x2600..=0x27BF
        | 0x2190..=0x21FF
        | 0x2B00..=0x2BFF
        | 0xFE00..=0xFE0F
        | 0x1F1E6..=0x1F1FF
    )
}

/// One reply chunk plus its lazily-synthesized, memoized audio blob (spec
/// §4.6). Constructed already mid-flight: synthesis starts immediately,
/// `get_blob` just joins it the first time it's needed.
pub struct AudioMessage {
    text: String,
    handle: parking_lot::Mutex<Option<JoinHandle<Result<Option<Vec<u8>>, BackendError>>>>,
    blob: OnceCell<Option<Vec<u8>>>,
    blob_ready: tokio::sync::Notify,
}

impl AudioMessage {
    pub fn new(tts: std::sync::Arc<TtsClient>, session_id: String, text: impl Into<String>) -> Self {
        let stripped = strip_emoji(&text.into());
        let synth_text = stripped.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = tts.synthesize(&session_id, &synth_text).await;
            let elapsed = started.elapsed().as_secs_f64();
            metrics::histogram!("callbridge_synthesize_latency_seconds", "session_id" => session_id.clone())
                .record(elapsed);
            result
        });
        Self {
            text: stripped,
            handle: parking_lot::Mutex::new(Some(handle)),
            blob: OnceCell::new(),
            blob_ready: tokio::sync::Notify::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Await the synthesis once; every subsequent call returns the memoized
    /// result. `Ok(None)` means the blob was too short to play.
    pub async fn get_blob(&self) -> Result<Option<Vec<u8>>, BackendError> {
        if let Some(blob) = self.blob.get() {
            return Ok(blob.clone());
        }
        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            // Another caller is already awaiting synthesis; wait for the
            // memo cell to be populated instead of re-spawning.
            loop {
                let ready = self.blob_ready.notified();
                if let Some(blob) = self.blob.get() {
                    return Ok(blob.clone());
                }
                ready.await;
            }
        };
        let result = match handle.await {
            Ok(Ok(blob)) => {
                let _ = self.blob.set(blob.clone());
                Ok(blob)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "tts synthesis failed");
                let _ = self.blob.set(None);
                Err(e)
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "tts synthesis task panicked");
                let _ = self.blob.set(None);
                Ok(None)
            }
        };
        self.blob_ready.notify_waiters();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_emoji_and_collapses_whitespace() {
        assert_eq!(strip_emoji("Hello 👋 there 😀!"), "Hello there !");
        assert_eq!(strip_emoji("no emoji here"), "no emoji here");
    }
}

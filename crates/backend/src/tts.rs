//! TTS HTTP adapter (spec §6 "TTS HTTP") — thin wrapper over the backend's
//! `/session/{id}/synthesize`; blobs under the "too short to play"
//! threshold are reported as `None` rather than an error (spec §9 open
//! question: the 364-byte cutoff is the minimal valid RIFF/WAVE header
//! plus a non-empty `data` chunk).

use std::sync::Arc;

use crate::error::BackendError;
use crate::session_client::SessionClient;

pub struct TtsClient {
    backend: Arc<SessionClient>,
}

impl TtsClient {
    pub fn new(backend: Arc<SessionClient>) -> Self {
        Self { backend }
    }

    pub async fn synthesize(&self, session_id: &str, text: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let bytes = self.backend.synthesize(session_id, text).await?;
        if bytes.len() < callbridge_config::constants::media::MIN_PLAYABLE_BLOB_BYTES {
            return Ok(None);
        }
        Ok(Some(bytes))
    }
}

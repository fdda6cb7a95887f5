//! Process-wide application state (spec §6, §9 "Global configuration"):
//! the shared HTTP/backend clients, the per-process VAD model session, and
//! the live-call registry the operator REST handlers consult.
//!
//! Grounded on the teacher's `AppState` (`server/src/state.rs`): one
//! struct of `Arc`-shared collaborators built once in `main` and cloned
//! into every request handler via axum's `State` extractor.

use std::path::Path;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use callbridge_backend::{SessionClient, SttClient, TtsClient};
use callbridge_config::Settings;
use callbridge_media::{CallBinding, CallPlacer, LoopbackBinding};
use callbridge_vad::VadEngine;

use crate::registry::CallRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub backend: Arc<SessionClient>,
    pub stt: Arc<SttClient>,
    pub tts: Arc<TtsClient>,
    /// Per-process VAD model session (spec §5 "Shared resources": "the VAD
    /// model session is per process; per-call recurrent state is
    /// private").
    pub vad_engine: Arc<VadEngine>,
    pub registry: Arc<CallRegistry>,
    /// Account-level outbound-call surface (spec §6 "SIP/media").
    /// Defaults to `LoopbackBinding`; a real deployment swaps this for its
    /// own SIP binding via `with_call_binding` (the telephony stack itself
    /// is out of scope, spec §1 Non-goals).
    pub call_placer: Arc<dyn CallPlacer>,
    /// Per-call `CallControl`/`MediaSink` factory the incoming-call glue
    /// (`crate::call_events`) looks up by native call id.
    pub call_binding: Arc<dyn CallBinding>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        vad_engine: Arc<VadEngine>,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self, callbridge_backend::BackendError> {
        let backend = Arc::new(SessionClient::new(&settings)?);
        let stt = Arc::new(SttClient::new(&settings, backend.clone())?);
        let tts = Arc::new(TtsClient::new(backend.clone()));
        let binding = Arc::new(LoopbackBinding);
        Ok(Self {
            settings,
            backend,
            stt,
            tts,
            vad_engine,
            registry: Arc::new(CallRegistry::new()),
            call_placer: binding.clone(),
            call_binding: binding,
            metrics_handle,
        })
    }

    /// Swap in a real SIP binding, replacing the default `LoopbackBinding`
    /// for both the outbound-call and incoming-call surfaces.
    pub fn with_call_binding<B>(mut self, binding: Arc<B>) -> Self
    where
        B: CallBinding + CallPlacer + 'static,
    {
        self.call_placer = binding.clone();
        self.call_binding = binding;
        self
    }
}

/// Ensure the VAD model file named by `settings.vad_model_path` exists,
/// downloading it from `settings.vad_model_url` on first run (spec §4.1
/// "Loads a pretrained VAD network from a model file (downloaded on first
/// run from a configured URL)").
pub async fn ensure_vad_model(settings: &Settings) -> Result<(), callbridge_core::Error> {
    let path = Path::new(&settings.vad_model_path);
    if path.exists() {
        return Ok(());
    }
    if settings.vad_model_url.is_empty() {
        return Err(callbridge_core::Error::Fatal(format!(
            "vad model not found at {} and VAD_MODEL_URL is not set",
            settings.vad_model_path
        )));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(callbridge_core::Error::Io)?;
    }
    tracing::info!(url = %settings.vad_model_url, path = %settings.vad_model_path, "downloading vad model");
    let resp = reqwest::get(&settings.vad_model_url)
        .await
        .map_err(|e| callbridge_core::Error::Fatal(format!("failed to download vad model: {e}")))?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| callbridge_core::Error::Fatal(format!("failed to read vad model body: {e}")))?;
    tokio::fs::write(path, &bytes)
        .await
        .map_err(callbridge_core::Error::Io)?;
    Ok(())
}

//! Concrete `CallEvents` glue (spec §9 "rewrite native callbacks"): wires
//! the opaque SIP binding's incoming-call/RTP-frame callbacks to a
//! `CallDialogEngine` per call.
//!
//! Grounded on the teacher's `voice_session.rs` construction site — one
//! session struct stood up per confirmed call, driven by its own event
//! loop — generalized to the spec's explicit `CallEvents`/`CallBinding`
//! seam instead of a native SDK callback.

use std::sync::Arc;

use callbridge_engine::{CallDialogEngine, Session};
use callbridge_media::{CallEvents, SmartPlayer};
use callbridge_vad::StreamingVad;

use crate::metrics;
use crate::state::AppState;

pub struct CallEventHandler {
    state: AppState,
}

impl CallEventHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl CallEvents for CallEventHandler {
    fn on_incoming_call(&self, call_id: &str) {
        let state = self.state.clone();
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = stand_up_call(state, call_id.clone()).await {
                tracing::warn!(call_id = %call_id, error = %e, "failed to stand up call dialog engine");
            }
        });
    }

    fn on_frame_received(&self, call_id: &str, pcm16: &[u8]) {
        let Some(engine) = self.state.registry.get_by_call_id(call_id) else {
            return;
        };
        let samples = pcm16_to_f32(pcm16);
        tokio::spawn(async move {
            if let Err(e) = engine.process_audio(&samples).await {
                tracing::warn!(error = %e, "process_audio failed");
            }
        });
    }
}

/// Build the per-call collaborators (C3/C4/C7) and register the resulting
/// engine, reachable from both the native call id (RTP frames) and the
/// backend session id (operator REST surface).
async fn stand_up_call(state: AppState, call_id: String) -> Result<(), callbridge_core::Error> {
    let call = state.call_binding.call_control(&call_id);
    let sink = state.call_binding.media_sink(&call_id);

    let opened = state
        .backend
        .open_session(serde_json::json!({ "call_id": call_id }), Vec::new())
        .await
        .map_err(|e| callbridge_core::Error::Backend(e.to_string()))?;
    let session_id = opened.session_id;
    metrics::record_call_started();

    let session = Session::new(session_id.clone(), call_id.clone(), call_id.clone(), "voice-agent".to_string());

    let vad = StreamingVad::new(
        state.vad_engine.clone(),
        &state.settings.vad,
        state.settings.short_pause_ms(),
        state.settings.long_pause_ms(),
        state.settings.user_silence_timeout_ms,
    )
    .map_err(|e| callbridge_core::Error::Inference(e.to_string()))?;

    let player = Arc::new(SmartPlayer::new(sink, None));

    let engine = CallDialogEngine::new(
        session,
        vad,
        player,
        call,
        state.backend.clone(),
        state.stt.clone(),
        state.tts.clone(),
        state.settings.clone(),
    );

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    state.backend.clone().spawn_ws(session_id.clone(), tx);
    let ws_engine = engine.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            ws_engine.handle_ws_event(event).await;
        }
    });

    let registry = state.registry.clone();
    let closed_session_id = session_id.clone();
    engine.set_on_closed(Arc::new(move |status| {
        metrics::record_call_ended(status);
        registry.remove(&closed_session_id);
    }));

    state.registry.register(session_id, call_id, engine);
    Ok(())
}

fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect()
}

//! Call Dialog Engine (spec §4.7) — the state machine coordinating
//! streaming VAD events (C3) with speculative/committed backend inference
//! (C8), TTS playback (C4/C6), and the backend's WebSocket reply stream.
//!
//! Grounded on the teacher's `voice_session.rs` task-spawning shape
//! (`tokio::spawn` tasks reading shared `Arc<Mutex<_>>` state, driven by a
//! `tokio::select!` event loop) generalized from the teacher's
//! listen/respond turn-taking to the spec's five-state speculate/commit
//! machine with rollback and barge-in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use callbridge_backend::{CommitResponse, SessionClient, SttClient, TtsClient, WsEvent};
use callbridge_config::Settings;
use callbridge_core::{DialogState, TaskName};
use callbridge_media::{wav, AudioFile, CallControl, SmartPlayer};
use callbridge_vad::{StreamingVad, VadEvent};

use crate::audio_message::{strip_emoji, AudioMessage};
use crate::error::EngineError;
use crate::session::Session;
use crate::task_manager::TaskManager;

/// The per-call state machine (spec §4.7). Owns the VAD processor and the
/// session record; holds `Arc`s to its collaborators (C4/C8 and the opaque
/// SIP call-control surface).
pub struct CallDialogEngine {
    session: Mutex<Session>,
    /// Own internal synchronization (spec §4.5); lives outside the session
    /// mutex so `await_and_delete` never holds `session`'s lock across an
    /// await point.
    tasks: TaskManager<TaskName>,
    vad: Mutex<StreamingVad>,
    player: Arc<SmartPlayer>,
    call: Arc<dyn CallControl>,
    backend: Arc<SessionClient>,
    stt: Arc<SttClient>,
    tts: Arc<TtsClient>,
    settings: Arc<Settings>,
    user_speaking: AtomicBool,
    pump_running: AtomicBool,
    /// Notified once, with the final close status, when `close_session`
    /// finishes (spec §3 "Lifecycle"). Lets the caller that registered
    /// this engine (e.g. a live-call registry) drop its own bookkeeping
    /// without polling `state()`.
    on_closed: std::sync::OnceLock<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl CallDialogEngine {
    pub fn new(
        session: Session,
        vad: StreamingVad,
        player: Arc<SmartPlayer>,
        call: Arc<dyn CallControl>,
        backend: Arc<SessionClient>,
        stt: Arc<SttClient>,
        tts: Arc<TtsClient>,
        settings: Arc<Settings>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            tasks: TaskManager::new(),
            vad: Mutex::new(vad),
            player,
            call,
            backend,
            stt,
            tts,
            settings,
            user_speaking: AtomicBool::new(false),
            pump_running: AtomicBool::new(false),
            on_closed: std::sync::OnceLock::new(),
        })
    }

    /// Register the close callback. A no-op past the first call.
    pub fn set_on_closed(&self, on_closed: Arc<dyn Fn(&str) + Send + Sync>) {
        let _ = self.on_closed.set(on_closed);
    }

    pub fn session_id(&self) -> String {
        self.session.lock().session_id.clone()
    }

    pub fn state(&self) -> DialogState {
        self.session.lock().state()
    }

    /// "speaking" iff a play pump is running OR C4 is active OR the
    /// message queue is non-empty AND the state allows the AI to speak
    /// (spec §4.7 "is_player_active / is_active_ai_speech").
    fn is_active_ai_speech(&self) -> bool {
        if self.pump_running.load(Ordering::SeqCst) || self.player.is_active() {
            return true;
        }
        let session = self.session.lock();
        !session.queue.is_empty()
            && matches!(
                session.state(),
                DialogState::WaitForUser | DialogState::CommitGenerate | DialogState::Finished
            )
    }

    // ---- RTP input path -------------------------------------------------

    /// Feed one arrival-ordered chunk of float32 PCM at 16 kHz (spec §4.7
    /// "RTP input path").
    pub async fn process_audio(self: &Arc<Self>, pcm: &[f32]) -> Result<(), EngineError> {
        let drop_frame = !self.settings.interruptions_are_allowed
            && (self.player.is_active() || self.tasks.contains(TaskName::Commit));
        if drop_frame {
            return Ok(());
        }

        let events = self.vad.lock().process_audio(pcm)?;
        for event in events {
            self.dispatch_vad_event(event).await?;
        }
        Ok(())
    }

    async fn dispatch_vad_event(self: &Arc<Self>, event: VadEvent) -> Result<(), EngineError> {
        match event {
            VadEvent::SpeechStart { .. } => self.on_speech_start().await,
            VadEvent::SpeechEnd { .. } => Ok(()),
            VadEvent::ShortPause { audio } => self.on_short_pause(audio).await,
            VadEvent::LongPause { audio } => self.on_long_pause(audio).await,
            VadEvent::UserSalienceTimeout { .. } => self.on_user_salience_timeout().await,
        }
    }

    // ---- Pause callbacks → state transitions -----------------------------

    async fn on_speech_start(self: &Arc<Self>) -> Result<(), EngineError> {
        self.user_speaking.store(true, Ordering::SeqCst);
        {
            let mut session = self.session.lock();
            session.speech_start = Some(Instant::now());
        }
        self.vad.lock().cancel_user_salience();
        self.player.interrupt();
        {
            let mut session = self.session.lock();
            session.clear_queue();
        }
        self.rollback_start_task();
        Ok(())
    }

    async fn on_short_pause(self: &Arc<Self>, audio: Vec<f32>) -> Result<(), EngineError> {
        let duration_ms = (audio.len() as f64 / callbridge_vad::SAMPLE_RATE as f64 * 1000.0) as u32;
        if duration_ms < callbridge_config::constants::dialog::MIN_UTTERANCE_MS_FOR_SHORT_PAUSE {
            return Ok(());
        }
        let skip = self.tasks.contains(TaskName::Commit);
        if skip {
            return Ok(());
        }

        {
            let mut session = self.session.lock();
            session.clear_queue();
            session.speculation_start = Some(Instant::now());
        }

        let session_id = self.session_id();
        if let Err(e) = self.backend.rollback(&session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "rollback before speculation failed");
        }

        let engine = self.clone();
        let session_id_for_task = session_id.clone();
        self.tasks.create(TaskName::Start, async move {
            if let Err(e) = engine.speculative_generate(audio).await {
                tracing::warn!(session_id = %session_id_for_task, error = %e, "speculative generation failed");
            }
        });
        Ok(())
    }

    async fn on_long_pause(self: &Arc<Self>, audio: Vec<f32>) -> Result<(), EngineError> {
        if self.settings.record_audio_parts {
            self.persist_utterance(&audio);
        }

        let engine = self.clone();
        let session_id_for_task = self.session_id();
        self.tasks.create(TaskName::Commit, async move {
            if let Err(e) = engine.commit_generate(audio).await {
                tracing::warn!(session_id = %session_id_for_task, error = %e, "commit generation failed");
            }
        });
        Ok(())
    }

    async fn on_user_salience_timeout(self: &Arc<Self>) -> Result<(), EngineError> {
        self.session.lock().set_state(DialogState::Finished);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.hangup_if_no_active_speech().await;
        });
        Ok(())
    }

    fn persist_utterance(&self, audio: &[f32]) {
        let path = wav::unique_wav_path(&self.settings.wav_dir, "utterance");
        match wav::WavFileWriter::create(&path) {
            Ok(mut writer) => {
                let bytes: Vec<u8> = audio
                    .iter()
                    .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
                    .collect();
                if let Err(e) = writer.write_pcm16_bytes(&bytes) {
                    tracing::warn!(error = %e, "failed to write utterance wav");
                } else if let Err(e) = writer.close() {
                    tracing::warn!(error = %e, "failed to finalize utterance wav");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to create utterance wav"),
        }
    }

    /// Pop the local `START` handle without awaiting, then best-effort
    /// `/rollback` (spec §4.7 "Rollback protocol").
    fn rollback_start_task(self: &Arc<Self>) {
        let popped = self.tasks.pop(TaskName::Start);
        if let Some(handle) = popped {
            handle.abort();
        } else {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            let session_id = engine.session_id();
            if let Err(e) = engine.backend.rollback(&session_id).await {
                tracing::warn!(session_id = %session_id, error = %e, "rollback failed");
            }
        });
    }

    // ---- Speculative / commit generation ---------------------------------

    async fn speculative_generate(self: &Arc<Self>, buf: Vec<f32>) -> Result<(), EngineError> {
        self.session.lock().set_state(DialogState::SpeculativeGenerate);

        let wav_bytes = pcm_to_wav_bytes(&buf);
        let started = Instant::now();
        let result = self.stt.transcribe(wav_bytes).await?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "stt latency (speculative)");

        if self.state() == DialogState::Finished {
            self.hangup_if_no_active_speech().await;
            return Ok(());
        }
        if self.state() != DialogState::SpeculativeGenerate {
            return Ok(());
        }

        let superseded = {
            let session = self.session.lock();
            result.is_empty()
                || session
                    .unstable_speech_result
                    .as_deref()
                    .map(|prev| normalize(prev) == normalize(&result))
                    .unwrap_or(false)
        };
        if superseded {
            return Ok(());
        }

        self.start_generate(&result).await
    }

    async fn commit_generate(self: &Arc<Self>, buf: Vec<f32>) -> Result<(), EngineError> {
        if matches!(self.state(), DialogState::HangedUp | DialogState::Finished) {
            self.tasks.pop(TaskName::Commit);
            return Ok(());
        }

        let had_start = self.tasks.await_and_delete(TaskName::Start).await;
        let _ = had_start;

        let result = if self.state() == DialogState::SpeculativeGenerate {
            self.session.lock().unstable_speech_result.clone().unwrap_or_default()
        } else {
            let wav_bytes = pcm_to_wav_bytes(&buf);
            let result = self.stt.transcribe(wav_bytes).await?;
            if !result.is_empty() {
                self.start_generate(&result).await?;
            }
            self.tasks.await_and_delete(TaskName::Start).await;
            result
        };

        let outcome = if !result.is_empty() {
            self.run_commit().await
        } else {
            Ok(())
        };

        if outcome.is_err() {
            self.session.lock().set_state(DialogState::WaitForUser);
        }

        self.vad.lock().long_pause_suspended = false;
        {
            let mut session = self.session.lock();
            session.long_pause_suspended = false;
            session.unstable_speech_result = None;
            self.tasks.pop(TaskName::Commit);
        }
        outcome
    }

    async fn run_commit(self: &Arc<Self>) -> Result<(), EngineError> {
        self.session.lock().set_state(DialogState::CommitGenerate);
        self.vad.lock().long_pause_suspended = true;
        self.session.lock().long_pause_suspended = true;

        let pump = tokio::spawn(self.clone().playback_pump());

        let session_id = self.session_id();
        let commit: Result<CommitResponse, _> = self.backend.commit(&session_id).await;

        let _ = pump.await;

        let commit = commit?;

        if !self.settings.is_streaming && !commit.response.is_empty() {
            self.enqueue_reply(commit.response.clone());
        }

        self.session.lock().set_state(DialogState::WaitForUser);
        tokio::spawn(self.clone().playback_pump()).await.ok();

        let session_ends = commit
            .metadata
            .get("SESSION_ENDS")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if session_ends {
            if self.state() != DialogState::Finished && self.state() != DialogState::HangedUp {
                self.hangup_if_no_active_speech().await;
            }
            self.session.lock().set_state(DialogState::Finished);
        }
        Ok(())
    }

    async fn start_generate(self: &Arc<Self>, text: &str) -> Result<(), EngineError> {
        {
            let mut session = self.session.lock();
            session.clear_queue();
        }
        self.player.interrupt();
        {
            let mut session = self.session.lock();
            session.unstable_speech_result = Some(text.to_string());
            session.reply_start = Some(Instant::now());
        }
        let session_id = self.session_id();
        self.backend
            .start(&session_id, text, serde_json::json!({}))
            .await?;
        Ok(())
    }

    fn enqueue_reply(&self, text: String) {
        let session_id = self.session.lock().session_id.clone();
        let msg = Arc::new(AudioMessage::new(self.tts.clone(), session_id, text));
        self.session.lock().queue.push_back(msg);
    }

    /// Drain the message queue into C4 sequentially (spec §4.7 "playback
    /// pump"). Never runs concurrently with itself.
    async fn playback_pump(self: Arc<Self>) {
        if self
            .pump_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        loop {
            let msg = self.session.lock().queue.pop_front();
            let Some(msg) = msg else { break };
            match msg.get_blob().await {
                Ok(Some(bytes)) => {
                    let path = wav::unique_wav_path(&self.settings.wav_dir, "reply");
                    if let Err(e) = tokio::fs::write(&path, &bytes).await {
                        tracing::warn!(error = %e, "failed to write synthesized reply to disk");
                        continue;
                    }
                    self.player.put(AudioFile::new(path, true));
                    if let Err(e) = self.player.play() {
                        tracing::warn!(error = %e, "failed to start playback");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "tts synthesis failed, skipping reply chunk"),
            }
        }
        self.pump_running.store(false, Ordering::SeqCst);
    }

    // ---- WebSocket reply path --------------------------------------------

    pub async fn handle_ws_event(self: &Arc<Self>, event: WsEvent) {
        match event {
            WsEvent::Message(text) => self.on_ws_message(text).await,
            WsEvent::Eos => self.on_ws_eos().await,
            WsEvent::Eoc => self.on_ws_eoc().await,
            WsEvent::Timeout => self.on_ws_session_timeout().await,
            WsEvent::Close => self.on_ws_session_close().await,
            WsEvent::Error(message) => tracing::warn!(%message, "backend reported a ws error"),
        }
    }

    async fn on_ws_message(self: &Arc<Self>, text: String) {
        let stripped = strip_emoji(&text);
        if stripped.is_empty() {
            return;
        }
        self.enqueue_reply(stripped);

        let state = self.state();
        let should_drain_now = matches!(
            state,
            DialogState::CommitGenerate | DialogState::WaitForUser | DialogState::Finished
        ) && !self.user_speaking.load(Ordering::SeqCst);

        if should_drain_now {
            tokio::spawn(self.clone().playback_pump());
        }
    }

    async fn on_ws_eos(self: &Arc<Self>) {
        match self.state() {
            DialogState::Finished => {
                tokio::spawn(self.clone().playback_pump()).await.ok();
                self.hangup_if_no_active_speech().await;
            }
            DialogState::CommitGenerate | DialogState::WaitForUser => {
                tokio::spawn(self.clone().playback_pump());
            }
            _ => {}
        }
    }

    async fn on_ws_eoc(self: &Arc<Self>) {
        if !self.settings.sip_early_eoc {
            return;
        }
        if self.state() == DialogState::SpeculativeGenerate {
            return;
        }
        self.session.lock().set_state(DialogState::Finished);
        tokio::spawn(self.clone().playback_pump()).await.ok();
        self.hangup_if_no_active_speech().await;
    }

    async fn on_ws_session_timeout(self: &Arc<Self>) {
        self.close_session("timeout").await;
    }

    async fn on_ws_session_close(self: &Arc<Self>) {
        self.close_session("closed").await;
    }

    // ---- Teardown ----------------------------------------------------------

    async fn hangup_if_no_active_speech(self: &Arc<Self>) {
        if self.is_active_ai_speech() {
            return;
        }
        self.soft_hangup().await;
    }

    /// Sleep a short pause, perform a pending transfer if one is set, tag
    /// the BYE, and enter `HANGED_UP` (spec §4.7 "Soft hangup"). A
    /// `transfer_uri` prefixed `dtmf:` uses in-band DTMF; anything else
    /// uses SIP REFER (`xfer`).
    async fn soft_hangup(self: &Arc<Self>) {
        tokio::time::sleep(Duration::from_millis(
            callbridge_config::constants::dialog::SOFT_HANGUP_PAUSE_MS,
        ))
        .await;

        let (transfer_uri, transfer_delay_ms) = {
            let session = self.session.lock();
            (session.transfer_uri.clone(), session.transfer_delay_ms)
        };

        let bye_tag = if let Some(uri) = transfer_uri {
            let result = if let Some(digits) = uri.strip_prefix("dtmf:") {
                let delay = Duration::from_millis(
                    transfer_delay_ms.unwrap_or(callbridge_config::constants::dialog::DEFAULT_TRANSFER_DELAY_MS),
                );
                self.call.dial_dtmf(digits, delay).await
            } else {
                self.call.xfer(&uri).await
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "transfer failed");
            }
            "transfer"
        } else {
            "bye"
        };

        if let Err(e) = self.call.hangup(Some(bye_tag)).await {
            tracing::warn!(error = %e, "hangup failed");
        }
        self.session.lock().set_state(DialogState::HangedUp);
        self.close_session("completed").await;
    }

    /// Tear down the backend session (spec §3 "Lifecycle"): cancel
    /// `START`, await `COMMIT`, close media, `DELETE /session/{id}`.
    pub async fn close_session(self: &Arc<Self>, status: &str) {
        {
            let mut session = self.session.lock();
            self.tasks.cancel_and_delete(TaskName::Start);
            session.close_status = Some(status.to_string());
        }
        self.tasks.await_and_delete(TaskName::Commit).await;
        self.player.interrupt();

        let session_id = self.session_id();
        if let Err(e) = self.backend.close(&session_id, status).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to close backend session");
        }

        if let Some(on_closed) = self.on_closed.get() {
            on_closed(status);
        }
    }

    /// Operator `POST /transfer/{session_id}` (spec §6). 400s if the call
    /// isn't confirmed yet.
    pub fn request_transfer(&self, to_uri: String, delay_ms: Option<u64>) -> Result<(), EngineError> {
        if !self.call.is_confirmed() {
            return Err(EngineError::CallNotConfirmed);
        }
        let mut session = self.session.lock();
        session.transfer_uri = Some(to_uri);
        session.transfer_delay_ms = delay_ms;
        Ok(())
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn pcm_to_wav_bytes(samples: &[f32]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: callbridge_vad::SAMPLE_RATE as u32,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("in-memory wav writer");
        for &s in samples {
            let _ = writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16);
        }
        writer.finalize().expect("finalize in-memory wav");
    }
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ignores_case_and_surrounding_whitespace() {
        assert_eq!(normalize("  Hello There  "), "hello there");
        assert_eq!(normalize("hello there"), "hello there");
    }

    #[test]
    fn pcm_round_trips_through_wav_bytes() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let bytes = pcm_to_wav_bytes(&samples);
        assert!(bytes.len() > 44);
        assert_eq!(&bytes[0..4], b"RIFF");
    }
}

//! Streaming VAD Processor (spec §4.3) — windows arbitrary-size PCM chunks
//! into fixed 512-sample frames, runs them through C1+C2, and classifies
//! the result into speech/pause events for the dialog engine to react to.
//!
//! Grounded on the teacher's Silero windowing loop (`vad/silero.rs`) for
//! the buffer bookkeeping shape, generalized to the spec's speech/silence
//! buffer pair and short/long-pause/salience-timeout callback set.

use std::collections::VecDeque;

use callbridge_config::VadSettings;

use crate::dynamic_correction::{DynamicCorrection, DynamicCorrectionConfig};
use crate::engine::{VadEngine, VadHiddenState, WINDOW_SAMPLES};
use crate::error::VadError;

/// One classified event emitted by the streaming processor.
#[derive(Debug, Clone)]
pub enum VadEvent {
    SpeechStart {
        silence_pad_buffer: Vec<f32>,
        start_sec: f64,
        duration_sec: f64,
    },
    SpeechEnd {
        audio: Vec<f32>,
    },
    ShortPause {
        audio: Vec<f32>,
    },
    LongPause {
        audio: Vec<f32>,
    },
    UserSalienceTimeout {
        current_time_sec: f64,
    },
}

fn fade_in(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n < 2 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(n);
    for (i, &s) in samples.iter().enumerate() {
        let factor = 0.5 * (1.0 - (std::f32::consts::PI * i as f32 / (n - 1) as f32).cos());
        out.push(s * factor);
    }
    out
}

fn fade_out(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n < 2 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(n);
    for (i, &s) in samples.iter().enumerate() {
        let factor = 0.5 * (1.0 + (std::f32::consts::PI * i as f32 / (n - 1) as f32).cos());
        out.push(s * factor);
    }
    out
}

fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

struct Thresholds {
    min_speech_samples: usize,
    min_silence_samples: usize,
    speech_pad_samples: usize,
    max_silence_samples: usize,
    short_pause_samples: usize,
    long_pause_samples: usize,
    user_silence_timeout_samples: u64,
}

impl Thresholds {
    fn from_settings(settings: &VadSettings, short_pause_ms: u32, long_pause_ms: u32, user_silence_timeout_ms: u32) -> Self {
        let sr = 16_000u64;
        let ms_to_samples = |ms: u32| (ms as u64 * sr / 1000) as usize;
        let min_speech_samples = ms_to_samples(settings.min_speech_duration_ms);
        let min_silence_samples = ms_to_samples(settings.min_silence_duration_ms);
        let speech_pad_samples = ms_to_samples(settings.speech_pad_ms);
        let max_silence_samples = (2 * speech_pad_samples).max(min_silence_samples);
        let short_pause_samples = min_silence_samples + ms_to_samples(short_pause_ms);
        let long_pause_samples = short_pause_samples + ms_to_samples(long_pause_ms);
        Self {
            min_speech_samples,
            min_silence_samples,
            speech_pad_samples,
            max_silence_samples,
            short_pause_samples,
            long_pause_samples,
            user_silence_timeout_samples: ms_to_samples(user_silence_timeout_ms) as u64,
        }
    }
}

/// Streaming VAD processor: windows raw PCM, runs C1+C2, classifies pauses.
pub struct StreamingVad {
    engine: std::sync::Arc<VadEngine>,
    hidden_state: VadHiddenState,
    dynamic_correction: Option<DynamicCorrection>,
    prob_window: VecDeque<f32>,
    prob_window_len: usize,
    threshold: f32,

    thresholds: Thresholds,

    input_buffer: Vec<f32>,
    speech_buffer: Vec<f32>,
    silence_buffer: Vec<f32>,

    active_speech: bool,
    active_long_speech: bool,
    short_pause_fired: bool,
    /// Externally held true while a commit is in progress (spec §4.3).
    pub long_pause_suspended: bool,

    user_silence_start: Option<u64>,
    user_silence_timeout_fired: bool,

    current_sample: u64,
}

impl StreamingVad {
    pub fn new(
        engine: std::sync::Arc<VadEngine>,
        settings: &VadSettings,
        short_pause_ms: u32,
        long_pause_ms: u32,
        user_silence_timeout_ms: u32,
    ) -> Result<Self, VadError> {
        let hidden_state = engine.initialize_state()?;
        let dynamic_correction = if settings.use_dynamic_corrections {
            let cfg = DynamicCorrectionConfig {
                enter_threshold: settings.correction_enter_threshold,
                exit_threshold: settings.correction_exit_threshold,
                ..Default::default()
            };
            Some(DynamicCorrection::new(cfg))
        } else {
            None
        };
        Ok(Self {
            engine,
            hidden_state,
            dynamic_correction,
            prob_window: VecDeque::with_capacity(settings.speech_prob_window),
            prob_window_len: settings.speech_prob_window,
            threshold: settings.threshold,
            thresholds: Thresholds::from_settings(settings, short_pause_ms, long_pause_ms, user_silence_timeout_ms),
            input_buffer: Vec::with_capacity(WINDOW_SAMPLES * 2),
            speech_buffer: Vec::new(),
            silence_buffer: Vec::new(),
            active_speech: false,
            active_long_speech: false,
            short_pause_fired: false,
            long_pause_suspended: false,
            user_silence_start: None,
            user_silence_timeout_fired: false,
            current_sample: 0,
        })
    }

    /// Begin the user-silence salience-timeout window; signals C2 into
    /// early phase so a resumed utterance is detected fast.
    pub fn start_user_silence(&mut self) {
        self.user_silence_start = Some(self.current_sample);
        self.user_silence_timeout_fired = false;
        if let Some(dc) = &self.dynamic_correction {
            dc.start_early_detection();
        }
    }

    /// Disable the pending salience timeout — the user spoke.
    pub fn cancel_user_salience(&mut self) {
        self.user_silence_start = None;
    }

    /// Mark the timeout as already fired so it cannot fire again.
    pub fn reset_user_salience(&mut self) {
        self.user_silence_timeout_fired = true;
        self.user_silence_start = None;
    }

    /// Feed an arbitrary-size chunk of float32 PCM at 16 kHz, returning
    /// every event produced by the full windows contained in it.
    pub fn process_audio(&mut self, pcm: &[f32]) -> Result<Vec<VadEvent>, VadError> {
        self.input_buffer.extend_from_slice(pcm);
        let mut events = Vec::new();
        while self.input_buffer.len() >= WINDOW_SAMPLES {
            let window: Vec<f32> = self.input_buffer.drain(..WINDOW_SAMPLES).collect();
            self.process_window(&window, &mut events)?;
        }
        Ok(events)
    }

    fn process_window(&mut self, window: &[f32], events: &mut Vec<VadEvent>) -> Result<(), VadError> {
        let mut chunk = window.to_vec();
        let prob = self.engine.speech_prob(&mut chunk, &mut self.hidden_state)?;
        let energy = rms_energy(window);

        let is_speech = if let Some(dc) = &self.dynamic_correction {
            dc.process_frame(prob, energy)
        } else {
            self.prob_window.push_back(prob);
            if self.prob_window.len() > self.prob_window_len {
                self.prob_window.pop_front();
            }
            // Linearly-weighted mean over the window, weights `1..=len`
            // (oldest = 1, newest = len) so a recent jump in probability
            // moves the average faster than a stale one decays it.
            let len = self.prob_window.len();
            let weighted_sum: f32 = self
                .prob_window
                .iter()
                .enumerate()
                .map(|(i, &p)| (i + 1) as f32 * p)
                .sum();
            let weight_total = (len * (len + 1) / 2) as f32;
            let avg = weighted_sum / weight_total;
            avg >= self.threshold
        };

        if self.active_long_speech {
            self.speech_buffer.extend_from_slice(window);
            if is_speech {
                self.silence_buffer.clear();
            } else {
                self.silence_buffer.extend_from_slice(window);
                if self.silence_buffer.len() > self.thresholds.max_silence_samples {
                    let excess = self.silence_buffer.len() - self.thresholds.max_silence_samples;
                    self.silence_buffer.drain(..excess);
                }
            }
        } else if is_speech {
            self.speech_buffer.extend_from_slice(window);
        } else {
            if !self.speech_buffer.is_empty() {
                self.silence_buffer.append(&mut self.speech_buffer);
            }
            self.silence_buffer.extend_from_slice(window);
        }

        self.current_sample += window.len() as u64;

        if !self.active_speech && self.speech_buffer.len() >= self.thresholds.min_speech_samples {
            self.active_speech = true;
            self.active_long_speech = true;
            let pad_len = self.thresholds.speech_pad_samples.min(self.silence_buffer.len());
            let pad_start = self.silence_buffer.len() - pad_len;
            let silence_pad_buffer = fade_in(&self.silence_buffer[pad_start..]);
            self.silence_buffer.clear();
            let start_sec = (self.current_sample.saturating_sub(window.len() as u64)) as f64 / 16_000.0;
            let duration_sec = self.speech_buffer.len() as f64 / 16_000.0;
            events.push(VadEvent::SpeechStart {
                silence_pad_buffer,
                start_sec,
                duration_sec,
            });
        }

        if self.active_speech && self.silence_buffer.len() >= self.thresholds.min_silence_samples {
            self.active_speech = false;
            self.user_silence_start = None;
            let silence_len = self.silence_buffer.len().min(self.speech_buffer.len());
            let audio = self.speech_buffer[..self.speech_buffer.len() - silence_len].to_vec();
            events.push(VadEvent::SpeechEnd { audio });
        }

        if self.active_long_speech
            && !self.short_pause_fired
            && self.silence_buffer.len() >= self.thresholds.short_pause_samples
        {
            self.short_pause_fired = true;
            events.push(VadEvent::ShortPause {
                audio: self.paused_audio_slice(),
            });
        }

        if self.active_long_speech
            && !self.long_pause_suspended
            && self.silence_buffer.len() >= self.thresholds.long_pause_samples
        {
            let audio = self.paused_audio_slice();
            self.short_pause_fired = false;
            self.active_long_speech = false;
            self.speech_buffer.clear();
            events.push(VadEvent::LongPause { audio });
        }

        if !self.active_speech && !self.user_silence_timeout_fired {
            if let Some(start) = self.user_silence_start {
                if self.current_sample.saturating_sub(start) > self.thresholds.user_silence_timeout_samples {
                    self.user_silence_timeout_fired = true;
                    events.push(VadEvent::UserSalienceTimeout {
                        current_time_sec: self.current_sample as f64 / 16_000.0,
                    });
                }
            }
        }

        Ok(())
    }

    fn paused_audio_slice(&self) -> Vec<f32> {
        let silence_len = self.silence_buffer.len().min(self.speech_buffer.len());
        let head = &self.speech_buffer[..self.speech_buffer.len() - silence_len];
        let mut out = Vec::with_capacity(head.len() + self.silence_buffer.len());
        out.extend_from_slice(head);
        out.extend_from_slice(&fade_out(&self.silence_buffer));
        out
    }

    pub fn reset(&mut self) {
        self.input_buffer.clear();
        self.speech_buffer.clear();
        self.silence_buffer.clear();
        self.active_speech = false;
        self.active_long_speech = false;
        self.short_pause_fired = false;
        self.long_pause_suspended = false;
        self.user_silence_start = None;
        self.user_silence_timeout_fired = false;
        self.current_sample = 0;
        self.prob_window.clear();
        if let Some(dc) = &self.dynamic_correction {
            dc.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_is_monotonically_increasing_envelope() {
        let samples = vec![1.0f32; 10];
        let faded = fade_in(&samples);
        for i in 1..faded.len() {
            assert!(faded[i] >= faded[i - 1] - 1e-6);
        }
        assert!(faded[0] < 0.1);
        assert!((faded[faded.len() - 1] - 1.0).abs() < 0.05);
    }

    #[test]
    fn fade_out_is_monotonically_decreasing_envelope() {
        let samples = vec![1.0f32; 10];
        let faded = fade_out(&samples);
        for i in 1..faded.len() {
            assert!(faded[i] <= faded[i - 1] + 1e-6);
        }
        assert!((faded[0] - 1.0).abs() < 0.05);
        assert!(faded[faded.len() - 1] < 0.1);
    }

    #[test]
    fn fade_short_input_unchanged() {
        assert_eq!(fade_in(&[0.5]), vec![0.5]);
        assert_eq!(fade_out(&[]), Vec::<f32>::new());
    }

    #[test]
    fn thresholds_compose_from_settings() {
        let settings = VadSettings::default();
        let t = Thresholds::from_settings(&settings, 200, 850, 60_000);
        assert_eq!(t.min_speech_samples, 2400);
        assert_eq!(t.min_silence_samples, 4800);
        assert_eq!(t.speech_pad_samples, 11_200);
        assert_eq!(t.short_pause_samples, 4800 + 3200);
        assert_eq!(t.long_pause_samples, 4800 + 3200 + 13_600);
    }
}

//! VAD Engine (spec §4.1) — stateful neural inference returning a
//! per-window speech probability.
//!
//! Grounded on the teacher's Silero ONNX session setup
//! (`GraphOptimizationLevel::Level3`, single intra-op thread, LSTM hidden
//! state threaded in `[2, 64]` tensors), narrowed to the functional
//! interface the spec asks for: the caller owns the recurrent state and
//! passes it in and out explicitly, rather than the engine holding a
//! state machine of its own — windowing and pause classification belong
//! to the streaming processor (C3), not here.

use std::path::Path;

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;

use crate::error::VadError;

pub const WINDOW_SAMPLES: usize = 512;
pub const SAMPLE_RATE: i64 = 16_000;

/// Opaque recurrent hidden state carried between `speech_prob` calls.
#[derive(Clone)]
pub struct VadHiddenState {
    h: Array2<f32>,
    c: Array2<f32>,
}

impl VadHiddenState {
    fn zeroed() -> Self {
        Self {
            h: Array2::zeros((2, 64)),
            c: Array2::zeros((2, 64)),
        }
    }
}

/// A Silero-style ONNX VAD network.
///
/// Inference is synchronous and cheap (32 ms windows) — callers run it on
/// their own event loop rather than delegating to a pool, per spec §5.
pub struct VadEngine {
    session: Mutex<Session>,
}

impl VadEngine {
    /// Load the network from an ONNX file with the graph-optimization and
    /// threading constraints spec §4.1 requires.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, VadError> {
        let session = Session::builder()
            .map_err(|e| VadError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VadError::Model(e.to_string()))?
            .with_intra_threads(4)
            .map_err(|e| VadError::Model(e.to_string()))?
            .with_inter_threads(1)
            .map_err(|e| VadError::Model(e.to_string()))?
            .with_memory_pattern(false)
            .map_err(|e| VadError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| VadError::Model(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// One-shot warmup with 512 zero samples, returning the initial hidden
    /// state (spec §4.1 `initialize_state`).
    pub fn initialize_state(&self) -> Result<VadHiddenState, VadError> {
        let zeros = vec![0.0f32; WINDOW_SAMPLES];
        let mut state = VadHiddenState::zeroed();
        self.speech_prob(&mut zeros.clone().into_boxed_slice(), &mut state)?;
        let _ = zeros;
        Ok(state)
    }

    /// Run one inference step. `chunk` must be 512 samples at 16 kHz; it
    /// may be renormalized in place per spec §4.1.
    pub fn speech_prob(
        &self,
        chunk: &mut [f32],
        state: &mut VadHiddenState,
    ) -> Result<f32, VadError> {
        if chunk.is_empty() {
            return Ok(0.0);
        }
        let max_abs = chunk.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        if max_abs == 0.0 {
            return Ok(0.0);
        }
        if !(0.01..=1.0).contains(&max_abs) {
            for s in chunk.iter_mut() {
                *s /= max_abs;
            }
        }

        let input = Array2::from_shape_vec((1, chunk.len()), chunk.to_vec())
            .map_err(|e| VadError::Tensor(e.to_string()))?;
        let sr = ndarray::arr1(&[SAMPLE_RATE]);

        let input_tensor = Tensor::from_array(input).map_err(|e| VadError::Model(e.to_string()))?;
        let sr_tensor = Tensor::from_array(sr).map_err(|e| VadError::Model(e.to_string()))?;
        let h_tensor =
            Tensor::from_array(state.h.clone()).map_err(|e| VadError::Model(e.to_string()))?;
        let c_tensor =
            Tensor::from_array(state.c.clone()).map_err(|e| VadError::Model(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input" => input_tensor,
                "sr" => sr_tensor,
                "h" => h_tensor,
                "c" => c_tensor,
            ])
            .map_err(|e| VadError::Model(e.to_string()))?;

        let (_, speech_data) = outputs
            .get("output")
            .ok_or_else(|| VadError::Model("missing output tensor".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| VadError::Model(e.to_string()))?;
        let prob = speech_data.first().copied().unwrap_or(0.0);

        if let Some(hn) = outputs.get("hn") {
            let (shape, data) = hn
                .try_extract_tensor::<f32>()
                .map_err(|e| VadError::Model(e.to_string()))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            if dims.len() == 2 && data.len() == dims[0] * dims[1] {
                let view = ndarray::ArrayView2::from_shape((dims[0], dims[1]), data)
                    .map_err(|e| VadError::Tensor(e.to_string()))?;
                state.h.assign(&view);
            }
        }
        if let Some(cn) = outputs.get("cn") {
            let (shape, data) = cn
                .try_extract_tensor::<f32>()
                .map_err(|e| VadError::Model(e.to_string()))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            if dims.len() == 2 && data.len() == dims[0] * dims[1] {
                let view = ndarray::ArrayView2::from_shape((dims[0], dims[1]), data)
                    .map_err(|e| VadError::Tensor(e.to_string()))?;
                state.c.assign(&view);
            }
        }

        Ok(prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_state_starts_zeroed() {
        let state = VadHiddenState::zeroed();
        assert_eq!(state.h.sum(), 0.0);
        assert_eq!(state.c.sum(), 0.0);
    }
}

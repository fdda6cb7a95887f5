//! WAV file I/O (spec §6 "WAV file layout") — PCM, 16 kHz, mono, 16-bit.
//! Recorded and synthesized audio share this layout; headers carry
//! placeholder RIFF/data sizes that are patched on close.
//!
//! Grounded on the teacher's `pipeline/src/tts/streaming.rs` use of
//! `hound` for WAV encode/decode; `hound::WavWriter::finalize` already
//! performs the offset-4/offset-40 size patch the spec describes, so this
//! module is a thin call-scoped wrapper rather than a hand-rolled RIFF
//! writer.

use std::path::{Path, PathBuf};

use crate::error::MediaError;

pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// A WAV file being recorded to disk, one call segment at a time.
pub struct WavFileWriter {
    path: PathBuf,
    writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
}

impl WavFileWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let path = path.into();
        let writer =
            hound::WavWriter::create(&path, wav_spec()).map_err(|e| MediaError::Wav(e.to_string()))?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    /// Append raw little-endian PCM16 bytes (as delivered by the RTP path).
    pub fn write_pcm16_bytes(&mut self, bytes: &[u8]) -> Result<(), MediaError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MediaError::Wav("writer already closed".to_string()))?;
        for chunk in bytes.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| MediaError::Wav(e.to_string()))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Patch the RIFF/data sizes and close the file.
    pub fn close(mut self) -> Result<PathBuf, MediaError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| MediaError::Wav("writer already closed".to_string()))?;
        writer.finalize().map_err(|e| MediaError::Wav(e.to_string()))?;
        Ok(self.path)
    }
}

/// Generate a call-unique WAV filename under `dir` (spec §5: UUID7 is
/// sufficient since it's monotonic and collision-free across calls).
pub fn unique_wav_path(dir: impl AsRef<Path>, prefix: &str) -> PathBuf {
    let id = uuid::Uuid::now_v7();
    dir.as_ref().join(format!("{prefix}-{id}.wav"))
}

/// Read an entire WAV file back into float32 samples (used by the TTS
/// blob path and tests).
pub fn read_f32(path: impl AsRef<Path>) -> Result<Vec<f32>, MediaError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| MediaError::Wav(e.to_string()))?;
    let spec = reader.spec();
    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect(),
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    };
    samples.map_err(|e| MediaError::Wav(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes_match_spec_scenario_6() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario6.wav");
        let mut writer = WavFileWriter::create(&path).unwrap();
        let chunk = vec![0u8; 4000];
        for _ in 0..3 {
            writer.write_pcm16_bytes(&chunk).unwrap();
        }
        let path = writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 12_044);
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size, 12_036);
        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size, 12_000);

        // Parses under a standard WAV reader.
        let samples = read_f32(&path).unwrap();
        assert_eq!(samples.len(), 6_000);
    }

    #[test]
    fn unique_paths_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = unique_wav_path(dir.path(), "call");
        let b = unique_wav_path(dir.path(), "call");
        assert_ne!(a, b);
    }
}

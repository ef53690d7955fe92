//! PCM audio accumulation and the utterance model
//!
//! Audio arrives from the wire as raw 16-bit signed little-endian PCM at a
//! fixed sample rate. The [`UtteranceBuffer`] collects chunks in arrival
//! order without interpreting them; [`UtteranceBuffer::finalize`] enforces
//! the minimum-duration invariant and produces an immutable [`Utterance`]
//! that is handed to recognition exactly once.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result};

/// PCM format descriptor (sample rate, channel count, bytes per sample)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    /// Samples per second
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Bytes per sample (2 = 16-bit PCM)
    pub sample_width: u16,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            sample_width: 2,
        }
    }
}

impl AudioSpec {
    /// Bytes of PCM per second of audio
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * self.sample_width as usize
    }

    /// Bytes required to cover `duration` of audio
    pub fn bytes_for(&self, duration: Duration) -> usize {
        (self.bytes_per_second() as f64 * duration.as_secs_f64()) as usize
    }

    /// Duration represented by `bytes` of PCM
    pub fn duration_of(&self, bytes: usize) -> Duration {
        Duration::from_secs_f64(bytes as f64 / self.bytes_per_second() as f64)
    }
}

/// Finalization failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeError {
    /// Accumulated audio is shorter than the minimum utterance duration
    #[error("Insufficient audio data: {got} bytes accumulated, {need} required")]
    InsufficientData { got: usize, need: usize },
}

/// Accumulates raw PCM chunks into one utterance per turn
///
/// Chunks are appended in arrival order and never interpreted. The buffer
/// is owned by exactly one session and reused across turns via
/// [`UtteranceBuffer::clear`] or a successful [`UtteranceBuffer::finalize`],
/// which drains it.
#[derive(Debug)]
pub struct UtteranceBuffer {
    pcm: Vec<u8>,
    spec: AudioSpec,
    min_bytes: usize,
}

impl UtteranceBuffer {
    /// Create a buffer enforcing `min_duration` of audio at `spec`
    pub fn new(spec: AudioSpec, min_duration: Duration) -> Self {
        let min_bytes = spec.bytes_for(min_duration);
        Self {
            pcm: Vec::with_capacity(min_bytes),
            spec,
            min_bytes,
        }
    }

    /// Append one received payload chunk
    pub fn accept(&mut self, chunk: &[u8]) {
        self.pcm.extend_from_slice(chunk);
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Discard everything accumulated for the current turn
    pub fn clear(&mut self) {
        self.pcm.clear();
    }

    /// Validate the minimum-duration invariant and produce the utterance
    ///
    /// On success the buffer is drained, so the utterance cannot be
    /// produced twice. On failure the accumulated bytes are discarded;
    /// an undersized capture is never retried against recognition.
    pub fn finalize(&mut self) -> std::result::Result<Utterance, FinalizeError> {
        if self.pcm.len() < self.min_bytes {
            let got = self.pcm.len();
            self.pcm.clear();
            return Err(FinalizeError::InsufficientData {
                got,
                need: self.min_bytes,
            });
        }
        let pcm = std::mem::take(&mut self.pcm);
        Ok(Utterance {
            pcm: pcm.into(),
            spec: self.spec,
        })
    }
}

/// One finalized, minimum-duration buffer of captured speech
///
/// Immutable once built. Consumed by recognition and then dropped; the
/// core never retains utterances across turns.
#[derive(Debug, Clone)]
pub struct Utterance {
    pcm: Arc<[u8]>,
    spec: AudioSpec,
}

impl Utterance {
    /// Raw PCM bytes (16-bit signed little-endian)
    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Audio duration implied by the byte count
    pub fn duration(&self) -> Duration {
        self.spec.duration_of(self.pcm.len())
    }

    /// Iterate samples as i16 (little-endian pairs; a trailing odd byte is ignored)
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    /// Materialize as a WAV file at `path`, overwriting any previous turn's
    /// artifact at the same location
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let wav_spec = hound::WavSpec {
            channels: self.spec.channels,
            sample_rate: self.spec.sample_rate,
            bits_per_sample: self.spec.sample_width * 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, wav_spec)
            .map_err(|e| Error::Audio(format!("Failed to create WAV file: {}", e)))?;
        for sample in self.samples() {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(format!("Failed to write WAV sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Audio(format!("Failed to finalize WAV file: {}", e)))?;
        Ok(())
    }
}

/// Synthesized reply audio as produced by the TTS collaborator
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    /// Raw PCM bytes (same encoding as captured audio)
    pub pcm: Vec<u8>,
    pub spec: AudioSpec,
}

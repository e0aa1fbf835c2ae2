//! Energy-based local end-of-speech detection.
//!
//! Chunks are read as 16-bit little-endian mono PCM.  The detector only
//! ends an utterance after it has heard speech, so leading silence never
//! cuts a request short.

use pb_domain::config::EndOfSpeechConfig;

#[derive(Debug, Clone)]
pub struct EndOfSpeechDetector {
    rms_threshold: f64,
    silence_chunks: usize,
    heard_speech: bool,
    silent_run: usize,
}

impl EndOfSpeechDetector {
    pub fn new(rms_threshold: f64, silence_chunks: usize) -> Self {
        Self {
            rms_threshold,
            silence_chunks: silence_chunks.max(1),
            heard_speech: false,
            silent_run: 0,
        }
    }

    /// `None` when detection is disabled.
    pub fn from_config(cfg: &EndOfSpeechConfig) -> Option<Self> {
        cfg.enabled.then(|| Self::new(cfg.rms_threshold, cfg.silence_chunks))
    }

    /// Feed the next chunk.  Returns `true` when this chunk ends the
    /// utterance.
    pub fn observe(&mut self, chunk: &[u8]) -> bool {
        if rms(chunk) >= self.rms_threshold {
            self.heard_speech = true;
            self.silent_run = 0;
            return false;
        }
        if !self.heard_speech {
            return false;
        }
        self.silent_run += 1;
        self.silent_run >= self.silence_chunks
    }
}

fn rms(chunk: &[u8]) -> f64 {
    let samples = chunk.chunks_exact(2);
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = samples
        .map(|b| f64::from(i16::from_le_bytes([b[0], b[1]])).powi(2))
        .sum();
    (sum / n as f64).sqrt()
}

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Bytes buffered in the in-memory pipe between producer and recognizer.
    #[serde(default = "d_8192")]
    pub pipe_capacity: usize,
    /// Capacity of the partial-result channel.
    #[serde(default = "d_16")]
    pub partial_buffer: usize,
    /// Uploaded audio is re-framed into chunks of this size.
    #[serde(default = "d_1024")]
    pub chunk_bytes: usize,
    #[serde(default)]
    pub end_of_speech: EndOfSpeechConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: 8192,
            partial_buffer: 16,
            chunk_bytes: 1024,
            end_of_speech: EndOfSpeechConfig::default(),
        }
    }
}

/// Local end-of-speech detection on uploaded 16-bit little-endian PCM.
///
/// A chunk whose RMS reaches `rms_threshold` counts as speech.  Once speech
/// has been heard, `silence_chunks` consecutive quieter chunks end the
/// utterance and the rest of the upload is not sent to the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndOfSpeechConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_500")]
    pub rms_threshold: f64,
    #[serde(default = "d_16")]
    pub silence_chunks: usize,
}

impl Default for EndOfSpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rms_threshold: 500.0,
            silence_chunks: 16,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recognition back-end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP speech-to-text endpoint that receives the audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Endpoint URL.  When `None`, the stream endpoint is disabled.
    #[serde(default)]
    pub url: Option<String>,
    /// Whole-request timeout for one recognition call.
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 30_000,
        }
    }
}

fn d_8192() -> usize {
    8192
}
fn d_16() -> usize {
    16
}
fn d_1024() -> usize {
    1024
}
fn d_true() -> bool {
    true
}
fn d_500() -> f64 {
    500.0
}
fn d_30000() -> u64 {
    30_000
}

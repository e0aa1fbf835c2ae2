//! Recognition back-end seam.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::error::StreamError;

/// Read half of the audio pipe handed to the recognizer.  Reaches EOF once
/// the producer closes the pipe.
pub type AudioStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Identifies the interaction a stream belongs to.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    /// Normalized device serial.
    pub device_id: String,
    pub request_id: String,
    pub locale: Option<String>,
}

/// Interim result reported by the back-end while audio is still flowing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialResult {
    pub text: String,
    /// The back-end has heard enough; the producer may stop sending audio.
    pub safe_to_stop_audio: bool,
}

/// Streaming speech-recognition client.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Consume `audio` until EOF or until the back-end finishes, reporting
    /// interim results on `partials`.  Returns the final transcript.
    async fn stream(
        &self,
        audio: AudioStream,
        meta: SessionMetadata,
        partials: mpsc::Sender<PartialResult>,
    ) -> Result<String, StreamError>;
}

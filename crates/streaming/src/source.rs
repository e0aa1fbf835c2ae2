//! Audio chunk sources.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SourceError;

/// Device-side capture loop feeding the pipeline.
///
/// `next_chunk` is raced against cancellation, so implementations must be
/// cancel safe: dropping the future must not lose a chunk that was not
/// returned.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next encoded audio chunk, or [`SourceError::EndOfAudio`] once exhausted.
    async fn next_chunk(&mut self) -> Result<Vec<u8>, SourceError>;

    /// Whether the chunk just returned ended the utterance.
    fn is_local_end_of_speech(&mut self) -> bool;
}

/// One frame pushed into a [`ChannelChunkSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFrame {
    Chunk(Vec<u8>),
    /// Last chunk of the utterance; local voice activity detection fired.
    EndOfSpeech(Vec<u8>),
}

/// Chunk source fed through a channel.  Dropping every sender ends the
/// audio.
pub struct ChannelChunkSource {
    rx: mpsc::Receiver<AudioFrame>,
    end_of_speech: bool,
}

impl ChannelChunkSource {
    pub fn new(rx: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            rx,
            end_of_speech: false,
        }
    }

    /// Convenience: a bounded channel and the source reading from it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<AudioFrame>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl ChunkSource for ChannelChunkSource {
    async fn next_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        if self.end_of_speech {
            return Err(SourceError::EndOfAudio);
        }
        match self.rx.recv().await {
            Some(AudioFrame::Chunk(bytes)) => Ok(bytes),
            Some(AudioFrame::EndOfSpeech(bytes)) => {
                self.end_of_speech = true;
                Ok(bytes)
            }
            None => Err(SourceError::EndOfAudio),
        }
    }

    fn is_local_end_of_speech(&mut self) -> bool {
        self.end_of_speech
    }
}

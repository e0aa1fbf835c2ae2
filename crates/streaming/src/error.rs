/// Errors returned by [`StreamingPipeline::run`](crate::StreamingPipeline::run).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The recognition back-end failed or rejected the stream.
    #[error("recognition back-end: {0}")]
    Backend(String),

    #[error("audio pipe: {0}")]
    Pipe(#[from] std::io::Error),

    /// A pipeline task panicked or was aborted.
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

/// Errors from a [`ChunkSource`](crate::ChunkSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Normal termination: the source has no more audio.
    #[error("end of audio")]
    EndOfAudio,

    #[error("audio device: {0}")]
    Device(String),
}

//! Audio streaming pipeline for podbridge.
//!
//! [`StreamingPipeline::run`] moves audio from a [`ChunkSource`] into an
//! in-memory pipe that a [`Recognizer`] reads while it streams to a speech
//! back-end.  Production stops on end of audio, on local end-of-speech, or
//! when the back-end reports it has heard enough.

pub mod error;
pub mod pipeline;
pub mod recognizer;
pub mod source;
pub mod vad;

pub use error::{SourceError, StreamError};
pub use pipeline::{PipelineConfig, StopReason, StreamingPipeline, Transcription};
pub use recognizer::{AudioStream, PartialResult, Recognizer, SessionMetadata};
pub use source::{AudioFrame, ChannelChunkSource, ChunkSource};
pub use vad::EndOfSpeechDetector;

//! Producer / recognizer / early-stop watcher orchestration.
//!
//! One [`StreamingPipeline::run`] call is one transcription job:
//!
//! - a producer task pulls chunks from the [`ChunkSource`] and writes them
//!   into the pipe,
//! - the recognizer call runs on the caller's task and reads the pipe,
//! - a watcher task reads partial results and fires the early-stop token on
//!   the first one marked safe-to-stop.
//!
//! The producer never writes after it has observed the early-stop token, and
//! it alone closes the pipe.  `run` joins both tasks before returning, on
//! success and on error.

use std::time::Instant;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pb_domain::config::StreamingConfig;
use pb_domain::trace::TraceEvent;

use crate::error::{SourceError, StreamError};
use crate::recognizer::{PartialResult, Recognizer, SessionMetadata};
use crate::source::ChunkSource;

/// Sizing for the pipe and partial-result channel.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub pipe_capacity: usize,
    pub partial_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for PipelineConfig {
    fn from(cfg: &StreamingConfig) -> Self {
        Self {
            pipe_capacity: cfg.pipe_capacity.max(1),
            partial_buffer: cfg.partial_buffer.max(1),
        }
    }
}

/// Why the producer stopped sending audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned end of audio.
    SourceExhausted,
    /// The source failed; the pipe was closed early.
    SourceFailed,
    /// Local end-of-speech fired after the final chunk was written.
    LocalEndOfSpeech,
    /// The back-end signalled it was safe to stop sending audio.
    EarlyStop,
    /// The recognizer call returned while audio was still flowing.
    BackendFinished,
    /// The recognizer dropped its end of the pipe.
    PipeClosed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceExhausted => "source_exhausted",
            Self::SourceFailed => "source_failed",
            Self::LocalEndOfSpeech => "local_end_of_speech",
            Self::EarlyStop => "early_stop",
            Self::BackendFinished => "backend_finished",
            Self::PipeClosed => "pipe_closed",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    pub stop_reason: StopReason,
    /// Chunks fully written into the pipe.
    pub chunks_written: usize,
}

#[derive(Debug, Clone, Copy)]
struct ProducerReport {
    stop_reason: StopReason,
    chunks_written: usize,
}

#[derive(Debug, Clone)]
pub struct StreamingPipeline {
    config: PipelineConfig,
}

impl StreamingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one transcription job to completion.
    pub async fn run<S, R>(
        &self,
        source: S,
        recognizer: &R,
        meta: SessionMetadata,
    ) -> Result<Transcription, StreamError>
    where
        S: ChunkSource + 'static,
        R: Recognizer + ?Sized,
    {
        let started = Instant::now();
        let (writer, reader) = tokio::io::duplex(self.config.pipe_capacity);
        let (partial_tx, partial_rx) = mpsc::channel(self.config.partial_buffer);
        let early_stop = CancellationToken::new();
        let call_done = CancellationToken::new();

        let producer = tokio::spawn(produce(
            source,
            writer,
            early_stop.clone(),
            call_done.clone(),
        ));
        let watcher = tokio::spawn(watch(partial_rx, early_stop.clone(), call_done.clone()));

        let result = recognizer
            .stream(Box::new(reader), meta.clone(), partial_tx)
            .await;
        call_done.cancel();

        let (produced, watched) = tokio::join!(producer, watcher);
        if let Err(e) = &watched {
            tracing::warn!(request_id = %meta.request_id, error = %e, "early-stop watcher failed");
        }

        let report = produced.map_err(|e| StreamError::TaskFailed(format!("producer: {e}")));
        let (stop_reason, chunks_written) = match &report {
            Ok(r) => (r.stop_reason.as_str(), r.chunks_written),
            Err(_) => ("unknown", 0),
        };

        TraceEvent::StreamFinished {
            device_id: meta.device_id.clone(),
            request_id: meta.request_id.clone(),
            stop_reason: stop_reason.to_owned(),
            chunks_written,
            duration_ms: started.elapsed().as_millis() as u64,
            ok: result.is_ok() && report.is_ok(),
        }
        .emit();

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    device_id = %meta.device_id,
                    request_id = %meta.request_id,
                    error = %e,
                    "recognition failed"
                );
                return Err(e);
            }
        };
        let report = report?;
        watched.map_err(|e| StreamError::TaskFailed(format!("watcher: {e}")))?;

        Ok(Transcription {
            text,
            stop_reason: report.stop_reason,
            chunks_written: report.chunks_written,
        })
    }
}

async fn produce<S: ChunkSource>(
    mut source: S,
    mut pipe: DuplexStream,
    early_stop: CancellationToken,
    call_done: CancellationToken,
) -> ProducerReport {
    let mut chunks_written = 0usize;

    let stop_reason = loop {
        let next = tokio::select! {
            biased;
            _ = early_stop.cancelled() => break StopReason::EarlyStop,
            _ = call_done.cancelled() => break StopReason::BackendFinished,
            next = source.next_chunk() => next,
        };

        let chunk = match next {
            Ok(chunk) => chunk,
            Err(SourceError::EndOfAudio) => break StopReason::SourceExhausted,
            Err(e) => {
                tracing::warn!(error = %e, "audio source failed, closing stream");
                break StopReason::SourceFailed;
            }
        };
        let end_of_speech = source.is_local_end_of_speech();

        // Checked again after the pull: no write once early stop has fired.
        if early_stop.is_cancelled() {
            break StopReason::EarlyStop;
        }

        let written = tokio::select! {
            biased;
            _ = call_done.cancelled() => break StopReason::BackendFinished,
            res = pipe.write_all(&chunk) => res,
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "audio pipe closed by reader");
            break StopReason::PipeClosed;
        }
        chunks_written += 1;

        if end_of_speech {
            break StopReason::LocalEndOfSpeech;
        }
    };

    if let Err(e) = pipe.shutdown().await {
        tracing::debug!(error = %e, "audio pipe already closed");
    }
    tracing::debug!(stop_reason = %stop_reason, chunks_written, "audio producer finished");

    ProducerReport {
        stop_reason,
        chunks_written,
    }
}

/// Returns whether a safe-to-stop result was seen.
async fn watch(
    mut partials: mpsc::Receiver<PartialResult>,
    early_stop: CancellationToken,
    call_done: CancellationToken,
) -> bool {
    loop {
        let partial = tokio::select! {
            biased;
            _ = call_done.cancelled() => return false,
            partial = partials.recv() => partial,
        };
        match partial {
            Some(p) if p.safe_to_stop_audio => {
                tracing::debug!(text = %p.text, "back-end signalled safe to stop audio");
                early_stop.cancel();
                return true;
            }
            Some(p) => tracing::trace!(text = %p.text, "partial result"),
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AudioFrame, ChannelChunkSource};
    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    use crate::recognizer::AudioStream;

    /// Reads the whole pipe and echoes it back as the transcript.
    struct Echo;

    #[async_trait]
    impl Recognizer for Echo {
        async fn stream(
            &self,
            mut audio: AudioStream,
            _meta: SessionMetadata,
            _partials: mpsc::Sender<PartialResult>,
        ) -> Result<String, StreamError> {
            let mut buf = Vec::new();
            audio.read_to_end(&mut buf).await?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
    }

    #[test]
    fn config_from_streaming_section() {
        let cfg = PipelineConfig::from(&StreamingConfig {
            pipe_capacity: 0,
            partial_buffer: 4,
            chunk_bytes: 512,
            ..StreamingConfig::default()
        });
        assert_eq!(cfg.pipe_capacity, 1);
        assert_eq!(cfg.partial_buffer, 4);
    }

    #[tokio::test]
    async fn channel_source_reaches_recognizer_in_order() {
        let (tx, source) = ChannelChunkSource::channel(8);
        tx.send(AudioFrame::Chunk(b"hello ".to_vec())).await.unwrap();
        tx.send(AudioFrame::EndOfSpeech(b"robot".to_vec())).await.unwrap();

        let out = StreamingPipeline::new(PipelineConfig::default())
            .run(source, &Echo, SessionMetadata::default())
            .await
            .unwrap();

        assert_eq!(out.text, "hello robot");
        assert_eq!(out.stop_reason, StopReason::LocalEndOfSpeech);
        assert_eq!(out.chunks_written, 2);
    }

    #[tokio::test]
    async fn empty_source_closes_pipe_immediately() {
        let (tx, source) = ChannelChunkSource::channel(1);
        drop(tx);
        let out = StreamingPipeline::new(PipelineConfig::default())
            .run(source, &Echo, SessionMetadata::default())
            .await
            .unwrap();
        assert_eq!(out.text, "");
        assert_eq!(out.stop_reason, StopReason::SourceExhausted);
        assert_eq!(out.chunks_written, 0);
    }

    #[test]
    fn stop_reason_labels() {
        assert_eq!(StopReason::EarlyStop.to_string(), "early_stop");
        assert_eq!(StopReason::LocalEndOfSpeech.as_str(), "local_end_of_speech");
    }
}

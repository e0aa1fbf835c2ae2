//! Pipeline termination: source exhaustion, local end-of-speech, back-end
//! early stop and back-end failure, using in-process fake sources and
//! recognizers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Notify};

use pb_streaming::{
    AudioStream, ChunkSource, PartialResult, PipelineConfig, Recognizer, SessionMetadata,
    SourceError, StopReason, StreamError, StreamingPipeline,
};

// ── Fake sources ────────────────────────────────────────────────────────

/// Fixed list of one-byte chunks, optionally ending speech after chunk N.
struct ScriptedSource {
    remaining: std::vec::IntoIter<u8>,
    pulled: usize,
    end_of_speech_after: Option<usize>,
    dropped: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new(chunks: usize, end_of_speech_after: Option<usize>) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = Self {
            remaining: (0..chunks as u8).collect::<Vec<_>>().into_iter(),
            pulled: 0,
            end_of_speech_after,
            dropped: dropped.clone(),
        };
        (source, dropped)
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        let byte = self.remaining.next().ok_or(SourceError::EndOfAudio)?;
        self.pulled += 1;
        Ok(vec![byte])
    }

    fn is_local_end_of_speech(&mut self) -> bool {
        self.end_of_speech_after == Some(self.pulled)
    }
}

/// Never runs dry.
struct EndlessSource {
    pulled: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkSource for EndlessSource {
    async fn next_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        tokio::task::yield_now().await;
        self.pulled.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0u8; 64])
    }

    fn is_local_end_of_speech(&mut self) -> bool {
        false
    }
}

/// Holds its only chunk, flagged as end of speech, until the gate opens and
/// a short pause has passed.
struct GatedEndOfSpeechSource {
    gate: Arc<Notify>,
    returned: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkSource for GatedEndOfSpeechSource {
    async fn next_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        self.gate.notified().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.returned.fetch_add(1, Ordering::SeqCst);
        Ok(vec![9u8; 8])
    }

    fn is_local_end_of_speech(&mut self) -> bool {
        true
    }
}

struct FailingSource {
    good_chunks: usize,
}

#[async_trait]
impl ChunkSource for FailingSource {
    async fn next_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        if self.good_chunks == 0 {
            return Err(SourceError::Device("microphone unplugged".into()));
        }
        self.good_chunks -= 1;
        Ok(vec![1])
    }

    fn is_local_end_of_speech(&mut self) -> bool {
        false
    }
}

// ── Fake recognizers ────────────────────────────────────────────────────

/// Reads to EOF and records the bytes it received.
#[derive(Default)]
struct CollectingRecognizer {
    received: Mutex<Vec<u8>>,
}

#[async_trait]
impl Recognizer for CollectingRecognizer {
    async fn stream(
        &self,
        mut audio: AudioStream,
        meta: SessionMetadata,
        _partials: mpsc::Sender<PartialResult>,
    ) -> Result<String, StreamError> {
        let mut buf = Vec::new();
        audio.read_to_end(&mut buf).await?;
        let n = buf.len();
        *self.received.lock() = buf;
        Ok(format!("{} heard {n} bytes", meta.device_id))
    }
}

/// Reports safe-to-stop after `after_bytes`, then drains until EOF.
struct EarlyStopRecognizer {
    after_bytes: usize,
}

#[async_trait]
impl Recognizer for EarlyStopRecognizer {
    async fn stream(
        &self,
        mut audio: AudioStream,
        _meta: SessionMetadata,
        partials: mpsc::Sender<PartialResult>,
    ) -> Result<String, StreamError> {
        let mut buf = vec![0u8; self.after_bytes];
        audio.read_exact(&mut buf).await?;
        partials
            .send(PartialResult {
                text: "turn on".into(),
                safe_to_stop_audio: false,
            })
            .await
            .ok();
        partials
            .send(PartialResult {
                text: "turn on the lights".into(),
                safe_to_stop_audio: true,
            })
            .await
            .ok();

        let mut rest = Vec::new();
        audio.read_to_end(&mut rest).await?;
        Ok("turn on the lights".into())
    }
}

/// Reports safe-to-stop before reading any audio, then opens the source's
/// gate and records whatever arrives before EOF.
struct StopFirstRecognizer {
    gate: Arc<Notify>,
    received: Mutex<Vec<u8>>,
}

#[async_trait]
impl Recognizer for StopFirstRecognizer {
    async fn stream(
        &self,
        mut audio: AudioStream,
        _meta: SessionMetadata,
        partials: mpsc::Sender<PartialResult>,
    ) -> Result<String, StreamError> {
        partials
            .send(PartialResult {
                text: "stop".into(),
                safe_to_stop_audio: true,
            })
            .await
            .ok();
        self.gate.notify_one();

        let mut buf = Vec::new();
        audio.read_to_end(&mut buf).await?;
        *self.received.lock() = buf;
        Ok("stop".into())
    }
}

/// Reads a little audio, then fails.
struct BrokenRecognizer;

#[async_trait]
impl Recognizer for BrokenRecognizer {
    async fn stream(
        &self,
        mut audio: AudioStream,
        _meta: SessionMetadata,
        _partials: mpsc::Sender<PartialResult>,
    ) -> Result<String, StreamError> {
        let mut buf = [0u8; 2];
        audio.read_exact(&mut buf).await?;
        Err(StreamError::Backend("upstream returned 503".into()))
    }
}

fn meta() -> SessionMetadata {
    SessionMetadata {
        device_id: "abc123".into(),
        request_id: "req-1".into(),
        locale: None,
    }
}

fn pipeline() -> StreamingPipeline {
    StreamingPipeline::new(PipelineConfig {
        pipe_capacity: 16,
        partial_buffer: 4,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn five_chunks_then_end_of_audio() {
    let (source, dropped) = ScriptedSource::new(5, None);
    let recognizer = CollectingRecognizer::default();

    let out = pipeline().run(source, &recognizer, meta()).await.unwrap();

    assert_eq!(out.stop_reason, StopReason::SourceExhausted);
    assert_eq!(out.chunks_written, 5);
    assert_eq!(*recognizer.received.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(out.text, "abc123 heard 5 bytes");
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn local_end_of_speech_after_third_chunk() {
    let (source, _) = ScriptedSource::new(10, Some(3));
    let recognizer = CollectingRecognizer::default();

    let out = pipeline().run(source, &recognizer, meta()).await.unwrap();

    assert_eq!(out.stop_reason, StopReason::LocalEndOfSpeech);
    assert_eq!(out.chunks_written, 3);
    assert_eq!(*recognizer.received.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn safe_to_stop_halts_endless_source() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let source = EndlessSource {
        pulled: pulled.clone(),
    };

    let out = pipeline()
        .run(source, &EarlyStopRecognizer { after_bytes: 256 }, meta())
        .await
        .unwrap();

    assert_eq!(out.stop_reason, StopReason::EarlyStop);
    assert_eq!(out.text, "turn on the lights");
    assert!(out.chunks_written >= 4);
    // At most the chunk in hand when the stop was seen is discarded.
    assert!(pulled.load(Ordering::SeqCst) - out.chunks_written <= 1);

    // Production has really stopped.
    let after = pulled.load(Ordering::SeqCst);
    tokio::task::yield_now().await;
    assert_eq!(pulled.load(Ordering::SeqCst), after);
}

#[tokio::test(start_paused = true)]
async fn early_stop_beats_pending_end_of_speech_chunk() {
    let gate = Arc::new(Notify::new());
    let returned = Arc::new(AtomicUsize::new(0));
    let source = GatedEndOfSpeechSource {
        gate: gate.clone(),
        returned: returned.clone(),
    };
    let recognizer = StopFirstRecognizer {
        gate,
        received: Mutex::new(vec![0xff]),
    };

    let out = pipeline().run(source, &recognizer, meta()).await.unwrap();

    assert_eq!(out.stop_reason, StopReason::EarlyStop);
    assert_eq!(out.chunks_written, 0);
    assert_eq!(returned.load(Ordering::SeqCst), 0);
    assert!(recognizer.received.lock().is_empty());
}

#[tokio::test]
async fn backend_error_is_returned_after_tasks_join() {
    let (source, dropped) = ScriptedSource::new(200, None);

    let err = pipeline()
        .run(source, &BrokenRecognizer, meta())
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::Backend(ref m) if m.contains("503")));
    // The producer task owned the source; it is gone once `run` returns.
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn source_failure_closes_pipe() {
    let recognizer = CollectingRecognizer::default();
    let out = pipeline()
        .run(FailingSource { good_chunks: 2 }, &recognizer, meta())
        .await
        .unwrap();

    assert_eq!(out.stop_reason, StopReason::SourceFailed);
    assert_eq!(out.chunks_written, 2);
    assert_eq!(recognizer.received.lock().len(), 2);
}

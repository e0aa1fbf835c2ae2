//! Audio streaming endpoint.
//!
//! The request body is raw 16-bit little-endian PCM.  It is re-framed into
//! `streaming.chunk_bytes` chunks and fed through the streaming pipeline to
//! the configured recognizer while the device's session is marked as
//! audio-streaming.  With `streaming.end_of_speech` enabled, a run of quiet
//! chunks after speech ends the utterance and the rest of the body is
//! dropped.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use pb_streaming::{
    AudioFrame, ChannelChunkSource, EndOfSpeechDetector, SessionMetadata, StreamError,
};

use super::{api_error, session_error};
use crate::state::AppState;

/// Frames buffered between the body reader and the pipeline.
const FRAME_BUFFER: usize = 8;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/stream/:serial
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stream_audio(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Query(query): Query<StreamQuery>,
    body: Body,
) -> Response {
    let Some(recognizer) = state.recognizer.clone() else {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "no recognizer configured");
    };

    let session = match state.pool.acquire(&serial).await {
        Ok(session) => session,
        Err(e) => return session_error(&e),
    };
    let _streaming = session.audio_stream_guard();

    let (tx, source) = ChannelChunkSource::channel(FRAME_BUFFER);
    let streaming = &state.config.streaming;
    let detector = EndOfSpeechDetector::from_config(&streaming.end_of_speech);
    let feeder = tokio::spawn(feed_body(body, streaming.chunk_bytes, detector, tx));

    let meta = SessionMetadata {
        device_id: session.serial().to_owned(),
        request_id: query
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        locale: query.locale,
    };
    let request_id = meta.request_id.clone();

    let result = state.pipeline.run(source, recognizer.as_ref(), meta).await;
    // The pipeline may stop before the upload ends.
    feeder.abort();

    match result {
        Ok(out) => Json(serde_json::json!({
            "device_id": session.serial(),
            "request_id": request_id,
            "transcript": out.text,
            "stop_reason": out.stop_reason.as_str(),
            "chunks_written": out.chunks_written,
        }))
        .into_response(),
        Err(e @ StreamError::Backend(_)) => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Copy the request body into fixed-size frames.  Returns the number of
/// frames sent; dropping `tx` ends the audio.  A frame the detector flags is
/// sent as [`AudioFrame::EndOfSpeech`] and nothing follows it.
async fn feed_body(
    body: Body,
    chunk_bytes: usize,
    mut detector: Option<EndOfSpeechDetector>,
    tx: mpsc::Sender<AudioFrame>,
) -> usize {
    let chunk_bytes = chunk_bytes.max(1);
    let mut stream = body.into_data_stream();
    let mut pending: Vec<u8> = Vec::with_capacity(chunk_bytes);
    let mut sent = 0usize;

    while let Some(next) = stream.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "audio upload interrupted");
                return sent;
            }
        };
        pending.extend_from_slice(&bytes);
        while pending.len() >= chunk_bytes {
            let rest = pending.split_off(chunk_bytes);
            let frame = to_frame(std::mem::replace(&mut pending, rest), &mut detector);
            let last = matches!(frame, AudioFrame::EndOfSpeech(_));
            if tx.send(frame).await.is_err() {
                return sent;
            }
            sent += 1;
            if last {
                tracing::debug!(frames = sent, "local end of speech");
                return sent;
            }
        }
    }

    if !pending.is_empty() && tx.send(to_frame(pending, &mut detector)).await.is_ok() {
        sent += 1;
    }
    sent
}

fn to_frame(bytes: Vec<u8>, detector: &mut Option<EndOfSpeechDetector>) -> AudioFrame {
    match detector.as_mut().map(|d| d.observe(&bytes)) {
        Some(true) => AudioFrame::EndOfSpeech(bytes),
        _ => AudioFrame::Chunk(bytes),
    }
}

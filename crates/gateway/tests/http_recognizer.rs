//! HTTP recognizer against an in-process speech endpoint that streams
//! newline-delimited JSON while the upload is still running.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use pb_gateway::recognizer::HttpRecognizer;
use pb_streaming::{
    AudioFrame, ChannelChunkSource, PipelineConfig, SessionMetadata, StopReason,
    StreamingPipeline,
};

const CHUNK: usize = 64;

/// Says it has heard enough straight away, then answers with the device id
/// and the byte count once the upload ends.
async fn recognize(headers: HeaderMap, body: Body) -> Body {
    let device = headers
        .get("x-device-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("?")
        .to_owned();
    let (tx, rx) = mpsc::channel::<String>(4);

    tokio::spawn(async move {
        let _ = tx
            .send("{\"partial\":\"lights\",\"safe_to_stop_audio\":false}\n".into())
            .await;
        let _ = tx
            .send("{\"partial\":\"lights on\",\"safe_to_stop_audio\":true}\n".into())
            .await;
        let mut received = 0usize;
        let mut upload = body.into_data_stream();
        while let Some(Ok(bytes)) = upload.next().await {
            received += bytes.len();
        }
        let _ = tx
            .send(format!("{{\"transcript\":\"{device}:{received}\"}}\n"))
            .await;
    });

    Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (Ok::<_, Infallible>(line), rx))
    }))
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/recognize")
}

#[tokio::test]
async fn safe_to_stop_partial_ends_the_upload() {
    let url = serve(Router::new().route("/recognize", post(recognize))).await;
    let recognizer = HttpRecognizer::new(url, Duration::from_secs(10)).unwrap();

    // Never runs dry on its own.
    let (tx, source) = ChannelChunkSource::channel(4);
    tokio::spawn(async move {
        while tx.send(AudioFrame::Chunk(vec![5u8; CHUNK])).await.is_ok() {}
    });

    let meta = SessionMetadata {
        device_id: "abc123".into(),
        request_id: "req-7".into(),
        locale: Some("en-US".into()),
    };
    let out = tokio::time::timeout(
        Duration::from_secs(10),
        StreamingPipeline::new(PipelineConfig::default()).run(source, &recognizer, meta),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(out.stop_reason, StopReason::EarlyStop);
    // Every chunk written before the stop reached the endpoint, nothing after.
    assert_eq!(out.text, format!("abc123:{}", out.chunks_written * CHUNK));
}

#[tokio::test]
async fn single_object_response_is_accepted() {
    let app = Router::new().route(
        "/recognize",
        post(|body: Body| async move {
            let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            format!("{{\"transcript\":\"{} bytes\"}}", bytes.len())
        }),
    );
    let recognizer = HttpRecognizer::new(serve(app).await, Duration::from_secs(10)).unwrap();

    let (tx, source) = ChannelChunkSource::channel(4);
    tx.send(AudioFrame::Chunk(vec![1u8; 10])).await.unwrap();
    tx.send(AudioFrame::Chunk(vec![2u8; 6])).await.unwrap();
    drop(tx);

    let out = StreamingPipeline::new(PipelineConfig::default())
        .run(source, &recognizer, SessionMetadata::default())
        .await
        .unwrap();
    assert_eq!(out.text, "16 bytes");
    assert_eq!(out.stop_reason, StopReason::SourceExhausted);
}

#[tokio::test]
async fn error_status_is_backend_error() {
    let app = Router::new().route(
        "/recognize",
        post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "warming up") }),
    );
    let recognizer = HttpRecognizer::new(serve(app).await, Duration::from_secs(10)).unwrap();

    let (tx, source) = ChannelChunkSource::channel(1);
    drop(tx);
    let err = StreamingPipeline::new(PipelineConfig::default())
        .run(source, &recognizer, SessionMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, pb_streaming::StreamError::Backend(ref m) if m.contains("warming up")));
}

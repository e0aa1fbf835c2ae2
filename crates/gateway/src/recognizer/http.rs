//! Speech-to-text over a single streaming HTTP request.
//!
//! The pipe's read half becomes a chunked request body.  The endpoint
//! answers with newline-delimited JSON while the upload is still running:
//!
//! - `{"partial": "...", "safe_to_stop_audio": bool}` for each partial
//!   transcript, forwarded to the pipeline's early-stop watcher,
//! - `{"transcript": "..."}` once the utterance is final.
//!
//! A plain single-object `{"transcript": "..."}` body is accepted too.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

use pb_streaming::{AudioStream, PartialResult, Recognizer, SessionMetadata, StreamError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseLine {
    Final {
        transcript: String,
    },
    Partial {
        partial: String,
        #[serde(default)]
        safe_to_stop_audio: bool,
    },
}

pub struct HttpRecognizer {
    client: reqwest::Client,
    url: String,
}

impl HttpRecognizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn stream(
        &self,
        audio: AudioStream,
        meta: SessionMetadata,
        partials: mpsc::Sender<PartialResult>,
    ) -> Result<String, StreamError> {
        let body = reqwest::Body::wrap_stream(ReaderStream::new(audio));

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/octet-stream")
            .header("x-device-id", &meta.device_id)
            .header("x-request-id", &meta.request_id)
            .body(body);
        if let Some(locale) = &meta.locale {
            req = req.header("content-language", locale);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StreamError::Backend(format!("request to {}: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(StreamError::Backend(format!("{status}: {detail}")));
        }

        let mut body = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        let mut transcript = None;

        while let Some(chunk) = body.next().await {
            let chunk =
                chunk.map_err(|e| StreamError::Backend(format!("reading response: {e}")))?;
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if let Some(text) = handle_line(&line, &partials).await? {
                    transcript = Some(text);
                }
            }
        }
        if let Some(text) = handle_line(&buf, &partials).await? {
            transcript = Some(text);
        }

        transcript.ok_or_else(|| StreamError::Backend("response ended without a transcript".into()))
    }
}

/// Forward a partial, or return the final transcript.
async fn handle_line(
    line: &[u8],
    partials: &mpsc::Sender<PartialResult>,
) -> Result<Option<String>, StreamError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: ResponseLine = serde_json::from_slice(line)
        .map_err(|e| StreamError::Backend(format!("invalid response line: {e}")))?;
    match parsed {
        ResponseLine::Final { transcript } => Ok(Some(transcript)),
        ResponseLine::Partial {
            partial,
            safe_to_stop_audio,
        } => {
            // The watcher stops listening once early stop has fired.
            let _ = partials
                .send(PartialResult {
                    text: partial,
                    safe_to_stop_audio,
                })
                .await;
            Ok(None)
        }
    }
}

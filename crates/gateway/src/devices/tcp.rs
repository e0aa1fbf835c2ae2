//! Development device client speaking newline-delimited JSON over TCP.
//!
//! Wire format, one JSON object per line:
//!
//! - gateway -> device: `{"type":"hello","serial":..,"credential":..}` right
//!   after connecting, then `{"type":"subscribe","events":[..]}`.
//!   `{"type":"ping"}` at any time as a health check.
//! - device -> gateway: `{"event":"<name>", ...}` for every pushed event,
//!   and `{"type":"pong"}` answering each ping.
//!
//! Events whose name is not in the subscription filter are dropped here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use pb_domain::config::DeviceConfig;
use pb_sessions::{DeviceConnection, DeviceConnector, DeviceError, DeviceEvent, EventSubscription};

const EVENT_BUFFER: usize = 64;

pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(cfg: &DeviceConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
        }
    }
}

async fn connect(target: &str, timeout: Duration) -> Result<TcpStream, DeviceError> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(DeviceError::Connect {
            target: target.to_owned(),
            message: e.to_string(),
        }),
        Err(_) => Err(DeviceError::Connect {
            target: target.to_owned(),
            message: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn open(
        &self,
        target: &str,
        serial: &str,
        credential: &str,
    ) -> Result<Arc<dyn DeviceConnection>, DeviceError> {
        let stream = connect(target, self.connect_timeout).await?;
        let (read, write) = stream.into_split();

        let conn = TcpConnection {
            target: target.to_owned(),
            reply_timeout: self.connect_timeout,
            reader: Mutex::new(Some(BufReader::new(read))),
            writer: tokio::sync::Mutex::new(write),
            pong: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        };
        conn.send_line(&serde_json::json!({
            "type": "hello",
            "serial": serial,
            "credential": credential,
        }))
        .await?;

        tracing::debug!(serial = %serial, addr = %target, "device control connection open");
        Ok(Arc::new(conn))
    }
}

type PongSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

struct TcpConnection {
    target: String,
    reply_timeout: Duration,
    /// Owned here until the event reader task takes it.
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    /// Waiter for the next pong while the event reader owns the socket.
    pong: PongSlot,
    cancel: CancellationToken,
}

impl TcpConnection {
    async fn send_line(&self, msg: &serde_json::Value) -> Result<(), DeviceError> {
        let mut line = serde_json::to_vec(msg).map_err(|e| DeviceError::Rpc(e.to_string()))?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| DeviceError::Rpc(e.to_string()))
    }

    /// Read lines until a pong arrives.  Used before the event reader starts;
    /// anything else received in the meantime is not subscribed to yet.
    async fn read_pong(reader: &mut BufReader<OwnedReadHalf>) -> Result<(), DeviceError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| DeviceError::Rpc(e.to_string()))?;
            if n == 0 {
                return Err(DeviceError::Closed);
            }
            if is_pong(&line) {
                return Ok(());
            }
        }
    }

    fn reply_timed_out(&self) -> DeviceError {
        DeviceError::Rpc(format!("no pong within {}ms", self.reply_timeout.as_millis()))
    }
}

#[async_trait]
impl DeviceConnection for TcpConnection {
    async fn health_check(&self) -> Result<(), DeviceError> {
        if self.cancel.is_cancelled() {
            return Err(DeviceError::Closed);
        }

        let (tx, rx) = oneshot::channel();
        *self.pong.lock() = Some(tx);
        self.send_line(&serde_json::json!({ "type": "ping" })).await?;

        let reader = self.reader.lock().take();
        if let Some(mut reader) = reader {
            let res = tokio::time::timeout(self.reply_timeout, Self::read_pong(&mut reader)).await;
            *self.reader.lock() = Some(reader);
            self.pong.lock().take();
            return res.unwrap_or_else(|_| Err(self.reply_timed_out()));
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeviceError::Closed),
            Err(_) => {
                self.pong.lock().take();
                Err(self.reply_timed_out())
            }
        }
    }

    async fn subscribe_events(&self, filter: &[String]) -> Result<EventSubscription, DeviceError> {
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| DeviceError::Rpc("event stream already subscribed".into()))?;

        self.send_line(&serde_json::json!({
            "type": "subscribe",
            "events": filter,
        }))
        .await?;

        let (tx, subscription) = EventSubscription::channel(EVENT_BUFFER);
        let filter = filter.to_vec();
        let cancel = self.cancel.clone();
        let target = self.target.clone();
        let pong = self.pong.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => line,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(addr = %target, error = %e, "device event stream read failed");
                        break;
                    }
                };
                if is_pong(&line) {
                    let waiter = pong.lock().take();
                    if let Some(waiter) = waiter {
                        let _ = waiter.send(());
                    }
                    continue;
                }
                let Some(event) = parse_event(&line, &filter) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            // Fail any health check still waiting on this socket.
            pong.lock().take();
            tracing::debug!(addr = %target, "device event reader exiting");
        });

        Ok(subscription)
    }

    async fn close(&self) {
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(addr = %self.target, error = %e, "device socket shutdown");
        }
    }
}

fn is_pong(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .map(|v| v.get("type").and_then(|t| t.as_str()) == Some("pong"))
        .unwrap_or(false)
}

/// Parse one line into an event, if it is well-formed and passes `filter`.
fn parse_event(line: &str, filter: &[String]) -> Option<DeviceEvent> {
    let payload: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed device event line");
            return None;
        }
    };
    let name = payload.get("event")?.as_str()?.to_owned();
    if !filter.iter().any(|f| *f == name) {
        return None;
    }
    Some(DeviceEvent { name, payload })
}

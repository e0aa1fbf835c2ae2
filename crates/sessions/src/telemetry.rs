//! Device event consumer.
//!
//! Drains a session's event subscription while the session's
//! events-streaming flag is set, caching the latest `stimulation_info`
//! value on the session.  Releasing the session clears the flag and cancels
//! its scope, which ends the consumer.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::device::DeviceEvent;
use crate::session::Session;

/// Event name carrying the robot's stimulation level.
pub const STIMULATION_EVENT: &str = "stimulation_info";

/// Start consuming `session`'s events.  Returns `None` if another consumer
/// already took the subscription.
pub fn spawn_consumer(session: Arc<Session>) -> Option<JoinHandle<usize>> {
    let mut events = session.take_events()?;
    session.set_events_streaming(true);

    Some(tokio::spawn(async move {
        let mut handled = 0usize;
        loop {
            let event = tokio::select! {
                biased;
                _ = session.scope().cancelled() => break,
                event = events.next() => event,
            };
            let Some(event) = event else {
                tracing::debug!(serial = %session.serial(), "device event stream ended");
                break;
            };
            if !session.is_events_streaming() {
                break;
            }
            apply_event(&session, &event);
            handled += 1;
        }
        session.set_events_streaming(false);
        handled
    }))
}

fn apply_event(session: &Session, event: &DeviceEvent) {
    if event.name != STIMULATION_EVENT {
        return;
    }
    match event.payload.get("value").and_then(|v| v.as_f64()) {
        Some(value) => session.set_stim_value(value as f32),
        None => tracing::debug!(serial = %session.serial(), "stimulation event without value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceConnection, DeviceError, EventSubscription};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Conn;

    #[async_trait]
    impl DeviceConnection for Conn {
        async fn health_check(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn subscribe_events(&self, _: &[String]) -> Result<EventSubscription, DeviceError> {
            Err(DeviceError::Closed)
        }
        async fn close(&self) {}
    }

    fn session_with_events() -> (mpsc::Sender<DeviceEvent>, Arc<Session>) {
        let (tx, sub) = EventSubscription::channel(8);
        let session = Arc::new(Session::new(
            "abc123".into(),
            "127.0.0.1:443".into(),
            "guid".into(),
            1,
            Arc::new(Conn),
            sub,
        ));
        (tx, session)
    }

    fn stim(value: f64) -> DeviceEvent {
        DeviceEvent {
            name: STIMULATION_EVENT.into(),
            payload: serde_json::json!({ "value": value }),
        }
    }

    #[tokio::test]
    async fn caches_last_stimulation_value() {
        let (tx, session) = session_with_events();
        let handle = spawn_consumer(session.clone()).unwrap();
        assert!(session.is_events_streaming());

        tx.send(stim(0.25)).await.unwrap();
        tx.send(DeviceEvent {
            name: "robot_state".into(),
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();
        tx.send(stim(0.75)).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);
        assert!((session.stim_value() - 0.75).abs() < f32::EPSILON);
        assert!(!session.is_events_streaming());
    }

    #[tokio::test]
    async fn scope_cancellation_stops_consumer() {
        let (_tx, session) = session_with_events();
        let handle = spawn_consumer(session.clone()).unwrap();
        session.scope().cancel();
        assert_eq!(handle.await.unwrap(), 0);
        assert!(!session.is_events_streaming());
    }

    #[tokio::test]
    async fn second_consumer_is_refused() {
        let (_tx, session) = session_with_events();
        let _first = spawn_consumer(session.clone()).unwrap();
        assert!(spawn_consumer(session).is_none());
    }
}

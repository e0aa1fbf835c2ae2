//! A pooled, live device session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceConnection, EventSubscription};

/// Mutable per-session state.  Every access goes through the session lock.
#[derive(Debug, Default)]
struct SessionState {
    audio_streaming: bool,
    /// Live [`AudioStreamGuard`]s.
    audio_streams: u32,
    events_streaming: bool,
    idle_secs: u32,
    stim_value: f32,
}

/// A live control session to one robot.
///
/// Identity fields are fixed at creation.  The control connection stays open
/// until the pool releases the session.
pub struct Session {
    serial: String,
    target: String,
    credential: String,
    generation: u64,
    created_at: DateTime<Utc>,
    connection: Arc<dyn DeviceConnection>,
    events: Mutex<Option<EventSubscription>>,
    state: Mutex<SessionState>,
    scope: CancellationToken,
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub serial: String,
    pub target: String,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u32,
    pub audio_streaming: bool,
    pub events_streaming: bool,
    pub stim_value: f32,
}

impl Session {
    pub(crate) fn new(
        serial: String,
        target: String,
        credential: String,
        generation: u64,
        connection: Arc<dyn DeviceConnection>,
        events: EventSubscription,
    ) -> Self {
        Self {
            serial,
            target,
            credential,
            generation,
            created_at: Utc::now(),
            connection,
            events: Mutex::new(Some(events)),
            state: Mutex::new(SessionState::default()),
            scope: CancellationToken::new(),
        }
    }

    /// Normalized device serial.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Pool generation; distinguishes a re-created session from its predecessor.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn connection(&self) -> &Arc<dyn DeviceConnection> {
        &self.connection
    }

    /// Cancelled when the session is released.  Consumers bound to the
    /// session's lifetime should select on it.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    // ── Idle counter ────────────────────────────────────────────────

    /// Record activity: resets the idle counter to zero.
    pub fn touch(&self) {
        self.state.lock().idle_secs = 0;
    }

    pub fn idle_secs(&self) -> u32 {
        self.state.lock().idle_secs
    }

    /// Advance the idle counter by one tick.  Only the reaper calls this.
    pub(crate) fn tick_idle(&self) -> u32 {
        let mut state = self.state.lock();
        state.idle_secs = state.idle_secs.saturating_add(1);
        state.idle_secs
    }

    // ── Streaming flags ─────────────────────────────────────────────

    pub fn set_audio_streaming(&self, active: bool) {
        self.state.lock().audio_streaming = active;
    }

    /// Set by [`set_audio_streaming`](Self::set_audio_streaming) or while
    /// any [`AudioStreamGuard`] is alive.
    pub fn is_audio_streaming(&self) -> bool {
        self.state.lock().is_audio_streaming()
    }

    pub fn set_events_streaming(&self, active: bool) {
        self.state.lock().events_streaming = active;
    }

    pub fn is_events_streaming(&self) -> bool {
        self.state.lock().events_streaming
    }

    /// Clear both streaming flags.  Returns whether either was set.
    pub(crate) fn clear_streaming(&self) -> bool {
        let mut state = self.state.lock();
        let was_active = state.is_audio_streaming() || state.events_streaming;
        state.audio_streaming = false;
        state.audio_streams = 0;
        state.events_streaming = false;
        was_active
    }

    /// Mark audio streaming active for the lifetime of the returned guard.
    ///
    /// Guards nest: the session stays audio-streaming until the last one is
    /// dropped.  Entering and leaving both count as activity for the idle
    /// counter.
    pub fn audio_stream_guard(self: &Arc<Self>) -> AudioStreamGuard {
        {
            let mut state = self.state.lock();
            state.audio_streams += 1;
            state.idle_secs = 0;
        }
        AudioStreamGuard {
            session: Arc::clone(self),
        }
    }

    // ── Telemetry ───────────────────────────────────────────────────

    /// Last cached `stimulation_info` reading.
    pub fn stim_value(&self) -> f32 {
        self.state.lock().stim_value
    }

    pub fn set_stim_value(&self, value: f32) {
        self.state.lock().stim_value = value;
    }

    /// Take the event subscription.  Only the first caller gets it.
    pub fn take_events(&self) -> Option<EventSubscription> {
        self.events.lock().take()
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            serial: self.serial.clone(),
            target: self.target.clone(),
            generation: self.generation,
            created_at: self.created_at,
            idle_secs: state.idle_secs,
            audio_streaming: state.is_audio_streaming(),
            events_streaming: state.events_streaming,
            stim_value: state.stim_value,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("serial", &self.serial)
            .field("target", &self.target)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Keeps a session's audio-streaming flag set until dropped.
pub struct AudioStreamGuard {
    session: Arc<Session>,
}

impl Drop for AudioStreamGuard {
    fn drop(&mut self) {
        let mut state = self.session.state.lock();
        state.audio_streams = state.audio_streams.saturating_sub(1);
        state.idle_secs = 0;
    }
}

impl SessionState {
    fn is_audio_streaming(&self) -> bool {
        self.audio_streaming || self.audio_streams > 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::{DeviceError, EventSubscription};
    use async_trait::async_trait;

    pub(crate) struct NullConnection;

    #[async_trait]
    impl DeviceConnection for NullConnection {
        async fn health_check(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn subscribe_events(&self, _: &[String]) -> Result<EventSubscription, DeviceError> {
            Ok(EventSubscription::channel(1).1)
        }
        async fn close(&self) {}
    }

    pub(crate) fn make_session(serial: &str, generation: u64) -> Arc<Session> {
        Arc::new(Session::new(
            serial.into(),
            "127.0.0.1:443".into(),
            "guid".into(),
            generation,
            Arc::new(NullConnection),
            EventSubscription::channel(1).1,
        ))
    }

    #[test]
    fn tick_and_touch() {
        let s = make_session("abc", 1);
        assert_eq!(s.tick_idle(), 1);
        assert_eq!(s.tick_idle(), 2);
        s.touch();
        assert_eq!(s.idle_secs(), 0);
    }

    #[test]
    fn clear_streaming_reports_previous_state() {
        let s = make_session("abc", 1);
        assert!(!s.clear_streaming());
        s.set_events_streaming(true);
        assert!(s.clear_streaming());
        assert!(!s.is_events_streaming());
    }

    #[test]
    fn audio_guard_sets_and_clears_flag() {
        let s = make_session("abc", 1);
        s.tick_idle();
        {
            let _guard = s.audio_stream_guard();
            assert!(s.is_audio_streaming());
            assert_eq!(s.idle_secs(), 0);
            s.tick_idle();
        }
        assert!(!s.is_audio_streaming());
        assert_eq!(s.idle_secs(), 0);
    }

    #[test]
    fn overlapping_audio_guards_keep_flag_until_last_drop() {
        let s = make_session("abc", 1);
        let first = s.audio_stream_guard();
        let second = s.audio_stream_guard();
        drop(first);
        assert!(s.is_audio_streaming());
        assert!(s.info().audio_streaming);
        drop(second);
        assert!(!s.is_audio_streaming());
    }

    #[test]
    fn clear_streaming_sees_guarded_stream() {
        let s = make_session("abc", 1);
        let guard = s.audio_stream_guard();
        assert!(s.clear_streaming());
        assert!(!s.is_audio_streaming());
        drop(guard);
        assert!(!s.is_audio_streaming());
    }

    #[test]
    fn events_can_be_taken_once() {
        let s = make_session("abc", 1);
        assert!(s.take_events().is_some());
        assert!(s.take_events().is_none());
    }

    #[test]
    fn info_omits_credential() {
        let s = make_session("abc", 7);
        let json = serde_json::to_value(s.info()).unwrap();
        assert_eq!(json["generation"], 7);
        assert!(json.get("credential").is_none());
    }
}

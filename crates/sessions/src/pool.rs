//! Process-wide registry of live device sessions.
//!
//! Creation and removal are serialized by a single creation gate (an async
//! mutex acquired with a bounded wait).  Session creation is slow and rare,
//! so concurrent `acquire` calls simply queue behind the gate and converge
//! on whatever session the first caller created.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pb_domain::config::{normalize_serial, SessionsConfig};
use pb_domain::trace::TraceEvent;

use crate::device::{DeviceConnector, DeviceDirectory};
use crate::error::SessionError;
use crate::reaper::{self, Evictor, ReaperExit, ReaperTiming};
use crate::session::{Session, SessionInfo};

/// Tunables for a [`SessionPool`].
#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    /// Reaper ticks of inactivity before a session is evicted.
    pub idle_threshold: u32,
    /// Length of one reaper tick.
    pub tick: Duration,
    /// Longest time a caller waits for the creation gate.
    pub gate_timeout: Duration,
    /// Pause after clearing an active streaming flag during release.
    pub release_grace: Duration,
    /// Event names requested when subscribing to device events.
    pub event_filter: Vec<String>,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self::from(&SessionsConfig::default())
    }
}

impl From<&SessionsConfig> for SessionPoolConfig {
    fn from(cfg: &SessionsConfig) -> Self {
        Self {
            idle_threshold: cfg.idle_timeout_secs,
            tick: Duration::from_millis(cfg.tick_ms.max(1)),
            gate_timeout: Duration::from_secs(cfg.gate_timeout_secs),
            release_grace: Duration::from_millis(cfg.release_grace_ms),
            event_filter: cfg.event_filter.clone(),
        }
    }
}

/// Why a session is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Explicit close requested through the server.
    Server,
    /// The session's reaper hit the idle threshold.
    IdleTimeout,
    /// Pool shutdown.
    Shutdown,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
        }
    }

    /// Externally triggered releases stop the reaper before removal.
    fn stops_reaper(&self) -> bool {
        !matches!(self, Self::IdleTimeout)
    }
}

impl std::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct PoolEntry {
    session: Arc<Session>,
    stop: CancellationToken,
    reaper: Option<JoinHandle<ReaperExit>>,
}

struct PoolInner {
    directory: Arc<dyn DeviceDirectory>,
    connector: Arc<dyn DeviceConnector>,
    config: SessionPoolConfig,
    sessions: RwLock<HashMap<String, PoolEntry>>,
    gate: Mutex<()>,
    next_generation: AtomicU64,
    active_reapers: Arc<AtomicUsize>,
}

/// Cloneable handle to the session registry.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        connector: Arc<dyn DeviceConnector>,
        config: SessionPoolConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                directory,
                connector,
                config,
                sessions: RwLock::new(HashMap::new()),
                gate: Mutex::new(()),
                next_generation: AtomicU64::new(0),
                active_reapers: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Return the live session for `device_id`, creating it on first use.
    ///
    /// Waits behind any in-flight creation or removal; gives up with
    /// [`SessionError::CreationGateTimeout`] after `gate_timeout`.
    pub async fn acquire(&self, device_id: &str) -> Result<Arc<Session>, SessionError> {
        let serial = normalize_serial(device_id);
        let _gate = self.inner.lock_gate().await?;

        if let Some(session) = self.get(&serial) {
            return Ok(session);
        }

        let started = Instant::now();
        match self.create(&serial).await {
            Ok(session) => {
                TraceEvent::SessionCreated {
                    serial: serial.clone(),
                    target: session.target().to_owned(),
                    generation: session.generation(),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
                .emit();
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(serial = %serial, stage = e.stage(), error = %e, "device session creation failed");
                TraceEvent::SessionCreateFailed {
                    serial,
                    stage: e.stage().to_owned(),
                    error: e.to_string(),
                }
                .emit();
                Err(e)
            }
        }
    }

    /// Build a session and insert it.  Caller holds the gate.
    async fn create(&self, serial: &str) -> Result<Arc<Session>, SessionError> {
        let inner = &self.inner;

        let record = inner
            .directory
            .lookup(serial)
            .ok_or_else(|| SessionError::DeviceNotRegistered(serial.to_owned()))?;
        let credential = record
            .credential
            .clone()
            .or_else(|| inner.directory.global_credential())
            .ok_or_else(|| SessionError::MissingCredential(serial.to_owned()))?;

        tracing::info!(serial = %serial, addr = %record.target, "connecting to device");

        let connection = inner
            .connector
            .open(&record.target, serial, &credential)
            .await
            .map_err(|source| SessionError::ConnectionFailed {
                serial: serial.to_owned(),
                source,
            })?;

        if let Err(source) = connection.health_check().await {
            connection.close().await;
            return Err(SessionError::HealthCheckFailed {
                serial: serial.to_owned(),
                source,
            });
        }

        let events = match connection.subscribe_events(&inner.config.event_filter).await {
            Ok(events) => events,
            Err(source) => {
                connection.close().await;
                return Err(SessionError::SubscriptionFailed {
                    serial: serial.to_owned(),
                    source,
                });
            }
        };

        let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(Session::new(
            serial.to_owned(),
            record.target,
            credential,
            generation,
            connection,
            events,
        ));

        let stop = CancellationToken::new();
        let reaper = self.spawn_reaper(session.clone(), stop.clone());
        inner.sessions.write().insert(
            serial.to_owned(),
            PoolEntry {
                session: session.clone(),
                stop,
                reaper: Some(reaper),
            },
        );

        tracing::info!(serial = %serial, generation, "device session ready");
        Ok(session)
    }

    fn spawn_reaper(&self, session: Arc<Session>, stop: CancellationToken) -> JoinHandle<ReaperExit> {
        let evictor = PoolEvictor(Arc::downgrade(&self.inner));
        let timing = ReaperTiming {
            tick: self.inner.config.tick,
            idle_threshold: self.inner.config.idle_threshold,
        };
        let active = self.inner.active_reapers.clone();
        active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let exit = reaper::run(evictor, session, stop, timing).await;
            active.fetch_sub(1, Ordering::SeqCst);
            exit
        })
    }

    /// Remove the session for `device_id`.  Returns `false` when there was
    /// nothing to remove, so repeated releases are harmless.
    pub async fn release(&self, device_id: &str, reason: ReleaseReason) -> Result<bool, SessionError> {
        let serial = normalize_serial(device_id);
        let (removed, reaper) = self.inner.remove(&serial, None, reason).await?;
        if let Some(handle) = reaper {
            // Gate is released by now, so a reaper blocked on eviction can finish.
            let _ = handle.await;
        }
        Ok(removed)
    }

    /// Reset the idle counter of a pooled session.  Returns `false` if the
    /// device has no session.
    pub fn touch(&self, device_id: &str) -> bool {
        match self.get(&normalize_serial(device_id)) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Look up a pooled session without creating one.
    pub fn get(&self, device_id: &str) -> Option<Arc<Session>> {
        self.inner
            .sessions
            .read()
            .get(&normalize_serial(device_id))
            .map(|e| e.session.clone())
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .inner
            .sessions
            .read()
            .values()
            .map(|e| e.session.info())
            .collect();
        infos.sort_by(|a, b| a.serial.cmp(&b.serial));
        infos
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().is_empty()
    }

    /// Number of reaper tasks still running.
    pub fn active_reapers(&self) -> usize {
        self.inner.active_reapers.load(Ordering::SeqCst)
    }

    /// Release every session and wait for all reapers to exit.
    pub async fn shutdown(&self) {
        let serials: Vec<String> = self.inner.sessions.read().keys().cloned().collect();
        for serial in serials {
            if let Err(e) = self.release(&serial, ReleaseReason::Shutdown).await {
                tracing::warn!(serial = %serial, error = %e, "session release on shutdown failed");
            }
        }
        tracing::info!("session pool shut down");
    }
}

impl PoolInner {
    async fn lock_gate(&self) -> Result<MutexGuard<'_, ()>, SessionError> {
        tokio::time::timeout(self.config.gate_timeout, self.gate.lock())
            .await
            .map_err(|_| SessionError::CreationGateTimeout(self.config.gate_timeout))
    }

    /// The single removal path shared by explicit release, shutdown and
    /// idle eviction.  With `generation` set, only that generation of the
    /// session is removed.
    async fn remove(
        &self,
        serial: &str,
        generation: Option<u64>,
        reason: ReleaseReason,
    ) -> Result<(bool, Option<JoinHandle<ReaperExit>>), SessionError> {
        let _gate = self.lock_gate().await?;

        let (session, stop) = {
            let sessions = self.sessions.read();
            match sessions.get(serial) {
                Some(entry) if generation.map_or(true, |g| g == entry.session.generation()) => {
                    (entry.session.clone(), entry.stop.clone())
                }
                Some(entry) => {
                    tracing::debug!(
                        serial = %serial,
                        stale = ?generation,
                        current = entry.session.generation(),
                        "ignoring eviction for replaced session"
                    );
                    return Ok((false, None));
                }
                None => return Ok((false, None)),
            }
        };

        if reason.stops_reaper() {
            stop.cancel();
        }

        if session.clear_streaming() {
            tracing::debug!(serial = %serial, "waiting for streaming consumers to stop");
            tokio::time::sleep(self.config.release_grace).await;
        }

        let reaper = self
            .sessions
            .write()
            .remove(serial)
            .and_then(|mut entry| entry.reaper.take());

        session.scope().cancel();
        session.connection().close().await;

        tracing::info!(serial = %serial, generation = session.generation(), reason = %reason, "device session closed");
        TraceEvent::SessionReleased {
            serial: serial.to_owned(),
            generation: session.generation(),
            reason: reason.as_str().to_owned(),
        }
        .emit();

        // An evicting reaper is the caller here; only hand back handles of
        // reapers that were told to stop.
        let reaper = if reason.stops_reaper() { reaper } else { None };
        Ok((true, reaper))
    }
}

/// Eviction through a weak pool reference so reapers never keep a dropped
/// pool alive.
struct PoolEvictor(Weak<PoolInner>);

#[async_trait]
impl Evictor for PoolEvictor {
    async fn evict(&self, serial: &str, generation: u64) -> Result<bool, SessionError> {
        match self.0.upgrade() {
            Some(inner) => inner
                .remove(serial, Some(generation), ReleaseReason::IdleTimeout)
                .await
                .map(|(removed, _)| removed),
            None => Ok(false),
        }
    }
}

//! Per-session idle reaper.
//!
//! Each pooled session gets one reaper task.  Every tick it bumps the
//! session's idle counter; once the counter reaches the threshold the
//! reaper asks the pool to evict *its own generation* of the session.
//! Consumers keep a session warm by calling [`Session::touch`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::session::Session;

const MIN_TICK: Duration = Duration::from_millis(1);

/// How a reaper task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperExit {
    /// Stop requested (explicit release or pool shutdown), or the session
    /// it watched is no longer the one in the pool.
    Stopped,
    /// The reaper evicted its session after the idle threshold.
    Evicted,
}

/// Removal path the reaper calls on timeout.
#[async_trait]
pub(crate) trait Evictor: Send + Sync {
    /// Evict `serial` only if the pooled entry still has `generation`.
    /// `Ok(false)` means there was nothing of that generation to evict.
    async fn evict(&self, serial: &str, generation: u64) -> Result<bool, SessionError>;
}

/// Timing parameters for one reaper.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReaperTiming {
    pub tick: Duration,
    pub idle_threshold: u32,
}

pub(crate) async fn run<E: Evictor>(
    evictor: E,
    session: Arc<Session>,
    stop: CancellationToken,
    timing: ReaperTiming,
) -> ReaperExit {
    let serial = session.serial().to_owned();
    let generation = session.generation();
    session.touch();

    // `interval` panics on a zero period.
    let mut interval = tokio::time::interval(timing.tick.max(MIN_TICK));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!(serial = %serial, generation, "session reaper stopping");
                return ReaperExit::Stopped;
            }
            _ = interval.tick() => {}
        }

        let idle = session.tick_idle();
        if idle < timing.idle_threshold {
            continue;
        }

        tracing::info!(serial = %serial, generation, idle, "closing idle device session");
        match evictor.evict(&serial, generation).await {
            Ok(true) => return ReaperExit::Evicted,
            Ok(false) => {
                tracing::debug!(serial = %serial, generation, "session already gone, reaper exiting");
                return ReaperExit::Stopped;
            }
            Err(e) => {
                // The counter stays at/above the threshold, so the next tick retries.
                tracing::warn!(serial = %serial, generation, error = %e, "idle eviction failed");
            }
        }
    }
}

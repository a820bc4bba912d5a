//! Ingestion Scheduler
//!
//! One independent task per feed, each on its own interval. A failing feed
//! only reports a failed cycle for itself; it never delays or clears another
//! feed. Every task carries a [`Liveness`] token checked after each await, so
//! a response resolving after teardown is dropped before it reaches the view.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::FeedSchedule;
use crate::records::{FeedKind, FeedPayload};
use crate::Result;

/// Anything that can produce a feed's full record set.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self, kind: FeedKind) -> impl Future<Output = Result<FeedPayload>> + Send;
}

// ============================================================================
// Liveness
// ============================================================================

/// Owner side of a mount's liveness flag.
#[derive(Debug)]
pub struct LivenessGuard {
    generation: u64,
    tx: watch::Sender<bool>,
}

impl LivenessGuard {
    pub fn new(generation: u64) -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> Liveness {
        Liveness {
            generation: self.generation,
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_alive(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip the flag to dead. Returns `false` if it was already revoked.
    pub fn revoke(&self) -> bool {
        self.tx.send_if_modified(|alive| std::mem::replace(alive, false))
    }
}

/// Task side of a mount's liveness flag.
#[derive(Debug, Clone)]
pub struct Liveness {
    generation: u64,
    rx: watch::Receiver<bool>,
}

impl Liveness {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once revoked or once the guard is gone.
    pub fn is_alive(&self) -> bool {
        *self.rx.borrow() && self.rx.has_changed().is_ok()
    }

    /// Resolves when the flag is revoked or the guard is dropped.
    pub async fn revoked(&mut self) {
        while *self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Feed updates
// ============================================================================

#[derive(Debug, Clone)]
pub enum FeedOutcome {
    Updated(FeedPayload),
    /// Non-success status, network or decode failure. Last good data stands.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FeedUpdate {
    /// Mount generation that issued the fetch
    pub generation: u64,
    pub kind: FeedKind,
    /// Issuance order within this feed, starting at 1
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub outcome: FeedOutcome,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct IngestionScheduler;

impl IngestionScheduler {
    /// Spawn one task per feed. Each fetches immediately, then per its cadence.
    pub fn start<S: FeedSource>(
        source: Arc<S>,
        schedule: &FeedSchedule,
        guard: LivenessGuard,
        tx: mpsc::Sender<FeedUpdate>,
    ) -> IngestionHandle {
        let tasks = FeedKind::ALL
            .iter()
            .map(|&kind| {
                let cadence = schedule.cadence(kind);
                tokio::spawn(run_feed(
                    source.clone(),
                    kind,
                    cadence,
                    guard.token(),
                    tx.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            generation = guard.generation(),
            feeds = tasks.len(),
            "ingestion scheduler started"
        );

        IngestionHandle { guard, tasks }
    }
}

async fn run_feed<S: FeedSource>(
    source: Arc<S>,
    kind: FeedKind,
    cadence: std::time::Duration,
    mut liveness: Liveness,
    tx: mpsc::Sender<FeedUpdate>,
) {
    let mut interval = time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = liveness.revoked() => break,
        }

        let result = source.fetch(kind).await;

        if !liveness.is_alive() {
            debug!(feed = %kind, "discarding response resolved after teardown");
            break;
        }

        seq += 1;
        let outcome = match result {
            Ok(payload) => {
                debug!(feed = %kind, seq, records = payload.len(), "feed cycle complete");
                FeedOutcome::Updated(payload)
            }
            Err(e) => {
                warn!(feed = %kind, seq, "feed cycle failed: {}", e);
                FeedOutcome::Failed(e.to_string())
            }
        };

        let update = FeedUpdate {
            generation: liveness.generation(),
            kind,
            seq,
            received_at: Utc::now(),
            outcome,
        };

        if tx.send(update).await.is_err() {
            break;
        }
    }

    debug!(feed = %kind, "feed task stopped");
}

/// Running feed tasks for one mount.
pub struct IngestionHandle {
    guard: LivenessGuard,
    tasks: Vec<JoinHandle<()>>,
}

impl IngestionHandle {
    pub fn generation(&self) -> u64 {
        self.guard.generation()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_alive()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Revoke the mount's liveness. Tasks exit at their next check; a fetch
    /// already in flight completes and is discarded. Returns `false` if the
    /// handle was already stopped.
    pub fn stop(&self) -> bool {
        let stopped = self.guard.revoke();
        if stopped {
            info!(generation = self.guard.generation(), "ingestion scheduler stopped");
        }
        stopped
    }
}

impl Drop for IngestionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Dispatch Queue and Worker Loop
//!
//! A [`QueuedSubmitter`] pairs one submission profile with its event filter,
//! an unbounded FIFO channel and a single worker task draining it.
//!
//! Worker states: `Idle → Fetching → Submitting → Fetching → … → Stopped`.
//!
//! Delivery is at most one attempt per event. A failed or unauthorized
//! submission is dropped and the worker pauses for the backoff interval
//! before pulling the next entry.
//!
//! Shutdown: `stop()` enqueues a `Stop` sentinel behind any pending entries,
//! so earlier entries drain in order while the join deadline lasts. A worker
//! still running at the deadline is aborted and its backlog counted as
//! discarded.

use crate::delivery::client::SubmissionClient;
use crate::delivery::filter::EventFilter;
use crate::types::{AuxState, JournalEvent, SubmitOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One queue slot
#[derive(Debug)]
pub enum QueueEntry {
    /// Event ready for submission (already enriched for its profile)
    Submit(JournalEvent),
    /// Worker exits when it dequeues this
    Stop,
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Fetching,
    Submitting,
    Stopped,
}

impl WorkerState {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Fetching,
            2 => Self::Submitting,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Fetching => 1,
            Self::Submitting => 2,
            Self::Stopped => 3,
        }
    }
}

/// Delivery counters for one pipeline, readable from any task.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    unauthorized: AtomicU64,
    failed: AtomicU64,
    /// Not attempted: disconnected or no API key
    skipped: AtomicU64,
    discarded: AtomicU64,
    state: AtomicU8,
    last_error: Mutex<Option<String>>,
    last_delivered_at: Mutex<Option<DateTime<Utc>>>,
}

/// Serializable view of [`DeliveryStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub state: WorkerState,
    pub enqueued: u64,
    pub delivered: u64,
    pub unauthorized: u64,
    pub failed: u64,
    pub skipped: u64,
    pub discarded: u64,
    pub pending: u64,
    pub last_error: Option<String>,
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryStats {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn record(&self, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                *lock(&self.last_delivered_at) = Some(Utc::now());
            }
            SubmitOutcome::Unauthorized => {
                self.unauthorized.fetch_add(1, Ordering::Relaxed);
                *lock(&self.last_error) = Some(outcome.to_string());
            }
            SubmitOutcome::Failed(e) if e.is_guard() => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            SubmitOutcome::Failed(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                *lock(&self.last_error) = Some(e.to_string());
            }
        }
    }

    fn processed(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
            + self.unauthorized.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.discarded.load(Ordering::Relaxed)
    }

    fn pending(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.processed())
    }

    /// Count everything not yet processed as discarded; returns that count.
    fn discard_pending(&self) -> u64 {
        let pending = self.pending();
        self.discarded.fetch_add(pending, Ordering::Relaxed);
        pending
    }

    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            state: self.state(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            pending: self.pending(),
            last_error: lock(&self.last_error).clone(),
            last_delivered_at: *lock(&self.last_delivered_at),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Worker timing
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Longest single wait on the queue before re-polling
    pub poll_interval: Duration,
    /// Pause after an unsuccessful submission
    pub failure_backoff: Duration,
}

/// Filter + enrichment + queue + worker for one submission profile
pub struct QueuedSubmitter {
    client: SubmissionClient,
    filter: EventFilter,
    settings: WorkerSettings,
    tx: mpsc::UnboundedSender<QueueEntry>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueueEntry>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<DeliveryStats>,
}

impl QueuedSubmitter {
    pub fn new(client: SubmissionClient, filter: EventFilter, settings: WorkerSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            filter,
            settings,
            tx,
            rx: Mutex::new(Some(rx)),
            handle: Mutex::new(None),
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.client.profile().name
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Filter, enrich and enqueue without blocking. Returns whether the
    /// event was queued.
    pub fn offer(&self, mut event: JournalEvent, aux: &AuxState) -> bool {
        if !self.filter.accepts(event.name()) {
            return false;
        }
        if self.client.profile().enrich {
            event.enrich(aux);
        }

        let name = event.name().to_string();
        match self.tx.send(QueueEntry::Submit(event)) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                debug!(profile = self.name(), event = %name, "Event queued");
                true
            }
            Err(_) => {
                debug!(profile = self.name(), event = %name, "Worker stopped, event dropped");
                false
            }
        }
    }

    /// Spawn the worker task. Returns `false` if it was already started.
    pub fn start(&self) -> bool {
        let Some(rx) = lock(&self.rx).take() else {
            return false;
        };
        let worker = Worker {
            client: self.client.clone(),
            rx,
            stats: Arc::clone(&self.stats),
            settings: self.settings,
        };
        *lock(&self.handle) = Some(tokio::spawn(worker.run()));
        true
    }

    /// Push the stop sentinel and wait up to `join_timeout` for the worker.
    pub async fn stop(&self, join_timeout: Duration) {
        let _ = self.tx.send(QueueEntry::Stop);

        let handle = lock(&self.handle).take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(join_timeout, &mut handle).await {
            Ok(Ok(())) => debug!(profile = self.name(), "Worker joined"),
            Ok(Err(e)) => warn!(profile = self.name(), error = %e, "Worker task ended abnormally"),
            Err(_) => {
                handle.abort();
                let discarded = self.stats.discard_pending();
                self.stats.set_state(WorkerState::Stopped);
                warn!(
                    profile = self.name(),
                    discarded,
                    timeout_ms = join_timeout.as_millis(),
                    "Worker did not stop in time, aborted"
                );
            }
        }
    }
}

struct Worker {
    client: SubmissionClient,
    rx: mpsc::UnboundedReceiver<QueueEntry>,
    stats: Arc<DeliveryStats>,
    settings: WorkerSettings,
}

impl Worker {
    async fn run(mut self) {
        let profile = self.client.profile().name;
        info!(profile, "Worker started");

        loop {
            self.stats.set_state(WorkerState::Fetching);
            let entry = match tokio::time::timeout(self.settings.poll_interval, self.rx.recv()).await {
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(entry)) => entry,
            };

            let QueueEntry::Submit(event) = entry else {
                break;
            };

            self.stats.set_state(WorkerState::Submitting);
            debug!(profile, event = event.name(), "Processing event");
            let outcome = self.client.submit(&event).await;
            self.stats.record(&outcome);

            if !outcome.is_delivered() {
                debug!(profile, outcome = %outcome, backoff_secs = self.settings.failure_backoff.as_secs_f32(), "Submission failed, pausing before next event");
                tokio::time::sleep(self.settings.failure_backoff).await;
            }
        }

        // Entries queued behind the sentinel are never submitted
        self.rx.close();
        let mut late = 0u64;
        while let Ok(entry) = self.rx.try_recv() {
            if matches!(entry, QueueEntry::Submit(_)) {
                late += 1;
            }
        }
        if late > 0 {
            self.stats.discarded.fetch_add(late, Ordering::Relaxed);
        }

        self.stats.set_state(WorkerState::Stopped);
        info!(profile, discarded = late, "Worker stopped");
    }
}

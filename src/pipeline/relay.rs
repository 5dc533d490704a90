//! Relay orchestrator
//!
//! Owns the connection state, both delivery pipelines and the verification
//! timer. The host calls [`Relay::on_event`] from its event thread; that call
//! only routes and enqueues; all network work runs on spawned tasks.

use crate::config::{ConfigError, RelayConfig};
use crate::credentials::CredentialSource;
use crate::delivery::{
    ConnectionVerifier, DeliveryStatsSnapshot, EventRouter, JournalTransport, QueuedSubmitter,
    Route, SubmissionClient, SubmissionProfile, WorkerSettings,
};
use crate::pipeline::state::{ConnectionSnapshot, ConnectionState};
use crate::types::{AuxState, JournalEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of the whole relay for status output
#[derive(Debug, Clone, Serialize)]
pub struct RelayHealth {
    pub running: bool,
    pub connection: ConnectionSnapshot,
    /// Events outside the tracked sets
    pub ignored: u64,
    /// Tracked events dropped because the relay was disconnected
    pub skipped_disconnected: u64,
    pub general: DeliveryStatsSnapshot,
    pub fleet_carrier: DeliveryStatsSnapshot,
}

pub struct Relay {
    router: EventRouter,
    connection: Arc<ConnectionState>,
    verifier: ConnectionVerifier,
    general: QueuedSubmitter,
    fleet_carrier: QueuedSubmitter,
    verify_interval: Duration,
    verify_jitter: Duration,
    join_timeout: Duration,
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
    ignored: AtomicU64,
    skipped_disconnected: AtomicU64,
}

impl Relay {
    /// Build a relay from a validated config. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: &RelayConfig,
        credentials: Arc<dyn CredentialSource>,
        transport: Arc<dyn JournalTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let schedule = &config.schedule;
        let connection = Arc::new(ConnectionState::new());
        let settings = WorkerSettings {
            poll_interval: Duration::from_secs(schedule.poll_interval_secs),
            failure_backoff: Duration::from_secs(schedule.failure_backoff_secs),
        };

        let important = config.filter.important_filter();
        let fleet_carrier_filter = config.filter.fleet_carrier_filter();

        let client = |profile: SubmissionProfile| {
            SubmissionClient::new(
                Arc::clone(&transport),
                Arc::clone(&credentials),
                Arc::clone(&connection),
                profile,
            )
        };
        let general = QueuedSubmitter::new(
            client(SubmissionProfile::general()),
            important.clone(),
            settings,
        );
        let fleet_carrier = QueuedSubmitter::new(
            client(SubmissionProfile::fleet_carrier()),
            fleet_carrier_filter.clone(),
            settings,
        );

        Ok(Self {
            router: EventRouter::new(important, fleet_carrier_filter),
            verifier: ConnectionVerifier::new(
                Arc::clone(&transport),
                Arc::clone(&credentials),
                Arc::clone(&connection),
            ),
            connection,
            general,
            fleet_carrier,
            verify_interval: Duration::from_secs(schedule.verify_interval_secs),
            verify_jitter: Duration::from_secs(schedule.verify_jitter_secs),
            join_timeout: Duration::from_secs(schedule.shutdown_join_timeout_secs),
            cancel: CancellationToken::new(),
            timer: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            ignored: AtomicU64::new(0),
            skipped_disconnected: AtomicU64::new(0),
        })
    }

    /// Spawn both workers and the verification timer. Must be called from
    /// within a tokio runtime. Returns `false` if already started or stopped.
    ///
    /// The timer task verifies the key immediately, so tracked events flow
    /// once that first check succeeds. The caller never waits on it.
    pub fn start(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) || self.started.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.general.start();
        self.fleet_carrier.start();

        let verifier = self.verifier.clone();
        let cancel = self.cancel.clone();
        let (interval, jitter) = (self.verify_interval, self.verify_jitter);
        let timer = tokio::spawn(verifier.run_periodic(interval, jitter, cancel));
        *self.timer.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(timer);

        info!("EDStS relay started");
        true
    }

    /// Cancel the timer and stop both workers, each bounded by the join timeout.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("EDStS relay stopping");

        self.cancel.cancel();
        tokio::join!(
            self.general.stop(self.join_timeout),
            self.fleet_carrier.stop(self.join_timeout),
        );

        let timer = self
            .timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut timer) = timer {
            if tokio::time::timeout(self.join_timeout, &mut timer).await.is_err() {
                warn!("Verification timer did not stop in time, aborting");
                timer.abort();
            }
        }

        info!("EDStS relay stopped");
    }

    /// Route one journal event to its pipeline without blocking.
    ///
    /// Returns the pipeline the event was queued on, or `Route::Ignored` when
    /// it was untracked, the relay is disconnected, or the worker has stopped.
    pub fn on_event(&self, event: JournalEvent, aux: AuxState) -> Route {
        let route = self.router.route(event.name());
        let submitter = match route {
            Route::Ignored => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
                return Route::Ignored;
            }
            Route::General => &self.general,
            Route::FleetCarrier => &self.fleet_carrier,
        };

        if !self.connection.is_connected() {
            self.skipped_disconnected.fetch_add(1, Ordering::Relaxed);
            debug!(event = event.name(), "Not connected, dropping event");
            return Route::Ignored;
        }

        if submitter.offer(event, &aux) {
            route
        } else {
            Route::Ignored
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> ConnectionSnapshot {
        self.connection.snapshot()
    }

    /// Re-verify right away after the key was saved or cleared.
    pub async fn credential_updated(&self) -> bool {
        self.verifier.verify().await
    }

    pub fn health(&self) -> RelayHealth {
        RelayHealth {
            running: self.started.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire),
            connection: self.connection.snapshot(),
            ignored: self.ignored.load(Ordering::Relaxed),
            skipped_disconnected: self.skipped_disconnected.load(Ordering::Relaxed),
            general: self.general.stats().snapshot(),
            fleet_carrier: self.fleet_carrier.stats().snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SettingsStore;
    use crate::delivery::transport::testing::MockTransport;
    use crate::delivery::transport::HttpReply;
    use crate::delivery::WorkerState;
    use crate::types::event::{SHIP_ID_FIELD, SYSTEM_ADDRESS_FIELD};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn test_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.schedule.poll_interval_secs = 1;
        config.schedule.failure_backoff_secs = 0;
        config.schedule.shutdown_join_timeout_secs = 1;
        config
    }

    fn relay_with(transport: &Arc<MockTransport>, key: Option<&str>) -> (Relay, Arc<SettingsStore>) {
        let store = Arc::new(SettingsStore::new());
        if let Some(k) = key {
            store.set_api_key(k);
        }
        let relay = Relay::new(&test_config(), store.clone(), transport.clone()).unwrap();
        (relay, store)
    }

    /// Start and wait for the timer's first check to land.
    async fn start(relay: &Relay, transport: &MockTransport) {
        assert!(relay.start());
        wait_until(|| relay.connection().last_checked.is_some()).await;
        assert_eq!(transport.verify_calls.load(Ordering::SeqCst), 1);
    }

    fn event(value: serde_json::Value) -> JournalEvent {
        JournalEvent::from_value(value).unwrap()
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_untracked_event_never_queued() {
        let transport = Arc::new(MockTransport::new());
        let (relay, _) = relay_with(&transport, Some("key-1"));
        start(&relay, &transport).await;

        assert_eq!(relay.on_event(event(json!({"event": "Music"})), AuxState::new()), Route::Ignored);
        relay.stop().await;

        let health = relay.health();
        assert_eq!(health.ignored, 1);
        assert_eq!(health.general.enqueued + health.fleet_carrier.enqueued, 0);
        assert_eq!(transport.post_count(), 0);
    }

    #[tokio::test]
    async fn test_routes_to_exactly_one_pipeline() {
        let transport = Arc::new(MockTransport::new());
        let (relay, store) = relay_with(&transport, Some("key-1"));
        store.set_permissions("market");
        start(&relay, &transport).await;

        assert_eq!(relay.on_event(event(json!({"event": "FSDJump"})), AuxState::new()), Route::General);
        assert_eq!(
            relay.on_event(event(json!({"event": "CarrierStats"})), AuxState::new()),
            Route::FleetCarrier
        );
        wait_until(|| transport.post_count() == 2).await;
        relay.stop().await;

        let posts = transport.posts();
        let general = posts.iter().find(|p| p.body["event"] == "FSDJump").unwrap();
        let carrier = posts.iter().find(|p| p.body["event"] == "CarrierStats").unwrap();
        assert_eq!(general.permissions, "EDStS,market");
        assert_eq!(carrier.permissions, "EDStS");
        assert_eq!(transport.post_count(), 2);
    }

    #[tokio::test]
    async fn test_fleet_carrier_enrichment() {
        let transport = Arc::new(MockTransport::new());
        let (relay, _) = relay_with(&transport, Some("key-1"));
        start(&relay, &transport).await;

        let aux = AuxState::new()
            .with(AuxState::SHIP_ID, 42)
            .with(AuxState::SYSTEM_ADDRESS, 5_031_654_888_162_u64);
        relay.on_event(event(json!({"event": "CarrierJump", "StarSystem": "Col 285"})), aux);
        wait_until(|| transport.post_count() == 1).await;
        relay.stop().await;

        let body = &transport.posts()[0].body;
        assert_eq!(body[SHIP_ID_FIELD], json!(42));
        assert_eq!(body[SYSTEM_ADDRESS_FIELD], json!(5_031_654_888_162_u64));
        assert_eq!(body["StarSystem"], "Col 285");
    }

    #[tokio::test]
    async fn test_disconnected_makes_no_requests() {
        let transport = Arc::new(MockTransport::new());
        transport.push_verify(Ok(HttpReply::new(200, r#"{"valid": false}"#)));
        let (relay, _) = relay_with(&transport, Some("key-1"));
        start(&relay, &transport).await;
        assert!(!relay.is_connected());

        for _ in 0..5 {
            assert_eq!(relay.on_event(event(json!({"event": "Docked"})), AuxState::new()), Route::Ignored);
        }
        relay.stop().await;

        assert_eq!(transport.post_count(), 0);
        assert_eq!(relay.health().skipped_disconnected, 5);
    }

    #[tokio::test]
    async fn test_missing_key_stays_disconnected() {
        let transport = Arc::new(MockTransport::new());
        let (relay, store) = relay_with(&transport, None);
        assert!(!relay.credential_updated().await);
        assert!(!relay.is_connected());
        assert_eq!(transport.verify_calls.load(Ordering::SeqCst), 0);

        store.set_api_key("key-2");
        assert!(relay.credential_updated().await);
        assert!(relay.is_connected());
        assert_eq!(relay.connection().to_string(), "EDStS API: Connected");
    }

    #[tokio::test]
    async fn test_401_disconnects_until_reverified() {
        let transport = Arc::new(MockTransport::new());
        transport.push_post(Ok(HttpReply::new(401, "")));
        let (relay, _) = relay_with(&transport, Some("key-1"));
        start(&relay, &transport).await;

        relay.on_event(event(json!({"event": "Docked"})), AuxState::new());
        wait_until(|| !relay.is_connected()).await;

        assert_eq!(relay.on_event(event(json!({"event": "Docked"})), AuxState::new()), Route::Ignored);
        assert_eq!(transport.post_count(), 1);

        assert!(relay.credential_updated().await);
        assert_eq!(relay.on_event(event(json!({"event": "Docked"})), AuxState::new()), Route::FleetCarrier);
        wait_until(|| transport.post_count() == 2).await;
        relay.stop().await;

        assert_eq!(relay.health().fleet_carrier.unauthorized, 1);
    }

    #[tokio::test]
    async fn test_on_event_does_not_wait_for_network() {
        let transport = Arc::new(MockTransport::new().with_post_delay(Duration::from_millis(500)));
        let (relay, _) = relay_with(&transport, Some("key-1"));
        start(&relay, &transport).await;

        let started = Instant::now();
        for _ in 0..20 {
            relay.on_event(event(json!({"event": "FSDJump"})), AuxState::new());
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        relay.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_bounded_with_pending_events() {
        let transport = Arc::new(MockTransport::new().with_post_delay(Duration::from_millis(400)));
        let (relay, _) = relay_with(&transport, Some("key-1"));
        start(&relay, &transport).await;

        for _ in 0..10 {
            relay.on_event(event(json!({"event": "Docked"})), AuxState::new());
        }

        let started = Instant::now();
        relay.stop().await;
        assert!(started.elapsed() < Duration::from_millis(2500));

        let health = relay.health();
        assert!(!health.running);
        assert_eq!(health.fleet_carrier.state, WorkerState::Stopped);
        assert_eq!(health.fleet_carrier.pending, 0);
        assert!(health.fleet_carrier.discarded > 0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_final() {
        let transport = Arc::new(MockTransport::new());
        let (relay, _) = relay_with(&transport, Some("key-1"));
        assert!(relay.start());
        assert!(!relay.start());

        relay.stop().await;
        relay.stop().await;
        assert!(!relay.start());
        assert_eq!(relay.health().general.state, WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_alone_connects() {
        let transport = Arc::new(MockTransport::new());
        let (relay, _) = relay_with(&transport, Some("key-1"));
        let started = Instant::now();
        assert!(relay.start());
        // start() never waits on the network
        assert!(started.elapsed() < Duration::from_millis(50));

        wait_until(|| relay.is_connected()).await;
        assert_eq!(relay.on_event(event(json!({"event": "Docked"})), AuxState::new()), Route::FleetCarrier);
        wait_until(|| transport.post_count() == 1).await;
        relay.stop().await;

        assert_eq!(transport.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(relay.health().skipped_disconnected, 0);
    }

    #[test]
    fn test_new_rejects_invalid_schedule() {
        let transport = Arc::new(MockTransport::new());
        let mut config = test_config();
        config.schedule.poll_interval_secs = 0;
        let result = Relay::new(&config, Arc::new(SettingsStore::new()), transport);
        match result {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("schedule.poll_interval_secs")));
            }
            Err(other) => panic!("expected validation error, got {other}"),
            Ok(_) => panic!("zero poll interval must be rejected"),
        }
    }
}

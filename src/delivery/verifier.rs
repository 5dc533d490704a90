//! Connection Verifier: checks the API key against the service
//!
//! Runs once on demand (after a key is saved) and on a cancelable timer that
//! checks immediately and then once per interval.
//! Every check, whatever its outcome, is written into [`ConnectionState`].
//! Failures are fail-closed: anything but an explicit `valid: true` leaves
//! the relay disconnected.

use crate::credentials::CredentialSource;
use crate::delivery::transport::JournalTransport;
use crate::pipeline::state::ConnectionState;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interpret a verification response body.
///
/// `valid` may be a JSON boolean or the string `"true"`/`"false"` in any
/// case. A missing field, any other type, or malformed JSON is `false`.
pub fn parse_valid(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    match value.get("valid") {
        Some(Value::Bool(valid)) => *valid,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Verifies the held credential and publishes the result.
#[derive(Clone)]
pub struct ConnectionVerifier {
    transport: Arc<dyn JournalTransport>,
    credentials: Arc<dyn CredentialSource>,
    connection: Arc<ConnectionState>,
}

impl ConnectionVerifier {
    pub fn new(
        transport: Arc<dyn JournalTransport>,
        credentials: Arc<dyn CredentialSource>,
        connection: Arc<ConnectionState>,
    ) -> Self {
        Self {
            transport,
            credentials,
            connection,
        }
    }

    /// Verify whatever key the credential source currently holds.
    pub async fn verify(&self) -> bool {
        match self.credentials.api_key() {
            Some(key) => self.verify_key(&key).await,
            None => {
                debug!("No API key configured, marking disconnected");
                self.connection.record_check(false, Utc::now());
                false
            }
        }
    }

    /// Verify a specific key, e.g. one the user just entered.
    ///
    /// A key rejection seen while the request is in flight wins over a
    /// `valid` answer.
    pub async fn verify_key(&self, api_key: &str) -> bool {
        let ticket = self.connection.begin_check();
        let valid = match self.transport.verify_key(api_key).await {
            Ok(reply) if reply.is_success() => {
                let valid = parse_valid(&reply.body);
                info!(valid, status = reply.status, "API key verification returned");
                valid
            }
            Ok(reply) => {
                warn!(status = reply.status, "API key verification rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "API key verification failed");
                false
            }
        };
        self.connection.record_check_from(ticket, valid, Utc::now())
    }

    /// Verify now, then again every `interval` (plus up to `jitter` extra)
    /// until cancelled.
    ///
    /// The timer is rearmed after each check completes, so a slow check
    /// pushes the next one back rather than overlapping it.
    pub async fn run_periodic(self, interval: Duration, jitter: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Verification timer started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                connected = self.verify() => {
                    debug!(connected, next_check_secs = interval.as_secs(), "Scheduled verification complete");
                }
            }

            let delay = interval + random_jitter(jitter);
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!("Verification timer cancelled");
    }
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    use rand::Rng;
    let nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
}

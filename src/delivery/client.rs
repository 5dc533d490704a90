//! Submission Client: authenticated delivery of one journal event
//!
//! Two profiles share this client:
//! - **general**: `x-permissions` built from the configured permission list
//! - **fleet carrier**: always the bare `EDStS` namespace tag, events enriched
//!   with ship id and system address
//!
//! Both read the API key and permissions fresh for every submission.

use crate::config::defaults::PERMISSION_NAMESPACE;
use crate::credentials::{permissions_header, CredentialSource};
use crate::delivery::transport::JournalTransport;
use crate::pipeline::state::ConnectionState;
use crate::types::{DeliveryError, JournalEvent, SubmitOutcome};
use std::sync::Arc;
use tracing::{debug, warn};

/// How the `x-permissions` header is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Built from the live permission list on every submission
    Configured,
    /// Always this literal value
    Fixed(String),
}

/// Per-pipeline submission behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionProfile {
    pub name: &'static str,
    pub permissions: PermissionPolicy,
    /// Merge `_shipId` / `_systemAddress` from aux state before enqueueing
    pub enrich: bool,
}

impl SubmissionProfile {
    pub fn general() -> Self {
        Self {
            name: "general",
            permissions: PermissionPolicy::Configured,
            enrich: false,
        }
    }

    pub fn fleet_carrier() -> Self {
        Self {
            name: "fleet-carrier",
            permissions: PermissionPolicy::Fixed(PERMISSION_NAMESPACE.to_string()),
            enrich: true,
        }
    }
}

/// Delivers events to the journal endpoint
#[derive(Clone)]
pub struct SubmissionClient {
    transport: Arc<dyn JournalTransport>,
    credentials: Arc<dyn CredentialSource>,
    connection: Arc<ConnectionState>,
    profile: SubmissionProfile,
}

impl SubmissionClient {
    pub fn new(
        transport: Arc<dyn JournalTransport>,
        credentials: Arc<dyn CredentialSource>,
        connection: Arc<ConnectionState>,
        profile: SubmissionProfile,
    ) -> Self {
        Self {
            transport,
            credentials,
            connection,
            profile,
        }
    }

    pub fn profile(&self) -> &SubmissionProfile {
        &self.profile
    }

    fn permission_header(&self) -> String {
        match &self.profile.permissions {
            PermissionPolicy::Configured => {
                permissions_header(self.credentials.permissions().as_deref())
            }
            PermissionPolicy::Fixed(value) => value.clone(),
        }
    }

    /// Submit one event.
    ///
    /// Short-circuits to `Failed` without any request while disconnected or
    /// when no key is configured. A 401 flips the connection to disconnected.
    pub async fn submit(&self, event: &JournalEvent) -> SubmitOutcome {
        let name = event.name();

        if !self.connection.is_connected() {
            debug!(profile = self.profile.name, event = name, "Not connected, skipping event submission");
            return SubmitOutcome::Failed(DeliveryError::NotConnected);
        }

        let Some(api_key) = self.credentials.api_key() else {
            debug!(profile = self.profile.name, event = name, "No API key, skipping event submission");
            return SubmitOutcome::Failed(DeliveryError::ConfigMissing);
        };

        let body = event.to_value();

        debug!(profile = self.profile.name, event = name, "Submitting event");
        match self
            .transport
            .post_event(&api_key, &self.permission_header(), &body)
            .await
        {
            Ok(reply) if reply.status == 200 => {
                debug!(profile = self.profile.name, event = name, "Event delivered");
                SubmitOutcome::Delivered
            }
            Ok(reply) if reply.status == 401 => {
                warn!(profile = self.profile.name, event = name, "Invalid API key for event submission");
                self.connection.mark_disconnected();
                SubmitOutcome::Unauthorized
            }
            Ok(reply) => {
                warn!(profile = self.profile.name, event = name, status = reply.status, "Failed to submit event");
                SubmitOutcome::Failed(DeliveryError::Server(reply.status))
            }
            Err(e) => {
                warn!(profile = self.profile.name, event = name, error = %e, "Failed to submit event");
                SubmitOutcome::Failed(DeliveryError::Transport(e))
            }
        }
    }
}

//! Shared relay state
//!
//! - [`ConnectionState`]: the one cell written by more than one task
//!   (verifier after every check, submission client on a 401)
//! - [`JournalStateTracker`]: derives the auxiliary state the host would
//!   normally pass next to each event

use crate::types::{AuxState, JournalEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

// ============================================================================
// Connection State
// ============================================================================

/// Whether the held API key is currently accepted by the service.
///
/// Starts disconnected. Readers never block on writers for the flag; the
/// timestamp sits behind a short-lived mutex.
///
/// Every rejection bumps a generation counter. A verification that began
/// before the latest rejection cannot flip the flag back to connected.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
    rejections: AtomicU64,
    last_checked: Mutex<Option<DateTime<Utc>>>,
}

/// Marks when a verification started, relative to key rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTicket(u64);

/// Point-in-time view of the connection for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub connected: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn lock_last_checked(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_checked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store the result of a verification and when it was observed.
    pub fn record_check(&self, valid: bool, at: DateTime<Utc>) {
        let mut last = self.lock_last_checked();
        self.connected.store(valid, Ordering::Release);
        *last = Some(at);
    }

    /// Take before sending a verification request.
    pub fn begin_check(&self) -> CheckTicket {
        let _last = self.lock_last_checked();
        CheckTicket(self.rejections.load(Ordering::Acquire))
    }

    /// Store a verification result unless the key was rejected after
    /// `ticket` was taken. Returns the connection flag now in effect.
    pub fn record_check_from(&self, ticket: CheckTicket, valid: bool, at: DateTime<Utc>) -> bool {
        let mut last = self.lock_last_checked();
        let stale = self.rejections.load(Ordering::Acquire) != ticket.0;
        let connected = valid && !stale;
        self.connected.store(connected, Ordering::Release);
        *last = Some(at);
        connected
    }

    /// The key was rejected mid-session; stay disconnected until re-verified.
    pub fn mark_disconnected(&self) {
        let _last = self.lock_last_checked();
        self.rejections.fetch_add(1, Ordering::AcqRel);
        self.connected.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let last_checked = *self.lock_last_checked();
        ConnectionSnapshot {
            connected: self.is_connected(),
            last_checked,
        }
    }
}

impl std::fmt::Display for ConnectionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.connected {
            write!(f, "EDStS API: Connected")
        } else {
            write!(f, "EDStS API: Disconnected")
        }
    }
}

// ============================================================================
// Journal State Tracker
// ============================================================================

/// Events that report the commander's current ship id
const SHIP_ID_EVENTS: &[&str] = &["LoadGame", "Loadout", "ShipyardSwap", "ShipyardNew"];

/// Events that report the current star system
const SYSTEM_EVENTS: &[&str] = &["Location", "FSDJump", "CarrierJump", "Docked"];

/// Follows `ShipID` and `SystemAddress` through a journal stream.
#[derive(Debug, Default)]
pub struct JournalStateTracker {
    state: AuxState,
}

impl JournalStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the tracked state and return a snapshot for it.
    pub fn observe(&mut self, event: &JournalEvent) -> AuxState {
        let name = event.name();

        if SHIP_ID_EVENTS.contains(&name) {
            let field = if name == "ShipyardNew" { "NewShipID" } else { "ShipID" };
            if let Some(id) = event.get(field) {
                self.state.set(AuxState::SHIP_ID, id.clone());
            }
        }

        if SYSTEM_EVENTS.contains(&name) {
            if let Some(address) = event.get("SystemAddress") {
                self.state.set(AuxState::SYSTEM_ADDRESS, address.clone());
            }
        }

        self.state.clone()
    }

    pub fn state(&self) -> &AuxState {
        &self.state
    }
}

//! EDStS Relay: Elite Dangerous journal events to the EDStS API
//!
//! Filters a live stream of journal entries and delivers the tracked ones to
//! the EDStS service, while tracking whether the API key is currently accepted.
//!
//! ## Architecture
//!
//! - **Relay**: owns lifecycle, connection state and both delivery pipelines
//! - **EventRouter**: picks the general or fleet-carrier pipeline (or neither)
//! - **QueuedSubmitter**: unbounded FIFO drained by one worker task
//! - **ConnectionVerifier**: checks the key on demand and every ten minutes
//! - **SubmissionClient**: one authenticated POST per event

pub mod config;
pub mod credentials;
pub mod delivery;
pub mod pipeline;
pub mod types;

pub use config::{ConfigError, RelayConfig};
pub use credentials::{CredentialSource, SettingsStore};
pub use delivery::{HttpTransport, JournalTransport, Route, TransportError};
pub use pipeline::{ConnectionSnapshot, ConnectionState, JournalStateTracker, Relay, RelayHealth};
pub use types::{AuxState, DeliveryError, JournalEvent, SubmitOutcome};

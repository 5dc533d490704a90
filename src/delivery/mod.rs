//! Delivery: everything between an accepted journal event and the remote API
//!
//! ## Architecture
//!
//! - **EventFilter / EventRouter**: membership sets deciding which pipeline, if any, gets an event
//! - **JournalTransport**: HTTP seam (`HttpTransport` in production)
//! - **ConnectionVerifier**: checks the API key, on demand and on a cancelable timer
//! - **SubmissionClient**: one authenticated POST per event, per submission profile
//! - **QueuedSubmitter**: unbounded FIFO + single worker task per pipeline
//!
//! ## Delivery Rules
//!
//! - No network I/O on the producer path
//! - At most one attempt per event; failures are dropped after a short pause
//! - A 401 disconnects the relay until the next successful verification

pub mod client;
pub mod filter;
pub mod queue;
pub mod transport;
pub mod verifier;

pub use client::{PermissionPolicy, SubmissionClient, SubmissionProfile};
pub use filter::{EventFilter, EventRouter, Route};
pub use queue::{DeliveryStats, DeliveryStatsSnapshot, QueueEntry, QueuedSubmitter, WorkerSettings, WorkerState};
pub use transport::{HttpReply, HttpTransport, JournalTransport, TransportError};
pub use verifier::{parse_valid, ConnectionVerifier};

//! Shared data types for the journal relay.

pub mod event;
pub mod outcome;

pub use event::{AuxState, EventError, JournalEvent};
pub use outcome::{DeliveryError, SubmitOutcome};

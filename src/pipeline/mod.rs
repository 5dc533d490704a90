//! Relay Pipeline
//!
//! ```text
//! host / CLI source ──on_event──► EventRouter ──► general queue ──► worker ──► POST
//!                                            └──► fleet-carrier queue ──► worker ──► POST
//! verification timer ──► ConnectionState ◄── 401 from either worker
//! ```
//!
//! `on_event` never waits on the network: it routes, enriches and enqueues.

mod relay;
pub mod source;
pub mod state;

pub use relay::{Relay, RelayHealth};
pub use state::*;

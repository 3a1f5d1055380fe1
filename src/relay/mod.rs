//! Connection relay
//!
//! The dispatcher that accepts clients, dials their route targets and
//! shuttles bytes between the two until either side closes.

mod handler;
pub mod socket;
mod stats;

pub use handler::Relay;
pub use stats::RelayStats;

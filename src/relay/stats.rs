//! Relay statistics
//!
//! Plain counters; the relay runs on one thread.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Connections taken off the listener
    accepted: u64,
    /// Pairs set up and relaying
    relayed: u64,
    /// Closed because no route matched the client address
    rejected_no_route: u64,
    /// Closed because the route already carried a session
    rejected_busy: u64,
    /// Closed because the registry had no room for a pair
    rejected_capacity: u64,
    /// Outbound connect failed before registration
    failed_connect: u64,
    /// Pairs torn down
    closed: u64,
    /// Bytes moved in either direction
    bytes_relayed: u64,
}

impl RelayStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&mut self) {
        self.accepted += 1;
    }

    pub fn record_relayed(&mut self) {
        self.relayed += 1;
    }

    pub fn record_rejected_no_route(&mut self) {
        self.rejected_no_route += 1;
    }

    pub fn record_rejected_busy(&mut self) {
        self.rejected_busy += 1;
    }

    pub fn record_rejected_capacity(&mut self) {
        self.rejected_capacity += 1;
    }

    pub fn record_failed_connect(&mut self) {
        self.failed_connect += 1;
    }

    pub fn record_closed(&mut self) {
        self.closed += 1;
    }

    pub fn record_bytes(&mut self, n: usize) {
        self.bytes_relayed += n as u64;
    }

    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    #[must_use]
    pub const fn relayed(&self) -> u64 {
        self.relayed
    }

    #[must_use]
    pub const fn rejected_no_route(&self) -> u64 {
        self.rejected_no_route
    }

    #[must_use]
    pub const fn rejected_busy(&self) -> u64 {
        self.rejected_busy
    }

    #[must_use]
    pub const fn rejected_capacity(&self) -> u64 {
        self.rejected_capacity
    }

    #[must_use]
    pub const fn failed_connect(&self) -> u64 {
        self.failed_connect
    }

    #[must_use]
    pub const fn closed(&self) -> u64 {
        self.closed
    }

    #[must_use]
    pub const fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }

    /// Connections closed without being relayed
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected_no_route + self.rejected_busy + self.rejected_capacity + self.failed_connect
    }

    /// Pairs currently relaying
    #[must_use]
    pub const fn open(&self) -> u64 {
        self.relayed.saturating_sub(self.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = RelayStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_relayed();
        stats.record_rejected_no_route();
        stats.record_rejected_busy();
        stats.record_bytes(512);
        stats.record_bytes(10);

        assert_eq!(stats.accepted(), 3);
        assert_eq!(stats.rejected(), 2);
        assert_eq!(stats.open(), 1);
        assert_eq!(stats.bytes_relayed(), 522);

        stats.record_closed();
        assert_eq!(stats.open(), 0);
    }

    #[test]
    fn test_serialize() {
        let mut stats = RelayStats::new();
        stats.record_accepted();
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["bytes_relayed"], 0);
    }
}

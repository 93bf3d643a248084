//! Neighbor table.
//!
//! Records when a Hello was last received from each peer. Entries are only
//! removed by an explicit [`NeighborTable::purge_stale`]; liveness is otherwise
//! a read-time comparison against the caller's threshold.

use std::collections::BTreeMap;
use std::time::Duration;

use meshlink_packet::NodeAddress;

use crate::Timestamp;

/// Last-seen times of peers, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    last_seen: BTreeMap<NodeAddress, Timestamp>,
}

impl NeighborTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a Hello from `address` at `now`. Returns `true` if the peer was
    /// not known before.
    pub fn record_hello(&mut self, address: NodeAddress, now: Timestamp) -> bool {
        self.last_seen.insert(address, now).is_none()
    }

    /// Whether a Hello has ever been received from `address`.
    pub fn is_known(&self, address: NodeAddress) -> bool {
        self.last_seen.contains_key(&address)
    }

    /// Whether `address` was heard from within `max_age` of `now`.
    pub fn is_fresh(&self, address: NodeAddress, now: Timestamp, max_age: Duration) -> bool {
        self.age_of(address, now)
            .map(|age| age <= max_age)
            .unwrap_or(false)
    }

    /// Time since the last Hello from `address`.
    pub fn age_of(&self, address: NodeAddress, now: Timestamp) -> Option<Duration> {
        self.last_seen
            .get(&address)
            .map(|seen| now.saturating_duration_since(*seen))
    }

    /// When the last Hello from `address` arrived.
    pub fn last_seen(&self, address: NodeAddress) -> Option<Timestamp> {
        self.last_seen.get(&address).copied()
    }

    /// All entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeAddress, Timestamp)> + '_ {
        self.last_seen.iter().map(|(addr, seen)| (*addr, *seen))
    }

    /// All neighbors with their age at `now`, in address order.
    pub fn neighbors(&self, now: Timestamp) -> Vec<(NodeAddress, Duration)> {
        self.iter()
            .map(|(addr, seen)| (addr, now.saturating_duration_since(seen)))
            .collect()
    }

    /// Remove entries older than `max_age`, returning the removed addresses.
    pub fn purge_stale(&mut self, now: Timestamp, max_age: Duration) -> Vec<NodeAddress> {
        let stale: Vec<NodeAddress> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > max_age)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &stale {
            self.last_seen.remove(addr);
        }
        stale
    }

    /// Number of known neighbors.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether no neighbor is known.
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

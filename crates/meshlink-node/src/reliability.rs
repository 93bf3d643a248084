//! Acknowledgement tracking and retransmission.
//!
//! Each message that expects an Ack is registered under its identifier. The
//! entry ends either when the matching Ack arrives or when [`ReliabilityManager::tick`]
//! finds it timed out with no retries left:
//!
//! ```text
//! register ──► AwaitingAck ──ack──► Acknowledged
//!                 │   ▲
//!          timeout│   │resend
//!                 ▼   │
//!               Retrying ──budget spent──► DeliveryFailed
//! ```
//!
//! The manager never schedules itself; the owner calls `tick` from its loop.

use std::collections::BTreeMap;
use std::time::Duration;

use meshlink_packet::NodeAddress;
use tracing::trace;

use crate::{NodeError, NodeResult, RetryPolicy, Timestamp};

/// A sent message awaiting its Ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAck {
    /// Where the message was sent.
    pub destination: NodeAddress,
    /// Identifier the Ack must carry.
    pub message_id: u16,
    /// Retransmissions so far. Zero right after registration.
    pub attempt_count: u32,
    /// Time of the original transmission.
    pub first_sent_at: Timestamp,
    /// Time of the most recent transmission.
    pub last_sent_at: Timestamp,
    /// Exact bytes written for the original transmission, resent on retry.
    pub frame: Vec<u8>,
}

impl PendingAck {
    /// Transmissions so far, including the original.
    pub fn transmissions(&self) -> u32 {
        self.attempt_count + 1
    }

    /// Time since the most recent transmission.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.saturating_duration_since(self.last_sent_at)
    }
}

/// Outcome of a timer evaluation for one pending message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReliabilityEvent {
    /// The message was handed to the resend callback again.
    Retransmitted {
        destination: NodeAddress,
        message_id: u16,
        /// Retransmission number, starting at 1.
        attempt: u32,
    },
    /// The retry budget ran out; the entry was dropped.
    DeliveryFailed {
        destination: NodeAddress,
        message_id: u16,
        /// Total transmissions made.
        transmissions: u32,
    },
}

/// Table of messages awaiting acknowledgement.
#[derive(Debug, Clone, Default)]
pub struct ReliabilityManager {
    policy: RetryPolicy,
    pending: BTreeMap<u16, PendingAck>,
}

impl ReliabilityManager {
    /// Create an empty manager with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        ReliabilityManager {
            policy,
            pending: BTreeMap::new(),
        }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Start tracking a message just sent at `now`.
    ///
    /// Fails with [`NodeError::DuplicateMessageId`] if `message_id` is still
    /// pending; the existing entry is left untouched.
    pub fn register(
        &mut self,
        destination: NodeAddress,
        message_id: u16,
        frame: Vec<u8>,
        now: Timestamp,
    ) -> NodeResult<()> {
        if self.pending.contains_key(&message_id) {
            return Err(NodeError::DuplicateMessageId(message_id));
        }
        self.pending.insert(
            message_id,
            PendingAck {
                destination,
                message_id,
                attempt_count: 0,
                first_sent_at: now,
                last_sent_at: now,
                frame,
            },
        );
        Ok(())
    }

    /// Settle the entry for `message_id`, returning it if it was pending.
    ///
    /// Unknown identifiers are ignored: late and duplicate Acks are normal once
    /// a message has been retransmitted.
    pub fn on_ack_received(&mut self, message_id: u16) -> Option<PendingAck> {
        let entry = self.pending.remove(&message_id);
        if entry.is_none() {
            trace!("ack for id {} matches nothing pending", message_id);
        }
        entry
    }

    /// Evaluate retry timers at `now`.
    ///
    /// Entries whose last transmission is at least the ack timeout old are
    /// either passed to `resend` (and their timer restarted) or, once the
    /// policy's transmission budget is spent, removed and reported as failed.
    pub fn tick<F>(&mut self, now: Timestamp, mut resend: F) -> Vec<ReliabilityEvent>
    where
        F: FnMut(&PendingAck),
    {
        let timeout = self.policy.ack_timeout();
        let mut events = Vec::new();
        let mut failed = Vec::new();

        for entry in self.pending.values_mut() {
            if entry.age(now) < timeout {
                continue;
            }
            if self.policy.allows_retry(entry.transmissions()) {
                entry.attempt_count += 1;
                entry.last_sent_at = now;
                resend(entry);
                events.push(ReliabilityEvent::Retransmitted {
                    destination: entry.destination,
                    message_id: entry.message_id,
                    attempt: entry.attempt_count,
                });
            } else {
                failed.push(entry.message_id);
            }
        }

        for message_id in failed {
            if let Some(entry) = self.pending.remove(&message_id) {
                events.push(ReliabilityEvent::DeliveryFailed {
                    destination: entry.destination,
                    message_id,
                    transmissions: entry.transmissions(),
                });
            }
        }

        events
    }

    /// Whether `message_id` is awaiting an Ack.
    pub fn is_pending(&self, message_id: u16) -> bool {
        self.pending.contains_key(&message_id)
    }

    /// The entry for `message_id`, if pending.
    pub fn get(&self, message_id: u16) -> Option<&PendingAck> {
        self.pending.get(&message_id)
    }

    /// All pending entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingAck> {
        self.pending.values()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: NodeAddress = NodeAddress(0x0002);

    fn manager() -> ReliabilityManager {
        ReliabilityManager::new(RetryPolicy::default())
    }

    #[test]
    fn test_register_duplicate() {
        let mut rm = manager();
        rm.register(DEST, 7, vec![1], Timestamp::ZERO).expect("first");
        let err = rm.register(DEST, 7, vec![2], Timestamp::from_secs(1)).unwrap_err();
        assert!(matches!(err, NodeError::DuplicateMessageId(7)));
        assert_eq!(rm.get(7).map(|p| p.frame.clone()), Some(vec![1]));
    }

    #[test]
    fn test_ack_removes_entry() {
        let mut rm = manager();
        rm.register(DEST, 7, vec![], Timestamp::ZERO).expect("register");

        let settled = rm.on_ack_received(7).expect("pending");
        assert_eq!(settled.destination, DEST);
        assert_eq!(settled.attempt_count, 0);
        assert!(rm.is_empty());

        // Duplicate Ack is ignored
        assert!(rm.on_ack_received(7).is_none());
    }

    #[test]
    fn test_one_retransmission_then_failure() {
        let mut rm = manager();
        rm.register(DEST, 1, vec![0xC0, 0x01, 0xC0], Timestamp::ZERO)
            .expect("register");

        let mut resent = Vec::new();

        let events = rm.tick(Timestamp::from_millis(2_999), |p| resent.push(p.frame.clone()));
        assert!(events.is_empty());

        let events = rm.tick(Timestamp::from_secs(3), |p| resent.push(p.frame.clone()));
        assert_eq!(
            events,
            vec![ReliabilityEvent::Retransmitted {
                destination: DEST,
                message_id: 1,
                attempt: 1
            }]
        );
        assert_eq!(resent, vec![vec![0xC0, 0x01, 0xC0]]);

        let events = rm.tick(Timestamp::from_millis(5_999), |p| resent.push(p.frame.clone()));
        assert!(events.is_empty());

        let events = rm.tick(Timestamp::from_secs(6), |p| resent.push(p.frame.clone()));
        assert_eq!(
            events,
            vec![ReliabilityEvent::DeliveryFailed {
                destination: DEST,
                message_id: 1,
                transmissions: 2
            }]
        );
        assert_eq!(resent.len(), 1);
        assert!(rm.is_empty());
    }

    #[test]
    fn test_ack_after_retransmission_stops_retries() {
        let mut rm = manager();
        rm.register(DEST, 3, vec![], Timestamp::ZERO).expect("register");
        rm.tick(Timestamp::from_secs(3), |_| {});

        let settled = rm.on_ack_received(3).expect("still pending");
        assert_eq!(settled.attempt_count, 1);
        assert_eq!(settled.first_sent_at, Timestamp::ZERO);

        let mut calls = 0;
        let events = rm.tick(Timestamp::from_secs(10), |_| calls += 1);
        assert!(events.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_single_attempt_policy() {
        let mut rm = ReliabilityManager::new(RetryPolicy {
            ack_timeout_ms: 1_000,
            max_attempts: 1,
        });
        rm.register(DEST, 9, vec![], Timestamp::ZERO).expect("register");

        let events = rm.tick(Timestamp::from_secs(1), |_| panic!("no retries allowed"));
        assert_eq!(
            events,
            vec![ReliabilityEvent::DeliveryFailed {
                destination: DEST,
                message_id: 9,
                transmissions: 1
            }]
        );
    }

    #[test]
    fn test_independent_timers() {
        let mut rm = manager();
        rm.register(DEST, 1, vec![], Timestamp::ZERO).expect("register");
        rm.register(NodeAddress(3), 2, vec![], Timestamp::from_secs(2))
            .expect("register");

        let events = rm.tick(Timestamp::from_secs(3), |_| {});
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ReliabilityEvent::Retransmitted { message_id: 1, .. }
        ));
        assert_eq!(rm.len(), 2);
    }
}

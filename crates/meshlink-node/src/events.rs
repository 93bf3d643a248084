//! Events reported by [`ProtocolStack::poll`](crate::ProtocolStack::poll).

use std::time::Duration;

use meshlink_packet::{DeviceCommand, NodeAddress};

use crate::RemoteCommand;

/// How a received message was addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Sent to this node; an Ack was returned.
    Unicast,
    /// Sent to everyone; no Ack.
    Broadcast,
}

/// Something the caller may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A Unicast or Broadcast message arrived.
    MessageReceived {
        from: NodeAddress,
        identifier: u16,
        delivery: Delivery,
        payload: Vec<u8>,
    },
    /// A reliable message was acknowledged.
    Acknowledged {
        destination: NodeAddress,
        message_id: u16,
        /// Time from the first transmission to the Ack.
        latency: Duration,
    },
    /// A reliable message was sent again after the ack timeout.
    Retransmitted {
        destination: NodeAddress,
        message_id: u16,
        attempt: u32,
    },
    /// A reliable message was abandoned without an Ack.
    DeliveryFailed {
        destination: NodeAddress,
        message_id: u16,
    },
    /// A Hello arrived.
    NeighborSeen {
        address: NodeAddress,
        /// No Hello had been received from this address before.
        new: bool,
    },
    /// A peer asked this node to drive its modem; the command was forwarded.
    RemoteCommandReceived {
        from: NodeAddress,
        kind: RemoteCommand,
        command: DeviceCommand,
    },
    /// Reading the transport failed. Input already buffered and the retry
    /// timers were still processed in the same cycle.
    TransportFailed {
        error: String,
    },
}

impl NodeEvent {
    /// Whether this event ends the life of a reliable message.
    pub fn is_delivery_outcome(&self) -> bool {
        matches!(
            self,
            NodeEvent::Acknowledged { .. } | NodeEvent::DeliveryFailed { .. }
        )
    }

    /// The reliable message this event concerns, if any.
    pub fn message_id(&self) -> Option<u16> {
        match self {
            NodeEvent::Acknowledged { message_id, .. }
            | NodeEvent::Retransmitted { message_id, .. }
            | NodeEvent::DeliveryFailed { message_id, .. } => Some(*message_id),
            _ => None,
        }
    }
}

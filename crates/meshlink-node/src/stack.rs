//! The protocol stack: the caller-facing API of a node.
//!
//! A [`ProtocolStack`] owns every piece of per-node state (identifier counter,
//! pending Acks, neighbor table, stream decoder) and is driven by a single
//! control loop calling [`ProtocolStack::poll`]. Each poll reads whatever the
//! transport has, decodes and dispatches every complete packet, and only then
//! evaluates retry timers, so an Ack arriving in the same cycle as its timeout
//! always wins.

use std::io;
use std::time::Duration;

use meshlink_metrics::{metric_defs, NodeLabels};
use meshlink_packet::{DeviceCommand, NodeAddress, Packet, PacketError, ProtocolType};
use meshlink_serial::{LinkError, PacketSession};
use tracing::{debug, info, trace, warn};

use crate::{
    Clock, Dispatcher, DropReason, NeighborTable, NodeConfig, NodeError, NodeEvent,
    NodeResult, ReliabilityEvent, ReliabilityManager, RemoteCommand, Route, Timestamp, Transport,
};

/// A protocol stack instance bound to one transport and one clock.
pub struct ProtocolStack<T: Transport, C: Clock> {
    config: NodeConfig,
    transport: T,
    clock: C,
    session: PacketSession,
    dispatcher: Dispatcher,
    reliability: ReliabilityManager,
    neighbors: NeighborTable,
    next_id: u16,
    labels: NodeLabels,
}

impl<T: Transport, C: Clock> ProtocolStack<T, C> {
    /// Create a stack after validating `config`.
    pub fn new(config: NodeConfig, transport: T, clock: C) -> NodeResult<Self> {
        config.validate()?;
        debug!(
            "Node[{}]: starting (ack timeout {:?}, {} attempts)",
            config.address,
            config.reliability.ack_timeout(),
            config.reliability.max_attempts
        );
        Ok(ProtocolStack {
            session: PacketSession::new(config.parse),
            dispatcher: Dispatcher::new(config.address),
            reliability: ReliabilityManager::new(config.reliability),
            neighbors: NeighborTable::new(),
            next_id: config.first_identifier,
            labels: NodeLabels::new(config.address.raw()),
            config,
            transport,
            clock,
        })
    }

    /// Local node address.
    pub fn address(&self) -> NodeAddress {
        self.config.address
    }

    /// Configuration in effect.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Current time according to the stack's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Neighbor table.
    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Known neighbors with their current age, in address order.
    pub fn neighbor_list(&self) -> Vec<(NodeAddress, Duration)> {
        self.neighbors.neighbors(self.clock.now())
    }

    /// Remove neighbors older than `neighbor_max_age_secs`. Does nothing when
    /// no maximum age is configured.
    pub fn purge_stale_neighbors(&mut self) -> Vec<NodeAddress> {
        let Some(max_age) = self.config.neighbor_max_age() else {
            return Vec::new();
        };
        let removed = self.neighbors.purge_stale(self.clock.now(), max_age);
        for addr in &removed {
            debug!("Node[{}]: forgetting stale neighbor {}", self.config.address, addr);
        }
        self.record_gauges();
        removed
    }

    /// Whether a reliable message may be sent to `destination` now.
    pub fn can_reach(&self, destination: NodeAddress) -> bool {
        if !self.config.require_known_neighbor {
            return true;
        }
        match self.config.neighbor_max_age() {
            Some(max_age) => self
                .neighbors
                .is_fresh(destination, self.clock.now(), max_age),
            None => self.neighbors.is_known(destination),
        }
    }

    /// Messages awaiting an Ack.
    pub fn pending_count(&self) -> usize {
        self.reliability.len()
    }

    /// Whether `message_id` is awaiting an Ack.
    pub fn is_pending(&self, message_id: u16) -> bool {
        self.reliability.is_pending(message_id)
    }

    /// Hand out the next message identifier.
    ///
    /// The counter wraps at `u16::MAX` and skips identifiers still awaiting an
    /// Ack.
    pub fn next_identifier(&mut self) -> NodeResult<u16> {
        for _ in 0..=u16::MAX as u32 {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.reliability.is_pending(id) {
                return Ok(id);
            }
        }
        Err(NodeError::IdentifiersExhausted(self.reliability.len()))
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send `payload` to `destination` and track it until acknowledged.
    ///
    /// Returns the message identifier; the outcome is reported later by
    /// [`poll`](Self::poll) as `Acknowledged` or `DeliveryFailed`.
    pub fn send_unicast(&mut self, destination: NodeAddress, payload: &[u8]) -> NodeResult<u16> {
        self.send_reliable(ProtocolType::Unicast, destination, payload.to_vec())
    }

    /// Send `payload` to every node. Not acknowledged.
    pub fn send_broadcast(&mut self, payload: &[u8]) -> NodeResult<u16> {
        let id = self.next_identifier()?;
        let packet = Packet::new(
            ProtocolType::Broadcast,
            id,
            self.config.address,
            NodeAddress::BROADCAST,
            payload.to_vec(),
        )?;
        self.transmit(&packet)?;
        debug!("Node[{}]: broadcast id {} ({} bytes)", self.config.address, id, payload.len());
        Ok(id)
    }

    /// Announce this node to its neighbors.
    pub fn send_hello(&mut self) -> NodeResult<u16> {
        let id = self.next_identifier()?;
        let packet = Packet::new(
            ProtocolType::Hello,
            id,
            self.config.address,
            NodeAddress::BROADCAST,
            self.config.hello_payload.as_bytes().to_vec(),
        )?;
        self.transmit(&packet)?;
        trace!("Node[{}]: hello id {}", self.config.address, id);
        Ok(id)
    }

    /// Ask `destination` to drive its modem. Tracked until acknowledged.
    ///
    /// `text` is only sent for [`RemoteCommand::Oled`].
    pub fn send_remote_command(
        &mut self,
        destination: NodeAddress,
        command: RemoteCommand,
        text: &[u8],
    ) -> NodeResult<u16> {
        let payload = if command.carries_payload() {
            text.to_vec()
        } else {
            Vec::new()
        };
        self.send_reliable(command.protocol_type(), destination, payload)
    }

    /// Issue a command to the modem attached to this node.
    ///
    /// `data` beyond 63 bytes is truncated.
    pub fn send_device_command(&mut self, cmd: u8, data: &[u8]) -> NodeResult<u16> {
        self.issue_device_command(&DeviceCommand::build(cmd, data))
    }

    /// Write an already built command to the attached modem.
    ///
    /// The command travels as a DeviceCommand packet addressed to this node.
    pub fn issue_device_command(&mut self, command: &DeviceCommand) -> NodeResult<u16> {
        let id = self.next_identifier()?;
        let packet = Packet::new(
            ProtocolType::DeviceCommand,
            id,
            self.config.address,
            self.config.address,
            command.encode(),
        )?;
        self.transmit(&packet)?;
        debug!(
            "Node[{}]: device command {} with {} data bytes",
            self.config.address,
            command.cmd,
            command.data.len()
        );
        Ok(id)
    }

    fn send_reliable(
        &mut self,
        protocol_type: ProtocolType,
        destination: NodeAddress,
        payload: Vec<u8>,
    ) -> NodeResult<u16> {
        if !self.can_reach(destination) {
            return Err(NodeError::UnknownNeighbor(destination));
        }

        let id = self.next_identifier()?;
        let packet = Packet::new(protocol_type, id, self.config.address, destination, payload)?;
        let frame = self.transmit(&packet)?;
        self.reliability
            .register(destination, id, frame, self.clock.now())?;
        self.record_gauges();

        debug!(
            "Node[{}]: sent {} id {} to {}, awaiting ack",
            self.config.address, protocol_type, id, destination
        );
        Ok(id)
    }

    /// Frame and write a packet, returning the bytes written.
    fn transmit(&mut self, packet: &Packet) -> NodeResult<Vec<u8>> {
        let frame = self.session.encode_packet(packet);
        let written = self.transport.write(&frame)?;
        if written < frame.len() {
            return Err(NodeError::Transport(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, frame.len()),
            )));
        }
        metrics::counter!(
            metric_defs::PACKET_TX.name,
            &self.labels.with("protocol", packet.protocol_type().as_label())
        )
        .increment(1);
        Ok(frame)
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Run one control-loop cycle.
    ///
    /// Reads the transport, dispatches every complete packet, then evaluates
    /// retry timers. Malformed input is logged and discarded. A failed read is
    /// reported as [`NodeEvent::TransportFailed`] and the timers still run, so
    /// pending messages reach [`NodeEvent::DeliveryFailed`] on a dead link.
    /// Write failures while replying or retransmitting are logged and left to
    /// the retry timers.
    pub fn poll(&mut self) -> Vec<NodeEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();

        match self.transport.read_nonblocking() {
            Ok(incoming) if !incoming.is_empty() => {
                trace!("Node[{}]: read {} bytes", self.config.address, incoming.len());
                self.session.feed(&incoming);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Node[{}]: transport read failed: {}", self.config.address, e);
                metrics::counter!(metric_defs::TRANSPORT_ERRORS.name, &self.labels.to_labels())
                    .increment(1);
                events.push(NodeEvent::TransportFailed {
                    error: e.to_string(),
                });
            }
        }

        loop {
            match self.session.try_decode() {
                Ok(Some(packet)) => {
                    metrics::counter!(metric_defs::FRAME_RX.name, &self.labels.to_labels())
                        .increment(1);
                    self.handle_packet(packet, now, &mut events);
                }
                Ok(None) => break,
                Err(LinkError::Frame(e)) => {
                    warn!("Node[{}]: discarding frame: {}", self.config.address, e);
                    metrics::counter!(metric_defs::FRAME_ERRORS.name, &self.labels.to_labels())
                        .increment(1);
                }
                Err(LinkError::Packet(e)) => {
                    warn!("Node[{}]: discarding packet: {}", self.config.address, e);
                    metrics::counter!(metric_defs::FRAME_RX.name, &self.labels.to_labels())
                        .increment(1);
                    self.count_drop(packet_error_label(&e));
                }
            }
        }

        self.run_timers(now, &mut events);
        self.record_gauges();
        events
    }

    fn handle_packet(&mut self, packet: Packet, now: Timestamp, events: &mut Vec<NodeEvent>) {
        let route = self.dispatcher.route(&packet);
        let from = packet.source();
        let identifier = packet.identifier();
        let protocol_type = packet.protocol_type();

        if let Route::Drop(reason) = route {
            match reason {
                DropReason::NotForUs => trace!(
                    "Node[{}]: ignoring {} for {}",
                    self.config.address,
                    protocol_type,
                    packet.destination()
                ),
                DropReason::UnknownProtocol(raw) => warn!(
                    "Node[{}]: unknown protocol type {} from {}",
                    self.config.address, raw, from
                ),
                _ => debug!(
                    "Node[{}]: dropping {} from {}: {}",
                    self.config.address,
                    protocol_type,
                    from,
                    reason.as_label()
                ),
            }
            self.count_drop(reason.as_label());
            return;
        }

        metrics::counter!(
            metric_defs::PACKET_RX.name,
            &self.labels.with("protocol", protocol_type.as_label())
        )
        .increment(1);

        let ack = route.requires_ack();
        match route {
            Route::Ack { acked } => self.settle_ack(from, acked, now, events),
            Route::Deliver { delivery } => {
                info!(
                    "Node[{}]: {:?} message id {} from {}: {}",
                    self.config.address,
                    delivery,
                    identifier,
                    from,
                    String::from_utf8_lossy(&packet.payload)
                );
                events.push(NodeEvent::MessageReceived {
                    from,
                    identifier,
                    delivery,
                    payload: packet.payload,
                });
            }
            Route::Hello => {
                let new = self.neighbors.record_hello(from, now);
                trace!("Node[{}]: hello from {} (new: {})", self.config.address, from, new);
                events.push(NodeEvent::NeighborSeen { address: from, new });
            }
            Route::Command { kind, command } => {
                info!(
                    "Node[{}]: {} command from {}",
                    self.config.address, kind, from
                );
                if let Err(e) = self.issue_device_command(&command) {
                    warn!(
                        "Node[{}]: failed to forward {} command to modem: {}",
                        self.config.address, kind, e
                    );
                }
                events.push(NodeEvent::RemoteCommandReceived {
                    from,
                    kind,
                    command,
                });
            }
            Route::Drop(_) => {}
        }

        if ack {
            self.send_ack(from, identifier);
        }
    }

    fn settle_ack(
        &mut self,
        from: NodeAddress,
        acked: u16,
        now: Timestamp,
        events: &mut Vec<NodeEvent>,
    ) {
        let Some(pending) = self.reliability.on_ack_received(acked) else {
            debug!(
                "Node[{}]: stale ack for id {} from {}",
                self.config.address, acked, from
            );
            return;
        };

        if pending.destination != from {
            debug!(
                "Node[{}]: ack for id {} came from {}, message was sent to {}",
                self.config.address, acked, from, pending.destination
            );
        }

        let latency = now.saturating_duration_since(pending.first_sent_at);
        info!(
            "Node[{}]: id {} acknowledged by {} after {:?}",
            self.config.address, acked, from, latency
        );
        metrics::counter!(metric_defs::DELIVERED.name, &self.labels.to_labels()).increment(1);
        metrics::histogram!(metric_defs::ACK_LATENCY.name, &self.labels.to_labels())
            .record(latency.as_secs_f64() * 1_000.0);

        events.push(NodeEvent::Acknowledged {
            destination: pending.destination,
            message_id: acked,
            latency,
        });
    }

    fn send_ack(&mut self, to: NodeAddress, acked: u16) {
        let result = self.next_identifier().and_then(|id| {
            let ack = Packet::ack(id, self.config.address, to, acked);
            self.transmit(&ack)
        });
        match result {
            Ok(_) => trace!("Node[{}]: acked id {} to {}", self.config.address, acked, to),
            Err(e) => warn!(
                "Node[{}]: failed to ack id {} to {}: {}",
                self.config.address, acked, to, e
            ),
        }
    }

    fn run_timers(&mut self, now: Timestamp, events: &mut Vec<NodeEvent>) {
        let address = self.config.address;
        let transport = &mut self.transport;
        let labels = &self.labels;

        let outcomes = self.reliability.tick(now, |pending| {
            match transport.write(&pending.frame) {
                Ok(_) => {
                    metrics::counter!(metric_defs::RETRANSMISSIONS.name, &labels.to_labels())
                        .increment(1);
                }
                Err(e) => warn!(
                    "Node[{}]: retransmission of id {} failed: {}",
                    address, pending.message_id, e
                ),
            }
        });

        for outcome in outcomes {
            match outcome {
                ReliabilityEvent::Retransmitted {
                    destination,
                    message_id,
                    attempt,
                } => {
                    info!(
                        "Node[{}]: no ack for id {} from {}, retransmission {}",
                        address, message_id, destination, attempt
                    );
                    events.push(NodeEvent::Retransmitted {
                        destination,
                        message_id,
                        attempt,
                    });
                }
                ReliabilityEvent::DeliveryFailed {
                    destination,
                    message_id,
                    transmissions,
                } => {
                    warn!(
                        "Node[{}]: id {} to {} not acknowledged after {} transmissions",
                        address, message_id, destination, transmissions
                    );
                    metrics::counter!(metric_defs::DELIVERY_FAILED.name, &labels.to_labels())
                        .increment(1);
                    events.push(NodeEvent::DeliveryFailed {
                        destination,
                        message_id,
                    });
                }
            }
        }
    }

    fn count_drop(&self, reason: &'static str) {
        metrics::counter!(
            metric_defs::PACKET_DROPPED.name,
            &self.labels.with("reason", reason)
        )
        .increment(1);
    }

    fn record_gauges(&self) {
        metrics::gauge!(metric_defs::PENDING_ACKS.name, &self.labels.to_labels())
            .set(self.reliability.len() as f64);
        metrics::gauge!(metric_defs::NEIGHBORS_KNOWN.name, &self.labels.to_labels())
            .set(self.neighbors.len() as f64);
    }
}

/// Metric label for a packet that failed to parse.
fn packet_error_label(err: &PacketError) -> &'static str {
    match err {
        PacketError::TooShort { .. } => "too_short",
        PacketError::LengthMismatch { .. } => "length_mismatch",
        PacketError::ChecksumMismatch { .. } => "checksum_mismatch",
        _ => "malformed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelTransport, Delivery, ManualClock};
    use meshlink_serial::{slip_decode, slip_encode};

    const LOCAL: NodeAddress = NodeAddress(0x0001);
    const PEER: NodeAddress = NodeAddress(0x0002);

    fn stack() -> (ProtocolStack<ChannelTransport, ManualClock>, ChannelTransport, ManualClock) {
        let (near, far) = ChannelTransport::pair();
        let clock = ManualClock::new();
        let stack = ProtocolStack::new(NodeConfig::with_address(LOCAL), near, clock.clone())
            .expect("valid config");
        (stack, far, clock)
    }

    fn inject(far: &mut ChannelTransport, packet: &Packet) {
        far.write(&slip_encode(&packet.encode())).expect("write");
    }

    fn written(far: &mut ChannelTransport) -> Vec<Packet> {
        let mut session = PacketSession::new(meshlink_packet::ParseOptions::strict());
        session.feed(&far.read_nonblocking().expect("read"));
        let mut packets = Vec::new();
        while let Some(packet) = session.try_decode().expect("valid frames") {
            packets.push(packet);
        }
        packets
    }

    fn hello_from(address: NodeAddress) -> Packet {
        Packet::new(ProtocolType::Hello, 1, address, NodeAddress::BROADCAST, b"hello".to_vec())
            .expect("fits")
    }

    #[test]
    fn test_identifiers_start_at_one_and_skip_pending() {
        let (mut stack, mut far, _clock) = stack();
        inject(&mut far, &hello_from(PEER));
        stack.poll();

        assert_eq!(stack.send_unicast(PEER, b"a").expect("send"), 1);
        stack.next_id = 1;
        assert_eq!(stack.next_identifier().expect("free id"), 2);
    }

    #[test]
    fn test_identifier_wraps() {
        let (mut stack, _far, _clock) = stack();
        stack.next_id = u16::MAX;
        assert_eq!(stack.next_identifier().expect("id"), u16::MAX);
        assert_eq!(stack.next_identifier().expect("id"), 0);
    }

    #[test]
    fn test_unicast_requires_known_neighbor() {
        let (mut stack, mut far, _clock) = stack();
        let err = stack.send_unicast(PEER, b"hola").unwrap_err();
        assert!(matches!(err, NodeError::UnknownNeighbor(addr) if addr == PEER));
        assert!(far.read_nonblocking().expect("read").is_empty());

        inject(&mut far, &hello_from(PEER));
        let events = stack.poll();
        assert_eq!(events, vec![NodeEvent::NeighborSeen { address: PEER, new: true }]);
        assert!(stack.send_unicast(PEER, b"hola").is_ok());
        assert_eq!(stack.pending_count(), 1);
    }

    #[test]
    fn test_stale_neighbor_unreachable() {
        let (near, mut far) = ChannelTransport::pair();
        let clock = ManualClock::new();
        let config = NodeConfig {
            neighbor_max_age_secs: Some(30),
            ..NodeConfig::with_address(LOCAL)
        };
        let mut stack = ProtocolStack::new(config, near, clock.clone()).expect("valid");

        inject(&mut far, &hello_from(PEER));
        stack.poll();
        assert!(stack.can_reach(PEER));

        clock.advance(Duration::from_secs(31));
        assert!(!stack.can_reach(PEER));
        assert_eq!(stack.purge_stale_neighbors(), vec![PEER]);
        assert!(stack.neighbors().is_empty());
    }

    #[test]
    fn test_broadcast_and_hello_not_tracked() {
        let (mut stack, mut far, _clock) = stack();
        stack.send_broadcast(b"all").expect("broadcast");
        stack.send_hello().expect("hello");
        assert_eq!(stack.pending_count(), 0);

        let packets = written(&mut far);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].protocol_type(), ProtocolType::Broadcast);
        assert_eq!(packets[0].destination(), NodeAddress::BROADCAST);
        assert_eq!(packets[1].protocol_type(), ProtocolType::Hello);
        assert_eq!(packets[1].payload, b"hello".to_vec());
    }

    #[test]
    fn test_device_command_addressed_to_self() {
        let (mut stack, mut far, _clock) = stack();
        stack.send_device_command(7, b"hi").expect("send");

        let packets = written(&mut far);
        assert_eq!(packets.len(), 1);
        let packet = &packets[0];
        assert_eq!(packet.protocol_type(), ProtocolType::DeviceCommand);
        assert_eq!(packet.source(), LOCAL);
        assert_eq!(packet.destination(), LOCAL);
        assert_eq!(packet.payload, vec![0x70, 0x02, b'h', b'i', 0x73]);
        assert_eq!(stack.pending_count(), 0);
    }

    #[test]
    fn test_broadcast_delivered_without_ack() {
        let (mut stack, mut far, _clock) = stack();
        let packet = Packet::new(
            ProtocolType::Broadcast,
            9,
            PEER,
            NodeAddress::BROADCAST,
            b"all".to_vec(),
        )
        .expect("fits");
        inject(&mut far, &packet);

        let events = stack.poll();
        assert_eq!(
            events,
            vec![NodeEvent::MessageReceived {
                from: PEER,
                identifier: 9,
                delivery: Delivery::Broadcast,
                payload: b"all".to_vec(),
            }]
        );
        assert!(written(&mut far).is_empty());
    }

    #[test]
    fn test_remote_led_command_forwarded_and_acked() {
        let (mut stack, mut far, _clock) = stack();
        let request = Packet::new(ProtocolType::LedCommand, 21, PEER, LOCAL, vec![])
            .expect("fits");
        inject(&mut far, &request);

        let events = stack.poll();
        assert_eq!(
            events,
            vec![NodeEvent::RemoteCommandReceived {
                from: PEER,
                kind: RemoteCommand::Led,
                command: DeviceCommand::toggle_led(),
            }]
        );

        let packets = written(&mut far);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].protocol_type(), ProtocolType::DeviceCommand);
        assert_eq!(packets[0].destination(), LOCAL);
        assert_eq!(packets[0].payload, DeviceCommand::toggle_led().encode());
        assert_eq!(packets[1].protocol_type(), ProtocolType::Ack);
        assert_eq!(packets[1].destination(), PEER);
        assert_eq!(packets[1].acked_identifier(), Some(21));
    }

    #[test]
    fn test_foreign_packet_ignored() {
        let (mut stack, mut far, _clock) = stack();
        let packet = Packet::new(ProtocolType::Unicast, 5, PEER, NodeAddress(0x0003), b"x".to_vec())
            .expect("fits");
        inject(&mut far, &packet);

        assert!(stack.poll().is_empty());
        assert!(written(&mut far).is_empty());
    }

    #[test]
    fn test_bad_checksum_dropped() {
        let (mut stack, mut far, _clock) = stack();
        let mut packet = Packet::new(ProtocolType::Unicast, 5, PEER, LOCAL, b"x".to_vec())
            .expect("fits");
        packet.header.checksum ^= 0xFF;
        inject(&mut far, &packet);

        assert!(stack.poll().is_empty());
        assert!(written(&mut far).is_empty());
    }

    #[test]
    fn test_ack_wire_format() {
        let (mut stack, mut far, _clock) = stack();
        let packet = Packet::new(ProtocolType::Unicast, 0x0102, PEER, LOCAL, b"hola".to_vec())
            .expect("fits");
        inject(&mut far, &packet);
        stack.poll();

        let raw = far.read_nonblocking().expect("read");
        let frame = slip_decode(&raw).expect("valid").expect("frame");
        let ack = Packet::parse(&frame).expect("packet");
        assert_eq!(ack.protocol_type(), ProtocolType::Ack);
        assert_eq!(ack.payload, vec![0x01, 0x02]);
        assert_ne!(ack.identifier(), 0x0102);
    }

    #[test]
    fn test_transport_failure_surfaces() {
        let (mut stack, far, _clock) = stack();
        drop(far);
        let events = stack.poll();
        assert!(matches!(events.as_slice(), [NodeEvent::TransportFailed { .. }]));
        assert!(matches!(stack.send_broadcast(b"x"), Err(NodeError::Transport(_))));
    }

    #[test]
    fn test_dead_link_still_abandons_pending() {
        let (mut stack, mut far, clock) = stack();
        inject(&mut far, &hello_from(PEER));
        stack.poll();
        let id = stack.send_unicast(PEER, b"hola").expect("send");
        drop(far);

        clock.advance(Duration::from_secs(3));
        let events = stack.poll();
        assert!(events.iter().any(|e| matches!(e, NodeEvent::TransportFailed { .. })));
        assert!(events.contains(&NodeEvent::Retransmitted {
            destination: PEER,
            message_id: id,
            attempt: 1,
        }));
        assert!(stack.is_pending(id));

        clock.advance(Duration::from_secs(3));
        let events = stack.poll();
        assert!(events.contains(&NodeEvent::DeliveryFailed {
            destination: PEER,
            message_id: id,
        }));
        assert!(!stack.is_pending(id));
        assert_eq!(stack.pending_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (near, _far) = ChannelTransport::pair();
        let result = ProtocolStack::new(
            NodeConfig::with_address(NodeAddress::BROADCAST),
            near,
            ManualClock::new(),
        );
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}

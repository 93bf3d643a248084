//! Packet routing.
//!
//! The dispatcher decides what a decoded packet means for this node without
//! touching any state. [`ProtocolStack`](crate::ProtocolStack) applies the
//! resulting [`Route`]: settling Acks, updating the neighbor table, delivering
//! payloads and writing replies.
//!
//! | protocol type | route |
//! |---|---|
//! | Ack | [`Route::Ack`] with the identifier from the payload |
//! | Unicast | [`Route::Deliver`], acknowledged |
//! | Broadcast | [`Route::Deliver`], not acknowledged |
//! | Hello | [`Route::Hello`] |
//! | Test / Led / Oled | [`Route::Command`], acknowledged |
//! | DeviceCommand, unknown | dropped |
//!
//! Packets addressed neither to this node nor to broadcast are dropped first.

use std::fmt;
use std::str::FromStr;

use meshlink_packet::{
    DeviceCommand, NodeAddress, Packet, ProtocolType, CMD_OLED_TEXT, CMD_TEST_PATTERN,
    CMD_TOGGLE_LED,
};

use crate::Delivery;

// ============================================================================
// Remote commands
// ============================================================================

/// A request for a peer to drive its attached modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCommand {
    /// Show the test pattern.
    Test,
    /// Toggle the LED.
    Led,
    /// Show text on the display.
    Oled,
}

impl RemoteCommand {
    /// Packet type carrying this request.
    pub fn protocol_type(&self) -> ProtocolType {
        match self {
            RemoteCommand::Test => ProtocolType::TestCommand,
            RemoteCommand::Led => ProtocolType::LedCommand,
            RemoteCommand::Oled => ProtocolType::OledMessage,
        }
    }

    /// Device command code the receiving node issues.
    pub fn command_code(&self) -> u8 {
        match self {
            RemoteCommand::Test => CMD_TEST_PATTERN,
            RemoteCommand::Led => CMD_TOGGLE_LED,
            RemoteCommand::Oled => CMD_OLED_TEXT,
        }
    }

    /// Whether the request carries a payload. Test and Led requests are sent
    /// empty and any payload they arrive with is ignored.
    pub fn carries_payload(&self) -> bool {
        matches!(self, RemoteCommand::Oled)
    }

    /// Device command for a request that arrived with `payload`.
    pub fn device_command(&self, payload: &[u8]) -> DeviceCommand {
        match self {
            RemoteCommand::Test => DeviceCommand::test_pattern(),
            RemoteCommand::Led => DeviceCommand::toggle_led(),
            RemoteCommand::Oled => DeviceCommand::oled_text(payload),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteCommand::Test => "test",
            RemoteCommand::Led => "led",
            RemoteCommand::Oled => "oled",
        };
        f.write_str(name)
    }
}

impl FromStr for RemoteCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(RemoteCommand::Test),
            "led" => Ok(RemoteCommand::Led),
            "oled" => Ok(RemoteCommand::Oled),
            other => Err(format!("unknown command '{}' (expected test, led or oled)", other)),
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Why a packet was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Addressed to another node.
    NotForUs,
    /// Ack without a 2-byte identifier.
    BadAck,
    /// Device command packets are consumed by the modem, not the host.
    DeviceCommand,
    /// Protocol type outside the known range.
    UnknownProtocol(u8),
}

impl DropReason {
    /// Metric label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DropReason::NotForUs => "not_for_us",
            DropReason::BadAck => "bad_ack",
            DropReason::DeviceCommand => "device_command",
            DropReason::UnknownProtocol(_) => "unknown_protocol",
        }
    }
}

/// What to do with a received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Discard.
    Drop(DropReason),
    /// Settle the pending entry for `acked`.
    Ack { acked: u16 },
    /// Hand the payload to the caller, acknowledging unicasts.
    Deliver { delivery: Delivery },
    /// Record the sender as a neighbor.
    Hello,
    /// Forward `command` to the attached modem and acknowledge the sender.
    Command {
        kind: RemoteCommand,
        command: DeviceCommand,
    },
}

impl Route {
    /// Whether the sender must be sent an Ack.
    pub fn requires_ack(&self) -> bool {
        matches!(
            self,
            Route::Deliver {
                delivery: Delivery::Unicast
            } | Route::Command { .. }
        )
    }
}

/// Routes packets for one local address.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    local: NodeAddress,
}

impl Dispatcher {
    pub fn new(local: NodeAddress) -> Self {
        Dispatcher { local }
    }

    /// The address packets are accepted for.
    pub fn local_address(&self) -> NodeAddress {
        self.local
    }

    /// Whether a packet addressed to `destination` concerns this node.
    pub fn accepts(&self, destination: NodeAddress) -> bool {
        destination == self.local || destination.is_broadcast()
    }

    /// Decide what to do with `packet`.
    pub fn route(&self, packet: &Packet) -> Route {
        if !self.accepts(packet.destination()) {
            return Route::Drop(DropReason::NotForUs);
        }

        match packet.protocol_type() {
            ProtocolType::Ack => match packet.acked_identifier() {
                Some(acked) => Route::Ack { acked },
                None => Route::Drop(DropReason::BadAck),
            },
            ProtocolType::Unicast => Route::Deliver {
                delivery: Delivery::Unicast,
            },
            ProtocolType::Broadcast => Route::Deliver {
                delivery: Delivery::Broadcast,
            },
            ProtocolType::Hello => Route::Hello,
            ProtocolType::TestCommand => command_route(RemoteCommand::Test, packet),
            ProtocolType::LedCommand => command_route(RemoteCommand::Led, packet),
            ProtocolType::OledMessage => command_route(RemoteCommand::Oled, packet),
            ProtocolType::DeviceCommand => Route::Drop(DropReason::DeviceCommand),
            ProtocolType::Unknown(raw) => Route::Drop(DropReason::UnknownProtocol(raw)),
        }
    }
}

fn command_route(kind: RemoteCommand, packet: &Packet) -> Route {
    Route::Command {
        kind,
        command: kind.device_command(&packet.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: NodeAddress = NodeAddress(0x0002);
    const PEER: NodeAddress = NodeAddress(0x0001);

    fn packet(protocol_type: ProtocolType, destination: NodeAddress, payload: &[u8]) -> Packet {
        Packet::new(protocol_type, 10, PEER, destination, payload.to_vec()).expect("fits")
    }

    #[test]
    fn test_drops_foreign_destination() {
        let dispatcher = Dispatcher::new(LOCAL);
        let p = packet(ProtocolType::Unicast, NodeAddress(0x0003), b"x");
        assert_eq!(dispatcher.route(&p), Route::Drop(DropReason::NotForUs));
    }

    #[test]
    fn test_accepts_broadcast_destination() {
        let dispatcher = Dispatcher::new(LOCAL);
        let p = packet(ProtocolType::Hello, NodeAddress::BROADCAST, b"hello");
        assert_eq!(dispatcher.route(&p), Route::Hello);
    }

    #[test]
    fn test_unicast_and_broadcast() {
        let dispatcher = Dispatcher::new(LOCAL);

        let unicast = dispatcher.route(&packet(ProtocolType::Unicast, LOCAL, b"hola"));
        assert_eq!(
            unicast,
            Route::Deliver {
                delivery: Delivery::Unicast
            }
        );
        assert!(unicast.requires_ack());

        let broadcast = dispatcher.route(&packet(
            ProtocolType::Broadcast,
            NodeAddress::BROADCAST,
            b"all",
        ));
        assert_eq!(
            broadcast,
            Route::Deliver {
                delivery: Delivery::Broadcast
            }
        );
        assert!(!broadcast.requires_ack());
    }

    #[test]
    fn test_ack_route() {
        let dispatcher = Dispatcher::new(LOCAL);
        let ack = Packet::ack(4, PEER, LOCAL, 0x1234);
        assert_eq!(dispatcher.route(&ack), Route::Ack { acked: 0x1234 });

        let short = packet(ProtocolType::Ack, LOCAL, &[0x12]);
        assert_eq!(dispatcher.route(&short), Route::Drop(DropReason::BadAck));
    }

    #[test]
    fn test_command_routes() {
        let dispatcher = Dispatcher::new(LOCAL);

        let route = dispatcher.route(&packet(ProtocolType::LedCommand, LOCAL, b"ignored"));
        assert_eq!(
            route,
            Route::Command {
                kind: RemoteCommand::Led,
                command: DeviceCommand::toggle_led()
            }
        );
        assert!(route.requires_ack());

        let long_text = [b'a'; 80];
        match dispatcher.route(&packet(ProtocolType::OledMessage, LOCAL, &long_text)) {
            Route::Command { kind, command } => {
                assert_eq!(kind, RemoteCommand::Oled);
                assert_eq!(command.cmd, CMD_OLED_TEXT);
                assert_eq!(command.data.len(), 63);
                assert!(command.is_intact());
            }
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn test_each_remote_command_type_routes_to_its_kind() {
        let dispatcher = Dispatcher::new(LOCAL);
        for kind in [RemoteCommand::Test, RemoteCommand::Led, RemoteCommand::Oled] {
            let route = dispatcher.route(&packet(kind.protocol_type(), LOCAL, b"hi"));
            assert_eq!(
                route,
                Route::Command {
                    kind,
                    command: kind.device_command(b"hi"),
                }
            );
        }
    }

    #[test]
    fn test_unhandled_types_dropped() {
        let dispatcher = Dispatcher::new(LOCAL);
        assert_eq!(
            dispatcher.route(&packet(ProtocolType::DeviceCommand, LOCAL, &[0x50, 0, 0x50])),
            Route::Drop(DropReason::DeviceCommand)
        );
        assert_eq!(
            dispatcher.route(&packet(ProtocolType::Unknown(42), LOCAL, &[])),
            Route::Drop(DropReason::UnknownProtocol(42))
        );
    }

    #[test]
    fn test_remote_command_parse() {
        assert_eq!("LED".parse::<RemoteCommand>(), Ok(RemoteCommand::Led));
        assert_eq!("oled".parse::<RemoteCommand>(), Ok(RemoteCommand::Oled));
        assert!("blink".parse::<RemoteCommand>().is_err());
        assert_eq!(RemoteCommand::Test.to_string(), "test");
        assert_eq!(RemoteCommand::Test.protocol_type(), ProtocolType::TestCommand);
    }
}

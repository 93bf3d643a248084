//! Fixed packet header.
//!
//! ```text
//!  byte 0        byte 1      2          3..4         5          6          7..8      9..10
//! +------+------+-----------+----------+------------+----------+----------+---------+---------+
//! | flag | off  | offset lo | total_len| identifier | protocol | checksum | source  | dest    |
//! | 4bit | hi 4 |   8 bit   |  8 bit   |  16 bit BE |  8 bit   |  8 bit   | 16 bit  | 16 bit  |
//! +------+------+-----------+----------+------------+----------+----------+---------+---------+
//! ```

use crate::{
    NodeAddress, PacketError, PacketResult, HEADER_SIZE, MAX_FRAGMENT_FLAG, MAX_FRAGMENT_OFFSET,
    PROTO_ACK, PROTO_BROADCAST, PROTO_DEVICE_COMMAND, PROTO_HELLO, PROTO_LED_COMMAND,
    PROTO_OLED_MESSAGE, PROTO_TEST_COMMAND, PROTO_UNICAST,
};

/// The kind of a packet, which decides how the receiver handles its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolType {
    /// Command for the locally attached modem (payload is a [`crate::DeviceCommand`]).
    DeviceCommand,
    /// Acknowledgement; payload is the acknowledged identifier (2 bytes, big-endian).
    Ack,
    /// Message for one node, acknowledged by the receiver.
    Unicast,
    /// Message for every node, never acknowledged.
    Broadcast,
    /// Presence announcement.
    Hello,
    /// Remote request to show the test pattern.
    TestCommand,
    /// Remote request to toggle the LED.
    LedCommand,
    /// Remote request to display a text.
    OledMessage,
    /// A code this implementation does not know.
    Unknown(u8),
}

impl ProtocolType {
    /// Whether the receiver answers this kind of packet with an Ack.
    pub fn expects_ack(&self) -> bool {
        matches!(
            self,
            ProtocolType::Unicast
                | ProtocolType::TestCommand
                | ProtocolType::LedCommand
                | ProtocolType::OledMessage
        )
    }

    /// Short lowercase name used in logs and metric labels.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolType::DeviceCommand => "device_command",
            ProtocolType::Ack => "ack",
            ProtocolType::Unicast => "unicast",
            ProtocolType::Broadcast => "broadcast",
            ProtocolType::Hello => "hello",
            ProtocolType::TestCommand => "test_command",
            ProtocolType::LedCommand => "led_command",
            ProtocolType::OledMessage => "oled_message",
            ProtocolType::Unknown(_) => "unknown",
        }
    }
}

impl From<u8> for ProtocolType {
    fn from(code: u8) -> Self {
        match code {
            PROTO_DEVICE_COMMAND => ProtocolType::DeviceCommand,
            PROTO_ACK => ProtocolType::Ack,
            PROTO_UNICAST => ProtocolType::Unicast,
            PROTO_BROADCAST => ProtocolType::Broadcast,
            PROTO_HELLO => ProtocolType::Hello,
            PROTO_TEST_COMMAND => ProtocolType::TestCommand,
            PROTO_LED_COMMAND => ProtocolType::LedCommand,
            PROTO_OLED_MESSAGE => ProtocolType::OledMessage,
            _ => ProtocolType::Unknown(code),
        }
    }
}

impl From<ProtocolType> for u8 {
    fn from(protocol: ProtocolType) -> Self {
        match protocol {
            ProtocolType::DeviceCommand => PROTO_DEVICE_COMMAND,
            ProtocolType::Ack => PROTO_ACK,
            ProtocolType::Unicast => PROTO_UNICAST,
            ProtocolType::Broadcast => PROTO_BROADCAST,
            ProtocolType::Hello => PROTO_HELLO,
            ProtocolType::TestCommand => PROTO_TEST_COMMAND,
            ProtocolType::LedCommand => PROTO_LED_COMMAND,
            ProtocolType::OledMessage => PROTO_OLED_MESSAGE,
            ProtocolType::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolType::Unknown(code) => write!(f, "unknown({})", code),
            other => f.write_str(other.as_label()),
        }
    }
}

// ============================================================================
// Fragment Field Packing
// ============================================================================

/// Pack the 4-bit fragment flag and 12-bit fragment offset into the first two
/// header bytes. Out-of-range bits are masked off.
pub fn pack_fragment(flag: u8, offset: u16) -> [u8; 2] {
    let byte0 = ((flag & MAX_FRAGMENT_FLAG) << 4) | ((offset >> 8) as u8 & 0x0F);
    let byte1 = (offset & 0xFF) as u8;
    [byte0, byte1]
}

/// Split the first two header bytes into fragment flag and fragment offset.
pub fn unpack_fragment(bytes: [u8; 2]) -> (u8, u16) {
    let flag = (bytes[0] >> 4) & MAX_FRAGMENT_FLAG;
    let offset = (((bytes[0] & 0x0F) as u16) << 8) | bytes[1] as u16;
    (flag, offset)
}

// ============================================================================
// Packet Header
// ============================================================================

/// The fixed 11-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Fragmentation indicator (4 bits). Stored but not interpreted.
    pub fragment_flag: u8,
    /// Fragment offset (12 bits). Stored but not interpreted.
    pub fragment_offset: u16,
    /// Payload length in bytes.
    pub total_length: u8,
    /// Sender-assigned message identifier, echoed back in Acks.
    pub identifier: u16,
    /// How the payload is interpreted.
    pub protocol_type: ProtocolType,
    /// Header checksum, see [`header_checksum`].
    pub checksum: u8,
    /// Sending node.
    pub source: NodeAddress,
    /// Receiving node, or [`NodeAddress::BROADCAST`].
    pub destination: NodeAddress,
}

impl PacketHeader {
    /// Set both fragment fields, masking them to their bit widths.
    pub fn with_fragment(mut self, flag: u8, offset: u16) -> Self {
        self.fragment_flag = flag & MAX_FRAGMENT_FLAG;
        self.fragment_offset = offset & MAX_FRAGMENT_OFFSET;
        self
    }

    /// Compute the checksum for the current field values.
    pub fn compute_checksum(&self) -> u8 {
        header_checksum(self)
    }

    /// Store the computed checksum in the header.
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Whether the stored checksum matches the field values.
    pub fn checksum_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Encode the header to its wire representation.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let [b0, b1] = pack_fragment(self.fragment_flag, self.fragment_offset);
        let [id_hi, id_lo] = self.identifier.to_be_bytes();
        let [src_hi, src_lo] = self.source.to_be_bytes();
        let [dst_hi, dst_lo] = self.destination.to_be_bytes();
        [
            b0,
            b1,
            self.total_length,
            id_hi,
            id_lo,
            self.protocol_type.into(),
            self.checksum,
            src_hi,
            src_lo,
            dst_hi,
            dst_lo,
        ]
    }

    /// Decode a header from the start of `data`.
    pub fn decode(data: &[u8]) -> PacketResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let (fragment_flag, fragment_offset) = unpack_fragment([data[0], data[1]]);
        Ok(PacketHeader {
            fragment_flag,
            fragment_offset,
            total_length: data[2],
            identifier: u16::from_be_bytes([data[3], data[4]]),
            protocol_type: ProtocolType::from(data[5]),
            checksum: data[6],
            source: NodeAddress::from_be_bytes([data[7], data[8]]),
            destination: NodeAddress::from_be_bytes([data[9], data[10]]),
        })
    }
}

/// Ones' complement checksum over the header, excluding both addresses.
///
/// The six covered bytes are the packed fragment fields, `total_length`, both
/// identifier bytes and `protocol_type`. Their 16-bit sum has its carry folded
/// back once and the low byte of the complement is the checksum. Source and
/// destination are not covered, so rewriting an address does not invalidate
/// the checksum.
pub fn header_checksum(header: &PacketHeader) -> u8 {
    let [frag_hi, frag_lo] = pack_fragment(header.fragment_flag, header.fragment_offset);
    let [id_hi, id_lo] = header.identifier.to_be_bytes();
    let covered = [
        frag_hi,
        frag_lo,
        header.total_length,
        id_hi,
        id_lo,
        u8::from(header.protocol_type),
    ];

    let sum: u16 = covered.iter().map(|&b| b as u16).sum();
    let folded = (sum & 0xFF) + (sum >> 8);
    !(folded as u8)
}

//! Packet encoding and decoding.
//!
//! ## Packet Format
//!
//! | Field   | Size (bytes)              | Description                               |
//! |---------|---------------------------|-------------------------------------------|
//! | header  | 11 (`HEADER_SIZE`)        | See [`PacketHeader`].                     |
//! | payload | up to 255                 | Interpretation depends on protocol type.  |
//!
//! [`Packet::parse`] is lenient: the header is unpacked positionally and the
//! remainder is taken as payload. [`Packet::parse_with`] takes
//! [`ParseOptions`] to verify `total_length` and the header checksum. A
//! default (or partially deserialized) `ParseOptions` enables both checks.

use serde::{Deserialize, Serialize};

use crate::{
    NodeAddress, PacketError, PacketHeader, PacketResult, ProtocolType, HEADER_SIZE,
    MAX_PAYLOAD_SIZE,
};

/// Which consistency checks [`Packet::parse_with`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Reject packets whose `total_length` differs from the payload size.
    pub verify_length: bool,
    /// Reject packets whose checksum does not match the header fields.
    pub verify_checksum: bool,
}

impl ParseOptions {
    /// Positional unpacking only, no consistency checks.
    pub const fn lenient() -> Self {
        ParseOptions {
            verify_length: false,
            verify_checksum: false,
        }
    }

    /// Verify both the payload length and the header checksum.
    pub const fn strict() -> Self {
        ParseOptions {
            verify_length: true,
            verify_checksum: true,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::strict()
    }
}

/// A header plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The fixed header.
    pub header: PacketHeader,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a well-formed packet: unfragmented, `total_length` set from the
    /// payload and the checksum computed.
    pub fn new(
        protocol_type: ProtocolType,
        identifier: u16,
        source: NodeAddress,
        destination: NodeAddress,
        payload: Vec<u8>,
    ) -> PacketResult<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut header = PacketHeader {
            fragment_flag: 0,
            fragment_offset: 0,
            total_length: payload.len() as u8,
            identifier,
            protocol_type,
            checksum: 0,
            source,
            destination,
        };
        header.seal();
        Ok(Packet { header, payload })
    }

    /// Build an Ack for `acked_identifier`, addressed to `destination`.
    pub fn ack(
        identifier: u16,
        source: NodeAddress,
        destination: NodeAddress,
        acked_identifier: u16,
    ) -> Self {
        let mut header = PacketHeader {
            fragment_flag: 0,
            fragment_offset: 0,
            total_length: 2,
            identifier,
            protocol_type: ProtocolType::Ack,
            checksum: 0,
            source,
            destination,
        };
        header.seal();
        Packet {
            header,
            payload: acked_identifier.to_be_bytes().to_vec(),
        }
    }

    /// Combine an existing header with a payload without touching any field.
    ///
    /// The caller is responsible for `total_length` and the checksum; use
    /// [`Packet::new`] for well-formed packets.
    pub fn from_parts(header: PacketHeader, payload: Vec<u8>) -> Self {
        Packet { header, payload }
    }

    /// Protocol type of this packet.
    pub fn protocol_type(&self) -> ProtocolType {
        self.header.protocol_type
    }

    /// Sender-assigned identifier.
    pub fn identifier(&self) -> u16 {
        self.header.identifier
    }

    /// Sending node.
    pub fn source(&self) -> NodeAddress {
        self.header.source
    }

    /// Receiving node.
    pub fn destination(&self) -> NodeAddress {
        self.header.destination
    }

    /// The identifier acknowledged by an Ack packet, if the payload carries one.
    pub fn acked_identifier(&self) -> Option<u16> {
        match self.payload.as_slice() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// Whether `total_length` matches the payload size.
    pub fn length_consistent(&self) -> bool {
        self.header.total_length as usize == self.payload.len()
    }

    /// Encode the packet: header followed by the payload verbatim.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a packet without consistency checks.
    pub fn parse(data: &[u8]) -> PacketResult<Self> {
        Self::parse_with(data, ParseOptions::lenient())
    }

    /// Parse a packet, applying the checks selected in `options`.
    pub fn parse_with(data: &[u8], options: ParseOptions) -> PacketResult<Self> {
        let header = PacketHeader::decode(data)?;
        let payload = data[HEADER_SIZE..].to_vec();

        if options.verify_length && header.total_length as usize != payload.len() {
            return Err(PacketError::LengthMismatch {
                declared: header.total_length as usize,
                actual: payload.len(),
            });
        }

        if options.verify_checksum {
            let expected = header.compute_checksum();
            if expected != header.checksum {
                return Err(PacketError::ChecksumMismatch {
                    expected,
                    actual: header.checksum,
                });
            }
        }

        Ok(Packet { header, payload })
    }
}

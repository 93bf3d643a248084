//! Meshlink packet encoding and decoding.
//!
//! This crate provides the wire types exchanged between a host and its attached
//! radio modem, and between nodes of the mesh:
//!
//! - [`Packet`]: an 11-byte fixed header followed by up to 255 payload bytes.
//! - [`DeviceCommand`]: the nested command format understood by the modem itself,
//!   carried inside the payload of a [`ProtocolType::DeviceCommand`] packet.
//!
//! Neither integrity check in this crate is cryptographic. The header checksum is
//! an 8-bit ones' complement sum and the device command trailer is an XOR parity
//! byte; both detect accidental corruption only.
//!
//! # Example
//!
//! ```rust
//! use meshlink_packet::{NodeAddress, Packet, ParseOptions, ProtocolType};
//!
//! let packet = Packet::new(
//!     ProtocolType::Unicast,
//!     7,
//!     NodeAddress::new(0x0001),
//!     NodeAddress::new(0x0002),
//!     b"hola".to_vec(),
//! )
//! .unwrap();
//!
//! let bytes = packet.encode();
//! let decoded = Packet::parse_with(&bytes, ParseOptions::strict()).unwrap();
//! assert_eq!(decoded, packet);
//! ```

mod address;
mod codec;
mod command;
mod constants;
mod error;
mod header;

pub use address::*;
pub use codec::*;
pub use command::*;
pub use constants::*;
pub use error::*;
pub use header::*;

//! Node addressing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 16-bit node address.
///
/// `0xFFFF` is reserved for broadcast. Address `0x0000` carries no special
/// meaning on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(pub u16);

impl NodeAddress {
    /// The broadcast address.
    pub const BROADCAST: NodeAddress = NodeAddress(0xFFFF);

    /// Create an address from its raw value.
    pub const fn new(raw: u16) -> Self {
        NodeAddress(raw)
    }

    /// Get the raw 16-bit value.
    pub const fn raw(&self) -> u16 {
        self.0
    }

    /// Whether this is the broadcast address.
    pub const fn is_broadcast(&self) -> bool {
        self.0 == Self::BROADCAST.0
    }

    /// Big-endian wire representation.
    pub const fn to_be_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Read an address from its big-endian wire representation.
    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        NodeAddress(u16::from_be_bytes(bytes))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for NodeAddress {
    fn from(raw: u16) -> Self {
        NodeAddress(raw)
    }
}

impl From<NodeAddress> for u16 {
    fn from(address: NodeAddress) -> Self {
        address.0
    }
}

/// Addresses are written in hexadecimal, with or without a `0x` prefix.
impl FromStr for NodeAddress {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u16::from_str_radix(digits, 16).map(NodeAddress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_address() {
        assert_eq!("0x0010".parse::<NodeAddress>(), Ok(NodeAddress(0x10)));
        assert_eq!("10".parse::<NodeAddress>(), Ok(NodeAddress(0x10)));
        assert_eq!("FFFF".parse::<NodeAddress>(), Ok(NodeAddress::BROADCAST));
        assert!("xyz".parse::<NodeAddress>().is_err());
        assert!("0x10000".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeAddress(0x2A).to_string(), "0x002A");
        assert!(NodeAddress::BROADCAST.is_broadcast());
        assert!(!NodeAddress(0).is_broadcast());
    }
}

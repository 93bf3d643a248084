//! Error types for meshlink-packet.

use thiserror::Error;

/// Errors that can occur while building or parsing packets and device commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than the fixed header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// The header's `total_length` disagrees with the bytes that follow it.
    #[error("packet length mismatch: header declares {declared} payload bytes, got {actual}")]
    LengthMismatch {
        /// Length declared in the header.
        declared: usize,
        /// Payload bytes actually present.
        actual: usize,
    },

    /// The header checksum does not match the header fields.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed from the header fields.
        expected: u8,
        /// Checksum carried on the wire.
        actual: u8,
    },

    /// Payload does not fit the one-byte length field.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Device command shorter than code + length + integrity.
    #[error("device command too short: expected at least {expected} bytes, got {actual}")]
    CommandTooShort {
        /// Minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Device command declares more data bytes than are present.
    #[error("device command declares {declared} data bytes but only {available} are available")]
    CommandLengthMismatch {
        /// Data length declared in the command.
        declared: usize,
        /// Data bytes present before the integrity byte.
        available: usize,
    },

    /// Device command data exceeds the 6-bit length field.
    #[error("device command data too long: {size} bytes (max {max})")]
    CommandDataTooLong {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Device command integrity byte does not match its contents.
    #[error("device command integrity mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    IntegrityMismatch {
        /// Integrity byte computed from the command fields.
        expected: u8,
        /// Integrity byte carried on the wire.
        actual: u8,
    },
}

/// Result type alias for packet operations.
pub type PacketResult<T> = Result<T, PacketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PacketError::TooShort {
            expected: 11,
            actual: 4,
        };
        assert!(err.to_string().contains("at least 11"));

        let err = PacketError::ChecksumMismatch {
            expected: 0xAB,
            actual: 0x01,
        };
        assert_eq!(err.to_string(), "checksum mismatch: expected 0xAB, got 0x01");
    }
}

//! Framing error types.

use meshlink_packet::PacketError;
use thiserror::Error;

/// Errors raised while removing SLIP framing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The stream ended right after an ESC byte.
    #[error("truncated escape sequence at end of stream")]
    TruncatedEscape,

    /// ESC was followed by something other than ESC_END or ESC_ESC.
    #[error("invalid escape sequence: 0xDB 0x{0:02X}")]
    InvalidEscape(u8),

    /// A frame grew past the codec's size limit without a closing END.
    #[error("frame too long: maximum {max} bytes")]
    TooLong {
        /// Maximum allowed frame size.
        max: usize,
    },
}

/// Errors returned by [`crate::PacketSession`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The frame itself was malformed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The frame was fine but did not hold a valid packet.
    #[error(transparent)]
    Packet(#[from] PacketError),
}

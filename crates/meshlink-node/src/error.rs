//! Error types for the protocol stack.

use meshlink_packet::{NodeAddress, PacketError};
use meshlink_serial::{FrameError, LinkError};
use thiserror::Error;

/// Errors surfaced to the caller of the protocol stack.
///
/// Decode failures on the receive path are logged and counted, never returned;
/// these variants exist for the send path, configuration and the transport.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A frame could not be unescaped.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A packet or device command could not be built or parsed.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// The identifier is already awaiting an Ack.
    #[error("message id {0} is already pending")]
    DuplicateMessageId(u16),

    /// No Hello has been received from the destination.
    #[error("node {0} is not a known neighbor")]
    UnknownNeighbor(NodeAddress),

    /// Every identifier is awaiting an Ack.
    #[error("no free message id: {0} messages pending")]
    IdentifiersExhausted(usize),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<LinkError> for NodeError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Frame(e) => NodeError::Frame(e),
            LinkError::Packet(e) => NodeError::Packet(e),
        }
    }
}

/// Result type alias for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

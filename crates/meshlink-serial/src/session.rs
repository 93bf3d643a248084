//! Packet session over a SLIP-framed byte stream.

use meshlink_packet::{Packet, ParseOptions};

use crate::{slip_encode, FrameCodec, LinkError};

/// Frames outgoing packets and turns incoming bytes back into packets.
///
/// This can be used with any byte stream (serial port, TCP socket, in-memory
/// channel).
#[derive(Debug, Default)]
pub struct PacketSession {
    codec: FrameCodec,
    options: ParseOptions,
}

impl PacketSession {
    /// Create a session that parses with the given checks.
    pub fn new(options: ParseOptions) -> Self {
        PacketSession {
            codec: FrameCodec::new(),
            options,
        }
    }

    /// The parse checks in effect.
    pub fn options(&self) -> ParseOptions {
        self.options
    }

    /// Encode and frame a packet for transmission.
    pub fn encode_packet(&self, packet: &Packet) -> Vec<u8> {
        slip_encode(&packet.encode())
    }

    /// Feed received data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.codec.push(data);
    }

    /// Try to decode the next packet.
    ///
    /// Returns `Ok(Some(packet))` if a complete packet was decoded, `Ok(None)`
    /// if more data is needed, or `Err` if a frame was discarded. Errors do
    /// not poison the session: keep calling until `Ok(None)`.
    pub fn try_decode(&mut self) -> Result<Option<Packet>, LinkError> {
        match self.codec.decode()? {
            Some(frame) => {
                let packet = Packet::parse_with(&frame, self.options).map_err(|e| {
                    log::debug!("frame {} is not a valid packet: {}", hex::encode(&frame), e);
                    e
                })?;
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }

    /// Reset the session state.
    pub fn reset(&mut self) {
        self.codec.clear();
    }
}

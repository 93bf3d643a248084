//! SLIP frame encoding/decoding.
//!
//! ```text
//! +-----+------------------------------------+-----+
//! | END | payload, END/ESC bytes escaped     | END |
//! +-----+------------------------------------+-----+
//! ```
//!
//! An empty frame (two adjacent END bytes) carries nothing and is skipped, so a
//! decoded frame is never empty.

use bytes::{Buf, BytesMut};
use meshlink_packet::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

use crate::FrameError;

/// Frame delimiter.
pub const SLIP_END: u8 = 0xC0;
/// Escape marker.
pub const SLIP_ESC: u8 = 0xDB;
/// Substitute for an escaped END.
pub const SLIP_ESC_END: u8 = 0xDC;
/// Substitute for an escaped ESC.
pub const SLIP_ESC_ESC: u8 = 0xDD;

/// Largest unescaped frame a [`FrameCodec`] accepts by default: one packet
/// with a full payload.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Wrap `payload` in a SLIP frame.
pub fn slip_encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2 + payload.len() / 16);
    out.push(SLIP_END);
    for &b in payload {
        match b {
            SLIP_END => out.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]),
            SLIP_ESC => out.extend_from_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
            _ => out.push(b),
        }
    }
    out.push(SLIP_END);
    out
}

/// Decode the first frame found in `stream`.
///
/// Bytes before the first END are ignored. The frame ends at the next END that
/// follows at least one payload byte; if the stream runs out first, whatever
/// was accumulated is returned. `Ok(None)` means no non-empty frame was found.
pub fn slip_decode(stream: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
    let mut out = Vec::with_capacity(stream.len());
    let mut inside = false;
    let mut bytes = stream.iter().copied();

    while let Some(b) = bytes.next() {
        if b == SLIP_END {
            if inside && !out.is_empty() {
                return Ok(Some(out));
            }
            inside = true;
            continue;
        }

        if !inside {
            continue;
        }

        if b == SLIP_ESC {
            match bytes.next() {
                Some(SLIP_ESC_END) => out.push(SLIP_END),
                Some(SLIP_ESC_ESC) => out.push(SLIP_ESC),
                Some(other) => return Err(FrameError::InvalidEscape(other)),
                None => return Err(FrameError::TruncatedEscape),
            }
        } else {
            out.push(b);
        }
    }

    Ok(if out.is_empty() { None } else { Some(out) })
}

/// Incremental SLIP decoder.
///
/// Bytes are pushed as they arrive from the transport and complete frames are
/// pulled out with [`FrameCodec::decode`]. A frame split across reads, or
/// several frames in one read, are both handled. An END closing one frame also
/// opens the next.
///
/// After a malformed escape the partial frame is discarded and decoding picks
/// up again at the next END, so one corrupted byte costs at most one frame.
#[derive(Debug)]
pub struct FrameCodec {
    /// Raw bytes not yet examined.
    buffer: BytesMut,
    /// Unescaped bytes of the frame being assembled.
    frame: Vec<u8>,
    /// An END has been seen and bytes belong to a frame.
    in_frame: bool,
    /// The previous byte was ESC.
    escaped: bool,
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a codec with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec that rejects frames longer than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(max_frame_size * 2),
            frame: Vec::with_capacity(max_frame_size),
            in_frame: false,
            escaped: false,
            max_frame_size,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` when a frame is complete and `Ok(None)` when
    /// more data is needed. An `Err` reports a discarded frame; the codec has
    /// already resynchronized and the next call continues with the remaining
    /// bytes.
    pub fn decode(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        while self.buffer.has_remaining() {
            let b = self.buffer.get_u8();

            if !self.in_frame {
                if b == SLIP_END {
                    self.in_frame = true;
                }
                continue;
            }

            if self.escaped {
                self.escaped = false;
                match b {
                    SLIP_ESC_END => self.frame.push(SLIP_END),
                    SLIP_ESC_ESC => self.frame.push(SLIP_ESC),
                    other => {
                        log::debug!(
                            "discarding {} byte partial frame after invalid escape 0x{:02X}",
                            self.frame.len(),
                            other
                        );
                        self.frame.clear();
                        // A stray END after ESC still marks a frame boundary
                        self.in_frame = other == SLIP_END;
                        return Err(FrameError::InvalidEscape(other));
                    }
                }
            } else {
                match b {
                    SLIP_END => {
                        if !self.frame.is_empty() {
                            return Ok(Some(std::mem::take(&mut self.frame)));
                        }
                    }
                    SLIP_ESC => self.escaped = true,
                    _ => self.frame.push(b),
                }
            }

            if self.frame.len() > self.max_frame_size {
                log::debug!(
                    "discarding oversized frame: {}...",
                    hex::encode(&self.frame[..16.min(self.frame.len())])
                );
                self.frame.clear();
                self.in_frame = false;
                self.escaped = false;
                return Err(FrameError::TooLong {
                    max: self.max_frame_size,
                });
            }
        }

        Ok(None)
    }

    /// Get the number of raw bytes not yet examined.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a frame is partially assembled.
    pub fn has_partial_frame(&self) -> bool {
        !self.frame.is_empty() || self.escaped
    }

    /// Drop all buffered and partially decoded data.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frame.clear();
        self.in_frame = false;
        self.escaped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut FrameCodec) -> Vec<Result<Vec<u8>, FrameError>> {
        let mut out = Vec::new();
        loop {
            match codec.decode() {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    #[test]
    fn test_escaping() {
        let frame = slip_encode(&[0xC0, 0xDB, 0x01]);
        assert_eq!(frame, vec![0xC0, 0xDB, 0xDC, 0xDB, 0xDD, 0x01, 0xC0]);
    }

    #[test]
    fn test_plain_bytes_pass_through() {
        let payload: Vec<u8> = (0..=255u8).filter(|b| *b != SLIP_END && *b != SLIP_ESC).collect();
        let frame = slip_encode(&payload);
        assert_eq!(frame.len(), payload.len() + 2);
        assert_eq!(&frame[1..frame.len() - 1], payload.as_slice());
    }

    #[test]
    fn test_roundtrip() {
        let samples: Vec<Vec<u8>> = vec![
            vec![0x00],
            vec![SLIP_END],
            vec![SLIP_ESC],
            vec![SLIP_ESC, SLIP_ESC_END],
            vec![SLIP_END, SLIP_END, SLIP_ESC, SLIP_ESC],
            (0..=255u8).collect(),
            b"hola".to_vec(),
        ];
        for payload in samples {
            let frame = slip_encode(&payload);
            assert_eq!(slip_decode(&frame), Ok(Some(payload.clone())));

            let mut codec = FrameCodec::new();
            codec.push(&frame);
            assert_eq!(codec.decode(), Ok(Some(payload)));
            assert_eq!(codec.decode(), Ok(None));
        }
    }

    #[test]
    fn test_roundtrip_every_length() {
        const SPECIAL: [u8; 5] = [SLIP_END, SLIP_ESC, SLIP_ESC_END, SLIP_ESC_ESC, 0x00];
        let patterns: [fn(usize) -> u8; 4] = [
            |_| SLIP_END,
            |_| SLIP_ESC,
            |i| SPECIAL[i % SPECIAL.len()],
            |i| (i * 37 + 11) as u8,
        ];

        let mut stream = FrameCodec::with_max_frame_size(300);
        let mut sent = Vec::new();
        for len in 0..=300usize {
            for pattern in patterns {
                let payload: Vec<u8> = (0..len).map(pattern).collect();
                let frame = slip_encode(&payload);
                assert!(frame[1..frame.len() - 1].iter().all(|&b| b != SLIP_END));

                let expected = if payload.is_empty() { None } else { Some(payload.clone()) };
                assert_eq!(slip_decode(&frame), Ok(expected), "length {}", len);

                stream.push(&frame);
                if !payload.is_empty() {
                    sent.push(payload);
                }
            }
        }

        let mut received = Vec::new();
        while let Some(frame) = stream.decode().expect("valid stream") {
            received.push(frame);
        }
        assert_eq!(received, sent);
    }

    #[test]
    fn test_empty_payload_is_not_a_frame() {
        let frame = slip_encode(&[]);
        assert_eq!(frame, vec![SLIP_END, SLIP_END]);
        assert_eq!(slip_decode(&frame), Ok(None));

        let mut codec = FrameCodec::new();
        codec.push(&frame);
        assert_eq!(codec.decode(), Ok(None));
    }

    #[test]
    fn test_decode_skips_leading_garbage() {
        let mut stream = vec![0x01, 0x02, 0x03];
        stream.extend(slip_encode(b"abc"));
        assert_eq!(slip_decode(&stream), Ok(Some(b"abc".to_vec())));
    }

    #[test]
    fn test_decode_escape_errors() {
        assert_eq!(
            slip_decode(&[SLIP_END, 0x01, SLIP_ESC]),
            Err(FrameError::TruncatedEscape)
        );
        assert_eq!(
            slip_decode(&[SLIP_END, 0x01, SLIP_ESC, 0x42, SLIP_END]),
            Err(FrameError::InvalidEscape(0x42))
        );
    }

    #[test]
    fn test_decode_returns_first_frame() {
        let mut stream = slip_encode(b"one");
        stream.extend(slip_encode(b"two"));
        assert_eq!(slip_decode(&stream), Ok(Some(b"one".to_vec())));
    }

    #[test]
    fn test_codec_partial() {
        let mut codec = FrameCodec::new();
        let frame = slip_encode(&[0x10, SLIP_END, 0x20]);

        // Split inside the escape sequence
        codec.push(&frame[..3]);
        assert_eq!(codec.decode(), Ok(None));
        assert!(codec.has_partial_frame());

        codec.push(&frame[3..]);
        assert_eq!(codec.decode(), Ok(Some(vec![0x10, SLIP_END, 0x20])));
    }

    #[test]
    fn test_codec_multiple() {
        let mut codec = FrameCodec::new();
        codec.push(&slip_encode(b"First"));
        codec.push(&slip_encode(b"Second"));

        assert_eq!(codec.decode(), Ok(Some(b"First".to_vec())));
        assert_eq!(codec.decode(), Ok(Some(b"Second".to_vec())));
        assert_eq!(codec.decode(), Ok(None));
    }

    #[test]
    fn test_codec_shared_delimiter() {
        // END a END b END: the middle END closes one frame and opens the next
        let mut codec = FrameCodec::new();
        codec.push(&[SLIP_END, b'a', SLIP_END, b'b', SLIP_END]);
        assert_eq!(codec.decode(), Ok(Some(vec![b'a'])));
        assert_eq!(codec.decode(), Ok(Some(vec![b'b'])));
    }

    #[test]
    fn test_codec_recovers_after_corruption() {
        let mut codec = FrameCodec::new();
        codec.push(&[SLIP_END, 0x01, SLIP_ESC, 0x42, 0x02, SLIP_END]);
        codec.push(&slip_encode(b"good"));

        let results = decode_all(&mut codec);
        assert_eq!(
            results,
            vec![Err(FrameError::InvalidEscape(0x42)), Ok(b"good".to_vec())]
        );
    }

    #[test]
    fn test_codec_escape_followed_by_end() {
        // ESC END: the END is still honored as the start of the next frame
        let mut codec = FrameCodec::new();
        codec.push(&[SLIP_END, 0x01, SLIP_ESC, SLIP_END, b'o', b'k', SLIP_END]);

        let results = decode_all(&mut codec);
        assert_eq!(
            results,
            vec![Err(FrameError::InvalidEscape(SLIP_END)), Ok(b"ok".to_vec())]
        );
    }

    #[test]
    fn test_codec_too_long() {
        let mut codec = FrameCodec::with_max_frame_size(4);
        codec.push(&[SLIP_END, 1, 2, 3, 4, 5, 6, SLIP_END]);
        codec.push(&slip_encode(&[9]));

        let results = decode_all(&mut codec);
        assert_eq!(
            results,
            vec![Err(FrameError::TooLong { max: 4 }), Ok(vec![9])]
        );
    }

    #[test]
    fn test_codec_clear() {
        let mut codec = FrameCodec::new();
        codec.push(&[SLIP_END, 1, 2]);
        assert_eq!(codec.decode(), Ok(None));
        codec.clear();
        assert_eq!(codec.buffered_len(), 0);
        assert!(!codec.has_partial_frame());
    }
}

//! Meshlink serial framing
//!
//! The host and its radio modem exchange packets over a byte stream with no
//! message boundaries of its own. Every packet is wrapped in a SLIP frame:
//!
//! - `0xC0` (END) delimits frames,
//! - `0xDB` (ESC) introduces an escape: `ESC 0xDC` stands for a literal END and
//!   `ESC 0xDD` for a literal ESC,
//! - every other byte passes through unchanged.
//!
//! [`FrameCodec`] reassembles frames from arbitrarily split reads, and
//! [`PacketSession`] layers packet parsing on top of it.
//!
//! # Example
//!
//! ```rust
//! use meshlink_serial::{slip_decode, slip_encode};
//!
//! let frame = slip_encode(&[0xC0, 0xDB, 0x01]);
//! assert_eq!(frame, vec![0xC0, 0xDB, 0xDC, 0xDB, 0xDD, 0x01, 0xC0]);
//! assert_eq!(slip_decode(&frame).unwrap(), Some(vec![0xC0, 0xDB, 0x01]));
//! ```

mod error;
mod session;
mod slip;

pub use error::*;
pub use session::*;
pub use slip::*;

//! Meshlink node protocol stack.
//!
//! This crate turns the wire formats of `meshlink-packet` and the framing of
//! `meshlink-serial` into a working node:
//!
//! - [`ReliabilityManager`]: pending Acks, retransmission and delivery failure.
//! - [`NeighborTable`]: when each peer last announced itself with a Hello.
//! - [`Dispatcher`]: what a received packet means for this node.
//! - [`ProtocolStack`]: the caller-facing API tying them to a [`Transport`]
//!   and a [`Clock`].
//!
//! The stack never spawns threads or sleeps. The caller runs the control loop:
//!
//! ```rust
//! use meshlink_node::{ChannelTransport, ManualClock, NodeConfig, ProtocolStack};
//! use meshlink_packet::NodeAddress;
//!
//! let (a_link, b_link) = ChannelTransport::pair();
//! let clock = ManualClock::new();
//! let mut a = ProtocolStack::new(NodeConfig::with_address(NodeAddress(1)), a_link, clock.clone())
//!     .unwrap();
//! let mut b = ProtocolStack::new(NodeConfig::with_address(NodeAddress(2)), b_link, clock)
//!     .unwrap();
//!
//! b.send_hello().unwrap();
//! a.poll();
//! let id = a.send_unicast(NodeAddress(2), b"hola").unwrap();
//! b.poll();
//! let events = a.poll();
//! assert!(events.iter().any(|e| e.is_delivery_outcome() && e.message_id() == Some(id)));
//! ```

mod config;
mod dispatcher;
mod error;
mod events;
mod neighbors;
mod reliability;
mod stack;
mod time;
mod transport;

pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use events::*;
pub use neighbors::*;
pub use reliability::*;
pub use stack::*;
pub use time::*;
pub use transport::*;

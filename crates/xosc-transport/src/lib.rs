//! xosc Transport Layer
//!
//! The byte moving side of OSC. Packets are opaque [`bytes::Bytes`] here,
//! encoding and routing live in `xosc-core` and `xosc-router`.
//!
//! - [`TransportSender`] sends whole packets to one remote peer
//! - [`TransportReceiver`] yields received packets
//! - UDP is the only transport shipped (feature `udp`, on by default)

pub mod error;
pub mod traits;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "udp")]
pub use udp::{UdpConfig, UdpReceiver, UdpSender, UdpTransport};

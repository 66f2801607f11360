//! xosc Core
//!
//! Wire format and value types for Open Sound Control.
//!
//! This crate provides:
//! - The byte codec for OSC primitives ([`OscReader`], [`OscWriter`])
//! - Typed converters and the converter registry ([`Converter`], [`ConverterRegistry`])
//! - Message, bundle and peer types ([`Message`], [`Bundle`], [`Peer`])
//! - Address validation and matching ([`AddressMatcher`])
//! - Copy-on-write collections for routing tables ([`CopyOnWriteMap`], [`CopyOnWriteList`])
//! - NTP time tags ([`TimeTag`])

pub mod address;
pub mod codec;
pub mod collections;
pub mod convert;
pub mod error;
pub mod time;
pub mod types;

pub use address::{validate_address, AddressMatcher};
pub use codec::{decode_bundle_header, OscReader, OscWriter};
pub use collections::{CopyOnWriteList, CopyOnWriteMap};
pub use convert::{decode_message, encode_message, Converter, ConverterRegistry, OscArg};
pub use error::{Error, Result};
pub use time::TimeTag;
pub use types::*;

/// Transport name used in [`Peer`]s of UDP packets
pub const UDP_TRANSPORT: &str = "udp";

/// Largest payload of a single UDP datagram
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

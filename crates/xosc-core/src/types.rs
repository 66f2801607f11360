//! Peers, messages and bundles

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{TimeTag, UDP_TRANSPORT};

/// One side of an OSC conversation.
///
/// Peers are not part of the OSC protocol, they give received messages the
/// context of who sent them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub hostname: String,
    pub port: u16,
    /// Transport the packet travelled on, e.g. `udp`
    pub transport: String,
}

impl Peer {
    pub fn new(hostname: impl Into<String>, port: u16, transport: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            transport: transport.into(),
        }
    }

    pub fn udp(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port(), UDP_TRANSPORT)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.transport, self.hostname, self.port)
    }
}

/// Values that can travel through routes and subscriptions
pub trait OscValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> OscValue for T {}

/// Type-erased message value, downcast with [`Message::value_as`]
pub trait AnyValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> AnyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to a type-erased value
pub type DynValue = Arc<dyn AnyValue>;

/// A decoded OSC message bound to the peer that sent it
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub peer: Peer,
    pub address: String,
    pub value: T,
}

impl<T> Message<T> {
    pub fn new(peer: Peer, address: impl Into<String>, value: T) -> Self {
        Self {
            peer,
            address: address.into(),
            value,
        }
    }
}

impl<T: OscValue> Message<T> {
    /// Erase the value type, for the shared message stream
    pub fn to_dyn(&self) -> Message<DynValue> {
        Message {
            peer: self.peer.clone(),
            address: self.address.clone(),
            value: Arc::new(self.value.clone()),
        }
    }
}

impl Message<DynValue> {
    /// Borrow the value if it has type `T`
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        (*self.value).as_any().downcast_ref::<T>()
    }
}

/// A time tagged container of packets
#[derive(Debug, Clone)]
pub struct Bundle {
    pub peer: Peer,
    pub time_tag: TimeTag,
    pub packets: Vec<Packet>,
}

/// Either a message or a bundle
#[derive(Debug, Clone)]
pub enum Packet {
    Message(Message<DynValue>),
    Bundle(Bundle),
}

impl Packet {
    pub fn peer(&self) -> &Peer {
        match self {
            Packet::Message(m) => &m.peer,
            Packet::Bundle(b) => &b.peer,
        }
    }
}

//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use xosc_core::Peer;

use crate::error::Result;

/// Events that can occur on a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One complete packet
    Data(Bytes),
    /// Receiving failed, the transport keeps going
    Error(String),
    /// The transport stopped, no more events follow
    Closed { reason: Option<String> },
}

/// Sends whole packets to a single remote peer
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one packet
    async fn send(&self, data: Bytes) -> Result<()>;

    /// The peer packets are sent to
    fn remote(&self) -> Peer;

    /// Check if the sender still accepts packets
    fn is_connected(&self) -> bool;

    /// Close the sender, later sends fail with `NotConnected`
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event along with the peer it came from
    async fn recv(&mut self) -> Option<(TransportEvent, Peer)>;
}

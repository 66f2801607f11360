//! UDP transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};
use xosc_core::{Peer, MAX_DATAGRAM_SIZE};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// UDP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Datagrams queued between the socket task and the consumer
    pub recv_buffer_size: usize,
    /// Maximum packet size, in both directions
    pub max_packet_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 1024,
            max_packet_size: MAX_DATAGRAM_SIZE,
        }
    }
}

/// UDP transport (connectionless)
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default()).await
    }

    /// Bind with config
    pub async fn bind_with_config(addr: &str, config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if let Ok(local) = socket.local_addr() {
            info!("UDP bound to {}", local);
        }

        let (closed, _) = watch::channel(false);
        Ok(Self {
            socket: Arc::new(socket),
            config,
            closed,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// The local end as a peer
    pub fn local_peer(&self) -> Result<Peer> {
        self.local_addr().map(Peer::udp)
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Create a sender for a specific remote address
    pub fn sender_to(&self, remote: SocketAddr) -> UdpSender {
        UdpSender {
            socket: self.socket.clone(),
            remote,
            max_packet_size: self.config.max_packet_size,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Start receiving packets.
    ///
    /// The socket task stops when the returned receiver is dropped, or after
    /// a closing event once the transport is closed or dropped.
    pub fn start_receiver(&self) -> UdpReceiver {
        let (tx, rx) = mpsc::channel(self.config.recv_buffer_size.max(1));
        let socket = self.socket.clone();
        let max_size = self.config.max_packet_size;
        let mut closed = self.closed.subscribe();

        let task = tokio::spawn(async move {
            // one spare byte to detect datagrams over the limit
            let mut buf = vec![0u8; max_size + 1];

            loop {
                let received = tokio::select! {
                    _ = closed.wait_for(|closed| *closed) => None,
                    received = socket.recv_from(&mut buf) => Some(received),
                };
                let Some(received) = received else {
                    let local = socket
                        .local_addr()
                        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
                    let closing = TransportEvent::Closed {
                        reason: Some("transport closed".to_string()),
                    };
                    let _ = tx.send((closing, local)).await;
                    debug!("UDP socket task on {} closed", local);
                    break;
                };
                let event = match received {
                    Ok((len, from)) if len > max_size => {
                        error!("UDP dropped oversized datagram from {}", from);
                        (
                            TransportEvent::Error(format!(
                                "datagram larger than {} bytes",
                                max_size
                            )),
                            from,
                        )
                    }
                    Ok((len, from)) => {
                        trace!("UDP received {} bytes from {}", len, from);
                        let data = Bytes::copy_from_slice(&buf[..len]);
                        (TransportEvent::Data(data), from)
                    }
                    Err(e) => {
                        error!("UDP receive error: {}", e);
                        (
                            TransportEvent::Error(e.to_string()),
                            SocketAddr::from(([0, 0, 0, 0], 0)),
                        )
                    }
                };
                if tx.send(event).await.is_err() {
                    debug!("UDP receiver dropped, stopping socket task");
                    break;
                }
            }
        });

        UdpReceiver { rx, task }
    }

    /// Send to a specific address
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        check_size(data.len(), self.config.max_packet_size)?;
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Stop every receiver of this transport.
    ///
    /// Each receiver yields a final [`TransportEvent::Closed`], then ends.
    /// Receivers started afterwards close right away.
    pub fn close(&self) {
        self.closed.send_replace(true);
        info!("UDP transport closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Enable broadcast
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        self.socket.set_broadcast(enable).map_err(TransportError::Io)
    }
}

fn check_size(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(TransportError::PacketTooLarge { size, max });
    }
    Ok(())
}

/// UDP sender (to a specific remote)
#[derive(Clone)]
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    max_packet_size: usize,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }
        check_size(data.len(), self.max_packet_size)?;
        self.socket
            .send_to(&data, self.remote)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        trace!("UDP sent {} bytes to {}", data.len(), self.remote);
        Ok(())
    }

    fn remote(&self) -> Peer {
        Peer::udp(self.remote)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// UDP receiver
pub struct UdpReceiver {
    rx: mpsc::Receiver<(TransportEvent, SocketAddr)>,
    task: JoinHandle<()>,
}

impl UdpReceiver {
    /// Receive the next event with source address
    pub async fn recv_from(&mut self) -> Option<(TransportEvent, SocketAddr)> {
        self.rx.recv().await
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl TransportReceiver for UdpReceiver {
    async fn recv(&mut self) -> Option<(TransportEvent, Peer)> {
        self.rx
            .recv()
            .await
            .map(|(event, from)| (event, Peer::udp(from)))
    }
}

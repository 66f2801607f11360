//! Output pipeline
//!
//! [`OscOutput`] encodes typed values for one destination peer and hands the
//! packets to a [`TransportSender`]. Packets go through a single queue drained
//! by one task, so they leave in the order they were sent, whichever entry
//! point was used.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};
use xosc_core::{encode_message, AddressMatcher, Converter, ConverterRegistry, Message, OscValue, Peer};
use xosc_transport::TransportSender;

use crate::error::{Result, RouterError};
use crate::input::{Action, RouteOptions};
use crate::router::{Route, RouteInfo, Router};

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Packets waiting for the transport before `send` reports a full queue
    pub queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// A typed output route
pub struct OutputRoute<T> {
    address: String,
    matcher: Option<AddressMatcher>,
    converter: Converter<T>,
    action: Option<Arc<Action<T>>>,
}

impl<T> fmt::Debug for OutputRoute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRoute")
            .field("address", &self.address)
            .field("matcher", &self.matcher)
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: OscValue> Route for OutputRoute<T> {
    fn address(&self) -> &str {
        &self.address
    }

    fn matcher(&self) -> Option<&AddressMatcher> {
        self.matcher.as_ref()
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn type_tag(&self) -> Option<&str> {
        self.converter.type_tag()
    }
}

/// Type erased side of [`OutputRoute`], what the router stores
pub trait OutputEncode: Route {
    fn as_any(&self) -> &dyn Any;
}

impl<T: OscValue> OutputEncode for OutputRoute<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Outgoing {
    bytes: Bytes,
    reply: Option<oneshot::Sender<xosc_transport::Result<()>>>,
}

/// Sending side of an OSC conversation
pub struct OscOutput {
    peer: Peer,
    registry: ConverterRegistry,
    router: Router<dyn OutputEncode>,
    sender: Arc<dyn TransportSender>,
    queue: Mutex<Option<mpsc::Sender<Outgoing>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl OscOutput {
    /// Create an output sending through `sender`.
    ///
    /// Must be called within a tokio runtime, the send queue is drained by a
    /// spawned task.
    pub fn new(sender: Arc<dyn TransportSender>, config: OutputConfig) -> Self {
        Self::with_registry(sender, config, ConverterRegistry::new())
    }

    pub fn with_registry(
        sender: Arc<dyn TransportSender>,
        config: OutputConfig,
        registry: ConverterRegistry,
    ) -> Self {
        let peer = sender.remote();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let pump = tokio::spawn(pump(sender.clone(), peer.clone(), rx));
        Self {
            peer,
            registry,
            router: Router::new(),
            sender,
            queue: Mutex::new(Some(tx)),
            pump: Mutex::new(Some(pump)),
        }
    }

    /// The destination of every packet
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Route one exact address to values of type `T`
    pub fn route<T: OscValue>(&self, address: &str) -> Result<()> {
        self.route_with(RouteOptions::<T>::new(address))
    }

    /// Add a route, replacing the route with the same address.
    ///
    /// The action sees every message right before it is queued. A failing
    /// action stops the send with [`RouterError::Action`].
    pub fn route_with<T: OscValue>(&self, options: RouteOptions<T>) -> Result<()> {
        let converter = match options.converter {
            Some(converter) => converter,
            None => self.registry.resolve::<T>()?,
        };
        let route: Arc<dyn OutputEncode> = Arc::new(OutputRoute {
            address: options.address,
            matcher: options.matcher,
            converter,
            action: options.action,
        });
        self.router.add_route(route)?;
        Ok(())
    }

    pub fn unroute(&self, addresses: &[&str]) -> Result<()> {
        self.router.unroute(addresses)
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.router.route_infos()
    }

    /// Serialize a message through the route of `address`
    pub fn encode<T: OscValue>(&self, address: &str, value: &T) -> Result<Bytes> {
        let route = self
            .router
            .resolve(address)
            .ok_or_else(|| RouterError::NoRoute(address.to_string()))?;
        let typed = route
            .as_any()
            .downcast_ref::<OutputRoute<T>>()
            .ok_or_else(|| RouterError::ValueType {
                address: address.to_string(),
                expected: route.type_name(),
                actual: type_name::<T>(),
            })?;

        let bytes = encode_message(address, value, &typed.converter)?;
        if let Some(action) = &typed.action {
            action(&Message::new(self.peer.clone(), address, value.clone())).map_err(|source| {
                RouterError::Action {
                    address: address.to_string(),
                    source,
                }
            })?;
        }
        Ok(bytes)
    }

    fn queue(&self) -> Result<mpsc::Sender<Outgoing>> {
        self.queue.lock().clone().ok_or(RouterError::Closed)
    }

    /// Queue a message and return without waiting for the transport.
    ///
    /// Routing and encoding errors are returned, transport errors are only
    /// logged.
    pub fn send<T: OscValue>(&self, address: &str, value: T) -> Result<()> {
        let bytes = self.encode(address, &value)?;
        trace!("Queueing {} ({} bytes) for {}", address, bytes.len(), self.peer);
        self.queue()?
            .try_send(Outgoing { bytes, reply: None })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RouterError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => RouterError::Closed,
            })
    }

    /// Send a message and wait until the transport took it
    pub async fn send_async<T: OscValue>(&self, address: &str, value: T) -> Result<()> {
        let bytes = self.encode(address, &value)?;
        let (reply, done) = oneshot::channel();
        self.queue()?
            .send(Outgoing {
                bytes,
                reply: Some(reply),
            })
            .await
            .map_err(|_| RouterError::Closed)?;
        done.await.map_err(|_| RouterError::Closed)??;
        Ok(())
    }

    /// Drop every route, flush queued packets and close the transport sender
    pub async fn close(&self) -> Result<()> {
        self.router.clear();
        self.queue.lock().take();
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                error!("Send task for {} failed: {}", self.peer, e);
            }
        }
        self.sender.close().await?;
        debug!("Output to {} closed", self.peer);
        Ok(())
    }
}

impl Drop for OscOutput {
    fn drop(&mut self) {
        // dropping the queue lets the task drain what is left, then exit
        self.queue.get_mut().take();
    }
}

async fn pump(sender: Arc<dyn TransportSender>, peer: Peer, mut rx: mpsc::Receiver<Outgoing>) {
    while let Some(outgoing) = rx.recv().await {
        let result = sender.send(outgoing.bytes).await;
        match outgoing.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    error!("Failed to send to {}: {}", peer, e);
                }
            }
        }
    }
}

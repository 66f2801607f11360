//! Input pipeline
//!
//! [`OscInput`] turns received packets into typed messages:
//!
//! ```text
//! bytes -> address -> route -> type tag -> value -> action -> subscribers
//! ```
//!
//! Every decoded message is published twice: on the route's own typed
//! stream ([`InputRoute::subscribe`]) and, type erased, on the input's shared
//! stream ([`OscInput::subscribe`]). Both are broadcast channels, so the
//! receive loop never waits for subscribers and late subscribers only see
//! messages published after they subscribed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, trace};
use xosc_core::codec::BUNDLE_TAG;
use xosc_core::{
    AddressMatcher, Converter, ConverterRegistry, DynValue, Message, OscReader, OscValue, Peer,
};

use crate::error::{ActionError, Result, RouterError};
use crate::router::{Route, RouteInfo, Router};

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Messages buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

pub(crate) type Action<T> =
    dyn Fn(&Message<T>) -> std::result::Result<(), ActionError> + Send + Sync;

/// How to register a route
pub struct RouteOptions<T> {
    pub address: String,
    /// Accept every address this matcher accepts instead of `address` only
    pub matcher: Option<AddressMatcher>,
    /// Converter to use instead of the registry's one for `T`
    pub converter: Option<Converter<T>>,
    /// Called with every message the route handles. A failing action drops
    /// the message.
    pub action: Option<Arc<Action<T>>>,
}

impl<T> RouteOptions<T> {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            matcher: None,
            converter: None,
            action: None,
        }
    }

    pub fn matcher(mut self, matcher: AddressMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn converter(mut self, converter: Converter<T>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Message<T>) -> std::result::Result<(), ActionError> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }
}

/// A typed input route
pub struct InputRoute<T> {
    address: String,
    matcher: Option<AddressMatcher>,
    converter: Converter<T>,
    action: Option<Arc<Action<T>>>,
    tx: broadcast::Sender<Message<T>>,
    last: RwLock<Option<Message<T>>>,
}

impl<T: OscValue> InputRoute<T> {
    /// Stream of the messages decoded by this route
    pub fn subscribe(&self) -> broadcast::Receiver<Message<T>> {
        self.tx.subscribe()
    }

    /// The most recently decoded value
    pub fn last_value(&self) -> Option<T> {
        self.last.read().as_ref().map(|m| m.value.clone())
    }

    /// The most recently decoded message
    pub fn last_message(&self) -> Option<Message<T>> {
        self.last.read().clone()
    }

    pub fn converter(&self) -> &Converter<T> {
        &self.converter
    }
}

impl<T> fmt::Debug for InputRoute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRoute")
            .field("address", &self.address)
            .field("matcher", &self.matcher)
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: OscValue> Route for InputRoute<T> {
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

/// Type erased side of [`InputRoute`], what the router stores
pub trait InputDispatch: Route {
    /// Decode the arguments, run the action and publish on the route stream.
    ///
    /// When the action fails the message is neither stored nor published.
    fn dispatch(
        &self,
        peer: &Peer,
        address: String,
        reader: &mut OscReader<'_>,
    ) -> Result<Message<DynValue>>;
}

impl<T: OscValue> InputDispatch for InputRoute<T> {
    fn dispatch(
        &self,
        peer: &Peer,
        address: String,
        reader: &mut OscReader<'_>,
    ) -> Result<Message<DynValue>> {
        let value = self.converter.decode(reader)?;
        let message = Message::new(peer.clone(), address, value);

        if let Some(action) = &self.action {
            action(&message).map_err(|source| RouterError::Action {
                address: message.address.clone(),
                source,
            })?;
        }

        let erased = message.to_dyn();
        *self.last.write() = Some(message.clone());
        // no subscribers is fine
        let _ = self.tx.send(message);
        Ok(erased)
    }
}

/// Receiving side of an OSC conversation
pub struct OscInput {
    config: InputConfig,
    registry: ConverterRegistry,
    router: Router<dyn InputDispatch>,
    messages: broadcast::Sender<Message<DynValue>>,
    closed: AtomicBool,
}

impl OscInput {
    pub fn new(config: InputConfig) -> Self {
        Self::with_registry(config, ConverterRegistry::new())
    }

    pub fn with_registry(config: InputConfig, registry: ConverterRegistry) -> Self {
        let (messages, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            config,
            registry,
            router: Router::new(),
            messages,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Converters used by routes that do not bring their own
    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Route one exact address to values of type `T`
    pub fn route<T: OscValue>(&self, address: &str) -> Result<Arc<InputRoute<T>>> {
        self.route_with(RouteOptions::new(address))
    }

    /// Add a route, replacing the route with the same address
    pub fn route_with<T: OscValue>(&self, options: RouteOptions<T>) -> Result<Arc<InputRoute<T>>> {
        if self.is_closed() {
            return Err(RouterError::Closed);
        }
        let converter = match options.converter {
            Some(converter) => converter,
            None => self.registry.resolve::<T>()?,
        };
        let (tx, _) = broadcast::channel(self.config.channel_capacity.max(1));
        let route = Arc::new(InputRoute {
            address: options.address,
            matcher: options.matcher,
            converter,
            action: options.action,
            tx,
            last: RwLock::new(None),
        });
        self.router.add_route(route.clone())?;
        Ok(route)
    }

    /// Remove routes, failing on an address that was never routed
    pub fn unroute(&self, addresses: &[&str]) -> Result<()> {
        self.router.unroute(addresses)
    }

    /// Every registered route, in lookup order
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.router.route_infos()
    }

    /// Stream of every decoded message, whatever its route
    pub fn subscribe(&self) -> broadcast::Receiver<Message<DynValue>> {
        self.messages.subscribe()
    }

    /// Handle one received packet, logging any failure.
    ///
    /// A malformed packet never fails the caller, so receive loops can call
    /// this for every datagram.
    pub fn handle(&self, peer: &Peer, bytes: &[u8]) {
        match self.try_handle(peer, bytes) {
            Ok(_) => {}
            Err(RouterError::Closed) => {
                debug!("Input closed, dropping packet from {}", peer);
            }
            Err(e) => {
                error!("Failed to handle packet from {}: {}", peer, e);
            }
        }
    }

    /// Handle one received packet.
    ///
    /// Returns the published message, or `None` when no route matched.
    pub fn try_handle(&self, peer: &Peer, bytes: &[u8]) -> Result<Option<Message<DynValue>>> {
        if self.is_closed() {
            return Err(RouterError::Closed);
        }
        trace!("Handling {} bytes from {}", bytes.len(), peer);

        let mut reader = OscReader::new(bytes);
        let address = reader.read_string()?;
        if address == BUNDLE_TAG {
            let time_tag = reader.read_time_tag()?;
            return Err(RouterError::UnsupportedBundle(time_tag));
        }

        let Some(route) = self.router.resolve(&address) else {
            let tag = reader.read_type_tag().unwrap_or_default();
            debug!(
                "No route for {} from {} (type tag {:?}, {} argument bytes)",
                address,
                peer,
                tag,
                reader.remaining()
            );
            return Ok(None);
        };

        let tag = reader.read_type_tag()?;
        if let Some(expected) = route.type_tag() {
            if expected != tag {
                error!(
                    "Type tag mismatch on {} from {}: route expects {:?}, got {:?}",
                    address, peer, expected, tag
                );
            }
        }

        let message = route.dispatch(peer, address, &mut reader)?;
        let _ = self.messages.send(message.clone());
        Ok(Some(message))
    }

    /// Drop every route and stop handling packets
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.router.clear();
            debug!("Input closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for OscInput {
    fn default() -> Self {
        Self::new(InputConfig::default())
    }
}

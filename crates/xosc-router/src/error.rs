//! Router error types

use thiserror::Error;
use xosc_core::TimeTag;

pub type Result<T> = std::result::Result<T, RouterError>;

/// Failure reported by a route action
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RouterError {
    /// Unrouting an address that has no route
    #[error("cannot unroute non-routed address: {0}")]
    NotRouted(String),

    /// Sending to an address that has no route
    #[error("no route for address: {0}")]
    NoRoute(String),

    /// The route exists but was registered for another value type
    #[error("route {address} carries {expected}, not {actual}")]
    ValueType {
        address: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The route action rejected a message
    #[error("action failed on {address}: {source}")]
    Action {
        address: String,
        #[source]
        source: ActionError,
    },

    #[error("bundles are not supported (time tag {0})")]
    UnsupportedBundle(TimeTag),

    #[error("send queue is full")]
    QueueFull,

    #[error("closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] xosc_transport::TransportError),

    #[error("codec error: {0}")]
    Core(#[from] xosc_core::Error),
}

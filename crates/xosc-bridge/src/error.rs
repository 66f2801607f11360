//! Bridge error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("routing error: {0}")]
    Router(#[from] xosc_router::RouterError),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("midi error: {0}")]
    Midi(String),

    #[error("bridge closed")]
    Closed,

    #[error("bridge task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

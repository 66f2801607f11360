//! Error types for the OSC codec

use thiserror::Error;

/// Result type alias for codec and registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Codec and registry error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Not enough bytes left in the packet
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Bytes could not be turned into a value
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Type tag string is not of the form `,xyz`
    #[error("invalid type tag: {0}")]
    InvalidTypeTag(String),

    /// Attempt to write a blank type tag
    #[error("type tag cannot be blank")]
    EmptyTypeTag,

    /// A value that cannot be put on the wire
    #[error("encode error: {0}")]
    EncodeError(String),

    /// Incoming type tag differs from the one the converter requires
    #[error("type tag mismatch: expected {expected}, got {actual}")]
    TypeTagMismatch { expected: String, actual: String },

    /// Type tag character with no decoding rule
    #[error("unsupported type tag character: {0:?}")]
    UnsupportedTypeTag(char),

    /// An int32 on the wire that is not a valid char
    #[error("invalid char code point: 0x{0:x}")]
    InvalidChar(u32),

    /// Invalid address format
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Address pattern compilation error
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// No converter registered for a type
    #[error("no converter for type: {0}")]
    NoConverter(&'static str),

    /// Blob or string longer than an int32 length prefix allows
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

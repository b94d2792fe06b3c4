//! Error types for the market depth service

use thiserror::Error;

/// Errors raised while decoding an ingress envelope
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is empty
    #[error("empty payload")]
    Empty,

    /// Payload ended before a field could be read
    #[error("envelope truncated: need {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        /// Offset of the field being read
        offset: usize,
        /// Bytes required at that offset
        needed: usize,
        /// Total payload length
        len: usize,
    },

    /// Snapshot envelope carried a zero-length symbol
    #[error("empty symbol in snapshot envelope")]
    EmptySymbol,

    /// Symbol bytes were not valid UTF-8
    #[error("symbol is not valid UTF-8")]
    BadSymbol,
}

/// Errors raised while processing a decoded snapshot
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Snapshot was routed to a book tracking a different symbol
    #[error("symbol mismatch: book tracks {expected}, snapshot carries {actual}")]
    SymbolMismatch {
        /// Symbol the book state was created for
        expected: String,
        /// Symbol carried by the snapshot
        actual: String,
    },

    /// Decode failure surfaced through the processing path
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors raised by the message bus abstraction
#[derive(Debug, Error)]
pub enum BusError {
    /// The underlying channel or connection is gone
    #[error("bus channel closed")]
    Closed,

    /// Consumer fell behind and records were dropped
    #[error("consumer lagged, {0} records dropped")]
    Lagged(u64),

    /// Producer enqueue failed
    #[error("publish to {topic} failed: {reason}")]
    Publish {
        /// Destination topic
        topic: String,
        /// Client-reported reason
        reason: String,
    },

    /// Consumer poll failed
    #[error("poll failed: {0}")]
    Poll(String),
}

/// Errors raised during configuration load or validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration source could not be read or deserialized
    #[error("configuration load failed: {0}")]
    Load(String),

    /// A required string or list option is empty
    #[error("{field} must not be empty")]
    EmptyField {
        /// Dotted option name
        field: &'static str,
    },

    /// A numeric option that must be positive is zero
    #[error("{field} must be positive")]
    NotPositive {
        /// Dotted option name
        field: &'static str,
    },

    /// A numeric option exceeds its supported range
    #[error("{field} must be at most {max}")]
    TooLarge {
        /// Dotted option name
        field: &'static str,
        /// Largest supported value
        max: u64,
    },
}

/// Fatal errors raised while bringing the pipeline up
#[derive(Debug, Error)]
pub enum InitError {
    /// Lifecycle method called from the wrong state
    #[error("pipeline is in state {state}, expected {expected}")]
    InvalidState {
        /// State the pipeline is actually in
        state: &'static str,
        /// State the operation requires
        expected: &'static str,
    },

    /// Configuration rejected by validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bus handles could not be created
    #[error("bus initialisation failed: {0}")]
    Bus(#[from] BusError),
}

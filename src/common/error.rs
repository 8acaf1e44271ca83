//! Error handling module
//!
//! This module defines the error types and result type aliases used in the crate.

use thiserror::Error;
use std::io;

use crate::transport::RejectReason;
use crate::wire::WireError;

/// Port forwarding error type
#[derive(Error, Debug)]
pub enum ForwardError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed wire payload
    #[error("Wire format error: {0}")]
    Wire(#[from] WireError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer refused a channel-open request
    #[error("Channel rejected ({reason}): {message}")]
    ChannelRejected {
        /// Rejection reason code
        reason: RejectReason,
        /// Human readable description sent by the peer
        message: String,
    },
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ForwardError`.
pub type Result<T> = std::result::Result<T, ForwardError>;

//! Common module
//!
//! This module contains shared errors, logging setup and network helpers used throughout the crate.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{ForwardError, Result};
pub use log::init_logger;
pub use net::{host_and_port, join_host_port, resolve_tcp_addr};

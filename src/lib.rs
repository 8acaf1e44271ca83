//! TCP/IP port forwarding over a secure transport (RFC4254 §7)
//!
//! This library implements the server side of SSH-style port forwarding on
//! top of any transport that can multiplex channels.
//!
//! # Main Features
//!
//! - Local forwarding: `direct-tcpip` channels dialed to a destination
//! - Remote forwarding: `tcpip-forward` listeners whose connections come back
//!   as `forwarded-tcpip` channels, with `cancel-tcpip-forward`
//! - Pluggable authorization policies, including rule-based configuration
//! - An in-memory transport for embedding and testing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcpip_forward::forward::{ForwardOptions, RemoteForwardRegistry, ReverseForwardEvent};
//! use tcpip_forward::transport::{memory, ConnContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ForwardOptions::new()
//!         .with_reverse_policy(|_: &ConnContext, _: &ReverseForwardEvent| true);
//!     let registry = RemoteForwardRegistry::new(options);
//!
//!     let client_addr = "127.0.0.1:50000".parse().unwrap();
//!     let ctx = ConnContext::new(client_addr, "127.0.0.1:22".parse().unwrap());
//!     let (conn, _peer) = memory::pair(client_addr);
//!     let (_requests_tx, requests) = futures::channel::mpsc::unbounded();
//!
//!     registry.serve_requests(ctx, Arc::new(conn), requests).await;
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod forward;
pub mod relay;
pub mod transport;
pub mod wire;

// Re-export commonly used structures and functions for convenience
pub use common::{ForwardError, Result};
pub use forward::{handle_channel, handle_direct_tcpip, ForwardOptions, RemoteForwardRegistry};
pub use transport::ConnContext;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

//! Default configuration values
//!
//! Single source of truth for defaults used by [`ForwardConfig`](super::ForwardConfig).

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "TCPIP_FORWARD_";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default relay buffer size (8KB)
pub fn buffer_size() -> usize {
    crate::relay::DEFAULT_BUFFER_SIZE
}

/// Default local-forward dial timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}

/// Forwarding is off unless explicitly enabled
pub fn allow_forwarding() -> bool {
    false
}

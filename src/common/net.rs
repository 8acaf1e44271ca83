//! Network utility functions
//!
//! Address formatting and resolution shared by both forwarding directions.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::error::Result;

/// Join a host and port into `host:port`, bracketing IPv6 literals
///
/// The port is kept as the 32-bit wire value so registry keys reproduce the
/// request exactly, even for out-of-range ports.
pub fn join_host_port(host: &str, port: u32) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Resolve a host and 32-bit wire port to a concrete TCP address
///
/// An empty host means every interface. When a name resolves to several
/// addresses the first IPv4 address wins.
///
/// # Errors
///
/// Returns an error if the port does not fit in 16 bits or the host does
/// not resolve to any address.
pub async fn resolve_tcp_addr(host: &str, port: u32) -> Result<SocketAddr> {
    let port = u16::try_from(port).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("port {} out of range", port))
    })?;

    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses found for {}", host)).into()
        })
}

/// Split an address into the host string and port used on the wire
pub fn host_and_port(addr: &SocketAddr) -> (String, u32) {
    (addr.ip().to_string(), u32::from(addr.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("127.0.0.1", 22), "127.0.0.1:22");
        assert_eq!(join_host_port("localhost", 0), "localhost:0");
        assert_eq!(join_host_port("::1", 8080), "[::1]:8080");
        assert_eq!(join_host_port("", 9000), ":9000");
        assert_eq!(join_host_port("example.com", 70000), "example.com:70000");
    }

    #[tokio::test]
    async fn test_resolve_literal_and_empty() {
        let addr = resolve_tcp_addr("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());

        let addr = resolve_tcp_addr("[::1]", 0).await.unwrap();
        assert!(addr.is_ipv6());

        let addr = resolve_tcp_addr("", 2222).await.unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 2222);
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_input() {
        assert!(resolve_tcp_addr("127.0.0.1", 65536).await.is_err());
        assert!(resolve_tcp_addr("no such host.invalid", 80).await.is_err());
    }

    #[test]
    fn test_host_and_port() {
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        assert_eq!(host_and_port(&addr), ("10.1.2.3".to_string(), 4567));
    }
}

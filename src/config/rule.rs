//! Address rules for forwarding allow-lists
//!
//! A rule is written `host:port`. Either part may be `*`; IPv6 hosts are
//! bracketed, e.g. `[::1]:22`.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::error::ConfigError;

/// One `host:port` allow-list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRule {
    host: Option<String>,
    port: Option<u16>,
}

impl AddressRule {
    /// Host part, `None` for `*`
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Port part, `None` for `*`
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether `host:port` is covered by this rule
    ///
    /// Hosts compare case-insensitively; IP literals compare by value.
    pub fn matches(&self, host: &str, port: u32) -> bool {
        let port_ok = match self.port {
            None => true,
            Some(expected) => u32::from(expected) == port,
        };
        port_ok && self.host.as_deref().map_or(true, |expected| host_eq(expected, host))
    }
}

fn host_eq(expected: &str, actual: &str) -> bool {
    let actual = actual.trim_start_matches('[').trim_end_matches(']');
    match (expected.parse::<IpAddr>(), actual.parse::<IpAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => expected.eq_ignore_ascii_case(actual),
    }
}

impl FromStr for AddressRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |reason: &'static str| ConfigError::InvalidRule {
            rule: s.to_string(),
            reason,
        };

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("expected host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }

        let port = match port {
            "*" => None,
            p => Some(p.parse::<u16>().map_err(|_| invalid("port must be 0-65535 or *"))?),
        };
        let host = match host {
            "*" => None,
            h => Some(h.to_string()),
        };

        Ok(Self { host, port })
    }
}

impl fmt::Display for AddressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) if host.contains(':') => write!(f, "[{}]", host)?,
            Some(host) => write!(f, "{}", host)?,
            None => write!(f, "*")?,
        }
        match self.port {
            Some(port) => write!(f, ":{}", port),
            None => write!(f, ":*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for rule in ["db:5432", "*:443", "127.0.0.1:*", "[::1]:22", "*:*"] {
            let parsed: AddressRule = rule.parse().unwrap();
            assert_eq!(parsed.to_string(), rule);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!("no-port".parse::<AddressRule>().is_err());
        assert!(":22".parse::<AddressRule>().is_err());
        assert!("host:99999".parse::<AddressRule>().is_err());
        assert!("host:http".parse::<AddressRule>().is_err());
    }

    #[test]
    fn test_matching() {
        let rule: AddressRule = "[::1]:*".parse().unwrap();
        assert!(rule.matches("0:0:0:0:0:0:0:1", 8080));
        assert!(rule.matches("[::1]", 1));
        assert!(!rule.matches("127.0.0.1", 8080));

        let rule: AddressRule = "Example.COM:80".parse().unwrap();
        assert!(rule.matches("example.com", 80));
        assert!(!rule.matches("example.com", 65616));
    }
}

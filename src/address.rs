//! Target address handling.
//!
//! A probe target is given on the command line as `host`, `host:port` or a
//! URL. Everything is reduced to a [`TargetAddress`] whose `hostname` is the
//! name checked against the certificate and whose `port` is dialed as given.

use serde::Serialize;
use std::fmt;
use std::net::Ipv6Addr;
use url::{Host, Url};

/// Port used when the target does not carry one.
pub const DEFAULT_PORT: u16 = 443;

/// A normalized `host:port` probe target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetAddress {
    /// Host part, used for SNI and hostname verification
    pub hostname: String,
    /// Port part, kept exactly as supplied
    pub port: String,
}

impl TargetAddress {
    /// Builds a target from a raw command-line value.
    ///
    /// Values with a scheme (`https://example.com:8443/path`) are parsed as
    /// URLs and reduced to their host and port. Anything else goes through
    /// [`normalize`].
    pub fn parse_target(input: &str) -> TargetAddress {
        if input.contains("://") {
            if let Some(target) = from_url(input) {
                return target;
            }
        }
        normalize(input)
    }

    /// `host:port`, the string handed to the socket layer. IPv6 literals
    /// are bracketed.
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.hostname, self.port)
        } else {
            write!(f, "{}:{}", self.hostname, self.port)
        }
    }
}

/// Normalizes `input` into a [`TargetAddress`].
///
/// Without a `:` the default port 443 is appended. The first `:` splits the
/// hostname from the port; the port text is not validated here.
pub fn normalize(input: &str) -> TargetAddress {
    match input.split_once(':') {
        Some((hostname, port)) => TargetAddress {
            hostname: hostname.to_string(),
            port: port.to_string(),
        },
        None => TargetAddress {
            hostname: input.to_string(),
            port: DEFAULT_PORT.to_string(),
        },
    }
}

fn from_url(input: &str) -> Option<TargetAddress> {
    let url = Url::parse(input).ok()?;
    // hostname is what the certificate is checked against, so no brackets
    let hostname = match url.host()? {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };
    let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
    Some(TargetAddress {
        hostname,
        port: port.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_appended() {
        let target = normalize("example.com");
        assert_eq!(target.hostname, "example.com");
        assert_eq!(target.port, "443");
        assert_eq!(target.to_string(), "example.com:443");
    }

    #[test]
    fn test_explicit_port_preserved() {
        let target = normalize("example.com:8443");
        assert_eq!(target.hostname, "example.com");
        assert_eq!(target.port, "8443");

        // kept verbatim, even when it would not parse as a number
        let target = normalize("example.com:08443");
        assert_eq!(target.port, "08443");
        let target = normalize("example.com:https");
        assert_eq!(target.port, "https");
    }

    #[test]
    fn test_first_colon_splits() {
        let target = normalize("::1");
        assert_eq!(target.hostname, "");
        assert_eq!(target.port, ":1");

        let target = normalize("host:1:2");
        assert_eq!(target.hostname, "host");
        assert_eq!(target.port, "1:2");
    }

    #[test]
    fn test_empty_input() {
        let target = normalize("");
        assert_eq!(target.hostname, "");
        assert_eq!(target.port, "443");
    }

    #[test]
    fn test_parse_target_url() {
        let target = TargetAddress::parse_target("https://secure.example.com:9443/status");
        assert_eq!(target.hostname, "secure.example.com");
        assert_eq!(target.port, "9443");

        let target = TargetAddress::parse_target("https://example.com");
        assert_eq!(target.authority(), "example.com:443");
    }

    #[test]
    fn test_parse_target_ipv6_url() {
        let target = TargetAddress::parse_target("https://[::1]:8443/");
        assert_eq!(target.hostname, "::1");
        assert_eq!(target.port, "8443");
        assert_eq!(target.authority(), "[::1]:8443");
        assert_eq!(target.to_string(), "[::1]:8443");

        let target = TargetAddress::parse_target("https://[2001:db8::7]");
        assert_eq!(target.hostname, "2001:db8::7");
        assert_eq!(target.authority(), "[2001:db8::7]:443");
    }

    #[test]
    fn test_parse_target_ipv4_url() {
        let target = TargetAddress::parse_target("https://192.0.2.7:9443");
        assert_eq!(target.hostname, "192.0.2.7");
        assert_eq!(target.authority(), "192.0.2.7:9443");
    }

    #[test]
    fn test_parse_target_plain() {
        assert_eq!(
            TargetAddress::parse_target("example.com:8443"),
            normalize("example.com:8443")
        );
        assert_eq!(
            TargetAddress::parse_target("example.com"),
            normalize("example.com")
        );
    }
}

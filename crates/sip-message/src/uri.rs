//! # SIP URI
//!
//! A deliberately small view over `sip:` / `sips:` URIs. The transaction layer
//! only needs the target host, port and transport of a Request-URI to pick a
//! default destination for client transactions (RFC 3261 §8.1.2); full URI
//! grammar belongs to the parser.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MessageError, Result};
use crate::via::TransportProtocol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipUri {
    pub secure: bool,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub transport: Option<TransportProtocol>,
}

impl SipUri {
    /// Parses the scheme, user, host, port and `transport` parameter of a URI.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason| MessageError::InvalidUri {
            uri: input.to_string(),
            reason,
        };

        let trimmed = input.trim().trim_start_matches('<').trim_end_matches('>');
        let (secure, rest) = if let Some(rest) = strip_prefix_ignore_case(trimmed, "sips:") {
            (true, rest)
        } else if let Some(rest) = strip_prefix_ignore_case(trimmed, "sip:") {
            (false, rest)
        } else {
            return Err(invalid("unsupported scheme"));
        };

        // Drop URI headers, they never affect routing
        let rest = rest.split('?').next().unwrap_or_default();
        let mut sections = rest.split(';');
        let address = sections.next().unwrap_or_default();

        let (user, hostport) = match address.rsplit_once('@') {
            Some((user, hostport)) => (Some(user.to_string()), hostport),
            None => (None, address),
        };

        let (host, port) = split_host_port(hostport).ok_or_else(|| invalid("bad host or port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let mut transport = None;
        for param in sections {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("transport") {
                    transport = Some(value.trim().parse()?);
                }
            }
        }

        Ok(Self {
            secure,
            user,
            host,
            port,
            transport,
        })
    }

    /// Transport implied by the URI: explicit parameter, else TLS for `sips:`, else UDP.
    pub fn effective_transport(&self) -> TransportProtocol {
        match self.transport {
            Some(transport) => transport,
            None if self.secure => TransportProtocol::Tls,
            None => TransportProtocol::Udp,
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port
            .unwrap_or_else(|| self.effective_transport().default_port())
    }
}

impl FromStr for SipUri {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.secure { "sips:" } else { "sip:" })?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(transport) = self.transport {
            write!(f, ";transport={}", transport.as_str().to_ascii_lowercase())?;
        }
        Ok(())
    }
}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    if input.len() >= prefix.len() && input[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&input[prefix.len()..])
    } else {
        None
    }
}

fn split_host_port(hostport: &str) -> Option<(String, Option<u16>)> {
    // IPv6 reference: [addr]:port
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(port.parse().ok()?),
            None if tail.is_empty() => None,
            None => return None,
        };
        return Some((host.to_string(), port));
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), Some(port.parse().ok()?))),
        None => Some((hostport.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_host_port() {
        let uri = SipUri::parse("sip:bob@biloxi.example.com:5070").unwrap();
        assert_eq!(uri.user.as_deref(), Some("bob"));
        assert_eq!(uri.host, "biloxi.example.com");
        assert_eq!(uri.port, Some(5070));
        assert_eq!(uri.effective_transport(), TransportProtocol::Udp);
    }

    #[test]
    fn test_transport_param_and_sips_defaults() {
        let tcp = SipUri::parse("sip:registrar.example.com;transport=tcp").unwrap();
        assert_eq!(tcp.effective_transport(), TransportProtocol::Tcp);
        assert_eq!(tcp.effective_port(), 5060);

        let sips = SipUri::parse("sips:alice@secure.example.com").unwrap();
        assert_eq!(sips.effective_transport(), TransportProtocol::Tls);
        assert_eq!(sips.effective_port(), 5061);
    }

    #[test]
    fn test_ipv6_host() {
        let uri = SipUri::parse("sip:carol@[2001:db8::10]:5080").unwrap();
        assert_eq!(uri.host, "2001:db8::10");
        assert_eq!(uri.port, Some(5080));
        assert_eq!(uri.to_string(), "sip:carol@[2001:db8::10]:5080");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(SipUri::parse("tel:+15551234567").is_err());
        assert!(SipUri::parse("sip:bob@host:notaport").is_err());
        assert!(SipUri::parse("sip:").is_err());
    }
}

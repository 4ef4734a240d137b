//! # Via Header
//!
//! The Via header records the path taken by a request and carries the
//! `branch` parameter that identifies the transaction (RFC 3261 §8.1.1.7,
//! §20.42).
//!
//! Only the topmost Via entry matters to the transaction layer:
//!
//! - its `branch` is the primary matching key (§17.1.3, §17.2.3)
//! - its sent-by (`host[:port]`) is compared when matching server transactions
//! - its `received`, `rport` and `maddr` parameters decide where responses go
//!   (§18.2.2, RFC 3581)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// The RFC 3261 magic cookie that prefixes every compliant branch parameter.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// Transport protocol named in a Via sent-protocol or a `transport=` URI parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Tls,
    Sctp,
    Ws,
    Wss,
}

impl TransportProtocol {
    /// Reliable transports suppress retransmission timers (RFC 3261 §17.1.1.2).
    pub fn is_reliable(self) -> bool {
        !matches!(self, TransportProtocol::Udp)
    }

    /// Default port for this transport when none is given explicitly.
    pub fn default_port(self) -> u16 {
        match self {
            TransportProtocol::Tls => 5061,
            TransportProtocol::Ws => 80,
            TransportProtocol::Wss => 443,
            _ => 5060,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Tls => "TLS",
            TransportProtocol::Sctp => "SCTP",
            TransportProtocol::Ws => "WS",
            TransportProtocol::Wss => "WSS",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(TransportProtocol::Udp),
            "TCP" => Ok(TransportProtocol::Tcp),
            "TLS" => Ok(TransportProtocol::Tls),
            "SCTP" => Ok(TransportProtocol::Sctp),
            "WS" => Ok(TransportProtocol::Ws),
            "WSS" => Ok(TransportProtocol::Wss),
            _ => Err(MessageError::UnknownTransport(s.to_string())),
        }
    }
}

/// A single Via header entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    pub protocol: TransportProtocol,
    pub host: String,
    pub port: Option<u16>,
    /// Parameters in order of appearance; flag parameters (such as a bare
    /// `rport`) carry no value.
    pub params: Vec<(String, Option<String>)>,
}

impl Via {
    /// Creates a Via entry without parameters.
    pub fn new(protocol: TransportProtocol, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    /// Shorthand for a `SIP/2.0/UDP` entry.
    pub fn udp(host: impl Into<String>, port: Option<u16>) -> Self {
        Self::new(TransportProtocol::Udp, host, port)
    }

    /// Shorthand for a `SIP/2.0/TCP` entry.
    pub fn tcp(host: impl Into<String>, port: Option<u16>) -> Self {
        Self::new(TransportProtocol::Tcp, host, port)
    }

    /// Sets (or replaces) the branch parameter.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.set_param("branch", Some(branch.into()));
        self
    }

    /// Sets (or replaces) an arbitrary parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self
            .params
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }

    /// Looks up a parameter. The outer `Option` tells whether the parameter is
    /// present, the inner one whether it carries a value.
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_deref())
    }

    pub fn branch(&self) -> Option<&str> {
        self.param("branch").flatten()
    }

    /// `true` when the branch carries the RFC 3261 magic cookie.
    pub fn has_rfc3261_branch(&self) -> bool {
        self.branch()
            .map(|b| b.starts_with(BRANCH_MAGIC_COOKIE))
            .unwrap_or(false)
    }

    pub fn received(&self) -> Option<&str> {
        self.param("received").flatten()
    }

    pub fn maddr(&self) -> Option<&str> {
        self.param("maddr").flatten()
    }

    /// RFC 3581 `rport`: `None` when absent, `Some(None)` when present as a
    /// flag, `Some(Some(port))` when filled in by the receiver.
    pub fn rport(&self) -> Option<Option<u16>> {
        self.param("rport")
            .map(|value| value.and_then(|v| v.parse().ok()))
    }

    /// Port advertised in sent-by, or the transport default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// The sent-by value normalised as `host:port` (host compared case-insensitively).
    pub fn sent_by(&self) -> String {
        format!("{}:{}", self.host.to_ascii_lowercase(), self.effective_port())
    }

    /// Where a server transaction sends its responses (RFC 3261 §18.2.2,
    /// RFC 3581 §4): `maddr` first, then `received` (with `rport` when it was
    /// filled in), then sent-by.
    pub fn response_target(&self) -> (String, u16) {
        if let Some(maddr) = self.maddr() {
            return (maddr.to_string(), self.effective_port());
        }
        if let Some(received) = self.received() {
            let port = match self.rport() {
                Some(Some(port)) => port,
                _ => self.effective_port(),
            };
            return (received.to_string(), port);
        }
        (self.host.clone(), self.effective_port())
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.protocol, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

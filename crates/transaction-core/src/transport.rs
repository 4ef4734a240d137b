//! Transport seam.
//!
//! The layer never touches sockets. Every message a state machine emits is
//! handed to the registered [`Transport`] together with the transaction and
//! its [`Destination`]. A returned [`TransportError`] is reported through the
//! transport-error callback and terminates the transaction.

use std::fmt;

use siptx_sip_message::{SipMessage, SipUri, TransportProtocol, Via};

use crate::error::TransportError;
use crate::transaction::Transaction;

/// Where a transaction sends its messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub protocol: TransportProtocol,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16, protocol: TransportProtocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// Client default: the host, port and transport of the Request-URI.
    pub fn from_uri(uri: &SipUri) -> Self {
        Self::new(uri.host.clone(), uri.effective_port(), uri.effective_transport())
    }

    /// Server default: the response target of the topmost Via.
    pub fn from_via(via: &Via) -> Self {
        let (host, port) = via.response_target();
        Self::new(host, port, via.protocol)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{};transport={}", self.host, self.port, self.protocol)
    }
}

/// Sends messages on behalf of transactions.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        transaction: &Transaction,
        message: &SipMessage,
        destination: &Destination,
    ) -> Result<(), TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&Transaction, &SipMessage, &Destination) -> Result<(), TransportError> + Send + Sync,
{
    fn send(
        &self,
        transaction: &Transaction,
        message: &SipMessage,
        destination: &Destination,
    ) -> Result<(), TransportError> {
        self(transaction, message, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_from_uri() {
        let uri = SipUri::parse("sips:bob@biloxi.example.com").unwrap();
        let dest = Destination::from_uri(&uri);
        assert_eq!(dest, Destination::new("biloxi.example.com", 5061, TransportProtocol::Tls));
    }

    #[test]
    fn test_destination_from_via() {
        let via = Via::tcp("pc33.atlanta.example.com", Some(5070))
            .with_param("received", Some("192.0.2.1".into()));
        let dest = Destination::from_via(&via);
        assert_eq!(dest.host, "192.0.2.1");
        assert_eq!(dest.port, 5070);
        assert_eq!(dest.protocol, TransportProtocol::Tcp);
        assert_eq!(dest.to_string(), "192.0.2.1:5070;transport=TCP");
    }
}

//! # SIP Request Message
//!
//! The Request struct represents a SIP request as produced by the parser or
//! assembled by the application: a method, a Request-URI, a header block and
//! an optional body.
//!
//! ## Examples
//!
//! ```rust
//! use siptx_sip_message::{Method, NameAddr, Request, Via};
//!
//! let invite = Request::builder(Method::Invite, "sip:bob@biloxi.example.com")
//!     .via(Via::udp("pc33.atlanta.example.com", None).with_branch("z9hG4bK776asdhds"))
//!     .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("1928301774"))
//!     .to(NameAddr::new("sip:bob@biloxi.example.com"))
//!     .call_id("a84b4c76e66710@pc33.atlanta.example.com")
//!     .cseq(314159, Method::Invite)
//!     .build();
//!
//! assert_eq!(invite.branch(), Some("z9hG4bK776asdhds"));
//! assert!(invite.method_matches_cseq());
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::headers::{CSeq, Headers, NameAddr};
use crate::method::Method;
use crate::via::Via;

/// A SIP request message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// The request-line method
    pub method: Method,
    /// The Request-URI as received
    pub uri: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    /// Creates a request with an empty header block and body.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::default(),
            body: Bytes::new(),
        }
    }

    /// Starts a [`RequestBuilder`].
    pub fn builder(method: Method, uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            request: Self::new(method, uri),
        }
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.headers.top_via()
    }

    /// Branch parameter of the topmost Via.
    pub fn branch(&self) -> Option<&str> {
        self.top_via().and_then(Via::branch)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.call_id.as_deref()
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        self.headers.cseq.as_ref()
    }

    pub fn from(&self) -> Option<&NameAddr> {
        self.headers.from.as_ref()
    }

    pub fn to(&self) -> Option<&NameAddr> {
        self.headers.to.as_ref()
    }

    /// RFC 3261 §8.2: the CSeq method must equal the request-line method.
    /// A request without CSeq never matches.
    pub fn method_matches_cseq(&self) -> bool {
        self.cseq()
            .map(|cseq| cseq.method == self.method)
            .unwrap_or(false)
    }
}

/// Builder for [`Request`] used by applications and tests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Appends a Via entry; the first one added is the topmost.
    pub fn via(mut self, via: Via) -> Self {
        self.request.headers.via.push(via);
        self
    }

    pub fn from(mut self, from: NameAddr) -> Self {
        self.request.headers.from = Some(from);
        self
    }

    pub fn to(mut self, to: NameAddr) -> Self {
        self.request.headers.to = Some(to);
        self
    }

    pub fn call_id(mut self, call_id: impl Into<String>) -> Self {
        self.request.headers.call_id = Some(call_id.into());
        self
    }

    pub fn cseq(mut self, seq: u32, method: Method) -> Self {
        self.request.headers.cseq = Some(CSeq::new(seq, method));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_must_match_cseq() {
        let ok = Request::builder(Method::Options, "sip:carol@chicago.example.com")
            .cseq(1, Method::Options)
            .build();
        assert!(ok.method_matches_cseq());

        let mismatch = Request::builder(Method::Invite, "sip:carol@chicago.example.com")
            .cseq(1, Method::Options)
            .build();
        assert!(!mismatch.method_matches_cseq());

        let missing = Request::new(Method::Bye, "sip:carol@chicago.example.com");
        assert!(!missing.method_matches_cseq());
    }

    #[test]
    fn test_builder_keeps_via_order() {
        let request = Request::builder(Method::Invite, "sip:bob@biloxi.example.com")
            .via(Via::udp("proxy.example.com", None).with_branch("z9hG4bKproxy"))
            .via(Via::udp("pc33.atlanta.example.com", None).with_branch("z9hG4bKuac"))
            .header("Route", "<sip:p1.example.com;lr>")
            .body("v=0")
            .build();

        assert_eq!(request.branch(), Some("z9hG4bKproxy"));
        assert_eq!(request.headers.via.len(), 2);
        assert_eq!(request.headers.get("route"), Some("<sip:p1.example.com;lr>"));
        assert_eq!(&request.body[..], b"v=0");
    }
}

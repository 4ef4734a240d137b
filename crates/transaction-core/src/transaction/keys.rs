//! # Transaction matching keys
//!
//! Values copied from the request that created a transaction and compared
//! against later messages:
//!
//! - server side, RFC 3261 §17.2.3: when the topmost Via branch carries the
//!   `z9hG4bK` cookie, branch, sent-by, Call-ID, CSeq number and method must
//!   agree (an ACK matches the INVITE it acknowledges). Otherwise the
//!   RFC 2543 rules apply: Request-URI, From tag, To tag, Call-ID, CSeq
//!   number and top Via sent-by.
//! - client side, RFC 3261 §17.1.3: the response's topmost Via branch and
//!   CSeq method must equal those of the request.

use siptx_sip_message::{Method, Request, Response};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKeys {
    pub branch: Option<String>,
    /// Normalised `host:port` of the topmost Via
    pub sent_by: String,
    pub call_id: String,
    pub cseq_number: u32,
    pub method: Method,
    pub from_tag: Option<String>,
    pub to_tag: Option<String>,
    pub request_uri: String,
}

impl MatchKeys {
    /// Extracts the keys, failing when a header needed for matching is missing.
    pub fn from_request(request: &Request) -> Result<Self> {
        let via = request
            .top_via()
            .ok_or_else(|| Error::validation("request has no Via header"))?;
        let from = request
            .from()
            .ok_or_else(|| Error::validation("request has no From header"))?;
        let to = request
            .to()
            .ok_or_else(|| Error::validation("request has no To header"))?;
        let call_id = request
            .call_id()
            .ok_or_else(|| Error::validation("request has no Call-ID header"))?;
        let cseq = request
            .cseq()
            .ok_or_else(|| Error::validation("request has no CSeq header"))?;

        Ok(Self {
            branch: via.branch().map(str::to_string),
            sent_by: via.sent_by(),
            call_id: call_id.to_string(),
            cseq_number: cseq.seq,
            method: cseq.method.clone(),
            from_tag: from.tag().map(str::to_string),
            to_tag: to.tag().map(str::to_string),
            request_uri: request.uri.clone(),
        })
    }

    /// Server transaction matching. `last_response_to_tag` is the To tag of
    /// the last response sent, which an RFC 2543 ACK must echo.
    pub fn matches_request(&self, request: &Request, last_response_to_tag: Option<&str>) -> bool {
        let (Some(via), Some(cseq)) = (request.top_via(), request.cseq()) else {
            return false;
        };

        let is_ack = request.method == Method::Ack;
        let method_matches = if is_ack {
            self.method == Method::Invite
        } else {
            cseq.method == self.method
        };
        if !method_matches
            || request.call_id() != Some(self.call_id.as_str())
            || cseq.seq != self.cseq_number
            || via.sent_by() != self.sent_by
        {
            return false;
        }

        if via.has_rfc3261_branch() {
            return via.branch() == self.branch.as_deref();
        }

        let to_tag = request.to().and_then(|to| to.tag());
        let expected_to_tag = if is_ack {
            last_response_to_tag
        } else {
            self.to_tag.as_deref()
        };
        request.uri == self.request_uri
            && request.from().and_then(|from| from.tag()) == self.from_tag.as_deref()
            && to_tag == expected_to_tag
    }

    /// Client transaction matching.
    pub fn matches_response(&self, response: &Response) -> bool {
        match (response.branch(), self.branch.as_deref(), response.cseq()) {
            (Some(branch), Some(ours), Some(cseq)) => branch == ours && cseq.method == self.method,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siptx_sip_message::{NameAddr, Via};

    fn invite(branch: &str) -> Request {
        Request::builder(Method::Invite, "sip:bob@biloxi.example.com")
            .via(Via::udp("pc33.atlanta.example.com", None).with_branch(branch))
            .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("1928301774"))
            .to(NameAddr::new("sip:bob@biloxi.example.com"))
            .call_id("a84b4c76e66710")
            .cseq(314159, Method::Invite)
            .build()
    }

    fn ack_for(invite: &Request, to_tag: &str) -> Request {
        let mut ack = invite.clone();
        ack.method = Method::Ack;
        ack.headers.cseq = Some(siptx_sip_message::CSeq::new(314159, Method::Ack));
        if let Some(to) = ack.headers.to.as_mut() {
            to.tag = Some(to_tag.to_string());
        }
        ack
    }

    #[test]
    fn test_missing_headers_are_rejected() {
        let mut request = invite("z9hG4bK1");
        request.headers.call_id = None;
        assert!(matches!(
            MatchKeys::from_request(&request),
            Err(Error::Validation(_))
        ));

        let mut request = invite("z9hG4bK1");
        request.headers.via.clear();
        assert!(MatchKeys::from_request(&request).is_err());
    }

    #[test]
    fn test_rfc3261_retransmission_and_ack_match() {
        let original = invite("z9hG4bK776asdhds");
        let keys = MatchKeys::from_request(&original).unwrap();

        assert!(keys.matches_request(&original, None));
        assert!(keys.matches_request(&ack_for(&original, "a6c85cf"), Some("a6c85cf")));

        let other_branch = invite("z9hG4bKdifferent");
        assert!(!keys.matches_request(&other_branch, None));

        let mut cancel = original.clone();
        cancel.method = Method::Cancel;
        cancel.headers.cseq = Some(siptx_sip_message::CSeq::new(314159, Method::Cancel));
        assert!(!keys.matches_request(&cancel, None));
    }

    #[test]
    fn test_sent_by_must_match() {
        let original = invite("z9hG4bK776asdhds");
        let keys = MatchKeys::from_request(&original).unwrap();

        let mut moved = original.clone();
        moved.headers.via[0] = Via::udp("other.example.com", None).with_branch("z9hG4bK776asdhds");
        assert!(!keys.matches_request(&moved, None));
    }

    #[test]
    fn test_rfc2543_ack_uses_response_to_tag() {
        let original = invite("legacy-1");
        let keys = MatchKeys::from_request(&original).unwrap();

        assert!(keys.matches_request(&original, None));
        assert!(keys.matches_request(&ack_for(&original, "resp-tag"), Some("resp-tag")));
        assert!(!keys.matches_request(&ack_for(&original, "other-tag"), Some("resp-tag")));
    }

    #[test]
    fn test_response_matching() {
        let original = invite("z9hG4bK776asdhds");
        let keys = MatchKeys::from_request(&original).unwrap();

        let ringing = Response::for_request(&original, 180, "Ringing");
        assert!(keys.matches_response(&ringing));

        let mut wrong_method = ringing.clone();
        wrong_method.headers.cseq = Some(siptx_sip_message::CSeq::new(314159, Method::Bye));
        assert!(!keys.matches_response(&wrong_method));

        let mut no_via = ringing;
        no_via.headers.via.clear();
        assert!(!keys.matches_response(&no_via));
    }
}

use serde::{Deserialize, Serialize};

use crate::headers::{CSeq, Headers};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::via::Via;

/// Either a request or a response, as handed over by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SipMessage {
    Request(Request),
    Response(Response),
}

impl SipMessage {
    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, SipMessage::Response(_))
    }

    /// `true` for an ACK request.
    pub fn is_ack(&self) -> bool {
        matches!(self, SipMessage::Request(req) if req.method == Method::Ack)
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            SipMessage::Request(req) => Some(req),
            SipMessage::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            SipMessage::Request(_) => None,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(req) => &req.headers,
            SipMessage::Response(resp) => &resp.headers,
        }
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        self.headers().cseq.as_ref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers().call_id.as_deref()
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.headers().top_via()
    }

    /// Status code for responses, `None` for requests.
    pub fn status(&self) -> Option<u16> {
        self.as_response().map(|resp| resp.status)
    }
}

impl From<Request> for SipMessage {
    fn from(request: Request) -> Self {
        SipMessage::Request(request)
    }
}

impl From<Response> for SipMessage {
    fn from(response: Response) -> Self {
        SipMessage::Response(response)
    }
}

//! # SIP Response Message
//!
//! Responses carry a status code and reason phrase plus the header block.
//! [`Response::for_request`] copies the headers a UAS must mirror into every
//! response (RFC 3261 §8.2.6.2).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::headers::{CSeq, Headers};
use crate::request::Request;
use crate::via::Via;

/// Status class of a response, the granularity at which transactions react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Provisional,
    Success,
    Redirection,
    ClientError,
    ServerError,
    GlobalFailure,
}

impl StatusClass {
    /// Classifies a status code. Codes below 200 are provisional, codes of
    /// 600 and above are global failures.
    pub fn from_code(code: u16) -> Self {
        match code {
            0..=199 => StatusClass::Provisional,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::GlobalFailure,
        }
    }

    pub fn is_final(self) -> bool {
        !matches!(self, StatusClass::Provisional)
    }
}

/// A SIP response message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Headers::default(),
            body: Bytes::new(),
        }
    }

    /// Builds a response mirroring Via, From, To, Call-ID and CSeq of `request`.
    pub fn for_request(request: &Request, status: u16, reason: impl Into<String>) -> Self {
        let mut response = Self::new(status, reason);
        response.headers.via = request.headers.via.clone();
        response.headers.from = request.headers.from.clone();
        response.headers.to = request.headers.to.clone();
        response.headers.call_id = request.headers.call_id.clone();
        response.headers.cseq = request.headers.cseq.clone();
        response
    }

    /// Sets the To tag, as a UAS does on every non-100 response.
    pub fn with_to_tag(mut self, tag: impl Into<String>) -> Self {
        if let Some(to) = self.headers.to.as_mut() {
            to.tag = Some(tag.into());
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn class(&self) -> StatusClass {
        StatusClass::from_code(self.status)
    }

    pub fn is_provisional(&self) -> bool {
        self.class() == StatusClass::Provisional
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.headers.top_via()
    }

    pub fn branch(&self) -> Option<&str> {
        self.top_via().and_then(Via::branch)
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        self.headers.cseq.as_ref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.call_id.as_deref()
    }

    pub fn to_tag(&self) -> Option<&str> {
        self.headers.to.as_ref().and_then(|to| to.tag())
    }
}

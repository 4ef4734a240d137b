//! # siptx-sip-message
//!
//! The SIP message model consumed by `siptx-transaction-core`.
//!
//! Parsing bytes off the wire and serializing messages back are the job of a
//! separate parser; this crate only defines the structured representation the
//! transaction layer reads when it classifies, matches and answers messages:
//!
//! - [`Request`] / [`Response`] / [`SipMessage`]
//! - [`Via`] with branch, sent-by and response-routing parameters
//! - [`NameAddr`] (From / To), [`CSeq`], Call-ID in [`Headers`]
//! - [`SipUri`] for picking a default destination from a Request-URI
//!
//! Builders on [`Request`] and [`Response`] let applications and tests
//! assemble messages without a parser.

pub mod error;
pub mod headers;
pub mod message;
pub mod method;
pub mod request;
pub mod response;
pub mod uri;
pub mod via;

pub use error::{MessageError, Result};
pub use headers::{CSeq, Headers, NameAddr};
pub use message::SipMessage;
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::{Response, StatusClass};
pub use uri::SipUri;
pub use via::{TransportProtocol, Via, BRANCH_MAGIC_COOKIE};

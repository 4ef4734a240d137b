//! # SIP Methods
//!
//! Request methods as defined by RFC 3261 Section 7.1 and its extensions.
//! Unknown tokens are preserved verbatim as [`Method::Extension`] so that the
//! transaction layer can still build a non-INVITE transaction for them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A SIP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Register,
    Info,
    Notify,
    Subscribe,
    Refer,
    Message,
    Update,
    Prack,
    Publish,
    /// Any method token not listed above
    Extension(String),
}

impl Method {
    /// Returns the canonical upper-case token for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
            Method::Info => "INFO",
            Method::Notify => "NOTIFY",
            Method::Subscribe => "SUBSCRIBE",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Update => "UPDATE",
            Method::Prack => "PRACK",
            Method::Publish => "PUBLISH",
            Method::Extension(token) => token.as_str(),
        }
    }

    /// INVITE and ACK belong to the INVITE transaction family (RFC 3261 §17).
    pub fn is_invite_family(&self) -> bool {
        matches!(self, Method::Invite | Method::Ack)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Method tokens are case-sensitive (RFC 3261 §7.1)
        Ok(match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            "REGISTER" => Method::Register,
            "INFO" => Method::Info,
            "NOTIFY" => Method::Notify,
            "SUBSCRIBE" => Method::Subscribe,
            "REFER" => Method::Refer,
            "MESSAGE" => Method::Message,
            "UPDATE" => Method::Update,
            "PRACK" => Method::Prack,
            "PUBLISH" => Method::Publish,
            other => Method::Extension(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_extension_methods() {
        assert_eq!("INVITE".parse::<Method>().unwrap(), Method::Invite);
        assert_eq!("OPTIONS".parse::<Method>().unwrap(), Method::Options);
        assert_eq!(
            "invite".parse::<Method>().unwrap(),
            Method::Extension("invite".to_string())
        );
        assert_eq!(Method::Extension("FOO".into()).to_string(), "FOO");
    }

    #[test]
    fn test_invite_family() {
        assert!(Method::Invite.is_invite_family());
        assert!(Method::Ack.is_invite_family());
        assert!(!Method::Cancel.is_invite_family());
        assert!(!Method::Options.is_invite_family());
    }
}

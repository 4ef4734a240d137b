//! # Transaction events
//!
//! A [`SipEvent`] is the unit of work queued on a transaction: a SIP message
//! classified by direction and kind, or a synthetic timer or kill event.
//! Events are built once by the parser side ([`SipEvent::incoming`]), the
//! application ([`SipEvent::outgoing`]) or the scheduler
//! ([`SipEvent::timer`]) and then moved, never shared, until an engine
//! consumes them.

use siptx_sip_message::{Method, SipMessage, StatusClass};

use crate::transaction::TransactionId;

/// Which side of the stack produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from the network
    Incoming,
    /// Submitted by the application for sending
    Outgoing,
}

/// Classification of an event as seen by the state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    // ICT timers
    TimeoutA,
    TimeoutB,
    TimeoutD,
    // NICT timers
    TimeoutE,
    TimeoutF,
    TimeoutK,
    // IST timers
    TimeoutG,
    TimeoutH,
    TimeoutI,
    // NIST timer
    TimeoutJ,

    RcvInvite,
    RcvAck,
    RcvRequest,
    RcvStatus1xx,
    RcvStatus2xx,
    RcvStatus3456xx,

    SndInvite,
    /// Never dispatched; outgoing ACKs go straight to the transport
    SndAck,
    SndRequest,
    SndStatus1xx,
    SndStatus2xx,
    SndStatus3456xx,

    /// Application-requested termination
    KillTransaction,
}

impl EventType {
    pub fn is_timeout(self) -> bool {
        matches!(
            self,
            EventType::TimeoutA
                | EventType::TimeoutB
                | EventType::TimeoutD
                | EventType::TimeoutE
                | EventType::TimeoutF
                | EventType::TimeoutK
                | EventType::TimeoutG
                | EventType::TimeoutH
                | EventType::TimeoutI
                | EventType::TimeoutJ
        )
    }

    /// Direction of message events, `None` for timer and kill events.
    pub fn direction(self) -> Option<Direction> {
        match self {
            EventType::RcvInvite
            | EventType::RcvAck
            | EventType::RcvRequest
            | EventType::RcvStatus1xx
            | EventType::RcvStatus2xx
            | EventType::RcvStatus3456xx => Some(Direction::Incoming),
            EventType::SndInvite
            | EventType::SndAck
            | EventType::SndRequest
            | EventType::SndStatus1xx
            | EventType::SndStatus2xx
            | EventType::SndStatus3456xx => Some(Direction::Outgoing),
            _ => None,
        }
    }

    fn classify(message: &SipMessage, direction: Direction) -> Self {
        let incoming = direction == Direction::Incoming;
        match message {
            SipMessage::Request(request) => match (&request.method, incoming) {
                (Method::Invite, true) => EventType::RcvInvite,
                (Method::Ack, true) => EventType::RcvAck,
                (_, true) => EventType::RcvRequest,
                (Method::Invite, false) => EventType::SndInvite,
                (Method::Ack, false) => EventType::SndAck,
                (_, false) => EventType::SndRequest,
            },
            SipMessage::Response(response) => match (response.class(), incoming) {
                (StatusClass::Provisional, true) => EventType::RcvStatus1xx,
                (StatusClass::Success, true) => EventType::RcvStatus2xx,
                (_, true) => EventType::RcvStatus3456xx,
                (StatusClass::Provisional, false) => EventType::SndStatus1xx,
                (StatusClass::Success, false) => EventType::SndStatus2xx,
                (_, false) => EventType::SndStatus3456xx,
            },
        }
    }
}

/// An event queued on a transaction.
#[derive(Debug, Clone)]
pub struct SipEvent {
    pub event_type: EventType,
    /// Set once the event belongs to a transaction
    pub transaction_id: Option<TransactionId>,
    pub message: Option<SipMessage>,
}

impl SipEvent {
    /// Wraps a message received from the network.
    pub fn incoming(message: impl Into<SipMessage>) -> Self {
        let message = message.into();
        Self {
            event_type: EventType::classify(&message, Direction::Incoming),
            transaction_id: None,
            message: Some(message),
        }
    }

    /// Wraps a message the application wants sent.
    pub fn outgoing(message: impl Into<SipMessage>) -> Self {
        let message = message.into();
        Self {
            event_type: EventType::classify(&message, Direction::Outgoing),
            transaction_id: None,
            message: Some(message),
        }
    }

    /// A timer expiry for the given transaction.
    pub fn timer(event_type: EventType, transaction_id: TransactionId) -> Self {
        Self {
            event_type,
            transaction_id: Some(transaction_id),
            message: None,
        }
    }

    /// Forces the given transaction to terminate.
    pub fn kill(transaction_id: TransactionId) -> Self {
        Self {
            event_type: EventType::KillTransaction,
            transaction_id: Some(transaction_id),
            message: None,
        }
    }

    /// Stamps the event with the transaction it belongs to.
    pub fn for_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn direction(&self) -> Option<Direction> {
        self.event_type.direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siptx_sip_message::{Request, Response};

    #[test]
    fn test_classify_requests() {
        let invite = Request::new(Method::Invite, "sip:bob@biloxi.example.com");
        let ack = Request::new(Method::Ack, "sip:bob@biloxi.example.com");
        let bye = Request::new(Method::Bye, "sip:bob@biloxi.example.com");

        assert_eq!(SipEvent::incoming(invite.clone()).event_type, EventType::RcvInvite);
        assert_eq!(SipEvent::incoming(ack.clone()).event_type, EventType::RcvAck);
        assert_eq!(SipEvent::incoming(bye.clone()).event_type, EventType::RcvRequest);
        assert_eq!(SipEvent::outgoing(invite).event_type, EventType::SndInvite);
        assert_eq!(SipEvent::outgoing(ack).event_type, EventType::SndAck);
        assert_eq!(SipEvent::outgoing(bye).event_type, EventType::SndRequest);
    }

    #[test]
    fn test_classify_responses() {
        let cases = [
            (100, EventType::RcvStatus1xx, EventType::SndStatus1xx),
            (180, EventType::RcvStatus1xx, EventType::SndStatus1xx),
            (200, EventType::RcvStatus2xx, EventType::SndStatus2xx),
            (302, EventType::RcvStatus3456xx, EventType::SndStatus3456xx),
            (486, EventType::RcvStatus3456xx, EventType::SndStatus3456xx),
            (603, EventType::RcvStatus3456xx, EventType::SndStatus3456xx),
        ];
        for (code, rcv, snd) in cases {
            assert_eq!(SipEvent::incoming(Response::new(code, "")).event_type, rcv);
            assert_eq!(SipEvent::outgoing(Response::new(code, "")).event_type, snd);
        }
    }

    #[test]
    fn test_synthetic_events_have_no_direction() {
        let id = TransactionId(7);
        let timer = SipEvent::timer(EventType::TimeoutA, id);
        assert!(timer.event_type.is_timeout());
        assert_eq!(timer.direction(), None);
        assert_eq!(timer.transaction_id, Some(id));

        let kill = SipEvent::kill(id);
        assert!(!kill.event_type.is_timeout());
        assert_eq!(kill.direction(), None);
    }
}

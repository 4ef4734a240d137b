//! INVITE client transaction (RFC 3261 §17.1.1).
//!
//! ```text
//!  PreCalling --SndInvite--> Calling --1xx--> Proceeding
//!   Calling/Proceeding --2xx--> Terminated
//!   Calling/Proceeding --300-699 (send ACK)--> Completed --Timer D--> Terminated
//!   Calling/Proceeding --Timer B--> Terminated
//! ```

use std::time::Duration;

use siptx_sip_message::{Method, Request, Response};

use super::{by_class, request_of, response_of, StateMachine, Step};
use crate::callbacks::MessageCallbackKind;
use crate::event::{EventType, SipEvent};
use crate::transaction::{IctState, TimerName, TransactionContext, TransactionKind, TransactionState};

pub(crate) fn machine() -> StateMachine {
    use IctState::*;
    let s = TransactionState::Ict;

    StateMachine::new(TransactionKind::Ict)
        .on(&[s(PreCalling)], EventType::SndInvite, send_invite)
        .on(&[s(Calling)], EventType::TimeoutA, retransmit_invite)
        .on(&[s(Calling), s(Proceeding)], EventType::TimeoutB, timeout_b)
        .on(&[s(Calling), s(Proceeding)], EventType::RcvStatus1xx, receive_1xx)
        .on(&[s(Calling), s(Proceeding)], EventType::RcvStatus2xx, receive_2xx)
        .on(&[s(Calling), s(Proceeding)], EventType::RcvStatus3456xx, receive_3456xx)
        .on(&[s(Completed)], EventType::RcvStatus3456xx, retransmit_ack)
        .on(&[s(Completed)], EventType::TimeoutD, timeout_d)
        .killable(&[s(PreCalling), s(Calling), s(Proceeding), s(Completed)])
}

fn send_invite(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(invite) = request_of(event) {
        cx.original_request = invite;
    }
    let invite = cx.original_request.clone();

    if !cx.reliable {
        cx.timers.arm(TimerName::A, step.timers.t1, step.now);
    }
    cx.timers.arm(TimerName::B, step.timers.timer_b(), step.now);
    cx.state = TransactionState::Ict(IctState::Calling);

    step.send(cx, invite.clone());
    step.deliver(MessageCallbackKind::IctInviteSent, invite);
}

fn retransmit_invite(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    let interval = cx.timers.interval(TimerName::A).unwrap_or(step.timers.t1);
    cx.timers
        .arm(TimerName::A, (interval * 2).min(step.timers.t2), step.now);
    cx.retransmissions += 1;

    let invite = cx.original_request.clone();
    step.send(cx, invite.clone());
    step.deliver(MessageCallbackKind::IctInviteSentAgain, invite);
}

fn timeout_b(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.deliver(MessageCallbackKind::IctStatusTimeout, cx.original_request.clone());
    step.kill(cx);
}

fn receive_1xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    cx.timers.disarm(TimerName::A);
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Ict(IctState::Proceeding);
    step.deliver(MessageCallbackKind::IctStatus1xxReceived, response);
}

fn receive_2xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    cx.last_response = Some(response.clone());
    step.deliver(MessageCallbackKind::IctStatus2xxReceived, response);
    step.kill(cx);
}

fn receive_3456xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    let ack = build_ack(&cx.original_request, &response);
    let wait = if cx.reliable {
        Duration::ZERO
    } else {
        step.timers.timer_d
    };

    cx.timers.disarm(TimerName::A);
    cx.timers.disarm(TimerName::B);
    cx.timers.arm(TimerName::D, wait, step.now);
    cx.ack = Some(ack.clone());
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Ict(IctState::Completed);

    let kind = by_class(
        response.status,
        [
            MessageCallbackKind::IctStatus3xxReceived,
            MessageCallbackKind::IctStatus4xxReceived,
            MessageCallbackKind::IctStatus5xxReceived,
            MessageCallbackKind::IctStatus6xxReceived,
        ],
    );
    step.send(cx, ack);
    step.deliver(kind, response);
}

fn retransmit_ack(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(ack) = cx.ack.clone() {
        step.send(cx, ack);
    }
    if let Some(response) = response_of(event) {
        step.deliver(MessageCallbackKind::IctStatus3456xxReceivedAgain, response);
    }
}

fn timeout_d(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.kill(cx);
}

/// ACK for a non-2xx final response (RFC 3261 §17.1.1.3): Request-URI,
/// top Via, From, Call-ID, CSeq number and Route set of the INVITE, To of
/// the response.
pub(crate) fn build_ack(invite: &Request, response: &Response) -> Request {
    let mut builder = Request::builder(Method::Ack, invite.uri.clone());
    if let Some(via) = invite.top_via() {
        builder = builder.via(via.clone());
    }
    if let Some(from) = invite.from() {
        builder = builder.from(from.clone());
    }
    if let Some(to) = response.headers.to.clone().or_else(|| invite.to().cloned()) {
        builder = builder.to(to);
    }
    if let Some(call_id) = invite.call_id() {
        builder = builder.call_id(call_id);
    }
    if let Some(cseq) = invite.cseq() {
        builder = builder.cseq(cseq.seq, Method::Ack);
    }
    for route in invite.headers.get_all("Route") {
        builder = builder.header("Route", route);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use siptx_sip_message::{NameAddr, Via};

    #[test]
    fn test_build_ack_for_non_2xx() {
        let invite = Request::builder(Method::Invite, "sip:bob@biloxi.example.com")
            .via(Via::udp("pc33.atlanta.example.com", None).with_branch("z9hG4bKnashds8"))
            .via(Via::udp("bigbox3.site3.atlanta.example.com", None).with_branch("z9hG4bK77ef4c"))
            .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("9fxced76sl"))
            .to(NameAddr::new("sip:bob@biloxi.example.com"))
            .call_id("2xTb9vxSit55XU7p8@atlanta.example.com")
            .cseq(1, Method::Invite)
            .header("Route", "<sip:p1.example.com;lr>")
            .header("Contact", "<sip:alice@pc33.atlanta.example.com>")
            .body("v=0")
            .build();
        let busy = Response::for_request(&invite, 486, "Busy Here").with_to_tag("314159");

        let ack = build_ack(&invite, &busy);

        assert_eq!(ack.method, Method::Ack);
        assert_eq!(ack.uri, invite.uri);
        assert_eq!(ack.headers.via.len(), 1);
        assert_eq!(ack.branch(), Some("z9hG4bKnashds8"));
        assert_eq!(ack.to().and_then(|to| to.tag()), Some("314159"));
        assert_eq!(ack.from(), invite.from());
        assert_eq!(ack.cseq().map(|c| (c.seq, c.method.clone())), Some((1, Method::Ack)));
        assert_eq!(ack.headers.get("Route"), Some("<sip:p1.example.com;lr>"));
        assert_eq!(ack.headers.get("Contact"), None);
        assert!(ack.body.is_empty());
    }

    #[test]
    fn test_machine_ignores_responses_before_invite_sent() {
        let machine = machine();
        let pre = TransactionState::Ict(IctState::PreCalling);
        assert!(machine.handles(pre, EventType::SndInvite));
        assert!(!machine.handles(pre, EventType::RcvStatus2xx));
        assert!(!machine.handles(TransactionState::Ict(IctState::Completed), EventType::RcvStatus2xx));
    }
}

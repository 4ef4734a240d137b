//! INVITE server transaction (RFC 3261 §17.2.1).
//!
//! A 2xx sent by the TU terminates the transaction at once; 2xx
//! retransmission and its ACK belong to the dialog layer. Timer H expiring
//! without an ACK is reported through the transport-error callback.

use std::time::Duration;

use super::{by_class, request_of, response_of, StateMachine, Step};
use crate::callbacks::MessageCallbackKind;
use crate::error::TransportError;
use crate::event::{EventType, SipEvent};
use crate::transaction::{IstState, TimerName, TransactionContext, TransactionKind, TransactionState};

pub(crate) fn machine() -> StateMachine {
    use IstState::*;
    let s = TransactionState::Ist;

    StateMachine::new(TransactionKind::Ist)
        .on(&[s(PreProceeding)], EventType::RcvInvite, receive_invite)
        .on(&[s(Proceeding), s(Completed)], EventType::RcvInvite, receive_invite_again)
        .on(&[s(Proceeding)], EventType::SndStatus1xx, send_1xx)
        .on(&[s(Proceeding)], EventType::SndStatus2xx, send_2xx)
        .on(&[s(Proceeding)], EventType::SndStatus3456xx, send_3456xx)
        .on(&[s(Completed)], EventType::TimeoutG, retransmit_response)
        .on(&[s(Completed)], EventType::TimeoutH, timeout_h)
        .on(&[s(Completed)], EventType::RcvAck, receive_ack)
        .on(&[s(Confirmed)], EventType::RcvAck, receive_ack_again)
        .on(&[s(Confirmed)], EventType::TimeoutI, timeout_i)
        .killable(&[s(PreProceeding), s(Proceeding), s(Completed), s(Confirmed)])
}

fn receive_invite(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(invite) = request_of(event) {
        cx.original_request = invite;
    }
    cx.state = TransactionState::Ist(IstState::Proceeding);
    step.deliver(MessageCallbackKind::IstInviteReceived, cx.original_request.clone());
}

fn receive_invite_again(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(response) = cx.last_response.clone() {
        step.send(cx, response);
    }
    if let Some(invite) = request_of(event) {
        step.deliver(MessageCallbackKind::IstInviteReceivedAgain, invite);
    }
}

fn send_1xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    cx.last_response = Some(response.clone());
    step.send(cx, response.clone());
    step.deliver(MessageCallbackKind::IstStatus1xxSent, response);
}

fn send_2xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    cx.last_response = Some(response.clone());
    step.send(cx, response.clone());
    step.deliver(MessageCallbackKind::IstStatus2xxSent, response);
    step.kill(cx);
}

fn send_3456xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    if !cx.reliable {
        cx.timers.arm(TimerName::G, step.timers.t1, step.now);
    }
    cx.timers.arm(TimerName::H, step.timers.timer_h(), step.now);
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Ist(IstState::Completed);

    let kind = by_class(
        response.status,
        [
            MessageCallbackKind::IstStatus3xxSent,
            MessageCallbackKind::IstStatus4xxSent,
            MessageCallbackKind::IstStatus5xxSent,
            MessageCallbackKind::IstStatus6xxSent,
        ],
    );
    step.send(cx, response.clone());
    step.deliver(kind, response);
}

fn retransmit_response(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    let interval = cx.timers.interval(TimerName::G).unwrap_or(step.timers.t1);
    cx.timers
        .arm(TimerName::G, (interval * 2).min(step.timers.t2), step.now);
    cx.retransmissions += 1;

    if let Some(response) = cx.last_response.clone() {
        step.send(cx, response.clone());
        step.deliver(MessageCallbackKind::IstStatus3456xxSentAgain, response);
    }
}

fn timeout_h(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.transport_error(TransportError::AckTimeout);
    step.kill(cx);
}

fn receive_ack(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let wait = if cx.reliable {
        Duration::ZERO
    } else {
        step.timers.t4
    };
    cx.timers.disarm(TimerName::G);
    cx.timers.disarm(TimerName::H);
    cx.timers.arm(TimerName::I, wait, step.now);
    cx.state = TransactionState::Ist(IstState::Confirmed);

    if let Some(ack) = request_of(event) {
        step.deliver(MessageCallbackKind::IstAckReceived, ack);
    }
}

fn receive_ack_again(step: &mut Step<'_>, _cx: &mut TransactionContext, event: SipEvent) {
    if let Some(ack) = request_of(event) {
        step.deliver(MessageCallbackKind::IstAckReceivedAgain, ack);
    }
}

fn timeout_i(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.kill(cx);
}

//! Non-INVITE server transaction (RFC 3261 §17.2.2).

use std::time::Duration;

use super::{by_class, request_of, response_of, StateMachine, Step};
use crate::callbacks::MessageCallbackKind;
use crate::event::{EventType, SipEvent};
use crate::transaction::{NistState, TimerName, TransactionContext, TransactionKind, TransactionState};

pub(crate) fn machine() -> StateMachine {
    use NistState::*;
    let s = TransactionState::Nist;

    StateMachine::new(TransactionKind::Nist)
        .on(&[s(PreTrying)], EventType::RcvRequest, receive_request)
        .on(&[s(Trying), s(Proceeding)], EventType::SndStatus1xx, send_1xx)
        .on(&[s(Trying), s(Proceeding)], EventType::SndStatus2xx, send_final)
        .on(&[s(Trying), s(Proceeding)], EventType::SndStatus3456xx, send_final)
        .on(&[s(Proceeding), s(Completed)], EventType::RcvRequest, receive_request_again)
        .on(&[s(Completed)], EventType::TimeoutJ, timeout_j)
        .killable(&[s(PreTrying), s(Trying), s(Proceeding), s(Completed)])
}

fn receive_request(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(request) = request_of(event) {
        cx.original_request = request;
    }
    cx.state = TransactionState::Nist(NistState::Trying);
    step.deliver(MessageCallbackKind::NistRequestReceived, cx.original_request.clone());
}

fn send_1xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Nist(NistState::Proceeding);
    step.send(cx, response.clone());
    step.deliver(MessageCallbackKind::NistStatus1xxSent, response);
}

fn send_final(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    let wait = if cx.reliable {
        Duration::ZERO
    } else {
        step.timers.timer_j()
    };
    cx.timers.arm(TimerName::J, wait, step.now);
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Nist(NistState::Completed);

    let kind = if response.is_success() {
        MessageCallbackKind::NistStatus2xxSent
    } else {
        by_class(
            response.status,
            [
                MessageCallbackKind::NistStatus3xxSent,
                MessageCallbackKind::NistStatus4xxSent,
                MessageCallbackKind::NistStatus5xxSent,
                MessageCallbackKind::NistStatus6xxSent,
            ],
        )
    };
    step.send(cx, response.clone());
    step.deliver(kind, response);
}

fn receive_request_again(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(response) = cx.last_response.clone() {
        step.send(cx, response);
    }
    if let Some(request) = request_of(event) {
        step.deliver(MessageCallbackKind::NistRequestReceivedAgain, request);
    }
}

fn timeout_j(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.kill(cx);
}

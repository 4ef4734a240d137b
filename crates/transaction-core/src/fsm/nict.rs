//! Non-INVITE client transaction (RFC 3261 §17.1.2).

use std::time::Duration;

use super::{by_class, request_of, response_of, StateMachine, Step};
use crate::callbacks::MessageCallbackKind;
use crate::event::{EventType, SipEvent};
use crate::transaction::{NictState, TimerName, TransactionContext, TransactionKind, TransactionState};

pub(crate) fn machine() -> StateMachine {
    use NictState::*;
    let s = TransactionState::Nict;

    StateMachine::new(TransactionKind::Nict)
        .on(&[s(PreTrying)], EventType::SndRequest, send_request)
        .on(&[s(Trying), s(Proceeding)], EventType::TimeoutE, retransmit_request)
        .on(&[s(Trying), s(Proceeding)], EventType::TimeoutF, timeout_f)
        .on(&[s(Trying), s(Proceeding)], EventType::RcvStatus1xx, receive_1xx)
        .on(&[s(Trying), s(Proceeding)], EventType::RcvStatus2xx, receive_final)
        .on(&[s(Trying), s(Proceeding)], EventType::RcvStatus3456xx, receive_final)
        .on(&[s(Completed)], EventType::RcvStatus2xx, receive_final_again)
        .on(&[s(Completed)], EventType::RcvStatus3456xx, receive_final_again)
        .on(&[s(Completed)], EventType::TimeoutK, timeout_k)
        .killable(&[s(PreTrying), s(Trying), s(Proceeding), s(Completed)])
}

fn send_request(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    if let Some(request) = request_of(event) {
        cx.original_request = request;
    }
    let request = cx.original_request.clone();

    if !cx.reliable {
        cx.timers.arm(TimerName::E, step.timers.t1, step.now);
    }
    cx.timers.arm(TimerName::F, step.timers.timer_f(), step.now);
    cx.state = TransactionState::Nict(NictState::Trying);

    step.send(cx, request.clone());
    step.deliver(MessageCallbackKind::NictRequestSent, request);
}

fn retransmit_request(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    // Proceeding retransmits at T2 (§17.1.2.2)
    let next = if cx.state == TransactionState::Nict(NictState::Trying) {
        let interval = cx.timers.interval(TimerName::E).unwrap_or(step.timers.t1);
        (interval * 2).min(step.timers.t2)
    } else {
        step.timers.t2
    };
    cx.timers.arm(TimerName::E, next, step.now);
    cx.retransmissions += 1;

    let request = cx.original_request.clone();
    step.send(cx, request.clone());
    step.deliver(MessageCallbackKind::NictRequestSentAgain, request);
}

fn timeout_f(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.deliver(MessageCallbackKind::NictStatusTimeout, cx.original_request.clone());
    step.kill(cx);
}

fn receive_1xx(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Nict(NictState::Proceeding);
    step.deliver(MessageCallbackKind::NictStatus1xxReceived, response);
}

fn receive_final(step: &mut Step<'_>, cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    let wait = if cx.reliable {
        Duration::ZERO
    } else {
        step.timers.t4
    };
    cx.timers.disarm(TimerName::E);
    cx.timers.disarm(TimerName::F);
    cx.timers.arm(TimerName::K, wait, step.now);
    cx.last_response = Some(response.clone());
    cx.state = TransactionState::Nict(NictState::Completed);

    let kind = if response.is_success() {
        MessageCallbackKind::NictStatus2xxReceived
    } else {
        by_class(
            response.status,
            [
                MessageCallbackKind::NictStatus3xxReceived,
                MessageCallbackKind::NictStatus4xxReceived,
                MessageCallbackKind::NictStatus5xxReceived,
                MessageCallbackKind::NictStatus6xxReceived,
            ],
        )
    };
    step.deliver(kind, response);
}

fn receive_final_again(step: &mut Step<'_>, _cx: &mut TransactionContext, event: SipEvent) {
    let Some(response) = response_of(event) else {
        return;
    };
    let kind = if response.is_success() {
        MessageCallbackKind::NictStatus2xxReceivedAgain
    } else {
        MessageCallbackKind::NictStatus3456xxReceivedAgain
    };
    step.deliver(kind, response);
}

fn timeout_k(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.kill(cx);
}

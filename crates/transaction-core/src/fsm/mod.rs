//! # Transaction state machines
//!
//! One generic engine drives all four transaction kinds. What differs per
//! kind is data: a [`StateMachine`] maps `(state, event)` pairs to actions,
//! built once by [`ict`], [`ist`], [`nict`] and [`nist`] and shared by every
//! layer of a runtime.
//!
//! ## Execution of one event
//!
//! 1. The transaction's context lock is taken and the action for the current
//!    `(state, event)` pair is looked up. Pairs without an action are ignored
//!    and leave the state untouched.
//! 2. The action updates the context (state, timers, stored messages) and
//!    records [`Effect`]s: messages to send, messages to deliver to the
//!    application, transport errors to report, a kill notification.
//! 3. The lock is released and the effects are applied in order. No lock is
//!    held while the transport or any application callback runs.
//!
//! A failed send reports the error through the transport-error callback,
//! forces the transaction to Terminated, fires the kill callback and drops
//! the remaining effects of that step.

pub(crate) mod ict;
pub(crate) mod ist;
pub(crate) mod nict;
pub(crate) mod nist;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use siptx_sip_message::{Request, Response, SipMessage};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::callbacks::{CallbackRegistry, MessageCallbackKind};
use crate::config::TimerSettings;
use crate::error::TransportError;
use crate::event::{EventType, SipEvent};
use crate::transaction::{Transaction, TransactionContext, TransactionKind, TransactionState};
use crate::transport::{Destination, Transport};

/// Side effect recorded by an action, applied once the context lock is released.
#[derive(Debug)]
pub(crate) enum Effect {
    Send {
        message: SipMessage,
        destination: Option<Destination>,
    },
    Deliver(MessageCallbackKind, SipMessage),
    TransportError(TransportError),
    Kill,
}

/// Per-event scratch space handed to actions.
pub(crate) struct Step<'a> {
    pub(crate) timers: &'a TimerSettings,
    pub(crate) now: Instant,
    effects: Vec<Effect>,
}

impl<'a> Step<'a> {
    pub(crate) fn new(timers: &'a TimerSettings, now: Instant) -> Self {
        Self {
            timers,
            now,
            effects: Vec::new(),
        }
    }

    /// Queues `message` for the transport, addressed to the transaction's destination.
    pub(crate) fn send(&mut self, cx: &TransactionContext, message: impl Into<SipMessage>) {
        self.effects.push(Effect::Send {
            message: message.into(),
            destination: cx.destination.clone(),
        });
    }

    pub(crate) fn deliver(&mut self, kind: MessageCallbackKind, message: impl Into<SipMessage>) {
        self.effects.push(Effect::Deliver(kind, message.into()));
    }

    pub(crate) fn transport_error(&mut self, error: TransportError) {
        self.effects.push(Effect::TransportError(error));
    }

    /// Terminates the transaction and queues the kill notification.
    pub(crate) fn kill(&mut self, cx: &mut TransactionContext) {
        cx.terminate();
        self.effects.push(Effect::Kill);
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

pub(crate) type Action = fn(&mut Step<'_>, &mut TransactionContext, SipEvent);

/// Transition table of one transaction kind.
pub struct StateMachine {
    kind: TransactionKind,
    transitions: HashMap<(TransactionState, EventType), Action>,
}

impl StateMachine {
    pub(crate) fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            transitions: HashMap::new(),
        }
    }

    /// Registers `action` for `event` in each of `states`.
    pub(crate) fn on(mut self, states: &[TransactionState], event: EventType, action: Action) -> Self {
        for state in states {
            self.transitions.insert((*state, event), action);
        }
        self
    }

    /// Lets the application terminate the transaction from any of `states`.
    pub(crate) fn killable(self, states: &[TransactionState]) -> Self {
        self.on(states, EventType::KillTransaction, kill_transaction)
    }

    pub(crate) fn action(&self, state: TransactionState, event: EventType) -> Option<Action> {
        self.transitions.get(&(state, event)).copied()
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Whether `(state, event)` has a transition.
    pub fn handles(&self, state: TransactionState, event: EventType) -> bool {
        self.transitions.contains_key(&(state, event))
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("kind", &self.kind)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

fn kill_transaction(step: &mut Step<'_>, cx: &mut TransactionContext, _event: SipEvent) {
    step.kill(cx);
}

/// The four transition tables, loaded once per runtime.
#[derive(Debug)]
pub struct StateMachines {
    ict: StateMachine,
    ist: StateMachine,
    nict: StateMachine,
    nist: StateMachine,
}

impl StateMachines {
    pub(crate) fn load() -> Self {
        Self {
            ict: ict::machine(),
            ist: ist::machine(),
            nict: nict::machine(),
            nist: nist::machine(),
        }
    }

    pub fn get(&self, kind: TransactionKind) -> &StateMachine {
        match kind {
            TransactionKind::Ict => &self.ict,
            TransactionKind::Ist => &self.ist,
            TransactionKind::Nict => &self.nict,
            TransactionKind::Nist => &self.nist,
        }
    }
}

/// What an engine run needs from its layer.
pub(crate) struct Env<'a> {
    pub(crate) timers: &'a TimerSettings,
    pub(crate) callbacks: &'a CallbackRegistry,
    pub(crate) transport: Option<Arc<dyn Transport>>,
}

/// Runs one event through `tx`'s state machine and applies the effects.
pub(crate) fn run(machine: &StateMachine, env: &Env<'_>, tx: &Transaction, event: SipEvent) {
    let event_type = event.event_type;
    let effects = {
        let mut cx = tx.context();
        let before = cx.state;
        let Some(action) = machine.action(before, event_type) else {
            trace!(id = %tx.id(), kind = %tx.kind(), state = ?before, event = ?event_type, "No transition, event ignored");
            return;
        };

        let mut step = Step::new(env.timers, Instant::now());
        action(&mut step, &mut cx, event);
        if cx.state != before {
            debug!(id = %tx.id(), kind = %tx.kind(), from = ?before, to = ?cx.state, event = ?event_type, "Transaction state changed");
        }
        step.into_effects()
    };

    apply(env, tx, effects);
}

fn apply(env: &Env<'_>, tx: &Transaction, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Send {
                message,
                destination,
            } => {
                if let Err(error) = transmit(env, tx, &message, destination.as_ref()) {
                    error!(id = %tx.id(), kind = %tx.kind(), %error, "Send failed, terminating transaction");
                    tx.context().terminate();
                    env.callbacks.notify_transport_error(tx, &error);
                    env.callbacks.notify_kill(tx);
                    return;
                }
            }
            Effect::Deliver(kind, message) => env.callbacks.notify_message(kind, tx, &message),
            Effect::TransportError(error) => {
                warn!(id = %tx.id(), kind = %tx.kind(), %error, "Transport error");
                env.callbacks.notify_transport_error(tx, &error);
            }
            Effect::Kill => {
                debug!(id = %tx.id(), kind = %tx.kind(), "Transaction terminated");
                env.callbacks.notify_kill(tx);
            }
        }
    }
}

fn transmit(
    env: &Env<'_>,
    tx: &Transaction,
    message: &SipMessage,
    destination: Option<&Destination>,
) -> Result<(), TransportError> {
    let transport = env.transport.as_ref().ok_or(TransportError::NoTransport)?;
    let destination = destination.ok_or(TransportError::NoDestination)?;
    trace!(id = %tx.id(), %destination, "Sending message");
    transport.send(tx, message, destination)
}

/// Picks the 3xx/4xx/5xx/6xx variant of a final-response callback.
pub(crate) fn by_class(status: u16, kinds: [MessageCallbackKind; 4]) -> MessageCallbackKind {
    match status {
        300..=399 => kinds[0],
        400..=499 => kinds[1],
        500..=599 => kinds[2],
        _ => kinds[3],
    }
}

pub(crate) fn request_of(event: SipEvent) -> Option<Request> {
    match event.message {
        Some(SipMessage::Request(request)) => Some(request),
        _ => None,
    }
}

pub(crate) fn response_of(event: SipEvent) -> Option<Response> {
    match event.message {
        Some(SipMessage::Response(response)) => Some(response),
        _ => None,
    }
}

//! # SIP transaction layer
//!
//! This crate implements the four RFC 3261 §17 transaction state machines
//! and the plumbing that feeds them:
//!
//! - **ICT** (INVITE client transaction): retransmits the INVITE on Timer A,
//!   gives up on Timer B, builds and sends the ACK for non-2xx finals
//! - **IST** (INVITE server transaction): absorbs INVITE retransmissions,
//!   retransmits non-2xx finals on Timer G until the ACK arrives
//! - **NICT** (non-INVITE client transaction): retransmits on Timer E,
//!   gives up on Timer F
//! - **NIST** (non-INVITE server transaction): replays the last response to
//!   request retransmissions until Timer J
//!
//! ## Architecture
//!
//! ```text
//!   parser / app ──SipEvent──► dispatcher ──► table (ICT|IST|NICT|NIST)
//!                                                  │ per-transaction FIFO
//!   timers pass ──timeout events──────────────────►│
//!                                                  ▼
//!                                 execute pass: state machine runs event
//!                                                  │
//!                          transport ◄── send ─────┤
//!                          callbacks ◄── deliver ──┘
//! ```
//!
//! A [`TransactionLayer`] owns the tables, the callback registry and the
//! transport. Events are dispatched into a transaction's queue and only run
//! when the application (or [`spawn`]) calls the execute and timer passes,
//! so every state change happens on the thread driving the layer.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use siptx_transaction_core::prelude::*;
//!
//! let layer = TransactionLayer::init(Arc::new(StackRuntime::new()), TransactionLayerConfig::default())
//!     .expect("valid configuration");
//! layer.set_transport(|_tx: &Transaction, _msg: &SipMessage, _dest: &Destination| {
//!     Ok::<(), TransportError>(())
//! });
//!
//! let options = Request::builder(Method::Options, "sip:carol@chicago.example.com")
//!     .via(Via::udp("pc33.atlanta.example.com", None).with_branch(layer.generate_branch()))
//!     .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("1928301774"))
//!     .to(NameAddr::new("sip:carol@chicago.example.com"))
//!     .call_id("a84b4c76e66710")
//!     .cseq(63104, Method::Options)
//!     .build();
//!
//! let mut event = SipEvent::outgoing(options);
//! let tx = layer.create_transaction(&mut event).expect("well-formed request");
//! layer.dispatch(event).expect("dispatched");
//! layer.execute_all();
//!
//! assert_eq!(tx.state(), TransactionState::Nict(NictState::Trying));
//! ```
//!
//! ## Timers
//!
//! Timer values come from [`TimerSettings`]: T1, T2, T4 and Timer D, with
//! B, F, H and J derived as 64·T1. Over reliable transports the
//! wait-for-retransmission timers (D, I, J, K) fire immediately and the
//! retransmission timers (A, E, G) are never armed.

pub mod callbacks;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
mod fsm;
pub mod layer;
pub mod runtime;
pub mod scheduler;
pub mod table;
pub mod transaction;
pub mod transport;

pub use callbacks::{
    CallbackRegistry, KillCallback, KillCallbackKind, MessageCallback, MessageCallbackKind,
    TransportErrorCallback, TransportErrorCallbackKind,
};
pub use config::{ThreadingModel, TimerSettings, TransactionLayerConfig, MAX_TIMER_VALUE};
pub use dispatcher::{table_kind, Dispatch};
pub use error::{Error, Result, TransportError};
pub use event::{Direction, EventType, SipEvent};
pub use layer::TransactionLayer;
pub use runtime::StackRuntime;
pub use scheduler::{spawn, SchedulerHandle};
pub use table::TransactionTable;
pub use transaction::{
    EventQueue, IctState, IstState, MatchKeys, NictState, NistState, TimerName, Transaction,
    TransactionId, TransactionKind, TransactionState,
};
pub use transport::{Destination, Transport};

pub use siptx_sip_message::{
    CSeq, Headers, Method, NameAddr, Request, RequestBuilder, Response, SipMessage, SipUri,
    StatusClass, TransportProtocol, Via, BRANCH_MAGIC_COOKIE,
};

/// Re-export of common types and functions
pub mod prelude {
    pub use crate::{
        spawn, CallbackRegistry, Destination, Direction, Dispatch, Error, EventType,
        IctState, IstState, KillCallbackKind, MessageCallbackKind, NictState, NistState,
        Result, SchedulerHandle, SipEvent, StackRuntime, TimerSettings, Transaction,
        TransactionId, TransactionKind, TransactionLayer, TransactionLayerConfig,
        TransactionState, Transport, TransportError, TransportErrorCallbackKind,
    };
    pub use siptx_sip_message::{
        Method, NameAddr, Request, Response, SipMessage, StatusClass, TransportProtocol, Via,
    };
}

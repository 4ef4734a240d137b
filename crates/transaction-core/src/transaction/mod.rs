//! # SIP Transactions
//!
//! A transaction is one request plus every response to it (RFC 3261 §17).
//! Four kinds exist, each with its own state machine:
//!
//! ```text
//!                 client side                 server side
//!   INVITE        ICT  (§17.1.1)              IST  (§17.2.1)
//!   non-INVITE    NICT (§17.1.2)              NIST (§17.2.2)
//! ```
//!
//! A [`Transaction`] owns:
//!
//! - its identity: a [`TransactionId`] allocated from the runtime, its
//!   [`TransactionKind`] and the [`MatchKeys`] copied from the creating request
//! - a private [`EventQueue`] fed by the dispatcher and drained by the scheduler
//! - a locked protocol context (state, armed timers, retransmission count,
//!   original request, last response, ACK, destination)
//! - optional per-transaction application data
//!
//! Every transaction starts in a `Pre*` state and only leaves it when its
//! engine runs the first queued event.

pub mod keys;
pub mod queue;
pub mod timer;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use siptx_sip_message::{Request, Response, SipUri};
use tokio::time::Instant;

use crate::error::Result;
use crate::transport::Destination;

pub use keys::MatchKeys;
pub use queue::EventQueue;
pub use timer::TimerName;

use timer::TimerSet;

/// Process-lifetime unique identifier of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four transaction kinds of RFC 3261 §17.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionKind {
    /// INVITE client transaction
    Ict,
    /// INVITE server transaction
    Ist,
    /// Non-INVITE client transaction
    Nict,
    /// Non-INVITE server transaction
    Nist,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 4] = [
        TransactionKind::Ict,
        TransactionKind::Ist,
        TransactionKind::Nict,
        TransactionKind::Nist,
    ];

    pub fn from_parts(invite: bool, client: bool) -> Self {
        match (invite, client) {
            (true, true) => TransactionKind::Ict,
            (true, false) => TransactionKind::Ist,
            (false, true) => TransactionKind::Nict,
            (false, false) => TransactionKind::Nist,
        }
    }

    pub fn is_client(self) -> bool {
        matches!(self, TransactionKind::Ict | TransactionKind::Nict)
    }

    pub fn is_invite(self) -> bool {
        matches!(self, TransactionKind::Ict | TransactionKind::Ist)
    }

    /// State assigned at creation, before the first event runs.
    pub fn initial_state(self) -> TransactionState {
        match self {
            TransactionKind::Ict => TransactionState::Ict(IctState::PreCalling),
            TransactionKind::Ist => TransactionState::Ist(IstState::PreProceeding),
            TransactionKind::Nict => TransactionState::Nict(NictState::PreTrying),
            TransactionKind::Nist => TransactionState::Nist(NistState::PreTrying),
        }
    }

    pub fn terminated_state(self) -> TransactionState {
        match self {
            TransactionKind::Ict => TransactionState::Ict(IctState::Terminated),
            TransactionKind::Ist => TransactionState::Ist(IstState::Terminated),
            TransactionKind::Nict => TransactionState::Nict(NictState::Terminated),
            TransactionKind::Nist => TransactionState::Nist(NistState::Terminated),
        }
    }

    /// Order in which the timer pass checks this kind's timers.
    pub fn timer_priority(self) -> &'static [TimerName] {
        match self {
            TransactionKind::Ict => &[TimerName::B, TimerName::A, TimerName::D],
            TransactionKind::Ist => &[TimerName::I, TimerName::H, TimerName::G],
            TransactionKind::Nict => &[TimerName::K, TimerName::F, TimerName::E],
            TransactionKind::Nist => &[TimerName::J],
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionKind::Ict => "ICT",
            TransactionKind::Ist => "IST",
            TransactionKind::Nict => "NICT",
            TransactionKind::Nist => "NIST",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IctState {
    PreCalling,
    Calling,
    Proceeding,
    Completed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IstState {
    PreProceeding,
    Proceeding,
    Completed,
    Confirmed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NictState {
    PreTrying,
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NistState {
    PreTrying,
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// State of a transaction, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Ict(IctState),
    Ist(IstState),
    Nict(NictState),
    Nist(NistState),
}

impl TransactionState {
    pub fn kind(self) -> TransactionKind {
        match self {
            TransactionState::Ict(_) => TransactionKind::Ict,
            TransactionState::Ist(_) => TransactionKind::Ist,
            TransactionState::Nict(_) => TransactionKind::Nict,
            TransactionState::Nist(_) => TransactionKind::Nist,
        }
    }

    pub fn is_terminated(self) -> bool {
        self == self.kind().terminated_state()
    }
}

/// Protocol context guarded by the transaction's state lock.
#[derive(Debug)]
pub(crate) struct TransactionContext {
    pub(crate) state: TransactionState,
    pub(crate) timers: TimerSet,
    pub(crate) retransmissions: u32,
    pub(crate) original_request: Request,
    pub(crate) last_response: Option<Response>,
    /// ACK generated for a non-2xx final response (ICT only)
    pub(crate) ack: Option<Request>,
    pub(crate) destination: Option<Destination>,
    pub(crate) reliable: bool,
}

impl TransactionContext {
    /// Moves to Terminated and drops every armed timer.
    pub(crate) fn terminate(&mut self) {
        self.state = self.state.kind().terminated_state();
        self.timers.clear();
    }
}

/// A live SIP transaction.
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    keys: MatchKeys,
    queue: EventQueue,
    context: Mutex<TransactionContext>,
    application_data: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl Transaction {
    /// Builds a transaction around its creating request.
    ///
    /// Client transactions default to the Request-URI as destination, server
    /// transactions to the response target of the topmost Via.
    pub(crate) fn new(id: TransactionId, kind: TransactionKind, request: Request) -> Result<Self> {
        let keys = MatchKeys::from_request(&request)?;
        let reliable = request
            .top_via()
            .map(|via| via.protocol.is_reliable())
            .unwrap_or(false);
        let destination = if kind.is_client() {
            SipUri::parse(&request.uri)
                .ok()
                .map(|uri| Destination::from_uri(&uri))
        } else {
            request.top_via().map(Destination::from_via)
        };

        Ok(Self {
            id,
            kind,
            keys,
            queue: EventQueue::new(),
            context: Mutex::new(TransactionContext {
                state: kind.initial_state(),
                timers: TimerSet::default(),
                retransmissions: 0,
                original_request: request,
                last_response: None,
                ack: None,
                destination,
                reliable,
            }),
            application_data: RwLock::new(None),
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn keys(&self) -> &MatchKeys {
        &self.keys
    }

    pub fn state(&self) -> TransactionState {
        self.context.lock().state
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    pub fn original_request(&self) -> Request {
        self.context.lock().original_request.clone()
    }

    pub fn last_response(&self) -> Option<Response> {
        self.context.lock().last_response.clone()
    }

    /// The ACK an ICT sent for a non-2xx final response.
    pub fn ack(&self) -> Option<Request> {
        self.context.lock().ack.clone()
    }

    pub fn destination(&self) -> Option<Destination> {
        self.context.lock().destination.clone()
    }

    /// Overrides where this transaction sends its messages.
    pub fn set_destination(&self, destination: Destination) {
        self.context.lock().destination = Some(destination);
    }

    pub fn is_reliable(&self) -> bool {
        self.context.lock().reliable
    }

    /// Number of retransmissions triggered by timers A, E or G.
    pub fn retransmissions(&self) -> u32 {
        self.context.lock().retransmissions
    }

    /// Current interval of an armed timer.
    pub fn timer_interval(&self, name: TimerName) -> Option<Duration> {
        self.context.lock().timers.interval(name)
    }

    /// Events queued and not yet executed.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn set_application_data<T: Any + Send + Sync>(&self, data: T) {
        *self.application_data.write() = Some(Arc::new(data));
    }

    /// Application data previously stored, if it is a `T`.
    pub fn application_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.application_data.read().clone()?;
        data.downcast::<T>().ok()
    }

    pub(crate) fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub(crate) fn context(&self) -> MutexGuard<'_, TransactionContext> {
        self.context.lock()
    }

    /// To tag of the last response, used to match RFC 2543 ACKs.
    pub(crate) fn last_response_to_tag(&self) -> Option<String> {
        self.context
            .lock()
            .last_response
            .as_ref()
            .and_then(|resp| resp.to_tag())
            .map(str::to_string)
    }

    /// Whether the last response sent or received was a 3xx-6xx final.
    pub(crate) fn last_final_is_non_2xx(&self) -> bool {
        self.context
            .lock()
            .last_response
            .as_ref()
            .is_some_and(|response| response.status >= 300)
    }

    /// First timer, in the kind's priority order, that is due at `now`.
    pub(crate) fn due_timer(&self, now: Instant) -> Option<TimerName> {
        let context = self.context.lock();
        self.kind
            .timer_priority()
            .iter()
            .copied()
            .find(|name| name.active_in(context.state) && context.timers.is_due(*name, now))
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("branch", &self.keys.branch)
            .field("call_id", &self.keys.call_id)
            .field("pending_events", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siptx_sip_message::{Method, NameAddr, TransportProtocol, Via};

    fn options(via: Via) -> Request {
        Request::builder(Method::Options, "sip:carol@chicago.example.com;transport=tcp")
            .via(via)
            .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("a1"))
            .to(NameAddr::new("sip:carol@chicago.example.com"))
            .call_id("opts-1")
            .cseq(1, Method::Options)
            .build()
    }

    #[test]
    fn test_kind_helpers() {
        assert_eq!(TransactionKind::from_parts(true, true), TransactionKind::Ict);
        assert_eq!(TransactionKind::from_parts(false, false), TransactionKind::Nist);
        assert!(TransactionKind::Nict.is_client());
        assert!(!TransactionKind::Nist.is_invite());
        assert_eq!(
            TransactionKind::Ict.timer_priority(),
            &[TimerName::B, TimerName::A, TimerName::D]
        );
        for kind in TransactionKind::ALL {
            assert_eq!(kind.initial_state().kind(), kind);
            assert!(kind.terminated_state().is_terminated());
            assert!(!kind.initial_state().is_terminated());
        }
    }

    #[test]
    fn test_default_destinations() {
        let client = Transaction::new(
            TransactionId(1),
            TransactionKind::Nict,
            options(Via::udp("pc33.atlanta.example.com", None).with_branch("z9hG4bK1")),
        )
        .unwrap();
        assert_eq!(
            client.destination(),
            Some(Destination::new("chicago.example.com", 5060, TransportProtocol::Tcp))
        );
        assert!(!client.is_reliable());

        let server = Transaction::new(
            TransactionId(2),
            TransactionKind::Nist,
            options(
                Via::tcp("pc33.atlanta.example.com", Some(5070))
                    .with_branch("z9hG4bK2")
                    .with_param("received", Some("192.0.2.1".into())),
            ),
        )
        .unwrap();
        assert_eq!(
            server.destination(),
            Some(Destination::new("192.0.2.1", 5070, TransportProtocol::Tcp))
        );
        assert!(server.is_reliable());
        assert_eq!(server.state(), TransactionState::Nist(NistState::PreTrying));
    }

    #[test]
    fn test_application_data_downcast() {
        let tx = Transaction::new(
            TransactionId(3),
            TransactionKind::Nist,
            options(Via::udp("pc33.atlanta.example.com", None).with_branch("z9hG4bK3")),
        )
        .unwrap();
        assert!(tx.application_data::<String>().is_none());

        tx.set_application_data(String::from("call-42"));
        assert_eq!(tx.application_data::<String>().as_deref().map(String::as_str), Some("call-42"));
        assert!(tx.application_data::<u32>().is_none());
    }
}

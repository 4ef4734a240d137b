//! # Dispatcher
//!
//! Routes an event to the transaction it belongs to, creating a server
//! transaction for an unmatched incoming request.
//!
//! ## Table selection
//!
//! | Message                 | CSeq method INVITE/ACK | other |
//! |-------------------------|------------------------|-------|
//! | incoming request        | IST                    | NIST  |
//! | incoming response       | ICT                    | NICT  |
//! | outgoing request        | ICT                    | NICT  |
//! | outgoing response       | IST                    | NIST  |
//!
//! ## Matching
//!
//! Incoming requests and responses are matched on their keys (see
//! [`MatchKeys`](crate::transaction::MatchKeys)). An ACK only matches an
//! IST that has sent a 3xx-6xx final response. ACKs for a 2xx, or for an
//! INVITE not yet answered with a final, are handed back unmatched.
//! Outgoing events must carry the id of the transaction created for them.
//! Outgoing ACKs are rejected: the client transaction builds the ACK for a
//! non-2xx final itself, and the ACK for a 2xx is sent by the dialog layer
//! straight to the transport.
//!
//! The matched event is queued while the table lock is still held, so the
//! scheduler can never see the transaction without it.

use std::sync::Arc;

use siptx_sip_message::{Method, SipMessage};
use tracing::{debug, trace, warn};

use crate::config::ThreadingModel;
use crate::error::{Error, Result};
use crate::event::{Direction, EventType, SipEvent};
use crate::layer::TransactionLayer;
use crate::table::LockedTable;
use crate::transaction::{Transaction, TransactionKind};

/// Outcome of dispatching an event.
#[derive(Debug)]
pub enum Dispatch {
    /// The event was queued on an existing transaction
    Matched(Arc<Transaction>),
    /// A new server transaction was created and the event queued on it
    Created(Arc<Transaction>),
    /// No transaction wants the event (stray response, 2xx ACK, ...); it is
    /// handed back for the caller to discard or pass upward
    Unmatched(SipEvent),
}

impl Dispatch {
    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        match self {
            Dispatch::Matched(tx) | Dispatch::Created(tx) => Some(tx),
            Dispatch::Unmatched(_) => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Dispatch::Created(_))
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(self, Dispatch::Unmatched(_))
    }
}

/// Table an event belongs to, from its direction, message kind and CSeq method.
pub fn table_kind(event: &SipEvent) -> Result<TransactionKind> {
    let direction = event
        .direction()
        .ok_or_else(|| Error::validation("timer and kill events are not dispatched"))?;
    if event.event_type == EventType::SndAck {
        return Err(Error::validation("outgoing ACKs bypass the transaction layer"));
    }
    let message = event
        .message
        .as_ref()
        .ok_or_else(|| Error::validation("event carries no message"))?;
    let cseq = message
        .cseq()
        .ok_or_else(|| Error::validation("message has no CSeq header"))?;

    let client = match (direction, message.is_request()) {
        (Direction::Incoming, true) | (Direction::Outgoing, false) => false,
        (Direction::Incoming, false) | (Direction::Outgoing, true) => true,
    };
    Ok(TransactionKind::from_parts(cseq.method.is_invite_family(), client))
}

impl TransactionLayer {
    /// Queues `event` on its transaction, creating one for an unmatched
    /// incoming request.
    pub fn dispatch(&self, event: SipEvent) -> Result<Dispatch> {
        self.find_or_create(event)
    }

    pub fn find_or_create(&self, event: SipEvent) -> Result<Dispatch> {
        self.route(event, true)
    }

    /// Queues `event` on a matching transaction; never creates one.
    pub fn find_transaction_and_add_event(&self, event: SipEvent) -> Result<Dispatch> {
        self.route(event, false)
    }

    /// Looks up the transaction `event` belongs to without queuing it.
    ///
    /// The returned transaction may be executed or removed concurrently in
    /// [`ThreadingModel::Multithreaded`] mode; prefer
    /// [`find_transaction_and_add_event`](Self::find_transaction_and_add_event) there.
    pub fn find_transaction(&self, event: &SipEvent) -> Result<Option<Arc<Transaction>>> {
        if self.config.threading == ThreadingModel::Multithreaded {
            warn!("find_transaction is racy in multithreaded mode, use find_transaction_and_add_event");
        }
        let kind = table_kind(event)?;
        let locked = self.table(kind).lock();
        Ok(find_match(&locked, event))
    }

    /// Creates a transaction for the request in `event` and stamps the event
    /// with its id. The event is not queued.
    ///
    /// Incoming requests create server transactions, outgoing requests
    /// client transactions. Responses, ACKs, requests whose CSeq method
    /// differs from the request method and requests missing Via, From, To,
    /// Call-ID or CSeq are rejected; nothing is registered on failure.
    pub fn create_transaction(&self, event: &mut SipEvent) -> Result<Arc<Transaction>> {
        let tx = self.new_transaction(event).inspect_err(|error| {
            warn!(%error, event = ?event.event_type, "Transaction creation rejected");
        })?;
        self.table(tx.kind()).insert(tx.clone())?;
        event.transaction_id = Some(tx.id());
        debug!(id = %tx.id(), kind = %tx.kind(), "Transaction created");
        Ok(tx)
    }

    fn route(&self, mut event: SipEvent, create: bool) -> Result<Dispatch> {
        let kind = table_kind(&event).inspect_err(|error| {
            warn!(%error, event = ?event.event_type, "Discarding event");
        })?;

        let mut locked = self.table(kind).lock();
        if let Some(tx) = find_match(&locked, &event) {
            trace!(id = %tx.id(), %kind, event = ?event.event_type, "Event matched transaction");
            event.transaction_id = Some(tx.id());
            tx.queue().push(event);
            return Ok(Dispatch::Matched(tx));
        }

        let creates = create && matches!(event.event_type, EventType::RcvInvite | EventType::RcvRequest);
        if !creates {
            debug!(%kind, event = ?event.event_type, "No matching transaction");
            return Ok(Dispatch::Unmatched(event));
        }

        let tx = self.new_transaction(&event).inspect_err(|error| {
            warn!(%error, "Discarding request");
        })?;
        locked.insert(tx.clone())?;
        debug!(id = %tx.id(), kind = %tx.kind(), "Transaction created");
        event.transaction_id = Some(tx.id());
        tx.queue().push(event);
        Ok(Dispatch::Created(tx))
    }

    fn new_transaction(&self, event: &SipEvent) -> Result<Arc<Transaction>> {
        let direction = event
            .direction()
            .ok_or_else(|| Error::validation("only message events create transactions"))?;
        let request = match event.message.as_ref() {
            Some(SipMessage::Request(request)) => request,
            Some(SipMessage::Response(_)) => {
                return Err(Error::validation("responses never create transactions"));
            }
            None => return Err(Error::validation("event carries no message")),
        };
        if request.method == Method::Ack {
            return Err(Error::validation("ACK never creates a transaction"));
        }
        let cseq = request
            .cseq()
            .ok_or_else(|| Error::validation("request has no CSeq header"))?;
        if cseq.method != request.method {
            return Err(Error::Validation(format!(
                "CSeq method {} does not match request method {}",
                cseq.method, request.method
            )));
        }

        let kind = TransactionKind::from_parts(
            request.method == Method::Invite,
            direction == Direction::Outgoing,
        );
        let id = self.runtime().next_transaction_id();
        Ok(Arc::new(Transaction::new(id, kind, request.clone())?))
    }
}

fn find_match(locked: &LockedTable<'_>, event: &SipEvent) -> Option<Arc<Transaction>> {
    match event.direction()? {
        Direction::Outgoing => locked.get(event.transaction_id?).cloned(),
        Direction::Incoming => match event.message.as_ref()? {
            SipMessage::Request(request) => {
                let is_ack = request.method == Method::Ack;
                locked
                    .find(|tx| {
                        if !is_ack {
                            return tx.keys().matches_request(request, None);
                        }
                        if !tx.last_final_is_non_2xx() {
                            return false;
                        }
                        let to_tag = tx.last_response_to_tag();
                        tx.keys().matches_request(request, to_tag.as_deref())
                    })
                    .cloned()
            }
            SipMessage::Response(response) => locked
                .find(|tx| tx.keys().matches_response(response))
                .cloned(),
        },
    }
}

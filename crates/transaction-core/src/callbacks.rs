//! # Application callbacks
//!
//! The layer reports every lifecycle moment of a transaction to the
//! application through three callback families:
//!
//! - message callbacks, one per [`MessageCallbackKind`], receive the message
//!   that was sent or received
//! - kill callbacks, one per [`KillCallbackKind`], run once when a
//!   transaction terminates
//! - transport-error callbacks, one per [`TransportErrorCallbackKind`], run
//!   when sending fails or an IST gives up waiting for its ACK
//!
//! Each family is keyed by a closed enum. Integer-indexed registration is
//! still available for bindings that carry raw type numbers; out-of-range
//! indices fail with [`Error::InvalidCallbackType`]. A kind with no
//! registered callback is silently skipped.
//!
//! Callbacks are invoked with no layer lock held, so they may dispatch new
//! events or inspect the transaction freely.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use siptx_sip_message::SipMessage;
use tracing::trace;

use crate::error::{Error, Result, TransportError};
use crate::transaction::{Transaction, TransactionKind};

/// Lifecycle moments reported with the related message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCallbackKind {
    IctInviteSent,
    IctInviteSentAgain,
    IctStatus1xxReceived,
    IctStatus2xxReceived,
    IctStatus3xxReceived,
    IctStatus4xxReceived,
    IctStatus5xxReceived,
    IctStatus6xxReceived,
    IctStatus3456xxReceivedAgain,

    IstInviteReceived,
    IstInviteReceivedAgain,
    IstAckReceived,
    IstAckReceivedAgain,
    IstStatus1xxSent,
    IstStatus2xxSent,
    IstStatus3xxSent,
    IstStatus4xxSent,
    IstStatus5xxSent,
    IstStatus6xxSent,
    IstStatus3456xxSentAgain,

    NictRequestSent,
    NictRequestSentAgain,
    NictStatus1xxReceived,
    NictStatus2xxReceived,
    NictStatus3xxReceived,
    NictStatus4xxReceived,
    NictStatus5xxReceived,
    NictStatus6xxReceived,
    NictStatus2xxReceivedAgain,
    NictStatus3456xxReceivedAgain,

    NistRequestReceived,
    NistRequestReceivedAgain,
    NistStatus1xxSent,
    NistStatus2xxSent,
    NistStatus3xxSent,
    NistStatus4xxSent,
    NistStatus5xxSent,
    NistStatus6xxSent,

    /// Timer B fired; the message is the original INVITE
    IctStatusTimeout,
    /// Timer F fired; the message is the original request
    NictStatusTimeout,
}

impl MessageCallbackKind {
    /// Every kind, in index order.
    pub const ALL: [MessageCallbackKind; 40] = [
        MessageCallbackKind::IctInviteSent,
        MessageCallbackKind::IctInviteSentAgain,
        MessageCallbackKind::IctStatus1xxReceived,
        MessageCallbackKind::IctStatus2xxReceived,
        MessageCallbackKind::IctStatus3xxReceived,
        MessageCallbackKind::IctStatus4xxReceived,
        MessageCallbackKind::IctStatus5xxReceived,
        MessageCallbackKind::IctStatus6xxReceived,
        MessageCallbackKind::IctStatus3456xxReceivedAgain,
        MessageCallbackKind::IstInviteReceived,
        MessageCallbackKind::IstInviteReceivedAgain,
        MessageCallbackKind::IstAckReceived,
        MessageCallbackKind::IstAckReceivedAgain,
        MessageCallbackKind::IstStatus1xxSent,
        MessageCallbackKind::IstStatus2xxSent,
        MessageCallbackKind::IstStatus3xxSent,
        MessageCallbackKind::IstStatus4xxSent,
        MessageCallbackKind::IstStatus5xxSent,
        MessageCallbackKind::IstStatus6xxSent,
        MessageCallbackKind::IstStatus3456xxSentAgain,
        MessageCallbackKind::NictRequestSent,
        MessageCallbackKind::NictRequestSentAgain,
        MessageCallbackKind::NictStatus1xxReceived,
        MessageCallbackKind::NictStatus2xxReceived,
        MessageCallbackKind::NictStatus3xxReceived,
        MessageCallbackKind::NictStatus4xxReceived,
        MessageCallbackKind::NictStatus5xxReceived,
        MessageCallbackKind::NictStatus6xxReceived,
        MessageCallbackKind::NictStatus2xxReceivedAgain,
        MessageCallbackKind::NictStatus3456xxReceivedAgain,
        MessageCallbackKind::NistRequestReceived,
        MessageCallbackKind::NistRequestReceivedAgain,
        MessageCallbackKind::NistStatus1xxSent,
        MessageCallbackKind::NistStatus2xxSent,
        MessageCallbackKind::NistStatus3xxSent,
        MessageCallbackKind::NistStatus4xxSent,
        MessageCallbackKind::NistStatus5xxSent,
        MessageCallbackKind::NistStatus6xxSent,
        MessageCallbackKind::IctStatusTimeout,
        MessageCallbackKind::NictStatusTimeout,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for MessageCallbackKind {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidCallbackType {
                family: "message",
                index,
            })
    }
}

/// Termination notification, one per transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KillCallbackKind {
    IctKilled,
    IstKilled,
    NictKilled,
    NistKilled,
}

impl KillCallbackKind {
    pub const ALL: [KillCallbackKind; 4] = [
        KillCallbackKind::IctKilled,
        KillCallbackKind::IstKilled,
        KillCallbackKind::NictKilled,
        KillCallbackKind::NistKilled,
    ];

    pub fn for_kind(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Ict => KillCallbackKind::IctKilled,
            TransactionKind::Ist => KillCallbackKind::IstKilled,
            TransactionKind::Nict => KillCallbackKind::NictKilled,
            TransactionKind::Nist => KillCallbackKind::NistKilled,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for KillCallbackKind {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidCallbackType {
                family: "kill",
                index,
            })
    }
}

/// Transport failure notification, one per transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorCallbackKind {
    IctTransportError,
    IstTransportError,
    NictTransportError,
    NistTransportError,
}

impl TransportErrorCallbackKind {
    pub const ALL: [TransportErrorCallbackKind; 4] = [
        TransportErrorCallbackKind::IctTransportError,
        TransportErrorCallbackKind::IstTransportError,
        TransportErrorCallbackKind::NictTransportError,
        TransportErrorCallbackKind::NistTransportError,
    ];

    pub fn for_kind(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Ict => TransportErrorCallbackKind::IctTransportError,
            TransactionKind::Ist => TransportErrorCallbackKind::IstTransportError,
            TransactionKind::Nict => TransportErrorCallbackKind::NictTransportError,
            TransactionKind::Nist => TransportErrorCallbackKind::NistTransportError,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for TransportErrorCallbackKind {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidCallbackType {
                family: "transport error",
                index,
            })
    }
}

pub type MessageCallback = Arc<dyn Fn(MessageCallbackKind, &Transaction, &SipMessage) + Send + Sync>;
pub type KillCallback = Arc<dyn Fn(KillCallbackKind, &Transaction) + Send + Sync>;
pub type TransportErrorCallback =
    Arc<dyn Fn(TransportErrorCallbackKind, &Transaction, &TransportError) + Send + Sync>;

/// Registered callbacks of one layer.
pub struct CallbackRegistry {
    message: RwLock<Vec<Option<MessageCallback>>>,
    kill: RwLock<Vec<Option<KillCallback>>>,
    transport_error: RwLock<Vec<Option<TransportErrorCallback>>>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self {
            message: RwLock::new(vec![None; MessageCallbackKind::ALL.len()]),
            kill: RwLock::new(vec![None; KillCallbackKind::ALL.len()]),
            transport_error: RwLock::new(vec![None; TransportErrorCallbackKind::ALL.len()]),
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn count<T>(slots: &[Option<T>]) -> usize {
            slots.iter().filter(|slot| slot.is_some()).count()
        }
        f.debug_struct("CallbackRegistry")
            .field("message", &count(self.message.read().as_slice()))
            .field("kill", &count(self.kill.read().as_slice()))
            .field("transport_error", &count(self.transport_error.read().as_slice()))
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_message_callback<F>(&self, kind: MessageCallbackKind, callback: F)
    where
        F: Fn(MessageCallbackKind, &Transaction, &SipMessage) + Send + Sync + 'static,
    {
        self.message.write()[kind.index()] = Some(Arc::new(callback));
    }

    /// Registers the same callback for every message kind.
    pub fn set_message_callback_all<F>(&self, callback: F)
    where
        F: Fn(MessageCallbackKind, &Transaction, &SipMessage) + Send + Sync + 'static,
    {
        let callback: MessageCallback = Arc::new(callback);
        let mut slots = self.message.write();
        for slot in slots.iter_mut() {
            *slot = Some(callback.clone());
        }
    }

    pub fn set_message_callback_by_index<F>(&self, index: usize, callback: F) -> Result<()>
    where
        F: Fn(MessageCallbackKind, &Transaction, &SipMessage) + Send + Sync + 'static,
    {
        let kind = MessageCallbackKind::try_from(index)?;
        self.set_message_callback(kind, callback);
        Ok(())
    }

    pub fn set_kill_callback<F>(&self, kind: KillCallbackKind, callback: F)
    where
        F: Fn(KillCallbackKind, &Transaction) + Send + Sync + 'static,
    {
        self.kill.write()[kind.index()] = Some(Arc::new(callback));
    }

    pub fn set_kill_callback_by_index<F>(&self, index: usize, callback: F) -> Result<()>
    where
        F: Fn(KillCallbackKind, &Transaction) + Send + Sync + 'static,
    {
        let kind = KillCallbackKind::try_from(index)?;
        self.set_kill_callback(kind, callback);
        Ok(())
    }

    pub fn set_transport_error_callback<F>(&self, kind: TransportErrorCallbackKind, callback: F)
    where
        F: Fn(TransportErrorCallbackKind, &Transaction, &TransportError) + Send + Sync + 'static,
    {
        self.transport_error.write()[kind.index()] = Some(Arc::new(callback));
    }

    pub fn set_transport_error_callback_by_index<F>(&self, index: usize, callback: F) -> Result<()>
    where
        F: Fn(TransportErrorCallbackKind, &Transaction, &TransportError) + Send + Sync + 'static,
    {
        let kind = TransportErrorCallbackKind::try_from(index)?;
        self.set_transport_error_callback(kind, callback);
        Ok(())
    }

    // The Arc is cloned out so the read lock is released before user code runs.

    pub(crate) fn notify_message(&self, kind: MessageCallbackKind, tx: &Transaction, message: &SipMessage) {
        let callback = self.message.read()[kind.index()].clone();
        match callback {
            Some(callback) => callback(kind, tx, message),
            None => trace!(id = %tx.id(), ?kind, "No message callback registered"),
        }
    }

    pub(crate) fn notify_kill(&self, tx: &Transaction) {
        let kind = KillCallbackKind::for_kind(tx.kind());
        let callback = self.kill.read()[kind.index()].clone();
        if let Some(callback) = callback {
            callback(kind, tx);
        }
    }

    pub(crate) fn notify_transport_error(&self, tx: &Transaction, error: &TransportError) {
        let kind = TransportErrorCallbackKind::for_kind(tx.kind());
        let callback = self.transport_error.read()[kind.index()].clone();
        if let Some(callback) = callback {
            callback(kind, tx, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_arrays_follow_discriminants() {
        for (index, kind) in MessageCallbackKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), index);
        }
        for (index, kind) in KillCallbackKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), index);
        }
        for (index, kind) in TransportErrorCallbackKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), index);
        }
    }

    #[test]
    fn test_index_conversion() {
        assert_eq!(
            MessageCallbackKind::try_from(0).unwrap(),
            MessageCallbackKind::IctInviteSent
        );
        assert_eq!(
            MessageCallbackKind::try_from(39).unwrap(),
            MessageCallbackKind::NictStatusTimeout
        );
        assert_eq!(
            MessageCallbackKind::try_from(40),
            Err(Error::InvalidCallbackType {
                family: "message",
                index: 40
            })
        );
        assert!(KillCallbackKind::try_from(4).is_err());
        assert!(TransportErrorCallbackKind::try_from(usize::MAX).is_err());
    }

    #[test]
    fn test_by_index_registration_rejects_out_of_range() {
        let registry = CallbackRegistry::new();
        assert!(registry.set_message_callback_by_index(12, |_, _, _| {}).is_ok());
        assert!(matches!(
            registry.set_kill_callback_by_index(9, |_, _| {}),
            Err(Error::InvalidCallbackType { family: "kill", index: 9 })
        ));
        assert!(registry
            .set_transport_error_callback_by_index(3, |_, _, _| {})
            .is_ok());
    }
}

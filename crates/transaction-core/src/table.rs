//! Per-kind transaction tables.
//!
//! Each table is a map from [`TransactionId`] to transaction behind its own
//! lock. Lookups, inserts and removals take the lock; executing a
//! transaction does not, the scheduler works on a snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::transaction::{Transaction, TransactionId, TransactionKind};

/// Live transactions of one kind.
#[derive(Debug)]
pub struct TransactionTable {
    kind: TransactionKind,
    entries: Mutex<BTreeMap<TransactionId, Arc<Transaction>>>,
}

impl TransactionTable {
    pub fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Holds the table lock for a find-then-insert sequence.
    pub(crate) fn lock(&self) -> LockedTable<'_> {
        LockedTable {
            kind: self.kind,
            entries: self.entries.lock(),
        }
    }

    pub(crate) fn insert(&self, tx: Arc<Transaction>) -> Result<()> {
        self.lock().insert(tx)
    }

    pub fn remove(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.entries.lock().remove(&id)
    }

    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Copies the current members so they can be processed without the lock.
    pub fn snapshot(&self) -> Vec<Arc<Transaction>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// A table with its lock held.
pub(crate) struct LockedTable<'a> {
    kind: TransactionKind,
    entries: MutexGuard<'a, BTreeMap<TransactionId, Arc<Transaction>>>,
}

impl LockedTable<'_> {
    pub(crate) fn get(&self, id: TransactionId) -> Option<&Arc<Transaction>> {
        self.entries.get(&id)
    }

    pub(crate) fn find(&self, mut predicate: impl FnMut(&Transaction) -> bool) -> Option<&Arc<Transaction>> {
        self.entries.values().find(|tx| predicate(tx))
    }

    pub(crate) fn insert(&mut self, tx: Arc<Transaction>) -> Result<()> {
        if tx.kind() != self.kind {
            return Err(Error::WrongTable {
                expected: self.kind,
                actual: tx.kind(),
            });
        }
        if self.entries.contains_key(&tx.id()) {
            return Err(Error::AllocationFailure(format!(
                "transaction id {} already registered",
                tx.id()
            )));
        }
        self.entries.insert(tx.id(), tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siptx_sip_message::{Method, NameAddr, Request, Via};

    fn transaction(id: u64, kind: TransactionKind) -> Arc<Transaction> {
        let request = Request::builder(Method::Options, "sip:carol@chicago.example.com")
            .via(Via::udp("pc33.atlanta.example.com", None).with_branch(format!("z9hG4bK{}", id)))
            .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("a1"))
            .to(NameAddr::new("sip:carol@chicago.example.com"))
            .call_id(format!("call-{}", id))
            .cseq(1, Method::Options)
            .build();
        Arc::new(Transaction::new(TransactionId(id), kind, request).unwrap())
    }

    #[test]
    fn test_insert_checks_kind_and_id() {
        let table = TransactionTable::new(TransactionKind::Nist);
        table.insert(transaction(1, TransactionKind::Nist)).unwrap();

        assert_eq!(
            table.insert(transaction(2, TransactionKind::Nict)),
            Err(Error::WrongTable {
                expected: TransactionKind::Nist,
                actual: TransactionKind::Nict,
            })
        );
        assert!(matches!(
            table.insert(transaction(1, TransactionKind::Nist)),
            Err(Error::AllocationFailure(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_by_id_from_snapshot_copy() {
        let table = TransactionTable::new(TransactionKind::Nist);
        for id in 1..=3 {
            table.insert(transaction(id, TransactionKind::Nist)).unwrap();
        }

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 3);
        let middle = snapshot[1].id();
        assert!(table.remove(middle).is_some());
        assert!(table.remove(middle).is_none());
        assert!(table.get(middle).is_none());
        assert_eq!(table.len(), 2);
    }
}

//! # Stack runtime
//!
//! Shared state behind every [`TransactionLayer`](crate::TransactionLayer)
//! created from it:
//!
//! - the four state-machine tables, loaded when the first layer is
//!   initialized and dropped when the last one is released
//! - the random generator used for branch parameters, seeded at first load
//! - the transaction id allocator, which never goes backwards so ids stay
//!   unique for the life of the runtime
//!
//! Only the reference count, the tables and the generator sit behind the
//! runtime lock. Id allocation is a lock-free atomic increment.
//!
//! ```rust
//! use std::sync::Arc;
//! use siptx_transaction_core::{StackRuntime, TransactionLayer, TransactionLayerConfig};
//!
//! let runtime = Arc::new(StackRuntime::new());
//! let first = TransactionLayer::init(runtime.clone(), TransactionLayerConfig::default()).unwrap();
//! let second = TransactionLayer::init(runtime.clone(), TransactionLayerConfig::default()).unwrap();
//! assert_eq!(runtime.ref_count(), 2);
//!
//! first.release();
//! assert!(runtime.is_loaded());
//! second.release();
//! assert!(!runtime.is_loaded());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siptx_sip_message::BRANCH_MAGIC_COOKIE;
use tracing::debug;

use crate::fsm::StateMachines;
use crate::transaction::TransactionId;

#[derive(Default)]
struct RuntimeState {
    refs: usize,
    machines: Option<Arc<StateMachines>>,
    rng: Option<StdRng>,
}

/// Reference-counted owner of the state machines and id allocator.
pub struct StackRuntime {
    state: Mutex<RuntimeState>,
    next_id: AtomicU64,
}

impl Default for StackRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StackRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StackRuntime")
            .field("refs", &state.refs)
            .field("loaded", &state.machines.is_some())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl StackRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RuntimeState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Takes a reference, loading the state machines on the first one.
    pub(crate) fn acquire(&self) -> Arc<StateMachines> {
        let mut state = self.state.lock();
        state.refs += 1;
        if state.rng.is_none() {
            state.rng = Some(StdRng::from_entropy());
        }
        match &state.machines {
            Some(machines) => machines.clone(),
            None => {
                let machines = Arc::new(StateMachines::load());
                state.machines = Some(machines.clone());
                debug!(refs = state.refs, "Loaded transaction state machines");
                machines
            }
        }
    }

    /// Drops a reference, unloading everything on the last one.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.refs = state.refs.saturating_sub(1);
        if state.refs == 0 && state.machines.is_some() {
            state.machines = None;
            state.rng = None;
            debug!("Unloaded transaction state machines");
        }
    }

    /// Number of live layers using this runtime.
    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().machines.is_some()
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// A fresh RFC 3261 branch parameter (`z9hG4bK` plus 64 random bits).
    pub fn generate_branch(&self) -> String {
        let mut state = self.state.lock();
        let rng = state.rng.get_or_insert_with(StdRng::from_entropy);
        format!("{}{:016x}", BRANCH_MAGIC_COOKIE, rng.r#gen::<u64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_refcount_gates_loading() {
        let runtime = StackRuntime::new();
        assert!(!runtime.is_loaded());

        let first = runtime.acquire();
        let second = runtime.acquire();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.ref_count(), 2);

        runtime.release();
        assert!(runtime.is_loaded());
        runtime.release();
        assert!(!runtime.is_loaded());

        // An extra release must not underflow
        runtime.release();
        assert_eq!(runtime.ref_count(), 0);
    }

    #[test]
    fn test_ids_survive_reload() {
        let runtime = StackRuntime::new();
        let a = runtime.next_transaction_id();
        runtime.acquire();
        runtime.release();
        let b = runtime.next_transaction_id();
        assert!(b > a);
    }

    #[test]
    fn test_branches_carry_cookie_and_differ() {
        let runtime = StackRuntime::new();
        let branches: HashSet<_> = (0..64).map(|_| runtime.generate_branch()).collect();
        assert_eq!(branches.len(), 64);
        assert!(branches.iter().all(|b| b.starts_with(BRANCH_MAGIC_COOKIE)));
    }
}

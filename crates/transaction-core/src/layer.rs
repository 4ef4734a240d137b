//! # Transaction layer
//!
//! [`TransactionLayer`] is the context object an application creates once per
//! SIP stack. It owns:
//!
//! - the four transaction tables (ICT, IST, NICT, NIST)
//! - the callback registry
//! - the transport used to send messages
//! - an optional application context
//!
//! Entry points are split by concern:
//!
//! - dispatch and creation live in [`dispatcher`](crate::dispatcher)
//! - execution and timer passes live in [`scheduler`](crate::scheduler)
//!
//! ## Lifecycle
//!
//! [`TransactionLayer::init`] takes a reference on a [`StackRuntime`]; the
//! first reference loads the state machines. [`TransactionLayer::release`]
//! (or dropping the layer) gives the reference back.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use siptx_transaction_core::{
//!     Destination, KillCallbackKind, SipMessage, StackRuntime, Transaction, TransactionLayer,
//!     TransactionLayerConfig, TransportError,
//! };
//!
//! let layer = TransactionLayer::init(Arc::new(StackRuntime::new()), TransactionLayerConfig::default())
//!     .expect("valid configuration");
//!
//! layer.set_transport(|_tx: &Transaction, _msg: &SipMessage, dest: &Destination| {
//!     println!("sending to {}", dest);
//!     Ok::<(), TransportError>(())
//! });
//! layer.callbacks().set_kill_callback(KillCallbackKind::NistKilled, |_, tx| {
//!     println!("NIST {} terminated", tx.id());
//! });
//! ```

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::callbacks::CallbackRegistry;
use crate::config::TransactionLayerConfig;
use crate::error::Result;
use crate::event::SipEvent;
use crate::fsm::{Env, StateMachines};
use crate::runtime::StackRuntime;
use crate::table::TransactionTable;
use crate::transaction::{Transaction, TransactionId, TransactionKind};
use crate::transport::Transport;

/// Process-wide transaction layer context.
pub struct TransactionLayer {
    runtime: Arc<StackRuntime>,
    pub(crate) machines: Arc<StateMachines>,
    pub(crate) config: TransactionLayerConfig,
    ict: TransactionTable,
    ist: TransactionTable,
    nict: TransactionTable,
    nist: TransactionTable,
    callbacks: CallbackRegistry,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    application: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl TransactionLayer {
    /// Validates `config` and creates a layer bound to `runtime`.
    pub fn init(runtime: Arc<StackRuntime>, config: TransactionLayerConfig) -> Result<Self> {
        config.validate()?;
        let machines = runtime.acquire();
        info!(
            t1 = ?config.timers.t1,
            t2 = ?config.timers.t2,
            t4 = ?config.timers.t4,
            threading = ?config.threading,
            "Transaction layer initialized"
        );

        Ok(Self {
            runtime,
            machines,
            config,
            ict: TransactionTable::new(TransactionKind::Ict),
            ist: TransactionTable::new(TransactionKind::Ist),
            nict: TransactionTable::new(TransactionKind::Nict),
            nist: TransactionTable::new(TransactionKind::Nist),
            callbacks: CallbackRegistry::new(),
            transport: RwLock::new(None),
            application: RwLock::new(None),
        })
    }

    /// Tears the layer down. Live transactions are dropped without callbacks.
    pub fn release(self) {
        drop(self);
    }

    pub fn config(&self) -> &TransactionLayerConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<StackRuntime> {
        &self.runtime
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Registers the transport every transaction sends through.
    pub fn set_transport<T: Transport + 'static>(&self, transport: T) {
        *self.transport.write() = Some(Arc::new(transport));
    }

    pub fn set_transport_arc(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
    }

    pub fn set_application_context<T: Any + Send + Sync>(&self, context: T) {
        *self.application.write() = Some(Arc::new(context));
    }

    /// The application context, if one of type `T` was set.
    pub fn application_context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let context = self.application.read().clone()?;
        context.downcast::<T>().ok()
    }

    pub fn table(&self, kind: TransactionKind) -> &TransactionTable {
        match kind {
            TransactionKind::Ict => &self.ict,
            TransactionKind::Ist => &self.ist,
            TransactionKind::Nict => &self.nict,
            TransactionKind::Nist => &self.nist,
        }
    }

    pub fn transaction(&self, kind: TransactionKind, id: TransactionId) -> Option<Arc<Transaction>> {
        self.table(kind).get(id)
    }

    pub fn transaction_count(&self, kind: TransactionKind) -> usize {
        self.table(kind).len()
    }

    /// Removes `tx` from its table without running its state machine.
    pub fn remove_transaction(&self, tx: &Transaction) -> bool {
        let removed = self.table(tx.kind()).remove(tx.id()).is_some();
        if removed {
            debug!(id = %tx.id(), kind = %tx.kind(), "Transaction removed");
        }
        removed
    }

    /// Queues a kill event on the live transaction `id`, whatever its kind.
    pub fn kill_transaction(&self, id: TransactionId) -> bool {
        for kind in TransactionKind::ALL {
            if let Some(tx) = self.table(kind).get(id) {
                tx.queue().push(SipEvent::kill(id));
                debug!(%id, %kind, "Kill requested");
                return true;
            }
        }
        false
    }

    /// A fresh `z9hG4bK` branch from the runtime generator.
    pub fn generate_branch(&self) -> String {
        self.runtime.generate_branch()
    }

    pub(crate) fn env(&self) -> Env<'_> {
        Env {
            timers: &self.config.timers,
            callbacks: &self.callbacks,
            transport: self.transport.read().clone(),
        }
    }
}

impl Drop for TransactionLayer {
    fn drop(&mut self) {
        self.runtime.release();
        debug!("Transaction layer released");
    }
}

impl std::fmt::Debug for TransactionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLayer")
            .field("config", &self.config)
            .field("ict", &self.ict.len())
            .field("ist", &self.ist.len())
            .field("nict", &self.nict.len())
            .field("nist", &self.nist.len())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

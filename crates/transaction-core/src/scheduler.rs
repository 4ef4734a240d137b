//! # Scheduling
//!
//! Two passes move transactions forward, each run per kind:
//!
//! - [`TransactionLayer::execute`] drains every transaction's queue through
//!   its state machine, then removes the transactions that terminated.
//! - [`TransactionLayer::timers_execute`] checks each transaction's armed
//!   timers in the kind's priority order (ICT: B, A, D; IST: I, H, G;
//!   NICT: K, F, E; NIST: J) and queues one timeout event for the first
//!   due timer. A transaction that already has queued events is skipped.
//!
//! Both passes work on a snapshot of the table and never block on a queue.
//! An application that drives the layer itself calls them in a loop;
//! [`spawn`] runs that loop on a tokio task instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::event::SipEvent;
use crate::fsm;
use crate::layer::TransactionLayer;
use crate::transaction::TransactionKind;

impl TransactionLayer {
    /// Runs every queued event of `kind`'s transactions. Returns the number
    /// of events executed.
    pub fn execute(&self, kind: TransactionKind) -> usize {
        let machine = self.machines.get(kind);
        let env = self.env();
        let table = self.table(kind);
        let mut executed = 0;

        for tx in table.snapshot() {
            while let Some(event) = tx.queue().try_pop() {
                fsm::run(machine, &env, &tx, event);
                executed += 1;
            }
            if tx.is_terminated() && table.remove(tx.id()).is_some() {
                debug!(id = %tx.id(), %kind, "Removed terminated transaction");
            }
        }
        executed
    }

    /// Queues timeout events for due timers of `kind`'s transactions.
    /// Returns the number of events queued.
    pub fn timers_execute(&self, kind: TransactionKind) -> usize {
        let now = Instant::now();
        let mut fired = 0;

        for tx in self.table(kind).snapshot() {
            if !tx.queue().is_empty() {
                continue;
            }
            if let Some(timer) = tx.due_timer(now) {
                trace!(id = %tx.id(), %kind, ?timer, "Timer fired");
                tx.queue().push(SipEvent::timer(timer.timeout_event(), tx.id()));
                fired += 1;
            }
        }
        fired
    }

    pub fn ict_execute(&self) -> usize {
        self.execute(TransactionKind::Ict)
    }

    pub fn ist_execute(&self) -> usize {
        self.execute(TransactionKind::Ist)
    }

    pub fn nict_execute(&self) -> usize {
        self.execute(TransactionKind::Nict)
    }

    pub fn nist_execute(&self) -> usize {
        self.execute(TransactionKind::Nist)
    }

    pub fn timers_ict_execute(&self) -> usize {
        self.timers_execute(TransactionKind::Ict)
    }

    pub fn timers_ist_execute(&self) -> usize {
        self.timers_execute(TransactionKind::Ist)
    }

    pub fn timers_nict_execute(&self) -> usize {
        self.timers_execute(TransactionKind::Nict)
    }

    pub fn timers_nist_execute(&self) -> usize {
        self.timers_execute(TransactionKind::Nist)
    }

    /// Execute pass over all four tables.
    pub fn execute_all(&self) -> usize {
        TransactionKind::ALL.iter().map(|kind| self.execute(*kind)).sum()
    }

    /// Timer pass over all four tables.
    pub fn timers_execute_all(&self) -> usize {
        TransactionKind::ALL
            .iter()
            .map(|kind| self.timers_execute(*kind))
            .sum()
    }
}

/// Handle on a background scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the loop and waits for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Runs the timer passes then the execute passes every `tick` on a tokio task.
pub fn spawn(layer: Arc<TransactionLayer>, tick: Duration) -> SchedulerHandle {
    let (shutdown, mut stop) = watch::channel(false);
    let tick = tick.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?tick, "Transaction scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    layer.timers_execute_all();
                    layer.execute_all();
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Transaction scheduler stopped");
    });

    SchedulerHandle { shutdown, task }
}

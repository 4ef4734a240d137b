//! Named transaction timers (RFC 3261 §17, Table 4).
//!
//! Timers are not tasks: a timer is an interval plus the instant it was
//! armed, stored in the transaction context. The scheduler's timer pass
//! compares them against the clock and synthesizes timeout events.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::event::EventType;
use crate::transaction::{IctState, IstState, NictState, NistState, TransactionState};

/// The RFC 3261 transaction timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerName {
    /// ICT INVITE retransmit
    A,
    /// ICT transaction timeout
    B,
    /// ICT wait for response retransmits
    D,
    /// NICT request retransmit
    E,
    /// NICT transaction timeout
    F,
    /// NICT wait for response retransmits
    K,
    /// IST final response retransmit
    G,
    /// IST wait for ACK
    H,
    /// IST wait for ACK retransmits
    I,
    /// NIST wait for request retransmits
    J,
}

impl TimerName {
    /// The event synthesized when this timer fires.
    pub fn timeout_event(self) -> EventType {
        match self {
            TimerName::A => EventType::TimeoutA,
            TimerName::B => EventType::TimeoutB,
            TimerName::D => EventType::TimeoutD,
            TimerName::E => EventType::TimeoutE,
            TimerName::F => EventType::TimeoutF,
            TimerName::K => EventType::TimeoutK,
            TimerName::G => EventType::TimeoutG,
            TimerName::H => EventType::TimeoutH,
            TimerName::I => EventType::TimeoutI,
            TimerName::J => EventType::TimeoutJ,
        }
    }

    /// Whether the timer means anything in `state`.
    pub fn active_in(self, state: TransactionState) -> bool {
        use TransactionState::*;
        match self {
            TimerName::A => matches!(state, Ict(IctState::Calling)),
            TimerName::B => matches!(state, Ict(IctState::Calling | IctState::Proceeding)),
            TimerName::D => matches!(state, Ict(IctState::Completed)),
            TimerName::E | TimerName::F => {
                matches!(state, Nict(NictState::Trying | NictState::Proceeding))
            }
            TimerName::K => matches!(state, Nict(NictState::Completed)),
            TimerName::G | TimerName::H => matches!(state, Ist(IstState::Completed)),
            TimerName::I => matches!(state, Ist(IstState::Confirmed)),
            TimerName::J => matches!(state, Nist(NistState::Completed)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timer {
    pub(crate) interval: Duration,
    pub(crate) armed_at: Instant,
}

impl Timer {
    /// A deadline past the clock's range never comes due.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.armed_at
            .checked_add(self.interval)
            .is_some_and(|deadline| now >= deadline)
    }
}

/// Armed timers of one transaction.
#[derive(Debug, Default)]
pub(crate) struct TimerSet {
    timers: BTreeMap<TimerName, Timer>,
}

impl TimerSet {
    /// Arms (or re-arms) `name` to fire `interval` after `now`.
    pub(crate) fn arm(&mut self, name: TimerName, interval: Duration, now: Instant) {
        self.timers.insert(
            name,
            Timer {
                interval,
                armed_at: now,
            },
        );
    }

    pub(crate) fn disarm(&mut self, name: TimerName) {
        self.timers.remove(&name);
    }

    pub(crate) fn clear(&mut self) {
        self.timers.clear();
    }

    pub(crate) fn get(&self, name: TimerName) -> Option<&Timer> {
        self.timers.get(&name)
    }

    pub(crate) fn interval(&self, name: TimerName) -> Option<Duration> {
        self.get(name).map(|timer| timer.interval)
    }

    pub(crate) fn is_due(&self, name: TimerName, now: Instant) -> bool {
        self.get(name).map(|timer| timer.is_due(now)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_after_interval() {
        let start = Instant::now();
        let mut timers = TimerSet::default();
        timers.arm(TimerName::A, Duration::from_millis(500), start);

        assert!(!timers.is_due(TimerName::A, start));
        assert!(!timers.is_due(TimerName::A, start + Duration::from_millis(499)));
        assert!(timers.is_due(TimerName::A, start + Duration::from_millis(500)));
        assert!(!timers.is_due(TimerName::B, start + Duration::from_secs(60)));

        timers.disarm(TimerName::A);
        assert!(timers.get(TimerName::A).is_none());
    }

    #[test]
    fn test_zero_interval_is_due_immediately() {
        let now = Instant::now();
        let mut timers = TimerSet::default();
        timers.arm(TimerName::K, Duration::ZERO, now);
        assert!(timers.is_due(TimerName::K, now));
    }

    #[test]
    fn test_unreachable_deadline_is_never_due() {
        let now = Instant::now();
        let mut timers = TimerSet::default();
        timers.arm(TimerName::I, Duration::MAX, now);
        assert!(!timers.is_due(TimerName::I, now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_timers_only_apply_to_their_states() {
        assert!(TimerName::A.active_in(TransactionState::Ict(IctState::Calling)));
        assert!(!TimerName::A.active_in(TransactionState::Ict(IctState::Proceeding)));
        assert!(TimerName::B.active_in(TransactionState::Ict(IctState::Proceeding)));
        assert!(TimerName::I.active_in(TransactionState::Ist(IstState::Confirmed)));
        assert!(!TimerName::G.active_in(TransactionState::Ist(IstState::Confirmed)));
        assert!(!TimerName::J.active_in(TransactionState::Nict(NictState::Completed)));
    }
}

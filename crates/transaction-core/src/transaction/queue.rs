use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::event::SipEvent;

/// FIFO of events waiting for a transaction's engine.
///
/// The dispatcher pushes, the scheduler pops. Pops never block.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<SipEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: SipEvent) {
        self.events.lock().push_back(event);
    }

    /// Removes the oldest event, if any.
    pub fn try_pop(&self) -> Option<SipEvent> {
        self.events.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::transaction::TransactionId;

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        assert!(queue.try_pop().is_none());

        queue.push(SipEvent::timer(EventType::TimeoutA, TransactionId(1)));
        queue.push(SipEvent::timer(EventType::TimeoutB, TransactionId(1)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_pop().map(|e| e.event_type), Some(EventType::TimeoutA));
        assert_eq!(queue.try_pop().map(|e| e.event_type), Some(EventType::TimeoutB));
        assert!(queue.is_empty());
    }
}

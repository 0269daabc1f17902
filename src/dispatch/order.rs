//! Last dispatched event per promotion.
//!
//! Tasks for the same promotion may be delivered late or twice, especially
//! across nodes. The cache remembers the last "consequent" event accepted for
//! each promotion and suppresses a "first" event arriving after it (a late
//! QUEUED after STARTED, or a duplicate STARTED).
//!
//! The cache is bounded and evicts in insertion order. Lookup and update happen
//! under one lock so two concurrent deliveries cannot both see an empty slot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{Event, PromotionId};

/// Verdict for a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDecision {
    Proceed,
    /// A first event arrived after `previous` was already dispatched.
    Suppressed { previous: Event },
}

#[derive(Debug, Default)]
struct Entries {
    events: HashMap<PromotionId, Event>,
    /// Keys in insertion order; the front is evicted first.
    order: VecDeque<PromotionId>,
}

/// Bounded insertion-ordered map from promotion to its last recorded event.
#[derive(Debug)]
pub struct EventOrderCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl EventOrderCache {
    pub fn new(capacity: usize) -> Self {
        EventOrderCache {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, promotion: PromotionId) -> Option<Event> {
        self.entries().events.get(&promotion).copied()
    }

    /// Checks a delivered event against the recorded one and records it when
    /// it is consequent.
    ///
    /// `is_retry` marks a task rescheduled after a failed publish. Its own
    /// earlier delivery may already be recorded, which must not suppress it.
    pub fn observe(&self, promotion: PromotionId, event: Event, is_retry: bool) -> OrderDecision {
        let mut entries = self.entries();
        if event.is_first()
            && let Some(&previous) = entries.events.get(&promotion)
            && !(is_retry && previous == event)
        {
            return OrderDecision::Suppressed { previous };
        }
        if event.is_consequent() {
            self.insert(&mut entries, promotion, event);
        }
        OrderDecision::Proceed
    }

    /// Records an event unconditionally.
    pub fn record(&self, promotion: PromotionId, event: Event) {
        let mut entries = self.entries();
        self.insert(&mut entries, promotion, event);
    }

    fn insert(&self, entries: &mut Entries, promotion: PromotionId, event: Event) {
        if entries.events.insert(promotion, event).is_none() {
            entries.order.push_back(promotion);
            while entries.order.len() > self.capacity {
                if let Some(oldest) = entries.order.pop_front() {
                    entries.events.remove(&oldest);
                }
            }
        }
    }
}

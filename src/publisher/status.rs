//! Remote commit status already recorded on the hosting service.
//!
//! Before a queue-related status is published, the dispatcher may ask the
//! publisher what the hosting service currently shows for the revision. A
//! queued status must not overwrite a status posted by a later lifecycle
//! event (for instance a build that already started on another node).

use crate::types::Event;

/// Status currently recorded on the hosting service for a revision.
pub trait RemoteStatus: Send {
    /// Returns true if publishing `event` would not overwrite a more
    /// authoritative status.
    fn is_event_allowed(&self, event: Event) -> bool;
}

/// A remote status described by the last lifecycle event that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedStatus {
    /// The event that posted the current remote status, if it could be
    /// determined.
    pub last_event: Option<Event>,
}

impl RecordedStatus {
    pub fn new(last_event: Option<Event>) -> Self {
        RecordedStatus { last_event }
    }
}

impl RemoteStatus for RecordedStatus {
    fn is_event_allowed(&self, event: Event) -> bool {
        let Some(previous) = self.last_event else {
            return true;
        };
        match event {
            Event::Queued => matches!(previous, Event::Queued | Event::RemovedFromQueue),
            Event::RemovedFromQueue => previous == Event::Queued,
            _ => true,
        }
    }
}

//! Build lifecycle events that can be published as commit statuses.
//!
//! Every variant carries static facts used by the dispatcher:
//!
//! | Event | name | first | consequent | retryable |
//! |---|---|---|---|---|
//! | `Queued` | `buildQueued` | yes | no | yes |
//! | `RemovedFromQueue` | `buildRemovedFromQueue` | no | no | no |
//! | `Started` | `buildStarted` | yes | yes | yes |
//! | `Finished` | `buildFinished` | no | yes | yes |
//! | `Commented` | `buildCommented` | no | no | no |
//! | `Interrupted` | `buildInterrupted` | no | yes | yes |
//! | `FailureDetected` | `buildFailureDetected` | no | yes | yes |
//! | `MarkedAsSuccessful` | `buildMarkedAsSuccessful` | no | yes | yes |
//!
//! A "first" event is suppressed once any event has been recorded for the
//! same promotion. A "consequent" event is recorded in the order cache when
//! it is accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A build lifecycle moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Queued,
    RemovedFromQueue,
    Started,
    Finished,
    Commented,
    Interrupted,
    FailureDetected,
    MarkedAsSuccessful,
}

/// How the task broker distributes tasks of a given type across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    /// At most one node processes each distinct task identity.
    Singleton,
    /// Every subscribed node is offered the task and decides for itself.
    Broadcast,
}

/// Error returned when a task type does not name a known event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEvent(pub String);

impl Event {
    /// All events, in declaration order.
    pub const ALL: [Event; 8] = [
        Event::Queued,
        Event::RemovedFromQueue,
        Event::Started,
        Event::Finished,
        Event::Commented,
        Event::Interrupted,
        Event::FailureDetected,
        Event::MarkedAsSuccessful,
    ];

    /// Stable name, used as the broker task type.
    pub fn name(self) -> &'static str {
        match self {
            Event::Queued => "buildQueued",
            Event::RemovedFromQueue => "buildRemovedFromQueue",
            Event::Started => "buildStarted",
            Event::Finished => "buildFinished",
            Event::Commented => "buildCommented",
            Event::Interrupted => "buildInterrupted",
            Event::FailureDetected => "buildFailureDetected",
            Event::MarkedAsSuccessful => "buildMarkedAsSuccessful",
        }
    }

    /// Only one delivery of this event should win per promotion.
    pub fn is_first(self) -> bool {
        matches!(self, Event::Queued | Event::Started)
    }

    /// This event is recorded so that later stale deliveries are suppressed.
    pub fn is_consequent(self) -> bool {
        matches!(
            self,
            Event::Started
                | Event::Finished
                | Event::Interrupted
                | Event::FailureDetected
                | Event::MarkedAsSuccessful
        )
    }

    /// A failed publish of this event may be rescheduled.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Event::Commented | Event::RemovedFromQueue)
    }

    /// Promotion-scoped events are keyed by promotion id, all others by build id.
    pub fn is_queue_event(self) -> bool {
        matches!(self, Event::Queued | Event::RemovedFromQueue)
    }

    pub fn subscription(self) -> Subscription {
        match self {
            Event::Queued => Subscription::Singleton,
            _ => Subscription::Broadcast,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = Event::ALL.iter().map(|e| e.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Event::ALL.len());
    }

    #[test]
    fn parse_from_name() {
        for event in Event::ALL {
            assert_eq!(event.name().parse::<Event>(), Ok(event));
        }
        assert_eq!(
            "buildExploded".parse::<Event>(),
            Err(UnknownEvent("buildExploded".to_string()))
        );
    }

    #[test]
    fn started_is_both_first_and_consequent() {
        assert!(Event::Started.is_first());
        assert!(Event::Started.is_consequent());
    }

    #[test]
    fn queued_is_first_but_not_recorded() {
        assert!(Event::Queued.is_first());
        assert!(!Event::Queued.is_consequent());
    }

    #[test]
    fn comment_and_removal_are_not_retried() {
        assert!(!Event::Commented.is_retryable());
        assert!(!Event::RemovedFromQueue.is_retryable());
        assert!(Event::Finished.is_retryable());
    }

    #[test]
    fn only_queued_is_singleton() {
        for event in Event::ALL {
            let expected = if event == Event::Queued {
                Subscription::Singleton
            } else {
                Subscription::Broadcast
            };
            assert_eq!(event.subscription(), expected, "{event}");
        }
    }
}

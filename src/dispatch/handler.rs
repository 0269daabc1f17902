//! Per-event publish handlers.
//!
//! Each [`Event`] maps to one handler that knows which [`Publisher`] method to
//! call. The table is built once with the dispatcher and never changes.

use std::collections::HashMap;

use crate::publisher::{AdditionalTaskInfo, PublishResult, PublishTarget, Publisher};
use crate::types::{Build, BuildRevision, Event};

/// Everything a handler needs to publish one revision.
pub struct PublishContext<'a> {
    pub publisher: &'a dyn Publisher,
    pub revision: &'a BuildRevision,
    pub target: &'a PublishTarget,
    pub info: &'a AdditionalTaskInfo,
}

impl PublishContext<'_> {
    fn build(&self) -> Option<&Build> {
        match self.target {
            PublishTarget::Build(build) => Some(build),
            PublishTarget::Promotion(_) => None,
        }
    }
}

/// Publishes one event through a publisher.
pub trait EventHandler: Send + Sync {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult;
}

struct Queued;
struct RemovedFromQueue;
struct Started;
struct Finished;
struct Commented;
struct Interrupted;
struct FailureDetected;
struct MarkedAsSuccessful;

impl EventHandler for Queued {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        ctx.publisher
            .build_queued(ctx.target.promotion(), ctx.revision, ctx.info)
    }
}

impl EventHandler for RemovedFromQueue {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        ctx.publisher
            .build_removed_from_queue(ctx.target.promotion(), ctx.revision, ctx.info)
    }
}

impl EventHandler for Started {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        match ctx.build() {
            Some(build) => ctx.publisher.build_started(build, ctx.revision),
            None => Ok(false),
        }
    }
}

impl EventHandler for Finished {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        match ctx.build() {
            Some(build) => ctx.publisher.build_finished(build, ctx.revision),
            None => Ok(false),
        }
    }
}

impl EventHandler for Commented {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        let Some(build) = ctx.build() else {
            return Ok(false);
        };
        // Nothing to publish is not a failure.
        let Some(comment) = build.comment() else {
            return Ok(true);
        };
        ctx.publisher.build_commented(
            build,
            ctx.revision,
            comment.author.as_ref(),
            &comment.text,
            build.is_in_progress(),
        )
    }
}

impl EventHandler for Interrupted {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        match ctx.build() {
            Some(build) => ctx.publisher.build_interrupted(build, ctx.revision),
            None => Ok(false),
        }
    }
}

impl EventHandler for FailureDetected {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        match ctx.build() {
            Some(build) => ctx.publisher.build_failure_detected(build, ctx.revision),
            None => Ok(false),
        }
    }
}

impl EventHandler for MarkedAsSuccessful {
    fn execute(&self, ctx: &PublishContext<'_>) -> PublishResult {
        match ctx.build() {
            Some(build) => {
                ctx.publisher
                    .build_marked_as_successful(build, ctx.revision, build.is_in_progress())
            }
            None => Ok(false),
        }
    }
}

/// Event to handler table.
pub struct HandlerTable {
    handlers: HashMap<Event, Box<dyn EventHandler>>,
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        let handlers = Event::ALL
            .into_iter()
            .map(|event| {
                let handler: Box<dyn EventHandler> = match event {
                    Event::Queued => Box::new(Queued),
                    Event::RemovedFromQueue => Box::new(RemovedFromQueue),
                    Event::Started => Box::new(Started),
                    Event::Finished => Box::new(Finished),
                    Event::Commented => Box::new(Commented),
                    Event::Interrupted => Box::new(Interrupted),
                    Event::FailureDetected => Box::new(FailureDetected),
                    Event::MarkedAsSuccessful => Box::new(MarkedAsSuccessful),
                };
                (event, handler)
            })
            .collect();
        HandlerTable { handlers }
    }

    pub fn get(&self, event: Event) -> Option<&dyn EventHandler> {
        self.handlers.get(&event).map(Box::as_ref)
    }
}

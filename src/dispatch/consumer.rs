//! Broker consumers that execute publish tasks.
//!
//! Both consumers mark the task finished before any publishing starts, so the
//! broker never redelivers it. A failed publish schedules its own follow-up
//! task instead.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::dispatcher::{EventDispatcher, PublishJob};
use super::order::OrderDecision;
use crate::broker::{PerformingTask, Task, TaskConsumer};
use crate::publisher::{AdditionalTaskInfo, PublishTarget};
use crate::types::{BuildId, Event, PromotionId};

fn task_event(task: &Task) -> Option<Event> {
    match task.task_type().parse() {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(error = %err, identity = task.identity(), "Ignoring task");
            None
        }
    }
}

/// Delay the task was submitted with, if it is a retry.
fn task_delay(task: &Task) -> Option<Duration> {
    task.data.secondary_arg.map(Duration::from_millis)
}

/// Whether the task's delay, if any, has elapsed.
fn is_due(task: &Task, now: DateTime<Utc>) -> bool {
    match task.data.secondary_arg {
        None => true,
        Some(delay_ms) => {
            TimeDelta::try_milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX))
                .and_then(|delay| task.created_at.checked_add_signed(delay))
                .is_some_and(|due| due <= now)
        }
    }
}

/// Executes build-scoped events (everything but the queue events).
pub struct BuildTaskConsumer {
    dispatcher: EventDispatcher,
}

impl BuildTaskConsumer {
    pub fn new(dispatcher: EventDispatcher) -> Self {
        BuildTaskConsumer { dispatcher }
    }
}

impl TaskConsumer for BuildTaskConsumer {
    /// Accepts a due task for a build this node is responsible for. A build
    /// that can no longer be found, or a task naming no build at all, is
    /// taken by any node managing builds so that it gets finished.
    fn before_accept(&self, task: &Task) -> bool {
        let Some(build_id) = task.data.primary_arg else {
            return self.dispatcher.cluster().can_manage_builds();
        };
        if !is_due(task, Utc::now()) {
            return false;
        }
        match self.dispatcher.builds().find_build(BuildId(build_id)) {
            Some(build) => self.dispatcher.cluster().is_responsible_for_build(&build),
            None => self.dispatcher.cluster().can_manage_builds(),
        }
    }

    fn accept(&self, task: PerformingTask) {
        let event = task_event(task.task());
        let build = task
            .task()
            .data
            .primary_arg
            .and_then(|id| self.dispatcher.builds().find_build(BuildId(id)));

        task.finish();
        let (Some(event), Some(build)) = (event, build) else {
            self.dispatcher.notify_processed(event);
            return;
        };

        let last_delay = task_delay(task.task());
        let decision =
            self.dispatcher
                .order_cache()
                .observe(build.promotion.id, event, last_delay.is_some());
        if let OrderDecision::Suppressed { previous } = decision {
            debug!(%event, %previous, build = %build.id, "Event suppressed by a later one");
            self.dispatcher.notify_processed(Some(event));
            return;
        }

        if last_delay.is_some() && event == Event::Started && build.is_finished() {
            debug!(build = %build.id, "Build already finished, dropping started retry");
            self.dispatcher.notify_processed(Some(event));
            return;
        }

        let job = PublishJob {
            event,
            target: PublishTarget::Build(build),
            info: AdditionalTaskInfo::default(),
            last_delay,
        };
        let dispatcher = self.dispatcher.clone();
        self.dispatcher
            .run_async(event, move || dispatcher.process_publishing(&job));
    }
}

/// Executes QUEUED tasks, keyed by promotion.
pub struct QueuedTaskConsumer {
    dispatcher: EventDispatcher,
}

impl QueuedTaskConsumer {
    pub fn new(dispatcher: EventDispatcher) -> Self {
        QueuedTaskConsumer { dispatcher }
    }
}

impl TaskConsumer for QueuedTaskConsumer {
    fn before_accept(&self, task: &Task) -> bool {
        is_due(task, Utc::now())
    }

    fn accept(&self, task: PerformingTask) {
        let event = task_event(task.task());
        let promotion = task
            .task()
            .data
            .primary_arg
            .and_then(|id| self.dispatcher.builds().find_promotion(PromotionId(id)));

        task.finish();
        let (Some(event), Some(promotion)) = (event, promotion) else {
            self.dispatcher.notify_processed(event);
            return;
        };

        let last_delay = task_delay(task.task());
        let decision = self
            .dispatcher
            .order_cache()
            .observe(promotion.id, event, last_delay.is_some());
        if let OrderDecision::Suppressed { previous } = decision {
            debug!(%event, %previous, promotion = %promotion.id, "Event suppressed by a later one");
            self.dispatcher.notify_processed(Some(event));
            return;
        }

        if last_delay.is_some() && !promotion.queued {
            debug!(promotion = %promotion.id, "Promotion left the queue, dropping queued retry");
            self.dispatcher.notify_processed(Some(event));
            return;
        }

        let job = PublishJob {
            event,
            info: AdditionalTaskInfo {
                description: task.task().data.payload.clone(),
                ..Default::default()
            },
            target: PublishTarget::Promotion(promotion),
            last_delay,
        };
        let dispatcher = self.dispatcher.clone();
        self.dispatcher
            .run_async(event, move || dispatcher.process_publishing(&job));
    }
}

//! In-process task broker.
//!
//! Tasks wait in a pending list keyed by identity until some consumer accepts
//! them. Each [`LocalTaskBroker::poll`] offers every pending task to the
//! consumers subscribed to its type:
//!
//! - singleton tasks go to the first consumer whose `before_accept` agrees;
//! - broadcast tasks go to every consumer whose `before_accept` agrees.
//!
//! A task nobody accepted stays pending and is offered again on the next poll.
//! Consumers are invoked without the broker lock held, so they may submit new
//! tasks from `accept`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{PerformingTask, Subscription, Task, TaskBroker, TaskConsumer, TaskData};

#[derive(Clone)]
struct Subscriber {
    subscription: Subscription,
    consumer: Arc<dyn TaskConsumer>,
}

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<String, Vec<Subscriber>>,
    /// Pending tasks in submission order.
    pending: Vec<Task>,
}

impl BrokerState {
    fn insert(&mut self, task: Task) {
        match self
            .pending
            .iter_mut()
            .find(|pending| pending.identity() == task.identity())
        {
            Some(existing) => *existing = task,
            None => self.pending.push(task),
        }
    }
}

/// Task broker for a single process.
#[derive(Default)]
pub struct LocalTaskBroker {
    state: Mutex<BrokerState>,
}

impl LocalTaskBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a task with an explicit creation time. Replaces a pending task
    /// with the same identity.
    pub fn enqueue(&self, task: Task) {
        trace!(identity = %task.identity(), "Task enqueued");
        self.state().insert(task);
    }

    /// Snapshot of the tasks not yet accepted by any consumer.
    pub fn pending(&self) -> Vec<Task> {
        self.state().pending.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Offers every pending task to its subscribers once.
    ///
    /// Returns the number of tasks that were accepted.
    pub fn poll(&self) -> usize {
        let (tasks, subscribers) = {
            let mut state = self.state();
            (std::mem::take(&mut state.pending), state.subscribers.clone())
        };

        let mut accepted = 0;
        let mut remaining = Vec::new();
        for task in tasks {
            let consumers = subscribers
                .get(task.task_type())
                .map(Vec::as_slice)
                .unwrap_or_default();
            if deliver(&task, consumers) {
                accepted += 1;
            } else {
                remaining.push(task);
            }
        }

        if !remaining.is_empty() {
            let mut state = self.state();
            // Tasks submitted during delivery are newer than the ones we
            // held back, so they win on identity collisions.
            let submitted = std::mem::take(&mut state.pending);
            state.pending = remaining;
            for task in submitted {
                state.insert(task);
            }
        }

        accepted
    }

    /// Polls on a fixed period until cancelled.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        info!(?period, "Task broker started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(pending = self.pending_count(), "Task broker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let accepted = self.poll();
                    if accepted > 0 {
                        debug!(accepted, "Delivered tasks");
                    }
                }
            }
        }
    }
}

/// Offers one task to its consumers. Returns true if anyone accepted it.
fn deliver(task: &Task, consumers: &[Subscriber]) -> bool {
    let mut delivered = false;
    for subscriber in consumers {
        if !subscriber.consumer.before_accept(task) {
            continue;
        }
        subscriber.consumer.accept(PerformingTask::new(task.clone()));
        delivered = true;
        if subscriber.subscription == Subscription::Singleton {
            break;
        }
    }
    delivered
}

impl TaskBroker for LocalTaskBroker {
    fn subscribe(&self, task_type: &str, subscription: Subscription, consumer: Arc<dyn TaskConsumer>) {
        debug!(task_type, ?subscription, "Consumer subscribed");
        self.state()
            .subscribers
            .entry(task_type.to_string())
            .or_default()
            .push(Subscriber {
                subscription,
                consumer,
            });
    }

    fn submit(&self, data: TaskData) {
        self.enqueue(Task::new(data, Utc::now()));
    }
}

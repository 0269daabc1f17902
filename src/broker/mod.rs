//! Task broker contract.
//!
//! The broker distributes named tasks to consumers, possibly on other cluster
//! nodes. Two delivery modes exist (see [`Subscription`]):
//!
//! - **Singleton**: at most one consumer processes a given task identity.
//! - **Broadcast**: every subscribed consumer is offered the task and decides
//!   independently in [`TaskConsumer::before_accept`].
//!
//! Delayed delivery is expressed by the consumer refusing a task in
//! `before_accept` until its delay has elapsed; the broker keeps offering it.
//!
//! [`LocalTaskBroker`] is an in-process implementation suitable for a
//! single-node deployment and for tests.

use std::sync::Arc;

mod local;
mod task;

pub use local::LocalTaskBroker;
pub use task::{PerformingTask, Task, TaskData};

pub use crate::types::Subscription;

/// Receives tasks of the types it subscribed to.
pub trait TaskConsumer: Send + Sync {
    /// Decides whether this consumer takes the task now. Returning false
    /// leaves the task with the broker.
    fn before_accept(&self, task: &Task) -> bool;

    /// Executes an accepted task. Must not block for long; heavy work is
    /// expected to move off the calling thread.
    fn accept(&self, task: PerformingTask);
}

/// Distributes tasks to consumers.
pub trait TaskBroker: Send + Sync {
    fn subscribe(&self, task_type: &str, subscription: Subscription, consumer: Arc<dyn TaskConsumer>);

    /// Submits a task. Fire-and-forget; an identity that is already pending
    /// is replaced.
    fn submit(&self, data: TaskData);

    fn subscribe_singleton(&self, task_type: &str, consumer: Arc<dyn TaskConsumer>) {
        self.subscribe(task_type, Subscription::Singleton, consumer);
    }

    fn subscribe_broadcast(&self, task_type: &str, consumer: Arc<dyn TaskConsumer>) {
        self.subscribe(task_type, Subscription::Broadcast, consumer);
    }
}

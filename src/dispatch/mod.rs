//! Event-to-task dispatch.
//!
//! This module decides which build lifecycle events are published, turns
//! them into broker tasks, and executes those tasks:
//!
//! - [`EventDispatcher`]: listener entry points, task submission and the
//!   publish loop.
//! - [`RetryPolicy`]: exponential backoff bounded by a delay and a duration
//!   ceiling.
//! - [`LockManager`]: striped per-revision locks.
//! - [`EventOrderCache`]: suppression of stale or duplicate deliveries.
//!
//! All of this state lives in memory and is rebuilt empty on restart.

mod config;
mod consumer;
mod dispatcher;
mod handler;
mod locks;
mod order;
mod retry;


pub use config::{ConfigError, DispatcherConfig, RetryConfig};
pub use consumer::{BuildTaskConsumer, QueuedTaskConsumer};
pub use dispatcher::{
    Collaborators, DispatcherState, EventDispatcher, PUBLISH_PROBLEM_TYPE, select_revisions,
    task_identity,
};
pub use handler::{EventHandler, HandlerTable, PublishContext};
pub use locks::{LockManager, removal_lock_key};
pub use order::{EventOrderCache, OrderDecision};
pub use retry::{RetryInfo, RetryPolicy};

//! Commit Status Dispatch - delivers build lifecycle events to commit status
//! publishers.
//!
//! This library decides which build events are published, distributes them as
//! tasks across server nodes, serializes publishes per revision, and retries
//! failed deliveries with bounded backoff.

pub mod broker;
pub mod builds;
pub mod cluster;
pub mod dispatch;
pub mod problems;
pub mod publisher;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

//! Task values exchanged with the task broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task as submitted by a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    /// Task type; consumers subscribe per type.
    pub task_type: String,
    /// Identity string. Re-submitting the same identity replaces the pending task.
    pub identity: String,
    pub primary_arg: Option<u64>,
    pub secondary_arg: Option<u64>,
    pub payload: Option<String>,
}

/// A task owned by the broker, stamped with its creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub data: TaskData,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(data: TaskData, created_at: DateTime<Utc>) -> Self {
        Task { data, created_at }
    }

    pub fn task_type(&self) -> &str {
        &self.data.task_type
    }

    pub fn identity(&self) -> &str {
        &self.data.identity
    }
}

#[derive(Debug, Default)]
struct Completion {
    finishes: AtomicU32,
}

/// A task handed to a consumer for execution.
///
/// The consumer must call [`PerformingTask::finish`] once it has taken
/// responsibility for the task; the broker never redelivers a finished task.
/// Clones share completion state.
#[derive(Debug, Clone)]
pub struct PerformingTask {
    task: Task,
    completion: Arc<Completion>,
}

impl PerformingTask {
    pub fn new(task: Task) -> Self {
        PerformingTask {
            task,
            completion: Arc::new(Completion::default()),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Marks the task finished. Returns true only for the first call.
    pub fn finish(&self) -> bool {
        self.completion.finishes.fetch_add(1, Ordering::SeqCst) == 0
    }

    pub fn is_finished(&self) -> bool {
        self.finish_count() > 0
    }

    /// Number of times `finish` was called.
    pub fn finish_count(&self) -> u32 {
        self.completion.finishes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            TaskData {
                task_type: "buildFinished".to_string(),
                identity: "buildFinished:1".to_string(),
                primary_arg: Some(1),
                secondary_arg: None,
                payload: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn finish_reports_first_call_only() {
        let performing = PerformingTask::new(task());
        assert!(!performing.is_finished());
        assert!(performing.finish());
        assert!(!performing.finish());
        assert_eq!(performing.finish_count(), 2);
    }

    #[test]
    fn clones_share_completion() {
        let performing = PerformingTask::new(task());
        let observer = performing.clone();
        performing.finish();
        assert!(observer.is_finished());
    }
}

//! Publishing problems shown to users.
//!
//! A problem is kept per build type and publisher. It is reported when a
//! publish fails, cleared before the publisher is tried again, and dropped
//! once the publisher is no longer configured on the build type.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::publisher::{Publisher, PublisherError, PublisherErrorKind};
use crate::types::{BuildTypeId, PublisherId};

/// A reported publishing problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishProblem {
    pub publisher: PublisherId,
    pub message: String,
    /// Description of the build or promotion being published.
    pub target: String,
    /// Hosting service endpoint, when the publisher exposes one.
    pub url: Option<String>,
    pub cause: String,
    pub kind: PublisherErrorKind,
    pub reported_at: DateTime<Utc>,
}

/// Collects publishing problems.
pub trait ProblemReporter: Send + Sync {
    fn report_problem(
        &self,
        message: &str,
        publisher: &dyn Publisher,
        target: &str,
        url: Option<&str>,
        cause: &PublisherError,
    );

    /// Clears the problem of one publisher.
    fn clear_problem(&self, publisher: &dyn Publisher);

    /// Clears problems of publishers no longer in `active`.
    fn clear_obsolete_problems(&self, build_type: &BuildTypeId, active: &BTreeSet<PublisherId>);

    fn has_problems(&self, build_type: &BuildTypeId) -> bool;
}

/// Problem store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryProblems {
    problems: RwLock<HashMap<BuildTypeId, BTreeMap<PublisherId, PublishProblem>>>,
}

impl InMemoryProblems {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<BuildTypeId, BTreeMap<PublisherId, PublishProblem>>> {
        self.problems.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<BuildTypeId, BTreeMap<PublisherId, PublishProblem>>> {
        self.problems.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn problem(&self, build_type: &BuildTypeId, publisher: &PublisherId) -> Option<PublishProblem> {
        self.read()
            .get(build_type)
            .and_then(|problems| problems.get(publisher))
            .cloned()
    }

    /// Problems of one build type, ordered by publisher id.
    pub fn problems_for(&self, build_type: &BuildTypeId) -> Vec<PublishProblem> {
        self.read()
            .get(build_type)
            .map(|problems| problems.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }
}

impl ProblemReporter for InMemoryProblems {
    fn report_problem(
        &self,
        message: &str,
        publisher: &dyn Publisher,
        target: &str,
        url: Option<&str>,
        cause: &PublisherError,
    ) {
        warn!(
            publisher = %publisher.id(),
            build_type = %publisher.build_type_id(),
            target,
            error = %cause,
            kind = %cause.kind,
            "{message}"
        );
        let problem = PublishProblem {
            publisher: publisher.id().clone(),
            message: message.to_string(),
            target: target.to_string(),
            url: url.map(str::to_string),
            cause: cause.to_string(),
            kind: cause.kind,
            reported_at: Utc::now(),
        };
        self.write()
            .entry(publisher.build_type_id().clone())
            .or_default()
            .insert(publisher.id().clone(), problem);
    }

    fn clear_problem(&self, publisher: &dyn Publisher) {
        let mut problems = self.write();
        if let Some(for_type) = problems.get_mut(publisher.build_type_id()) {
            for_type.remove(publisher.id());
            if for_type.is_empty() {
                problems.remove(publisher.build_type_id());
            }
        }
    }

    fn clear_obsolete_problems(&self, build_type: &BuildTypeId, active: &BTreeSet<PublisherId>) {
        let mut problems = self.write();
        let Some(for_type) = problems.get_mut(build_type) else {
            return;
        };
        let before = for_type.len();
        for_type.retain(|publisher, _| active.contains(publisher));
        let dropped = before - for_type.len();
        if dropped > 0 {
            info!(%build_type, dropped, "Cleared problems of removed publishers");
        }
        if for_type.is_empty() {
            problems.remove(build_type);
        }
    }

    fn has_problems(&self, build_type: &BuildTypeId) -> bool {
        self.read().get(build_type).is_some_and(|p| !p.is_empty())
    }
}

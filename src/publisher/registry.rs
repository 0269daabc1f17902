//! Publisher registry backed by an in-memory table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{Publisher, PublisherRegistry};
use crate::types::{BuildType, BuildTypeId};

/// Registry holding publishers registered per build type.
///
/// A registered publisher is returned only while the build type has an
/// enabled publishing feature with the publisher's id.
#[derive(Default)]
pub struct InMemoryRegistry {
    publishers: RwLock<HashMap<BuildTypeId, Vec<Arc<dyn Publisher>>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a publisher, replacing one with the same id on the same
    /// build type.
    pub fn register(&self, publisher: Arc<dyn Publisher>) {
        let mut publishers = self
            .publishers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let for_type = publishers
            .entry(publisher.build_type_id().clone())
            .or_default();
        for_type.retain(|p| p.id() != publisher.id());
        debug!(
            publisher = %publisher.id(),
            build_type = %publisher.build_type_id(),
            "Publisher registered"
        );
        for_type.push(publisher);
    }

    pub fn len(&self) -> usize {
        self.publishers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PublisherRegistry for InMemoryRegistry {
    fn configured_publishers(&self, build_type: &BuildType) -> Vec<Arc<dyn Publisher>> {
        let active = build_type.active_feature_ids();
        self.publishers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&build_type.id)
            .map(|publishers| {
                publishers
                    .iter()
                    .filter(|p| active.contains(p.id()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

//! The publisher capability and the registry that resolves it.
//!
//! A [`Publisher`] translates build lifecycle events into commit statuses on
//! one hosting service (Bitbucket Server, GitLab, ...). Concrete HTTP clients
//! live outside this crate; the dispatcher only relies on this trait.
//!
//! Publish methods are blocking. The dispatcher calls them from blocking
//! worker threads while holding a per-revision lock, so an implementation
//! is free to perform synchronous network I/O bounded by its own timeouts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

mod error;
mod registry;
mod status;

pub use error::{PublisherError, PublisherErrorKind};
pub use registry::InMemoryRegistry;
pub use status::{RecordedStatus, RemoteStatus};

use crate::types::{
    Build, BuildId, BuildRevision, BuildType, BuildTypeId, Event, Promotion, PromotionId,
    PublisherId, UserRef,
};

/// Result of a single publish call. `Ok(false)` means the publisher chose not
/// to post anything for this event.
pub type PublishResult = Result<bool, PublisherError>;

/// What a publish is about: a running/finished build, or a promotion that is
/// still queued (or was just removed from the queue).
#[derive(Debug, Clone)]
pub enum PublishTarget {
    Build(Build),
    Promotion(Promotion),
}

impl PublishTarget {
    pub fn promotion(&self) -> &Promotion {
        match self {
            PublishTarget::Build(build) => &build.promotion,
            PublishTarget::Promotion(promotion) => promotion,
        }
    }

    pub fn promotion_id(&self) -> PromotionId {
        self.promotion().id
    }

    pub fn build_type(&self) -> Option<&BuildType> {
        self.promotion().build_type.as_ref()
    }

    pub fn build_type_id(&self) -> &BuildTypeId {
        &self.promotion().build_type_id
    }

    /// The build associated with the target, if the promotion has one.
    pub fn associated_build(&self) -> Option<BuildId> {
        match self {
            PublishTarget::Build(build) => Some(build.id),
            PublishTarget::Promotion(promotion) => promotion.associated_build,
        }
    }
}

impl fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishTarget::Build(build) => build.fmt(f),
            PublishTarget::Promotion(promotion) => promotion.fmt(f),
        }
    }
}

/// Default status description of a queued build.
pub const BUILD_QUEUED: &str = "Build queued";

/// Default status description of a build removed from the queue.
pub const BUILD_REMOVED_FROM_QUEUE: &str = "Build removed from queue";

/// Status description of a build canceled while queued.
pub const BUILD_REMOVED_AS_CANCELED: &str = "Build was canceled";

/// Extra data carried by queue-related publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalTaskInfo {
    /// Status description to show on the hosting service.
    pub description: Option<String>,
    /// Comment left by the user who removed the build, if any.
    pub comment: Option<String>,
    pub comment_author: Option<UserRef>,
    /// Promotion that replaced the removed one (e.g. after queue optimization).
    pub replacing_promotion: Option<PromotionId>,
}

/// A commit status publisher for one hosting integration on one build type.
///
/// Every publish method defaults to `Ok(false)`; implementations override the
/// events they report in [`Publisher::is_event_supported`].
pub trait Publisher: Send + Sync {
    /// Id of the publishing feature this publisher was created from.
    fn id(&self) -> &PublisherId;

    /// Build type this publisher was configured on.
    fn build_type_id(&self) -> &BuildTypeId;

    /// VCS root this publisher is restricted to, if any.
    fn vcs_root_id(&self) -> Option<&str> {
        None
    }

    fn is_event_supported(&self, event: Event) -> bool;

    /// Whether the publisher can currently publish for the target, e.g. its
    /// credentials are still valid.
    fn is_available(&self, _target: &PublishTarget) -> bool {
        true
    }

    /// Used when no VCS root id is configured to decide which revisions to
    /// publish for.
    fn is_publishing_for_revision(&self, _revision: &BuildRevision) -> bool {
        true
    }

    fn build_queued(
        &self,
        _promotion: &Promotion,
        _revision: &BuildRevision,
        _info: &AdditionalTaskInfo,
    ) -> PublishResult {
        Ok(false)
    }

    fn build_removed_from_queue(
        &self,
        _promotion: &Promotion,
        _revision: &BuildRevision,
        _info: &AdditionalTaskInfo,
    ) -> PublishResult {
        Ok(false)
    }

    fn build_started(&self, _build: &Build, _revision: &BuildRevision) -> PublishResult {
        Ok(false)
    }

    fn build_finished(&self, _build: &Build, _revision: &BuildRevision) -> PublishResult {
        Ok(false)
    }

    fn build_commented(
        &self,
        _build: &Build,
        _revision: &BuildRevision,
        _author: Option<&UserRef>,
        _comment: &str,
        _build_in_progress: bool,
    ) -> PublishResult {
        Ok(false)
    }

    fn build_interrupted(&self, _build: &Build, _revision: &BuildRevision) -> PublishResult {
        Ok(false)
    }

    fn build_failure_detected(&self, _build: &Build, _revision: &BuildRevision) -> PublishResult {
        Ok(false)
    }

    fn build_marked_as_successful(
        &self,
        _build: &Build,
        _revision: &BuildRevision,
        _build_in_progress: bool,
    ) -> PublishResult {
        Ok(false)
    }

    /// Status currently shown by the hosting service for the revision.
    fn revision_status(
        &self,
        _promotion: &Promotion,
        _revision: &BuildRevision,
    ) -> Result<Option<Box<dyn RemoteStatus>>, PublisherError> {
        Ok(None)
    }
}

/// Resolves the publishers configured for a build type.
pub trait PublisherRegistry: Send + Sync {
    /// Publishers created from the build type's enabled publishing features.
    fn configured_publishers(&self, build_type: &BuildType) -> Vec<Arc<dyn Publisher>>;

    /// Publishers added on top of the configured ones (e.g. integrations that
    /// publish without an explicit feature). A supplementary publisher
    /// replaces a configured one with the same id.
    fn supplementary_publishers(
        &self,
        _build_type: &BuildType,
        _configured: &[Arc<dyn Publisher>],
    ) -> Vec<Arc<dyn Publisher>> {
        Vec::new()
    }

    /// Whether some integration can publish for this build type even though
    /// no publishing feature is configured.
    fn is_feature_less_publishing_possible(&self, _build_type: &BuildType) -> bool {
        false
    }

    /// All publishers for a build type, keyed by publisher id.
    fn publishers_for(&self, build_type: &BuildType) -> BTreeMap<PublisherId, Arc<dyn Publisher>> {
        let configured = self.configured_publishers(build_type);
        let supplementary = self.supplementary_publishers(build_type, &configured);
        configured
            .into_iter()
            .chain(supplementary)
            .map(|publisher| (publisher.id().clone(), publisher))
            .collect()
    }
}

//! Core domain types for commit status dispatch.
//!
//! This module contains the identifiers, lifecycle events, and build model
//! shared by every other part of the crate.

pub mod build;
pub mod event;
pub mod ids;

// Re-export commonly used types at the module level
pub use build::{
    Build, BuildProblem, BuildRevision, BuildState, BuildStatus, BuildType, CanceledInfo, Comment,
    FAIL_BUILD_ON_PUBLISH_ERROR_PARAM, PUBLISHING_ENABLED_PARAM, Promotion, PublishingFeature,
    UserRef, VcsRootInstance,
};
pub use event::{Event, Subscription, UnknownEvent};
pub use ids::{BuildId, BuildTypeId, NodeId, PromotionId, PublisherId, UserId};

//! Build model as seen by the dispatcher.
//!
//! These are snapshots resolved from the [`BuildStore`](crate::builds::BuildStore)
//! at the moment a task is accepted. The dispatcher never mutates them; the
//! only write path back into the build server is
//! [`BuildStore::add_build_problem`](crate::builds::BuildStore::add_build_problem).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{BuildId, BuildTypeId, NodeId, PromotionId, PublisherId, UserId};

/// Build type parameter that disables (`"false"`) or force-enables (`"true"`)
/// publishing for a single build configuration.
pub const PUBLISHING_ENABLED_PARAM: &str = "status_publisher.enabled";

/// Build type parameter that attaches a build problem when publishing fails.
pub const FAIL_BUILD_ON_PUBLISH_ERROR_PARAM: &str = "status_publisher.fail_build_on_publish_error";

/// A publishing feature configured on a build type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingFeature {
    pub id: PublisherId,
    pub enabled: bool,
}

/// A build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildType {
    pub id: BuildTypeId,
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub features: Vec<PublishingFeature>,
}

impl BuildType {
    pub fn new(id: impl Into<BuildTypeId>, name: impl Into<String>) -> Self {
        BuildType {
            id: id.into(),
            name: name.into(),
            parameters: BTreeMap::new(),
            features: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_feature(mut self, id: impl Into<PublisherId>, enabled: bool) -> Self {
        self.features.push(PublishingFeature {
            id: id.into(),
            enabled,
        });
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Returns true if at least one publishing feature is enabled.
    pub fn has_enabled_feature(&self) -> bool {
        self.features.iter().any(|f| f.enabled)
    }

    /// Ids of the enabled publishing features.
    pub fn active_feature_ids(&self) -> BTreeSet<PublisherId> {
        self.features
            .iter()
            .filter(|f| f.enabled)
            .map(|f| f.id.clone())
            .collect()
    }

    pub fn fail_build_on_publish_error(&self) -> bool {
        self.parameter(FAIL_BUILD_ON_PUBLISH_ERROR_PARAM)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// A VCS root attached to a build type.
///
/// `id` identifies this instance; `parent_id` and `parent_external_id`
/// identify the root definition it was instantiated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRootInstance {
    pub id: u64,
    pub parent_id: u64,
    pub parent_external_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl VcsRootInstance {
    /// Returns true if `root_id` refers to this root's definition, by
    /// external id, by one of its aliases, or by numeric id.
    pub fn matches_root_id(&self, root_id: &str) -> bool {
        self.parent_external_id == root_id
            || self.aliases.iter().any(|alias| alias == root_id)
            || self.parent_id.to_string() == root_id
    }
}

/// A VCS revision a build was run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRevision {
    pub revision: String,
    pub root: VcsRootInstance,
    pub branch: Option<String>,
}

/// Outcome status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    #[default]
    Normal,
    Warning,
    Failure,
    Error,
}

impl BuildStatus {
    pub fn is_failed(self) -> bool {
        matches!(self, BuildStatus::Failure | BuildStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub username: String,
}

/// A comment left on a build or promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: Option<UserRef>,
    pub text: String,
}

/// Who canceled a build, and why.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanceledInfo {
    pub user_id: Option<UserId>,
    pub comment: Option<String>,
}

/// A problem attached to a build, visible to users and able to fail it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProblem {
    pub identity: String,
    pub kind: String,
    pub description: String,
}

/// The logical identity of a build across its queued and running lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub build_type_id: BuildTypeId,
    /// `None` when the build type was deleted after the promotion was created.
    pub build_type: Option<BuildType>,
    #[serde(default)]
    pub revisions: Vec<BuildRevision>,
    /// Node that created the promotion.
    pub creator_node: NodeId,
    /// Still waiting in the queue.
    pub queued: bool,
    /// Left the queue because it started running.
    pub started: bool,
    pub canceled: bool,
    pub failed_to_collect_changes: bool,
    /// Changes have not been collected yet, so revisions are not final.
    pub change_collecting_needed: bool,
    pub part_of_chain: bool,
    pub has_changes: bool,
    /// Number of promotions depending on this one.
    pub dependents: u32,
    pub associated_build: Option<BuildId>,
    pub comment: Option<Comment>,
}

impl Promotion {
    /// Creates a queued promotion with no revisions.
    pub fn new(id: PromotionId, build_type: BuildType, creator_node: NodeId) -> Self {
        Promotion {
            id,
            build_type_id: build_type.id.clone(),
            build_type: Some(build_type),
            revisions: Vec::new(),
            creator_node,
            queued: true,
            started: false,
            canceled: false,
            failed_to_collect_changes: false,
            change_collecting_needed: false,
            part_of_chain: false,
            has_changes: true,
            dependents: 0,
            associated_build: None,
            comment: None,
        }
    }

    pub fn with_revision(mut self, revision: BuildRevision) -> Self {
        self.revisions.push(revision);
        self
    }

    /// Queued status would be overwritten immediately: the promotion is part of
    /// a chain, has no changes of its own, and other promotions depend on it.
    pub fn will_be_optimized_away(&self) -> bool {
        self.part_of_chain && !self.has_changes && self.dependents != 0
    }
}

impl fmt::Display for Promotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promotion {} {{{}}}", self.id.0, self.build_type_id)
    }
}

/// Whether a build is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Running,
    Finished,
}

/// A concrete build instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub promotion: Promotion,
    pub state: BuildState,
    pub status: BuildStatus,
    pub canceled_info: Option<CanceledInfo>,
}

impl Build {
    /// Creates a running build for a promotion that has left the queue.
    pub fn new(id: BuildId, mut promotion: Promotion) -> Self {
        promotion.queued = false;
        promotion.started = true;
        promotion.associated_build = Some(id);
        Build {
            id,
            promotion,
            state: BuildState::Running,
            status: BuildStatus::Normal,
            canceled_info: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == BuildState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state == BuildState::Finished
    }

    pub fn build_type(&self) -> Option<&BuildType> {
        self.promotion.build_type.as_ref()
    }

    pub fn revisions(&self) -> &[BuildRevision] {
        &self.promotion.revisions
    }

    pub fn comment(&self) -> Option<&Comment> {
        self.promotion.comment.as_ref()
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build {} {{{}}}, promotion {}",
            self.id, self.promotion.build_type_id, self.promotion.id.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> VcsRootInstance {
        VcsRootInstance {
            id: 7,
            parent_id: 3,
            parent_external_id: "Project_GitRoot".to_string(),
            aliases: vec!["OldRootName".to_string()],
        }
    }

    #[test]
    fn root_matches_external_id_alias_or_numeric_id() {
        let root = root();
        assert!(root.matches_root_id("Project_GitRoot"));
        assert!(root.matches_root_id("OldRootName"));
        assert!(root.matches_root_id("3"));
        assert!(!root.matches_root_id("7"));
        assert!(!root.matches_root_id("Other"));
    }

    #[test]
    fn active_features_exclude_disabled() {
        let bt = BuildType::new("Bt1", "Build")
            .with_feature("F1", true)
            .with_feature("F2", false);
        assert!(bt.has_enabled_feature());
        assert_eq!(
            bt.active_feature_ids().into_iter().collect::<Vec<_>>(),
            vec![PublisherId::new("F1")]
        );
    }

    #[test]
    fn fail_build_parameter_is_case_insensitive() {
        let bt = BuildType::new("Bt1", "Build").with_parameter(FAIL_BUILD_ON_PUBLISH_ERROR_PARAM, "TRUE");
        assert!(bt.fail_build_on_publish_error());
        assert!(!BuildType::new("Bt2", "Build").fail_build_on_publish_error());
    }

    #[test]
    fn optimized_away_requires_chain_without_changes_and_dependents() {
        let mut p = Promotion::new(PromotionId(1), BuildType::new("Bt", "B"), NodeId::new("main"));
        assert!(!p.will_be_optimized_away());
        p.part_of_chain = true;
        p.has_changes = false;
        assert!(!p.will_be_optimized_away());
        p.dependents = 2;
        assert!(p.will_be_optimized_away());
    }

    #[test]
    fn new_build_leaves_queue() {
        let p = Promotion::new(PromotionId(1), BuildType::new("Bt", "B"), NodeId::new("main"));
        let build = Build::new(BuildId(10), p);
        assert!(!build.promotion.queued);
        assert!(build.promotion.started);
        assert_eq!(build.promotion.associated_build, Some(BuildId(10)));
        assert!(build.is_in_progress());
    }
}

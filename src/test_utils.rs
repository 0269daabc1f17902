//! Shared test fakes, builders and arbitrary generators for property-based testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use crate::cluster::{ClusterNode, NodeResponsibility};
use crate::publisher::{
    AdditionalTaskInfo, PublishResult, PublishTarget, Publisher, PublisherError, PublisherRegistry,
    RecordedStatus, RemoteStatus,
};
use crate::types::{
    Build, BuildId, BuildRevision, BuildType, BuildTypeId, Event, NodeId, Promotion, PromotionId,
    PublisherId, UserRef, VcsRootInstance,
};

// ─── Builders ───

/// A build type with one enabled publishing feature `F1`.
pub fn build_type(id: &str) -> BuildType {
    BuildType::new(id, format!("{id} build")).with_feature("F1", true)
}

pub fn vcs_root(id: u64, external_id: &str) -> VcsRootInstance {
    VcsRootInstance {
        id: id * 10,
        parent_id: id,
        parent_external_id: external_id.to_string(),
        aliases: Vec::new(),
    }
}

/// A revision on root `Root1`.
pub fn revision(rev: &str) -> BuildRevision {
    BuildRevision {
        revision: rev.to_string(),
        root: vcs_root(1, "Root1"),
        branch: Some("refs/heads/main".to_string()),
    }
}

/// A queued promotion created on node `main`, without revisions.
pub fn promotion(id: u64, build_type_id: &str) -> Promotion {
    Promotion::new(PromotionId(id), build_type(build_type_id), NodeId::new("main"))
}

pub fn build(id: u64, promotion: Promotion) -> Build {
    Build::new(BuildId(id), promotion)
}

// ─── MockPublisher ───

/// One successful publish seen by a [`MockPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub event: Event,
    pub revision: String,
    pub target: String,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub author: Option<String>,
    pub replacing: Option<PromotionId>,
    pub build_in_progress: Option<bool>,
}

impl Published {
    fn new(event: Event, revision: &BuildRevision, target: String) -> Self {
        Published {
            event,
            revision: revision.revision.clone(),
            target,
            description: None,
            comment: None,
            author: None,
            replacing: None,
            build_in_progress: None,
        }
    }

    fn with_info(mut self, info: &AdditionalTaskInfo) -> Self {
        self.description = info.description.clone();
        self.comment = info.comment.clone();
        self.author = info.comment_author.as_ref().map(|u| u.username.clone());
        self.replacing = info.replacing_promotion;
        self
    }
}

/// Publisher that records what it publishes and fails on demand.
pub struct MockPublisher {
    id: PublisherId,
    build_type: BuildTypeId,
    events: Option<HashSet<Event>>,
    vcs_root: Option<String>,
    hold: Option<Duration>,
    available: AtomicBool,
    panic_next: AtomicBool,
    failures: Mutex<VecDeque<PublisherError>>,
    remote_status: Mutex<Result<Option<Event>, PublisherError>>,
    status_checks: AtomicUsize,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    published: Mutex<Vec<Published>>,
}

impl MockPublisher {
    /// A publisher supporting every event.
    pub fn new(id: &str, build_type: &str) -> Self {
        MockPublisher {
            id: PublisherId::new(id),
            build_type: BuildTypeId::new(build_type),
            events: None,
            vcs_root: None,
            hold: None,
            available: AtomicBool::new(true),
            panic_next: AtomicBool::new(false),
            failures: Mutex::new(VecDeque::new()),
            remote_status: Mutex::new(Ok(None)),
            status_checks: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn with_events(mut self, events: &[Event]) -> Self {
        self.events = Some(events.iter().copied().collect());
        self
    }

    pub fn with_vcs_root(mut self, root_id: &str) -> Self {
        self.vcs_root = Some(root_id.to_string());
        self
    }

    /// Sleeps inside every publish, to make overlapping calls observable.
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }

    /// Queues errors returned by the next publish attempts.
    pub fn fail_with(&self, errors: impl IntoIterator<Item = PublisherError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Sets what the hosting service reports as the current status.
    pub fn set_remote_status(&self, status: Result<Option<Event>, PublisherError>) {
        *self.remote_status.lock().unwrap() = status;
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_events(&self) -> Vec<Event> {
        self.published().into_iter().map(|p| p.event).collect()
    }

    /// Publish calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// Highest number of publish calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, published: Published) -> PublishResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(hold) = self.hold {
            thread::sleep(hold);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("mock publisher exploded");
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.published.lock().unwrap().push(published);
        Ok(true)
    }
}

impl Publisher for MockPublisher {
    fn id(&self) -> &PublisherId {
        &self.id
    }

    fn build_type_id(&self) -> &BuildTypeId {
        &self.build_type
    }

    fn vcs_root_id(&self) -> Option<&str> {
        self.vcs_root.as_deref()
    }

    fn is_event_supported(&self, event: Event) -> bool {
        self.events.as_ref().is_none_or(|events| events.contains(&event))
    }

    fn is_available(&self, _target: &PublishTarget) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn build_queued(&self, promotion: &Promotion, revision: &BuildRevision, info: &AdditionalTaskInfo) -> PublishResult {
        self.record(Published::new(Event::Queued, revision, promotion.to_string()).with_info(info))
    }

    fn build_removed_from_queue(
        &self,
        promotion: &Promotion,
        revision: &BuildRevision,
        info: &AdditionalTaskInfo,
    ) -> PublishResult {
        self.record(
            Published::new(Event::RemovedFromQueue, revision, promotion.to_string()).with_info(info),
        )
    }

    fn build_started(&self, build: &Build, revision: &BuildRevision) -> PublishResult {
        self.record(Published::new(Event::Started, revision, build.to_string()))
    }

    fn build_finished(&self, build: &Build, revision: &BuildRevision) -> PublishResult {
        self.record(Published::new(Event::Finished, revision, build.to_string()))
    }

    fn build_commented(
        &self,
        build: &Build,
        revision: &BuildRevision,
        author: Option<&UserRef>,
        comment: &str,
        build_in_progress: bool,
    ) -> PublishResult {
        let mut published = Published::new(Event::Commented, revision, build.to_string());
        published.comment = Some(comment.to_string());
        published.author = author.map(|u| u.username.clone());
        published.build_in_progress = Some(build_in_progress);
        self.record(published)
    }

    fn build_interrupted(&self, build: &Build, revision: &BuildRevision) -> PublishResult {
        self.record(Published::new(Event::Interrupted, revision, build.to_string()))
    }

    fn build_failure_detected(&self, build: &Build, revision: &BuildRevision) -> PublishResult {
        self.record(Published::new(Event::FailureDetected, revision, build.to_string()))
    }

    fn build_marked_as_successful(
        &self,
        build: &Build,
        revision: &BuildRevision,
        build_in_progress: bool,
    ) -> PublishResult {
        let mut published = Published::new(Event::MarkedAsSuccessful, revision, build.to_string());
        published.build_in_progress = Some(build_in_progress);
        self.record(published)
    }

    fn revision_status(
        &self,
        _promotion: &Promotion,
        _revision: &BuildRevision,
    ) -> Result<Option<Box<dyn RemoteStatus>>, PublisherError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let status = self.remote_status.lock().unwrap().clone()?;
        Ok(status.map(|event| Box::new(RecordedStatus::new(Some(event))) as Box<dyn RemoteStatus>))
    }
}

// ─── StaticRegistry ───

/// Registry returning fixed publishers per build type.
#[derive(Default)]
pub struct StaticRegistry {
    configured: RwLock<HashMap<BuildTypeId, Vec<Arc<dyn Publisher>>>>,
    supplementary: RwLock<HashMap<BuildTypeId, Vec<Arc<dyn Publisher>>>>,
    feature_less: AtomicBool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, publisher: Arc<dyn Publisher>) {
        self.configured
            .write()
            .unwrap()
            .entry(publisher.build_type_id().clone())
            .or_default()
            .push(publisher);
    }

    pub fn add_supplementary(&self, publisher: Arc<dyn Publisher>) {
        self.supplementary
            .write()
            .unwrap()
            .entry(publisher.build_type_id().clone())
            .or_default()
            .push(publisher);
    }

    pub fn set_feature_less_publishing(&self, possible: bool) {
        self.feature_less.store(possible, Ordering::SeqCst);
    }
}

impl PublisherRegistry for StaticRegistry {
    fn configured_publishers(&self, build_type: &BuildType) -> Vec<Arc<dyn Publisher>> {
        self.configured
            .read()
            .unwrap()
            .get(&build_type.id)
            .cloned()
            .unwrap_or_default()
    }

    fn supplementary_publishers(
        &self,
        build_type: &BuildType,
        _configured: &[Arc<dyn Publisher>],
    ) -> Vec<Arc<dyn Publisher>> {
        self.supplementary
            .read()
            .unwrap()
            .get(&build_type.id)
            .cloned()
            .unwrap_or_default()
    }

    fn is_feature_less_publishing_possible(&self, _build_type: &BuildType) -> bool {
        self.feature_less.load(Ordering::SeqCst)
    }
}

// ─── FakeCluster ───

/// Cluster view with switchable answers.
pub struct FakeCluster {
    current: NodeId,
    responsible: AtomicBool,
    can_manage: AtomicBool,
    nodes: Mutex<Vec<ClusterNode>>,
}

impl FakeCluster {
    /// A cluster of one main node.
    pub fn single(node: &str) -> Self {
        Self::new(
            node,
            vec![ClusterNode {
                id: NodeId::new(node),
                online: true,
                main: true,
            }],
        )
    }

    /// `current`'s view of a cluster made of `nodes`.
    pub fn new(current: &str, nodes: Vec<ClusterNode>) -> Self {
        FakeCluster {
            current: NodeId::new(current),
            responsible: AtomicBool::new(true),
            can_manage: AtomicBool::new(true),
            nodes: Mutex::new(nodes),
        }
    }

    pub fn set_responsible(&self, responsible: bool) {
        self.responsible.store(responsible, Ordering::SeqCst);
    }

    pub fn set_can_manage_builds(&self, can_manage: bool) {
        self.can_manage.store(can_manage, Ordering::SeqCst);
    }

    pub fn set_online(&self, node: &str, online: bool) {
        for n in self.nodes.lock().unwrap().iter_mut() {
            if n.id.as_str() == node {
                n.online = online;
            }
        }
    }
}

impl NodeResponsibility for FakeCluster {
    fn current_node(&self) -> NodeId {
        self.current.clone()
    }

    fn is_main_node(&self) -> bool {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .any(|n| n.id == self.current && n.main)
    }

    fn is_responsible_for_build(&self, _build: &Build) -> bool {
        self.responsible.load(Ordering::SeqCst)
    }

    fn can_manage_builds(&self) -> bool {
        self.can_manage.load(Ordering::SeqCst)
    }

    fn nodes(&self) -> Vec<ClusterNode> {
        self.nodes.lock().unwrap().clone()
    }
}

// ─── Generators ───

pub fn arb_event() -> impl Strategy<Value = Event> {
    prop::sample::select(Event::ALL.to_vec())
}

pub fn arb_revision() -> impl Strategy<Value = String> {
    "[0-9a-f]{40}".prop_map(String::from)
}

pub fn arb_delay() -> impl Strategy<Value = Option<Duration>> {
    prop::option::of((1u64..86_400_000).prop_map(Duration::from_millis))
}

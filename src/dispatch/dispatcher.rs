//! The event dispatcher.
//!
//! Build lifecycle notifications enter through the listener methods
//! (`build_started`, `build_finished`, ...). Eligible events become broker
//! tasks; every node's consumers (see [`super::consumer`]) decide whether to
//! accept them and then run the publish loop on a blocking worker thread.
//!
//! # Publish loop
//!
//! For each publisher of the build type that supports the event:
//!
//! 1. skip it if publishing is administratively disabled;
//! 2. pick the revisions it publishes for, skipping it if there are none;
//! 3. clear its previous problem;
//! 4. publish every revision under the revision's lock, collecting retry
//!    decisions;
//! 5. resubmit the event with a longer delay if any revision asked for a
//!    retry. Only the first retry decision is used.
//!
//! Problems of publishers no longer configured are cleared at the end.

use std::collections::{BTreeSet, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::config::{DispatcherConfig, RetryConfig, duration_millis};
use super::consumer::{BuildTaskConsumer, QueuedTaskConsumer};
use super::handler::{HandlerTable, PublishContext};
use super::locks::{LockManager, removal_lock_key};
use super::order::EventOrderCache;
use super::retry::{RetryInfo, RetryPolicy};
use crate::broker::{TaskBroker, TaskData};
use crate::builds::BuildStore;
use crate::cluster::{NodeResponsibility, owns_queue_removal};
use crate::problems::ProblemReporter;
use crate::publisher::{
    AdditionalTaskInfo, BUILD_QUEUED, BUILD_REMOVED_AS_CANCELED, BUILD_REMOVED_FROM_QUEUE,
    PublishTarget, Publisher, PublisherError, PublisherRegistry,
};
use crate::types::{
    Build, BuildProblem, BuildRevision, BuildStatus, BuildType, BuildTypeId, Event,
    PUBLISHING_ENABLED_PARAM, Promotion, UserRef,
};

/// Build problem type attached when publishing fails a build.
pub const PUBLISH_PROBLEM_TYPE: &str = "commitStatusPublisherProblem";

/// External services the dispatcher talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn PublisherRegistry>,
    pub builds: Arc<dyn BuildStore>,
    pub cluster: Arc<dyn NodeResponsibility>,
    pub problems: Arc<dyn ProblemReporter>,
    pub broker: Arc<dyn TaskBroker>,
}

/// Point-in-time view of the dispatcher's in-memory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherState {
    pub node: String,
    pub publishing_enabled: bool,
    pub queue_enabled: bool,
    pub order_cache_entries: usize,
    pub order_cache_capacity: usize,
    pub lock_stripes: usize,
    /// Build types currently retrying after a failure.
    pub failing_build_types: usize,
    pub retry: RetryConfig,
}

/// A cached yes/no answer with an expiry.
#[derive(Debug, Clone, Copy)]
struct CachedFlag {
    value: bool,
    expires_at: Instant,
}

/// One run of the publish loop.
pub(super) struct PublishJob {
    pub event: Event,
    pub target: PublishTarget,
    pub info: AdditionalTaskInfo,
    /// Delay of the task being executed, if it was itself a retry.
    pub last_delay: Option<Duration>,
}

struct Inner {
    config: DispatcherConfig,
    collab: Collaborators,
    retry: RetryPolicy,
    locks: LockManager,
    order: EventOrderCache,
    handlers: HandlerTable,
    feature_cache: Mutex<HashMap<BuildTypeId, CachedFlag>>,
    processed: Mutex<Option<mpsc::UnboundedSender<Event>>>,
}

/// Turns build lifecycle notifications into commit status publishes.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    pub fn new(config: DispatcherConfig, collab: Collaborators) -> Self {
        info!(
            node = %collab.cluster.current_node(),
            lock_stripes = config.lock_stripes,
            order_cache_capacity = config.order_cache_capacity,
            retry_enabled = config.retry.enabled,
            "Creating event dispatcher"
        );
        EventDispatcher {
            inner: Arc::new(Inner {
                retry: RetryPolicy::new(config.retry),
                locks: LockManager::new(config.lock_stripes),
                order: EventOrderCache::new(config.order_cache_capacity),
                handlers: HandlerTable::new(),
                feature_cache: Mutex::new(HashMap::new()),
                processed: Mutex::new(None),
                config,
                collab,
            }),
        }
    }

    /// Subscribes the task consumers to the broker.
    ///
    /// QUEUED tasks are singleton; build-scoped events are broadcast. Queue
    /// removals never go through the broker.
    pub fn register(&self) {
        let broker = &self.inner.collab.broker;
        for event in Event::ALL {
            match event {
                Event::RemovedFromQueue => continue,
                Event::Queued => broker.subscribe(
                    event.name(),
                    event.subscription(),
                    Arc::new(QueuedTaskConsumer::new(self.clone())),
                ),
                _ => broker.subscribe(
                    event.name(),
                    event.subscription(),
                    Arc::new(BuildTaskConsumer::new(self.clone())),
                ),
            }
        }
        debug!("Task consumers registered");
    }

    /// Returns a channel receiving every event once its task was processed,
    /// including tasks that ended up publishing nothing. Replaces any
    /// previously returned channel.
    pub fn processed_events(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .inner
            .processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    pub fn order_cache(&self) -> &EventOrderCache {
        &self.inner.order
    }

    pub(super) fn builds(&self) -> &dyn BuildStore {
        self.inner.collab.builds.as_ref()
    }

    pub(super) fn cluster(&self) -> &dyn NodeResponsibility {
        self.inner.collab.cluster.as_ref()
    }

    pub fn state(&self) -> DispatcherState {
        let inner = &self.inner;
        DispatcherState {
            node: inner.collab.cluster.current_node().to_string(),
            publishing_enabled: inner.config.publishing_enabled,
            queue_enabled: inner.config.queue_enabled,
            order_cache_entries: inner.order.len(),
            order_cache_capacity: inner.order.capacity(),
            lock_stripes: inner.locks.stripes(),
            failing_build_types: inner.retry.failing_build_types(),
            retry: inner.config.retry,
        }
    }

    // ─── Listener ───

    /// A build was added to the queue.
    #[instrument(skip_all, fields(promotion = %promotion.id))]
    pub fn build_type_added_to_queue(&self, promotion: &Promotion) {
        if self.should_not_publish(promotion.build_type.as_ref()) || promotion.change_collecting_needed {
            return;
        }
        self.build_added_to_queue(promotion);
    }

    /// Changes of a promotion were collected. A still-queued promotion
    /// publishes QUEUED; one whose build is already running publishes STARTED.
    #[instrument(skip_all, fields(promotion = %promotion.id))]
    pub fn changes_loaded(&self, promotion: &Promotion) {
        if self.should_not_publish(promotion.build_type.as_ref()) {
            return;
        }
        if promotion.queued {
            self.build_added_to_queue(promotion);
            return;
        }
        let running = promotion
            .associated_build
            .and_then(|id| self.builds().find_build(id))
            .filter(Build::is_in_progress);
        if let Some(build) = running {
            self.submit_for_build(Event::Started, &build, None);
        }
    }

    #[instrument(skip_all, fields(build = %build.id))]
    pub fn build_started(&self, build: &Build) {
        if self.should_not_publish(self.build_type(Event::Started, build)) {
            return;
        }
        self.submit_for_build(Event::Started, build, None);
    }

    #[instrument(skip_all, fields(build = %build.id))]
    pub fn build_finished(&self, build: &Build) {
        self.submit_if_finished(Event::Finished, build);
    }

    #[instrument(skip_all, fields(build = %build.id))]
    pub fn build_interrupted(&self, build: &Build) {
        self.submit_if_finished(Event::Interrupted, build);
    }

    /// A comment was added to a build. The comment itself is read from the
    /// build when the task runs.
    #[instrument(skip_all, fields(build = %build.id))]
    pub fn build_commented(&self, build: &Build, _user: Option<&UserRef>, _comment: Option<&str>) {
        if self.should_not_publish(self.build_type(Event::Commented, build)) {
            return;
        }
        self.submit_for_build(Event::Commented, build, None);
    }

    /// The status of a running build changed. Only a transition into a
    /// failed status is published.
    #[instrument(skip_all, fields(build = %build.id, ?old, ?new))]
    pub fn build_changed_status(&self, build: &Build, old: BuildStatus, new: BuildStatus) {
        if old.is_failed() || !new.is_failed() {
            return;
        }
        if self.should_not_publish(self.build_type(Event::FailureDetected, build)) {
            return;
        }
        self.submit_for_build(Event::FailureDetected, build, None);
    }

    /// Problems of a build changed. Muting the last problem marks the build
    /// successful.
    #[instrument(skip_all, fields(build = %build.id))]
    pub fn build_problems_changed(&self, build: &Build, before: &[BuildProblem], after: &[BuildProblem]) {
        if self.should_not_publish(self.build_type(Event::MarkedAsSuccessful, build)) {
            return;
        }
        if !before.is_empty() && after.is_empty() {
            self.submit_for_build(Event::MarkedAsSuccessful, build, None);
        }
    }

    /// A promotion left the queue without starting.
    ///
    /// Only canceled promotions are published, and only on the node that
    /// owns the removal. Publishing happens directly on a worker thread and
    /// is never retried.
    #[instrument(skip_all, fields(promotion = %promotion.id))]
    pub fn build_removed_from_queue(
        &self,
        promotion: &Promotion,
        user: Option<&UserRef>,
        comment: Option<&str>,
    ) {
        if !self.inner.config.queue_enabled || promotion.started {
            return;
        }
        let Some(build_type) = promotion.build_type.as_ref() else {
            debug!(event = %Event::RemovedFromQueue, "Build type not found");
            return;
        };
        if self.should_not_publish(Some(build_type)) {
            return;
        }
        if self.is_publishing_disabled(build_type) {
            info!(
                event = %Event::RemovedFromQueue,
                target = %promotion,
                "Commit status publishing is disabled"
            );
            return;
        }
        if !promotion.canceled {
            return;
        }
        if !owns_queue_removal(self.cluster(), &promotion.creator_node) {
            debug!(creator = %promotion.creator_node, "Queue removal belongs to another node");
            return;
        }
        if promotion.change_collecting_needed {
            return;
        }

        let job = PublishJob {
            event: Event::RemovedFromQueue,
            info: self.removal_info(promotion, user, comment),
            target: PublishTarget::Promotion(promotion.clone()),
            last_delay: None,
        };
        let dispatcher = self.clone();
        self.run_async(Event::RemovedFromQueue, move || dispatcher.process_publishing(&job));
    }

    /// The settings of a build type were saved. Drops problems of publishers
    /// that are no longer configured.
    #[instrument(skip_all, fields(build_type = %build_type.id))]
    pub fn configuration_changed(&self, build_type: &BuildType) {
        self.inner
            .feature_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&build_type.id);
        let problems = &self.inner.collab.problems;
        if !problems.has_problems(&build_type.id) {
            return;
        }
        problems.clear_obsolete_problems(&build_type.id, &build_type.active_feature_ids());
    }

    /// Whether the build server should collect changes for the promotion
    /// right away, because its build type publishes statuses.
    pub fn should_collect_changes_now(&self, promotion: &Promotion) -> bool {
        let Some(build_type) = promotion.build_type.as_ref() else {
            return false;
        };
        if build_type.parameter(PUBLISHING_ENABLED_PARAM) == Some("false") {
            return false;
        }

        let now = Instant::now();
        let mut cache = self
            .inner
            .feature_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&build_type.id)
            && cached.expires_at > now
        {
            return cached.value;
        }
        let value = !self.should_not_publish(Some(build_type));
        cache.insert(
            build_type.id.clone(),
            CachedFlag {
                value,
                expires_at: now + self.inner.config.feature_cache_ttl,
            },
        );
        value
    }

    // ─── Eligibility ───

    fn build_type<'a>(&self, event: Event, build: &'a Build) -> Option<&'a BuildType> {
        let build_type = build.build_type();
        if build_type.is_none() {
            debug!(%event, build = %build.id, "Cannot find build type for build");
        }
        build_type
    }

    /// No publishing feature is enabled and no integration publishes without
    /// one.
    fn should_not_publish(&self, build_type: Option<&BuildType>) -> bool {
        match build_type {
            None => true,
            Some(build_type) => {
                !build_type.has_enabled_feature()
                    && !self
                        .inner
                        .collab
                        .registry
                        .is_feature_less_publishing_possible(build_type)
            }
        }
    }

    /// The build type parameter wins over the global switch, but only
    /// `"true"` can turn publishing back on.
    fn is_publishing_disabled(&self, build_type: &BuildType) -> bool {
        let param = build_type.parameter(PUBLISHING_ENABLED_PARAM);
        param == Some("false") || !(self.inner.config.publishing_enabled || param == Some("true"))
    }

    fn submit_if_finished(&self, event: Event, build: &Build) {
        if self.should_not_publish(self.build_type(event, build)) {
            return;
        }
        let finished = self
            .builds()
            .find_build(build.id)
            .is_some_and(|b| b.is_finished());
        if !finished {
            debug!(%event, build = %build.id, "Cannot find finished build");
            return;
        }
        self.submit_for_build(event, build, None);
    }

    fn build_added_to_queue(&self, promotion: &Promotion) {
        if !self.inner.config.queue_enabled {
            return;
        }
        if promotion.will_be_optimized_away() {
            debug!(
                promotion = %promotion.id,
                "Queued status will not be published, because the build will be optimized"
            );
            return;
        }
        self.submit_for_queued_build(promotion, None);
    }

    // ─── Submission ───

    /// Submits a build-scoped task, if this node is responsible for the build.
    pub(super) fn submit_for_build(&self, event: Event, build: &Build, delay: Option<Duration>) {
        if !self.cluster().is_responsible_for_build(build) {
            debug!(%event, build = %build.id, "Current node is not responsible for build, skip");
            return;
        }
        self.inner.collab.broker.submit(TaskData {
            task_type: event.name().to_string(),
            identity: task_identity(event, build.id.0, delay),
            primary_arg: Some(build.id.0),
            secondary_arg: delay.map(duration_millis),
            payload: None,
        });
    }

    pub(super) fn submit_for_queued_build(&self, promotion: &Promotion, delay: Option<Duration>) {
        self.inner.collab.broker.submit(TaskData {
            task_type: Event::Queued.name().to_string(),
            identity: task_identity(Event::Queued, promotion.id.0, delay),
            primary_arg: Some(promotion.id.0),
            secondary_arg: delay.map(duration_millis),
            payload: Some(BUILD_QUEUED.to_string()),
        });
    }

    fn resubmit(&self, job: &PublishJob, delay: Duration) {
        if job.event == Event::Queued {
            self.submit_for_queued_build(job.target.promotion(), Some(delay));
            return;
        }
        if let PublishTarget::Build(build) = &job.target {
            self.submit_for_build(job.event, build, Some(delay));
        } else if let Some(build) = job
            .target
            .associated_build()
            .and_then(|id| self.builds().find_build(id))
        {
            self.submit_for_build(job.event, &build, Some(delay));
        }
    }

    // ─── Execution ───

    /// Runs `work` on a blocking worker thread and reports `event` as
    /// processed afterwards. Without a runtime the work runs inline.
    pub(super) fn run_async(&self, event: Event, work: impl FnOnce() + Send + 'static) {
        let dispatcher = self.clone();
        let task = move || {
            if catch_unwind(AssertUnwindSafe(work)).is_err() {
                error!(%event, "Publishing task panicked");
            }
            dispatcher.notify_processed(Some(event));
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(task);
            }
            Err(_) => {
                warn!(%event, "No async runtime available, publishing on the calling thread");
                task();
            }
        }
    }

    pub(super) fn notify_processed(&self, event: Option<Event>) {
        let Some(event) = event else {
            return;
        };
        let processed = self
            .inner
            .processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = processed.as_ref() {
            // A dropped receiver only means nobody is listening anymore.
            let _ = tx.send(event);
        }
    }

    #[instrument(skip_all, fields(event = %job.event, target = %job.target))]
    pub(super) fn process_publishing(&self, job: &PublishJob) {
        let Some(build_type) = job.target.build_type() else {
            warn!(
                build_type = %job.target.build_type_id(),
                "Build status has not been published: build type not found"
            );
            return;
        };

        let publishers = self.inner.collab.registry.publishers_for(build_type);
        debug!(publishers = publishers.len(), "Publishing");

        for publisher in publishers.values() {
            let publisher = publisher.as_ref();
            if !publisher.is_event_supported(job.event) {
                continue;
            }
            if self.is_publishing_disabled(build_type) {
                info!(publisher = %publisher.id(), "Commit status publishing is disabled");
                continue;
            }
            let revisions = self.revisions_for(job, publisher);
            if revisions.is_empty() {
                info!(publisher = %publisher.id(), "No compatible revisions found");
                continue;
            }

            self.inner.collab.problems.clear_problem(publisher);
            let decisions: Vec<RetryInfo> = revisions
                .iter()
                .map(|revision| self.publish_revision(job, publisher, revision))
                .collect();
            if let Some(retry) = decisions.into_iter().find(|d| d.should_retry) {
                debug!(
                    publisher = %publisher.id(),
                    delay_ms = duration_millis(retry.new_delay),
                    "Scheduling retry"
                );
                self.resubmit(job, retry.new_delay);
            }
        }

        let active: BTreeSet<_> = publishers.keys().cloned().collect();
        self.inner
            .collab
            .problems
            .clear_obsolete_problems(&build_type.id, &active);
    }

    fn revisions_for(&self, job: &PublishJob, publisher: &dyn Publisher) -> Vec<BuildRevision> {
        let promotion = job.target.promotion();
        if promotion.failed_to_collect_changes {
            return Vec::new();
        }
        if job.event.is_queue_event() && promotion.change_collecting_needed {
            debug!(
                build_type = %promotion.build_type_id,
                "No revision is found, queue-related status won't be published"
            );
            return Vec::new();
        }
        select_revisions(publisher, &promotion.revisions)
    }

    /// Publishes one revision through one publisher, holding its lock.
    fn publish_revision(
        &self,
        job: &PublishJob,
        publisher: &dyn Publisher,
        revision: &BuildRevision,
    ) -> RetryInfo {
        if !publisher.is_available(&job.target) {
            return RetryInfo::no_retry();
        }

        if job.event == Event::RemovedFromQueue {
            let key = removal_lock_key(job.target.build_type_id().as_str(), &revision.revision);
            let _guard = self.inner.locks.lock(&key);
            match self.is_event_allowed(job, publisher, revision) {
                Ok(true) => {
                    if let Err(err) = self.execute(job, publisher, revision) {
                        warn!(
                            publisher = %publisher.id(),
                            revision = %revision.revision,
                            error = %err,
                            "Cannot publish removed build status"
                        );
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(
                    publisher = %publisher.id(),
                    error = %err,
                    "Cannot determine if removal can be published for current revision state"
                ),
            }
            return RetryInfo::no_retry();
        }

        let _guard = self.inner.locks.lock(&revision.revision);
        if job.event == Event::Queued {
            match self.is_event_allowed(job, publisher, revision) {
                Ok(true) => {}
                Ok(false) => return RetryInfo::no_retry(),
                Err(err) => {
                    let retry = self.inner.retry.evaluate(
                        &err,
                        job.target.build_type_id(),
                        job.event,
                        job.last_delay,
                        Utc::now(),
                    );
                    warn!(
                        publisher = %publisher.id(),
                        error = %err,
                        "Cannot determine if event can be published for current revision state. {}",
                        retry.message
                    );
                    return retry;
                }
            }
        }
        self.run_task(job, publisher, revision)
    }

    /// Asks the hosting service whether publishing would overwrite a more
    /// authoritative status.
    fn is_event_allowed(
        &self,
        job: &PublishJob,
        publisher: &dyn Publisher,
        revision: &BuildRevision,
    ) -> Result<bool, PublisherError> {
        if !self.inner.config.check_status_before_publishing {
            return Ok(true);
        }
        let status = publisher.revision_status(job.target.promotion(), revision)?;
        let allowed = status.is_none_or(|s| s.is_event_allowed(job.event));
        if !allowed {
            debug!(
                publisher = %publisher.id(),
                revision = %revision.revision,
                vcs_root = ?publisher.vcs_root_id(),
                "Event is not suitable for current revision state"
            );
        }
        Ok(allowed)
    }

    fn execute(
        &self,
        job: &PublishJob,
        publisher: &dyn Publisher,
        revision: &BuildRevision,
    ) -> Result<bool, PublisherError> {
        let Some(handler) = self.inner.handlers.get(job.event) else {
            error!(event = %job.event, "No handler registered");
            return Ok(false);
        };
        let ctx = PublishContext {
            publisher,
            revision,
            target: &job.target,
            info: &job.info,
        };
        catch_unwind(AssertUnwindSafe(|| handler.execute(&ctx)))
            .unwrap_or_else(|panic| Err(PublisherError::fatal(panic_message(panic.as_ref()))))
    }

    /// Publishes and turns a failure into a retry decision plus a problem.
    fn run_task(&self, job: &PublishJob, publisher: &dyn Publisher, revision: &BuildRevision) -> RetryInfo {
        let build_type_id = job.target.build_type_id();
        let err = match self.execute(job, publisher, revision) {
            Ok(_) => {
                self.inner.retry.record_success(build_type_id);
                return RetryInfo::no_retry();
            }
            Err(err) => err,
        };

        let retry = self
            .inner
            .retry
            .evaluate(&err, build_type_id, job.event, job.last_delay, Utc::now());
        let message = format!(
            "Commit Status Publisher has failed to publish {} status. {}",
            job.event.name(),
            retry.message
        );
        self.inner.collab.problems.report_problem(
            message.trim_end(),
            publisher,
            &job.target.to_string(),
            None,
            &err,
        );

        if job
            .target
            .build_type()
            .is_some_and(BuildType::fail_build_on_publish_error)
        {
            self.builds().add_build_problem(
                job.target.promotion_id(),
                BuildProblem {
                    identity: format!("commitStatusPublisher.{}.{}", publisher.id(), revision.root.id),
                    kind: PUBLISH_PROBLEM_TYPE.to_string(),
                    description: err.to_string(),
                },
            );
        }
        retry
    }

    fn removal_info(
        &self,
        promotion: &Promotion,
        user: Option<&UserRef>,
        comment: Option<&str>,
    ) -> AdditionalTaskInfo {
        let (comment, author) = match comment {
            Some(comment) => (Some(comment.to_string()), user.cloned()),
            None => self.comment_with_author(promotion),
        };
        let replacing = self
            .builds()
            .find_promotion_or_replacement(promotion.id)
            .map(|p| p.id)
            .filter(|id| *id != promotion.id);
        let description = if replacing.is_none()
            && promotion.associated_build.is_some()
            && promotion.canceled
            && user.is_none()
        {
            BUILD_REMOVED_AS_CANCELED
        } else {
            BUILD_REMOVED_FROM_QUEUE
        };
        AdditionalTaskInfo {
            description: Some(description.to_string()),
            comment,
            comment_author: author,
            replacing_promotion: replacing,
        }
    }

    /// Cancel comment of the associated build, falling back to the promotion
    /// comment.
    fn comment_with_author(&self, promotion: &Promotion) -> (Option<String>, Option<UserRef>) {
        let canceled = promotion
            .associated_build
            .and_then(|id| self.builds().find_build(id))
            .and_then(|build| build.canceled_info)
            .filter(|info| info.comment.is_some());
        if let Some(info) = canceled {
            let author = info.user_id.and_then(|id| self.builds().find_user(id));
            return (info.comment, author);
        }
        match &promotion.comment {
            Some(comment) => (Some(comment.text.clone()), comment.author.clone()),
            None => (None, None),
        }
    }
}

/// `eventName:id`, plus `:delay=N` for a delayed retry so it does not replace
/// the original task.
pub fn task_identity(event: Event, id: u64, delay: Option<Duration>) -> String {
    match delay {
        Some(delay) => format!("{}:{}:delay={}", event.name(), id, duration_millis(delay)),
        None => format!("{}:{}", event.name(), id),
    }
}

/// Revisions a publisher should publish for.
///
/// A publisher bound to a VCS root gets the first revision of that root;
/// otherwise every revision it accepts.
pub fn select_revisions(publisher: &dyn Publisher, revisions: &[BuildRevision]) -> Vec<BuildRevision> {
    match publisher.vcs_root_id() {
        Some(root_id) => revisions
            .iter()
            .find(|revision| revision.root.matches_root_id(root_id))
            .cloned()
            .into_iter()
            .collect(),
        None => revisions
            .iter()
            .filter(|revision| publisher.is_publishing_for_revision(revision))
            .cloned()
            .collect(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("publisher panicked: {detail}")
}

//! Read access to builds, promotions and users.
//!
//! The dispatcher resolves every task against a [`BuildStore`] at the moment
//! it is accepted, so it always publishes the latest known state.
//! [`InMemoryBuildStore`] backs single-process deployments and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{Build, BuildId, BuildProblem, BuildState, Promotion, PromotionId, UserId, UserRef};

/// Source of build server state.
pub trait BuildStore: Send + Sync {
    fn find_build(&self, id: BuildId) -> Option<Build>;

    /// A promotion that is still known to the queue or history.
    fn find_promotion(&self, id: PromotionId) -> Option<Promotion>;

    /// Like [`BuildStore::find_promotion`], but follows queue optimization:
    /// if the promotion was merged into another one, returns that one.
    fn find_promotion_or_replacement(&self, id: PromotionId) -> Option<Promotion> {
        self.find_promotion(id)
    }

    fn find_user(&self, id: UserId) -> Option<UserRef>;

    /// Attaches a problem to the build of a promotion.
    fn add_build_problem(&self, promotion: PromotionId, problem: BuildProblem);
}

#[derive(Debug, Default)]
struct StoreState {
    builds: HashMap<BuildId, Build>,
    promotions: HashMap<PromotionId, Promotion>,
    replacements: HashMap<PromotionId, PromotionId>,
    users: HashMap<UserId, UserRef>,
    problems: HashMap<PromotionId, Vec<BuildProblem>>,
}

/// Build store kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryBuildStore {
    state: RwLock<StoreState>,
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores or updates a build. Its promotion is stored alongside.
    pub fn put_build(&self, build: Build) {
        let mut state = self.write();
        state.promotions.insert(build.promotion.id, build.promotion.clone());
        state.builds.insert(build.id, build);
    }

    pub fn put_promotion(&self, promotion: Promotion) {
        self.write().promotions.insert(promotion.id, promotion);
    }

    pub fn put_user(&self, user: UserRef) {
        self.write().users.insert(user.id, user);
    }

    /// Records that `removed` was merged into `replacement`.
    pub fn replace_promotion(&self, removed: PromotionId, replacement: PromotionId) {
        self.write().replacements.insert(removed, replacement);
    }

    pub fn remove_build(&self, id: BuildId) {
        self.write().builds.remove(&id);
    }

    pub fn remove_promotion(&self, id: PromotionId) {
        self.write().promotions.remove(&id);
    }

    /// Marks a stored build finished. Returns false if it is unknown.
    pub fn finish_build(&self, id: BuildId) -> bool {
        match self.write().builds.get_mut(&id) {
            Some(build) => {
                build.state = BuildState::Finished;
                true
            }
            None => false,
        }
    }

    /// Problems attached to a promotion so far.
    pub fn build_problems(&self, id: PromotionId) -> Vec<BuildProblem> {
        self.read().problems.get(&id).cloned().unwrap_or_default()
    }
}

impl BuildStore for InMemoryBuildStore {
    fn find_build(&self, id: BuildId) -> Option<Build> {
        self.read().builds.get(&id).cloned()
    }

    fn find_promotion(&self, id: PromotionId) -> Option<Promotion> {
        self.read().promotions.get(&id).cloned()
    }

    fn find_promotion_or_replacement(&self, id: PromotionId) -> Option<Promotion> {
        let state = self.read();
        let mut current = id;
        // Replacement chains are short; bound the walk in case of a cycle.
        for _ in 0..16 {
            match state.replacements.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        state
            .promotions
            .get(&current)
            .or_else(|| state.promotions.get(&id))
            .cloned()
    }

    fn find_user(&self, id: UserId) -> Option<UserRef> {
        self.read().users.get(&id).cloned()
    }

    fn add_build_problem(&self, promotion: PromotionId, problem: BuildProblem) {
        let mut state = self.write();
        let problems = state.problems.entry(promotion).or_default();
        if !problems.iter().any(|p| p.identity == problem.identity) {
            problems.push(problem);
        }
    }
}

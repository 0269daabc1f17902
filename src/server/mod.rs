//! HTTP surface of the dispatcher.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns 200 if the server is running
//! - `GET /api/v1/dispatcher/state` - Dispatcher counters as JSON
//! - `GET /api/v1/build-types/{build_type}/problems` - Reported publishing
//!   problems of one build type

use std::sync::Arc;

pub mod health;
pub mod state;

pub use health::health_handler;
pub use state::{problems_handler, state_handler};

use crate::broker::LocalTaskBroker;
use crate::dispatch::EventDispatcher;
use crate::problems::InMemoryProblems;

/// Shared application state, passed to handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: EventDispatcher,
    broker: Arc<LocalTaskBroker>,
    problems: Arc<InMemoryProblems>,
}

impl AppState {
    pub fn new(
        dispatcher: EventDispatcher,
        broker: Arc<LocalTaskBroker>,
        problems: Arc<InMemoryProblems>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                dispatcher,
                broker,
                problems,
            }),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn broker(&self) -> &LocalTaskBroker {
        &self.inner.broker
    }

    pub fn problems(&self) -> &InMemoryProblems {
        &self.inner.problems
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/api/v1/dispatcher/state", get(state_handler))
        .route(
            "/api/v1/build-types/{build_type}/problems",
            get(problems_handler),
        )
        .route("/health", get(health_handler))
        .with_state(app_state)
}

//! Element resolution and interaction over a remote accessibility-tree driver
//!
//! Elements are described by ordered multi-strategy [`Query`] values and
//! resolved fresh for every interaction. Off-screen targets are scrolled into
//! a safe band, gestures fall back from native primitives to pointer
//! sequences, and screen transitions are confirmed by polling a
//! [`ScreenPredicate`].

use std::sync::Arc;
use tracing::instrument;

pub mod config;
pub mod element;
pub mod errors;
pub mod gesture;
pub mod locator;
pub mod navigation;
pub mod platforms;
pub mod query;
pub mod scroll;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod types;
pub mod wait;

pub use config::{EngineConfig, GestureOptions, PollOptions, ResolveOptions, ScrollOptions};
pub use element::{AttributeSnapshot, ElementHandle};
pub use errors::AutomationError;
pub use gesture::{GestureKind, GestureMethod, GestureResult, GestureSpec, GestureTarget, PointerAction};
pub use locator::{resolve, resolve_all, Locator};
pub use navigation::{navigate_and_verify, navigate_and_verify_with, NavigationFailure, Transition, TransitionState};
pub use platforms::{AutomationDriver, WebDriverSession};
pub use query::{Anchor, PostFilter, Query, Strategy, TieBreak};
pub use scroll::{bring_into_view, SafeBand, ScrollDirection, ScrollReport};
pub use selector::Selector;
pub use types::{ElementId, Point, Rect, Size};
pub use wait::{await_gone, await_state, ScreenPredicate, WaitOutcome};

/// The main entry point: a driver session plus the engine configuration
///
/// Holds no UI state. Every call goes to the driver.
#[derive(Clone)]
pub struct Automator {
    driver: Arc<dyn AutomationDriver>,
    config: EngineConfig,
}

impl Automator {
    pub fn new(driver: Arc<dyn AutomationDriver>) -> Self {
        Self {
            driver,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(driver: Arc<dyn AutomationDriver>, config: EngineConfig) -> Self {
        Self { driver, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn AutomationDriver> {
        &self.driver
    }

    /// Create a locator for the query. Nothing is resolved until it is used.
    pub fn locator(&self, query: impl Into<Query>) -> Locator {
        Locator::new(self.driver.clone(), query.into(), self.config.clone())
    }

    pub fn resolve(&self, query: &Query) -> Result<ElementHandle, AutomationError> {
        resolve(self.driver.as_ref(), query, &self.config.resolve_options())
    }

    pub fn await_state(&self, predicate: &ScreenPredicate) -> WaitOutcome {
        await_state(
            self.driver.as_ref(),
            predicate,
            &self.config.poll,
            &self.config.resolve_options(),
        )
    }

    pub fn await_gone(&self, predicate: &ScreenPredicate) -> WaitOutcome {
        await_gone(
            self.driver.as_ref(),
            predicate,
            &self.config.poll,
            &self.config.resolve_options(),
        )
    }

    #[instrument(level = "debug", skip(self, spec))]
    pub fn perform(&self, spec: &GestureSpec) -> Result<GestureResult, AutomationError> {
        gesture::perform(self.driver.as_ref(), spec, &self.config.gesture)
    }

    pub fn tap_at(&self, at: Point) -> Result<GestureResult, AutomationError> {
        self.perform(&GestureSpec::tap_at(at))
    }

    /// One scroll drag over the whole viewport.
    pub fn swipe(&self, direction: ScrollDirection) -> Result<GestureResult, AutomationError> {
        let viewport = self.driver.viewport_size()?;
        scroll::scroll_once(
            self.driver.as_ref(),
            viewport,
            direction,
            &self.config.scroll,
            &self.config.gesture,
        )
    }

    pub fn bring_into_view(&self, query: &Query) -> Result<ScrollReport, AutomationError> {
        bring_into_view(
            self.driver.as_ref(),
            query,
            None,
            &self.config.scroll,
            &self.config.gesture,
        )
    }

    pub fn navigate_and_verify(
        &self,
        query: &Query,
        expected: &ScreenPredicate,
    ) -> Result<Transition, NavigationFailure> {
        navigate_and_verify(self.driver.as_ref(), query, expected, &self.config)
    }

    /// Async variant of [`Automator::navigate_and_verify`], run on a
    /// blocking-safe thread.
    pub async fn navigate_and_verify_async(
        &self,
        query: Query,
        expected: ScreenPredicate,
    ) -> Result<Transition, NavigationFailure> {
        let automator = self.clone();
        tokio::task::spawn_blocking(move || automator.navigate_and_verify(&query, &expected))
            .await
            .map_err(|e| NavigationFailure {
                stage: TransitionState::Idle,
                error: AutomationError::PlatformError(format!("Task join error: {e}")),
            })?
    }
}

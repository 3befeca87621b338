use tracing::{debug, instrument, warn};

use crate::config::{EngineConfig, ResolveOptions};
use crate::element::{AttributeSnapshot, ElementHandle};
use crate::errors::AutomationError;
use crate::gesture::{perform, GestureKind, GestureResult, GestureSpec, GestureTarget};
use crate::navigation::{navigate_and_verify_with, NavigationFailure, Transition};
use crate::platforms::AutomationDriver;
use crate::query::{Anchor, PostFilter, Query, Strategy, TieBreak};
use crate::scroll::bring_into_view;
use crate::wait::{await_condition, ScreenPredicate, WaitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

/// Resolve `query` against the current tree.
///
/// Strategies run in declaration order and the first one yielding an
/// accepted candidate wins. A strategy that throws (stale node, anchor not
/// found) counts as empty. Only a lost driver connection aborts early.
#[instrument(level = "debug", skip(driver, query, options), fields(query = %query.description()))]
pub fn resolve(
    driver: &dyn AutomationDriver,
    query: &Query,
    options: &ResolveOptions,
) -> Result<ElementHandle, AutomationError> {
    let mut attempted = Vec::with_capacity(query.strategies().len());

    for strategy in query.strategies() {
        attempted.push(strategy.name.clone());
        match evaluate_strategy(driver, query, strategy, options) {
            Ok(mut ranked) if !ranked.is_empty() => {
                let winner = ranked.swap_remove(0);
                debug!(strategy = %strategy.name, element = ?winner, "resolved");
                return Ok(ElementHandle::new(winner, strategy.name.clone()));
            }
            Ok(_) => debug!(strategy = %strategy.name, "no accepted candidates"),
            Err(e) => skip_or_abort(strategy, e)?,
        }
    }

    Err(AutomationError::ElementNotFound {
        query: query.description().to_string(),
        attempted,
    })
}

/// Every accepted candidate of the first successful strategy, in tie-break
/// order (tree order, or nearest-first for proximity strategies).
#[instrument(level = "debug", skip(driver, query, options), fields(query = %query.description()))]
pub fn resolve_all(
    driver: &dyn AutomationDriver,
    query: &Query,
    options: &ResolveOptions,
) -> Result<Vec<ElementHandle>, AutomationError> {
    let mut attempted = Vec::new();

    for strategy in query.strategies() {
        attempted.push(strategy.name.clone());
        match evaluate_strategy(driver, query, strategy, options) {
            Ok(ranked) if !ranked.is_empty() => {
                return Ok(ranked
                    .into_iter()
                    .map(|s| ElementHandle::new(s, strategy.name.clone()))
                    .collect());
            }
            Ok(_) => {}
            Err(e) => skip_or_abort(strategy, e)?,
        }
    }

    Err(AutomationError::ElementNotFound {
        query: query.description().to_string(),
        attempted,
    })
}

fn skip_or_abort(strategy: &Strategy, error: AutomationError) -> Result<(), AutomationError> {
    match error {
        AutomationError::DriverDisconnected(_) => Err(error),
        e if e.is_retryable() => {
            debug!(strategy = %strategy.name, error = %e, "strategy failed, treating as empty");
            Ok(())
        }
        e => {
            warn!(strategy = %strategy.name, error = %e, "strategy failed, treating as empty");
            Ok(())
        }
    }
}

/// Run one strategy: query, post-filter, rank by tie-break.
fn evaluate_strategy(
    driver: &dyn AutomationDriver,
    query: &Query,
    strategy: &Strategy,
    options: &ResolveOptions,
) -> Result<Vec<AttributeSnapshot>, AutomationError> {
    let raw = driver.query_all(&strategy.selector)?;
    let raw_count = raw.len();
    let accepted: Vec<AttributeSnapshot> = raw.into_iter().filter(|c| query.accepts(c)).collect();
    debug!(
        strategy = %strategy.name,
        raw = raw_count,
        accepted = accepted.len(),
        "strategy evaluated"
    );

    if accepted.is_empty() {
        return Ok(accepted);
    }

    match &strategy.tie_break {
        TieBreak::First => Ok(accepted),
        TieBreak::ClosestToAnchor {
            anchor,
            max_distance,
        } => {
            let anchor_y = anchor_y(driver, anchor, options)?;
            let limit = max_distance.unwrap_or(options.proximity_threshold);
            Ok(rank_by_proximity(accepted, anchor_y, limit))
        }
    }
}

fn anchor_y(
    driver: &dyn AutomationDriver,
    anchor: &Anchor,
    options: &ResolveOptions,
) -> Result<f64, AutomationError> {
    match anchor {
        Anchor::Y(y) => Ok(*y),
        Anchor::Element(query) => {
            let handle = resolve(driver, query, options)?;
            match handle.snapshot().center_y() {
                Some(y) => Ok(y),
                None => Ok(handle.bounds(driver)?.center().y),
            }
        }
    }
}

/// Keep candidates within `limit` of `anchor_y`, nearest first. Ties keep
/// tree order.
pub(crate) fn rank_by_proximity(
    candidates: Vec<AttributeSnapshot>,
    anchor_y: f64,
    limit: f64,
) -> Vec<AttributeSnapshot> {
    let mut ranked: Vec<(f64, AttributeSnapshot)> = candidates
        .into_iter()
        .filter_map(|c| {
            let distance = (c.center_y()? - anchor_y).abs();
            if distance <= limit {
                Some((distance, c))
            } else {
                debug!(id = %c.id, distance, limit, "candidate too far from anchor");
                None
            }
        })
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.into_iter().map(|(_, c)| c).collect()
}

/// A high-level API for finding and interacting with one element
///
/// A locator stores the query, not a handle: every call resolves again.
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn AutomationDriver>,
    query: Query,
    config: EngineConfig,
}

impl Locator {
    pub(crate) fn new(driver: Arc<dyn AutomationDriver>, query: Query, config: EngineConfig) -> Self {
        Self {
            driver,
            query,
            config,
        }
    }

    /// Set the default timeout for waiting operations on this locator.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll = self.config.poll.with_timeout(timeout);
        self
    }

    /// Add a post-filter applied to every strategy.
    pub fn filter(mut self, filter: PostFilter) -> Self {
        self.query = self.query.with_filter(filter);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Resolve once, without waiting or scrolling.
    pub fn resolve(&self) -> Result<ElementHandle, AutomationError> {
        resolve(self.driver.as_ref(), &self.query, &self.config.resolve_options())
    }

    pub fn all(&self) -> Result<Vec<ElementHandle>, AutomationError> {
        resolve_all(self.driver.as_ref(), &self.query, &self.config.resolve_options())
    }

    /// Number of accepted candidates right now; zero when nothing matches.
    pub fn count(&self) -> Result<usize, AutomationError> {
        match self.all() {
            Ok(handles) => Ok(handles.len()),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self) -> bool {
        self.resolve().is_ok()
    }

    /// Poll until the query resolves, up to `timeout` (or the locator default).
    #[instrument(level = "debug", skip(self, timeout), fields(query = %self.query.description()))]
    pub fn wait(&self, timeout: Option<Duration>) -> Result<ElementHandle, AutomationError> {
        let mut poll = self.config.poll.clone();
        if let Some(timeout) = timeout {
            poll = poll.with_timeout(timeout);
        }
        let options = self.config.resolve_options();
        let mut found = None;

        let outcome = await_condition(self.driver.as_ref(), &poll, |driver| {
            match resolve(driver, &self.query, &options) {
                Ok(handle) => {
                    found = Some(handle);
                    Ok(true)
                }
                Err(e) => Err(e),
            }
        });

        match (outcome, found) {
            (WaitOutcome::Reached { .. }, Some(handle)) => Ok(handle),
            (WaitOutcome::TimedOut { elapsed, last_error, .. }, _) => {
                Err(AutomationError::Timeout(format!(
                    "Timed out after {elapsed:?} waiting for element '{}'. Last error: {}",
                    self.query.description(),
                    last_error.unwrap_or_else(|| "none".to_string())
                )))
            }
            (WaitOutcome::Reached { .. }, None) => Err(AutomationError::not_found(
                self.query.description(),
            )),
        }
    }

    /// Async variant of [`Locator::wait`].
    ///
    /// The engine blocks while polling, so it runs on a blocking-safe thread
    /// to avoid stalling the async runtime.
    pub async fn wait_async(&self, timeout: Option<Duration>) -> Result<ElementHandle, AutomationError> {
        let locator = self.clone();
        task::spawn_blocking(move || locator.wait(timeout))
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?
    }

    /// Resolve and scroll until the element sits inside the safe band.
    pub fn bring_into_view(&self) -> Result<ElementHandle, AutomationError> {
        bring_into_view(self.driver.as_ref(), &self.query, None, &self.config.scroll, &self.config.gesture)
            .map(|report| report.handle)
    }

    /// Bring into view, then tap the element's current centroid.
    pub fn tap(&self) -> Result<GestureResult, AutomationError> {
        self.act(GestureKind::Tap)
    }

    pub fn long_press(&self, duration: Option<Duration>) -> Result<GestureResult, AutomationError> {
        let duration = duration.unwrap_or(self.config.gesture.long_press());
        self.act(GestureKind::LongPress(duration))
    }

    fn act(&self, kind: GestureKind) -> Result<GestureResult, AutomationError> {
        let mut retries_left = self.config.stale_retries;
        loop {
            let handle = self.bring_into_view()?;
            let spec = GestureSpec {
                target: GestureTarget::Element(handle),
                kind: kind.clone(),
            };
            match perform(self.driver.as_ref(), &spec, &self.config.gesture) {
                Err(e) if e.is_stale() && retries_left > 0 => {
                    retries_left -= 1;
                    debug!(error = %e, retries_left, "target went stale before gesture, re-resolving");
                }
                other => return other,
            }
        }
    }

    /// Tap this element and wait for `expected` to hold.
    pub fn navigate_to(&self, expected: &ScreenPredicate) -> Result<Transition, NavigationFailure> {
        navigate_and_verify_with(
            self.driver.as_ref(),
            &self.query,
            GestureKind::Tap,
            expected,
            &self.config,
        )
    }
}

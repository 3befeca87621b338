//! Navigate-then-verify: resolve, bring into view, act, confirm
//!
//! The protocol walks `Idle → Located → Acted → Confirmed`. A failure at any
//! step aborts with the step reached so far; an action is never reported
//! as successful until the expected screen state has been observed.

use crate::config::EngineConfig;
use crate::element::ElementHandle;
use crate::errors::AutomationError;
use crate::gesture::{perform, GestureKind, GestureResult, GestureSpec, GestureTarget};
use crate::platforms::AutomationDriver;
use crate::query::Query;
use crate::scroll::bring_into_view;
use crate::wait::{await_state, ScreenPredicate, WaitOutcome};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionState {
    Idle,
    Located,
    Acted,
    Confirmed,
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionState::Idle => "idle",
            TransitionState::Located => "located",
            TransitionState::Acted => "acted",
            TransitionState::Confirmed => "confirmed",
        };
        f.write_str(s)
    }
}

/// A confirmed transition
#[derive(Debug, Clone)]
pub struct Transition {
    /// The handle the gesture was dispatched to; stale by now
    pub element: ElementHandle,
    pub gesture: GestureResult,
    pub scrolls: usize,
    /// Time from dispatch until the expected state was observed
    pub confirmed_after: Duration,
    pub stale_recoveries: usize,
}

/// The protocol stopped before `Confirmed`
#[derive(Debug, Clone, Error)]
#[error("navigation stopped after '{stage}': {error}")]
pub struct NavigationFailure {
    /// Last state successfully reached
    pub stage: TransitionState,
    pub error: AutomationError,
}

impl NavigationFailure {
    fn at(stage: TransitionState, error: AutomationError) -> Self {
        Self { stage, error }
    }
}

/// Tap the element `query` resolves to and wait for `expected` to hold.
pub fn navigate_and_verify(
    driver: &dyn AutomationDriver,
    query: &Query,
    expected: &ScreenPredicate,
    config: &EngineConfig,
) -> Result<Transition, NavigationFailure> {
    navigate_and_verify_with(driver, query, GestureKind::Tap, expected, config)
}

/// [`navigate_and_verify`] with any gesture, e.g. a long-press that opens a
/// context menu.
///
/// Disabled targets are rejected before any gesture primitive is invoked.
/// A stale handle between locating and acting restarts from `Idle`, at most
/// `config.stale_retries` times; after that the target counts as not found.
#[instrument(level = "debug", skip(driver, query, kind, expected, config), fields(query = %query.description(), expected = %expected.name()))]
pub fn navigate_and_verify_with(
    driver: &dyn AutomationDriver,
    query: &Query,
    kind: GestureKind,
    expected: &ScreenPredicate,
    config: &EngineConfig,
) -> Result<Transition, NavigationFailure> {
    let mut stale_recoveries = 0usize;

    loop {
        // Idle -> Located
        let report = bring_into_view(driver, query, None, &config.scroll, &config.gesture)
            .map_err(|e| NavigationFailure::at(TransitionState::Idle, e))?;
        let handle = report.handle;
        debug!(element = ?handle.snapshot(), scrolls = report.scrolls, "located");

        // Located -> Acted
        let acted = handle.is_enabled(driver).and_then(|enabled| {
            if !enabled {
                return Err(AutomationError::ElementNotEnabled(format!(
                    "'{}' resolved via {} is disabled",
                    query.description(),
                    handle.strategy()
                )));
            }
            let spec = GestureSpec {
                target: GestureTarget::Element(handle.clone()),
                kind: kind.clone(),
            };
            perform(driver, &spec, &config.gesture)
        });

        let gesture = match acted {
            Ok(gesture) => gesture,
            Err(e) if e.is_stale() && stale_recoveries < config.stale_retries => {
                stale_recoveries += 1;
                warn!(error = %e, stale_recoveries, "target went stale, re-resolving");
                continue;
            }
            Err(e) if e.is_stale() => {
                warn!(error = %e, stale_recoveries, "target kept going stale");
                return Err(NavigationFailure::at(
                    TransitionState::Idle,
                    AutomationError::ElementNotFound {
                        query: query.description().to_string(),
                        attempted: query.strategy_names(),
                    },
                ));
            }
            Err(e) => return Err(NavigationFailure::at(TransitionState::Located, e)),
        };

        // Acted -> Confirmed
        match await_state(driver, expected, &config.poll, &config.resolve_options()) {
            WaitOutcome::Reached { elapsed, .. } => {
                info!(
                    query = %query.description(),
                    expected = %expected.name(),
                    ?elapsed,
                    "transition confirmed"
                );
                return Ok(Transition {
                    element: handle,
                    gesture,
                    scrolls: report.scrolls,
                    confirmed_after: elapsed,
                    stale_recoveries,
                });
            }
            WaitOutcome::TimedOut {
                elapsed,
                last_error,
                ..
            } => {
                let mut message = format!(
                    "'{}' did not hold {elapsed:?} after acting on '{}'",
                    expected.name(),
                    query.description()
                );
                if let Some(err) = last_error {
                    message.push_str(&format!(" (last error: {err})"));
                }
                return Err(NavigationFailure::at(
                    TransitionState::Acted,
                    AutomationError::Timeout(message),
                ));
            }
        }
    }
}

//! Screen-state polling
//!
//! One parameterised poller replaces per-screen wait loops: the screen is
//! identified by a caller-supplied [`ScreenPredicate`], and a timeout is an
//! ordinary [`WaitOutcome`] rather than an error.

use crate::config::{PollOptions, ResolveOptions};
use crate::errors::AutomationError;
use crate::locator::resolve;
use crate::platforms::AutomationDriver;
use crate::query::{Query, Strategy};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

type PredicateFn =
    Arc<dyn Fn(&dyn AutomationDriver, &ResolveOptions) -> Result<bool, AutomationError> + Send + Sync>;

/// Named boolean check over the current tree, e.g. "Edit screen is showing"
#[derive(Clone)]
pub struct ScreenPredicate {
    name: String,
    check: PredicateFn,
}

impl fmt::Debug for ScreenPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenPredicate")
            .field("name", &self.name)
            .finish()
    }
}

impl ScreenPredicate {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&dyn AutomationDriver) -> Result<bool, AutomationError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_resolver(name, move |driver, _| check(driver))
    }

    /// Like [`ScreenPredicate::new`], for checks that resolve queries and so
    /// need the caller's resolver options.
    pub fn with_resolver(
        name: impl Into<String>,
        check: impl Fn(&dyn AutomationDriver, &ResolveOptions) -> Result<bool, AutomationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Holds while `query` resolves to something.
    pub fn element_present(name: impl Into<String>, query: Query) -> Self {
        Self::with_resolver(name, move |driver, options| {
            match resolve(driver, &query, options) {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    /// Holds while an element labelled exactly `title` is in the tree.
    pub fn title_present(title: &str) -> Self {
        Self::element_present(
            format!("title '{title}'"),
            Query::single(Strategy::by_label(title)),
        )
    }

    /// Holds exactly when `self` does not. Errors stay errors.
    pub fn negated(&self) -> Self {
        let inner = self.check.clone();
        Self {
            name: format!("not({})", self.name),
            check: Arc::new(move |driver, options| inner(driver, options).map(|v| !v)),
        }
    }

    /// Holds when every predicate holds; evaluation stops at the first false.
    pub fn all_of(name: impl Into<String>, predicates: Vec<ScreenPredicate>) -> Self {
        Self::with_resolver(name, move |driver, options| {
            for p in &predicates {
                if !p.evaluate(driver, options)? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// Holds when any predicate holds. A member error is reported only if no
    /// other member holds.
    pub fn any_of(name: impl Into<String>, predicates: Vec<ScreenPredicate>) -> Self {
        Self::with_resolver(name, move |driver, options| {
            let mut last_err = None;
            for p in &predicates {
                match p.evaluate(driver, options) {
                    Ok(true) => return Ok(true),
                    Ok(false) => {}
                    Err(e) => last_err = Some(e),
                }
            }
            match last_err {
                Some(e) => Err(e),
                None => Ok(false),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(
        &self,
        driver: &dyn AutomationDriver,
        options: &ResolveOptions,
    ) -> Result<bool, AutomationError> {
        (self.check)(driver, options)
    }
}

/// Result of a poll. Timing out is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WaitOutcome {
    Reached {
        elapsed: Duration,
        polls: usize,
    },
    TimedOut {
        elapsed: Duration,
        polls: usize,
        /// Last error raised by the predicate, kept for diagnostics
        last_error: Option<String>,
    },
}

impl WaitOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, WaitOutcome::Reached { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Reached { elapsed, .. } | WaitOutcome::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn polls(&self) -> usize {
        match self {
            WaitOutcome::Reached { polls, .. } | WaitOutcome::TimedOut { polls, .. } => *polls,
        }
    }
}

/// Block until `predicate` holds or `options.timeout` passes.
///
/// Queries inside the predicate resolve with `resolver`.
#[instrument(level = "debug", skip(driver, predicate, options, resolver), fields(predicate = %predicate.name()))]
pub fn await_state(
    driver: &dyn AutomationDriver,
    predicate: &ScreenPredicate,
    options: &PollOptions,
    resolver: &ResolveOptions,
) -> WaitOutcome {
    await_condition(driver, options, |d| predicate.evaluate(d, resolver))
}

/// Block until `predicate` stops holding, e.g. a sheet has been dismissed.
pub fn await_gone(
    driver: &dyn AutomationDriver,
    predicate: &ScreenPredicate,
    options: &PollOptions,
    resolver: &ResolveOptions,
) -> WaitOutcome {
    await_state(driver, &predicate.negated(), options, resolver)
}

/// Poll an arbitrary condition with the same timing rules as [`await_state`].
///
/// The condition is checked immediately. Between checks the poller sleeps
/// for the interval, shortened so that the last check lands on the
/// deadline. Errors from the condition count as "not yet".
pub fn await_condition(
    driver: &dyn AutomationDriver,
    options: &PollOptions,
    mut condition: impl FnMut(&dyn AutomationDriver) -> Result<bool, AutomationError>,
) -> WaitOutcome {
    let start = driver.now();
    let timeout = options.timeout();
    // A zero interval would spin without ever advancing a virtual clock
    let interval = options.interval().max(Duration::from_millis(1));
    let mut polls = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        polls += 1;
        match condition(driver) {
            Ok(true) => {
                let elapsed = driver.now().saturating_duration_since(start);
                debug!(?elapsed, polls, "condition reached");
                return WaitOutcome::Reached { elapsed, polls };
            }
            Ok(false) => {}
            Err(e) => {
                debug!(error = %e, "condition raised, treating as not satisfied");
                last_error = Some(e.to_string());
            }
        }

        let elapsed = driver.now().saturating_duration_since(start);
        if elapsed >= timeout {
            debug!(?elapsed, polls, "condition timed out");
            return WaitOutcome::TimedOut {
                elapsed,
                polls,
                last_error,
            };
        }

        driver.sleep(interval.min(timeout - elapsed));
    }
}

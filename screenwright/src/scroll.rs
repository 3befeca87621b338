//! Scroll-search: bring a resolvable element into the safe interactable band
//!
//! The band keeps targets away from system chrome at the top and bottom of
//! the viewport. After every scroll the query is resolved again from
//! scratch; the pre-scroll handle is never reused.

use crate::config::{GestureOptions, ResolveOptions, ScrollOptions};
use crate::element::ElementHandle;
use crate::errors::AutomationError;
use crate::gesture::{perform, GestureResult, GestureSpec};
use crate::locator::resolve;
use crate::platforms::AutomationDriver;
use crate::query::Query;
use crate::types::{Point, Size};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Which content a scroll reveals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScrollDirection {
    /// Reveal content above; the finger drags downward
    Up,
    /// Reveal content below; the finger drags upward
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandPosition {
    Above,
    Inside,
    Below,
}

/// Vertical range in which an element can be tapped safely
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafeBand {
    pub top: f64,
    pub bottom: f64,
}

impl SafeBand {
    pub fn for_viewport(viewport: Size, options: &ScrollOptions) -> Self {
        Self {
            top: options.top_margin,
            bottom: (viewport.height - options.bottom_margin).max(options.top_margin),
        }
    }

    pub fn locate(&self, y: f64) -> BandPosition {
        if y < self.top {
            BandPosition::Above
        } else if y > self.bottom {
            BandPosition::Below
        } else {
            BandPosition::Inside
        }
    }

    pub fn contains(&self, y: f64) -> bool {
        self.locate(y) == BandPosition::Inside
    }
}

/// Outcome of a scroll-search
#[derive(Debug, Clone)]
pub struct ScrollReport {
    pub handle: ElementHandle,
    pub scrolls: usize,
    /// False when attempts ran out and `handle` is a best-effort result
    pub in_band: bool,
}

/// Start and end points of one scroll drag at the horizontal centre.
pub fn scroll_path(viewport: Size, direction: ScrollDirection, fraction: f64) -> (Point, Point) {
    let x = viewport.width / 2.0;
    let mid = viewport.height / 2.0;
    let half_span = viewport.height * fraction / 2.0;
    let upper = Point::new(x, mid - half_span);
    let lower = Point::new(x, mid + half_span);
    match direction {
        ScrollDirection::Up => (upper, lower),
        ScrollDirection::Down => (lower, upper),
    }
}

/// Perform one scroll drag through the gesture executor.
pub fn scroll_once(
    driver: &dyn AutomationDriver,
    viewport: Size,
    direction: ScrollDirection,
    options: &ScrollOptions,
    gesture: &GestureOptions,
) -> Result<GestureResult, AutomationError> {
    let (from, to) = scroll_path(viewport, direction, options.swipe_fraction);
    debug!(?direction, %from, %to, "scrolling");
    perform(
        driver,
        &GestureSpec::drag(from, to, options.swipe_duration()),
        gesture,
    )
}

/// Live vertical centre, or `None` when the node is not laid out.
///
/// Stale handles and disconnects are returned as errors; any other read
/// failure counts as an unknown position.
fn vertical_position(
    driver: &dyn AutomationDriver,
    handle: &ElementHandle,
) -> Result<Option<f64>, AutomationError> {
    match handle.bounds(driver) {
        Ok(rect) if !rect.is_empty() => Ok(Some(rect.center().y)),
        Ok(_) => Ok(None),
        Err(e) if e.is_stale() || matches!(e, AutomationError::DriverDisconnected(_)) => Err(e),
        Err(e) => {
            debug!(error = %e, "position unavailable");
            Ok(None)
        }
    }
}

fn not_found(query: &Query) -> AutomationError {
    AutomationError::ElementNotFound {
        query: query.description().to_string(),
        attempted: query.strategy_names(),
    }
}

/// Resolve `query`, scrolling until the element's centre is inside the safe band.
///
/// Fails immediately if the first resolution fails. A handle that goes stale
/// is resolved again without scrolling, at most `max_attempts` times. After
/// `max_attempts` scrolls without reaching the band, returns the latest
/// resolution as a best effort, or `ElementNotFound` if that resolution failed.
#[instrument(level = "debug", skip(driver, query, viewport, options, gesture), fields(query = %query.description()))]
pub fn bring_into_view(
    driver: &dyn AutomationDriver,
    query: &Query,
    viewport: Option<Size>,
    options: &ScrollOptions,
    gesture: &GestureOptions,
) -> Result<ScrollReport, AutomationError> {
    let resolve_options = ResolveOptions {
        proximity_threshold: options.proximity_threshold,
    };
    let mut current = Some(resolve(driver, query, &resolve_options)?);
    let viewport = match viewport {
        Some(v) => v,
        None => driver.viewport_size()?,
    };
    let band = SafeBand::for_viewport(viewport, options);
    let mut scrolls = 0usize;
    let mut stale_reads = 0usize;
    let mut direction = ScrollDirection::Down;

    loop {
        if let Some(handle) = &current {
            let position = match vertical_position(driver, handle) {
                Ok(position) => position,
                Err(e) if e.is_stale() => {
                    if stale_reads >= options.max_attempts {
                        warn!(stale_reads, "target kept going stale");
                        return Err(not_found(query));
                    }
                    stale_reads += 1;
                    debug!(error = %e, stale_reads, "handle went stale, resolving again");
                    current = match resolve(driver, query, &resolve_options) {
                        Ok(handle) => Some(handle),
                        Err(e) if e.is_not_found() => None,
                        Err(e) => return Err(e),
                    };
                    continue;
                }
                Err(e) => return Err(e),
            };
            direction = match position {
                Some(y) => match band.locate(y) {
                    BandPosition::Inside => {
                        if scrolls > 0 {
                            info!(scrolls, y, "element scrolled into safe band");
                        }
                        return Ok(ScrollReport {
                            handle: handle.clone(),
                            scrolls,
                            in_band: true,
                        });
                    }
                    BandPosition::Above => ScrollDirection::Up,
                    BandPosition::Below => ScrollDirection::Down,
                },
                // Not rendered: assume it lies further along the content
                None => ScrollDirection::Down,
            };
        }

        if scrolls >= options.max_attempts {
            break;
        }

        scroll_once(driver, viewport, direction, options, gesture)?;
        scrolls += 1;
        driver.sleep(options.settle());

        current = match resolve(driver, query, &resolve_options) {
            Ok(handle) => Some(handle),
            Err(e) if e.is_not_found() => {
                debug!(scrolls, "target not resolvable after scroll");
                None
            }
            Err(e) => return Err(e),
        };
    }

    match current {
        Some(handle) => {
            warn!(
                scrolls,
                ?band,
                "safe band not reached, returning best-effort position"
            );
            Ok(ScrollReport {
                handle,
                scrolls,
                in_band: false,
            })
        }
        None => Err(not_found(query)),
    }
}

//! Gesture execution with coordinate fallback
//!
//! Element targets are turned into a centroid from bounds read right before
//! dispatch. The native driver primitive is tried first; if it throws, the
//! same gesture is replayed as a low-level pointer sequence. Whether the UI
//! reacted is not checked here.

use crate::config::GestureOptions;
use crate::element::ElementHandle;
use crate::errors::AutomationError;
use crate::platforms::AutomationDriver;
use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// One step of a synthesized pointer sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerAction {
    Move { x: f64, y: f64, duration_ms: u64 },
    Down,
    Pause { duration_ms: u64 },
    Up,
}

impl PointerAction {
    fn move_to(at: Point, duration: Duration) -> Self {
        PointerAction::Move {
            x: at.x,
            y: at.y,
            duration_ms: duration.as_millis() as u64,
        }
    }

    fn pause(duration: Duration) -> Self {
        PointerAction::Pause {
            duration_ms: duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GestureTarget {
    /// Centroid of the element, from bounds re-read at dispatch time
    Element(ElementHandle),
    Point(Point),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureKind {
    Tap,
    LongPress(Duration),
    /// Drag from the target to `to`
    Drag { to: Point, duration: Duration },
}

#[derive(Debug, Clone)]
pub struct GestureSpec {
    pub target: GestureTarget,
    pub kind: GestureKind,
}

impl GestureSpec {
    pub fn tap(element: ElementHandle) -> Self {
        Self {
            target: GestureTarget::Element(element),
            kind: GestureKind::Tap,
        }
    }

    pub fn tap_at(at: Point) -> Self {
        Self {
            target: GestureTarget::Point(at),
            kind: GestureKind::Tap,
        }
    }

    pub fn long_press(element: ElementHandle, duration: Duration) -> Self {
        Self {
            target: GestureTarget::Element(element),
            kind: GestureKind::LongPress(duration),
        }
    }

    pub fn drag(from: Point, to: Point, duration: Duration) -> Self {
        Self {
            target: GestureTarget::Point(from),
            kind: GestureKind::Drag { to, duration },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GestureMethod {
    Native,
    PointerSequence,
}

/// What was dispatched, mirroring the click result of the element API
#[derive(Debug, Clone, Serialize)]
pub struct GestureResult {
    pub method: GestureMethod,
    pub coordinates: Point,
    pub details: String,
}

/// Resolve the dispatch point for a target.
fn target_point(driver: &dyn AutomationDriver, target: &GestureTarget) -> Result<Point, AutomationError> {
    match target {
        GestureTarget::Point(p) => Ok(*p),
        GestureTarget::Element(handle) => {
            let rect = handle.bounds(driver)?;
            if rect.is_empty() {
                return Err(AutomationError::InvalidArgument(format!(
                    "element {} has no on-screen frame ({rect:?})",
                    handle.id()
                )));
            }
            Ok(rect.center())
        }
    }
}

/// Pointer steps equivalent to `kind` performed at `at`.
pub fn pointer_sequence(at: Point, kind: &GestureKind, options: &GestureOptions) -> Vec<PointerAction> {
    let mut actions = vec![PointerAction::move_to(at, Duration::ZERO), PointerAction::Down];
    match kind {
        GestureKind::Tap => actions.push(PointerAction::pause(options.tap_hold())),
        GestureKind::LongPress(duration) => actions.push(PointerAction::pause(*duration)),
        GestureKind::Drag { to, duration } => {
            actions.push(PointerAction::pause(options.tap_hold()));
            actions.push(PointerAction::move_to(*to, *duration));
        }
    }
    actions.push(PointerAction::Up);
    actions
}

fn perform_native(
    driver: &dyn AutomationDriver,
    at: Point,
    kind: &GestureKind,
) -> Result<(), AutomationError> {
    match kind {
        GestureKind::Tap => driver.tap(at),
        GestureKind::LongPress(duration) => driver.touch_and_hold(at, *duration),
        GestureKind::Drag { to, duration } => driver.drag_from_to(at, *to, *duration),
    }
}

/// Dispatch a gesture, falling back to a pointer sequence if the native
/// primitive throws. Fails only if both paths fail.
#[instrument(level = "debug", skip(driver, spec, options), fields(kind = ?spec.kind))]
pub fn perform(
    driver: &dyn AutomationDriver,
    spec: &GestureSpec,
    options: &GestureOptions,
) -> Result<GestureResult, AutomationError> {
    let at = target_point(driver, &spec.target)?;

    let native_error = if driver.supports_native_gestures() {
        match perform_native(driver, at, &spec.kind) {
            Ok(()) => {
                debug!(%at, "native gesture dispatched");
                return Ok(GestureResult {
                    method: GestureMethod::Native,
                    coordinates: at,
                    details: format!("{:?} via native primitive", spec.kind),
                });
            }
            Err(e @ AutomationError::DriverDisconnected(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, %at, "native gesture failed, falling back to pointer sequence");
                e.to_string()
            }
        }
    } else {
        "native gestures not supported by driver".to_string()
    };

    let actions = pointer_sequence(at, &spec.kind, options);
    match driver.perform_pointer_sequence(&actions) {
        Ok(()) => {
            debug!(%at, steps = actions.len(), "pointer sequence dispatched");
            Ok(GestureResult {
                method: GestureMethod::PointerSequence,
                coordinates: at,
                details: format!("{:?} via pointer sequence ({native_error})", spec.kind),
            })
        }
        Err(e @ AutomationError::DriverDisconnected(_)) => Err(e),
        Err(e) => Err(AutomationError::InteractionFailed {
            native: native_error,
            fallback: e.to_string(),
        }),
    }
}

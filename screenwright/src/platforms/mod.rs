use crate::element::AttributeSnapshot;
use crate::errors::AutomationError;
use crate::gesture::PointerAction;
use crate::selector::Selector;
use crate::types::{ElementId, Point, Rect, Size};
use std::time::{Duration, Instant};

pub mod webdriver;

pub use webdriver::WebDriverSession;

/// The remote automation driver the engine talks to.
///
/// Implementations wrap one already-established session. Every call may
/// fail; the engine never assumes a call succeeds, and never issues two
/// calls concurrently against the same driver.
pub trait AutomationDriver: Send + Sync {
    /// Execute one selector against the live tree, returning candidates in
    /// tree-traversal order. No match is `Ok(vec![])`, not an error.
    fn query_all(&self, selector: &Selector) -> Result<Vec<AttributeSnapshot>, AutomationError>;

    /// Read a single attribute of a live element. `Ok(None)` when the
    /// element exists but does not expose the attribute.
    fn read_attribute(
        &self,
        id: &ElementId,
        name: &str,
    ) -> Result<Option<String>, AutomationError>;

    /// Current frame of a live element
    fn bounds(&self, id: &ElementId) -> Result<Rect, AutomationError>;

    fn is_displayed(&self, id: &ElementId) -> Result<bool, AutomationError>;

    /// Native single tap at a screen coordinate
    fn tap(&self, at: Point) -> Result<(), AutomationError>;

    /// Native press-and-hold at a screen coordinate
    fn touch_and_hold(&self, at: Point, duration: Duration) -> Result<(), AutomationError>;

    /// Native press, move and release over `duration`
    fn drag_from_to(&self, from: Point, to: Point, duration: Duration)
        -> Result<(), AutomationError>;

    /// Low-level pointer sequence used when the native primitives fail
    fn perform_pointer_sequence(&self, actions: &[PointerAction]) -> Result<(), AutomationError>;

    /// Whether the native primitives above are available at all. Drivers
    /// that return false go straight to the pointer sequence.
    fn supports_native_gestures(&self) -> bool {
        true
    }

    fn viewport_size(&self) -> Result<Size, AutomationError>;

    /// The only suspension primitive the engine uses
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Monotonic clock used for deadlines
    fn now(&self) -> Instant {
        Instant::now()
    }
}

//! Scripted in-memory driver with a virtual clock
//!
//! The tree is a flat list in traversal order. `sleep` advances the clock
//! instantly and fires any mutation scheduled for the new time, so polling
//! and scrolling tests run without real delays.

use crate::{
    AttributeSnapshot, AutomationDriver, AutomationError, ElementId, PointerAction, Point, Rect,
    Selector, Size,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub type Tree = Vec<AttributeSnapshot>;

type Mutation = Box<dyn FnOnce(&mut Tree) + Send>;
type PressHook = Box<dyn FnMut(&mut Tree, Point) + Send>;
type DragHook = Box<dyn FnMut(&mut Tree, Point, Point) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query(String),
    ReadAttribute(String, String),
    Bounds(String),
    Tap(Point),
    TouchAndHold(Point, Duration),
    Drag(Point, Point, Duration),
    PointerSequence(Vec<PointerAction>),
    Viewport,
    Sleep(Duration),
}

impl Call {
    fn is_gesture(&self) -> bool {
        matches!(
            self,
            Call::Tap(_) | Call::TouchAndHold(..) | Call::Drag(..) | Call::PointerSequence(_)
        )
    }
}

struct State {
    tree: Tree,
    elapsed: Duration,
    calls: Vec<Call>,
    scheduled: Vec<(Duration, Mutation)>,
    on_press: Option<PressHook>,
    on_drag: Option<DragHook>,
    query_failures: HashMap<String, VecDeque<AutomationError>>,
    attribute_failures: HashMap<String, VecDeque<AutomationError>>,
    bounds_failures: HashMap<String, VecDeque<AutomationError>>,
    native_failure: Option<AutomationError>,
    pointer_failure: Option<AutomationError>,
}

impl State {
    fn find(&self, id: &ElementId) -> Result<&AttributeSnapshot, AutomationError> {
        self.tree
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| AutomationError::StaleElement(format!("{id} is no longer in the tree")))
    }

    fn press(&mut self, at: Point) {
        if let Some(hook) = self.on_press.as_mut() {
            hook(&mut self.tree, at);
        }
    }

    fn drag(&mut self, from: Point, to: Point) {
        match self.on_drag.as_mut() {
            Some(hook) => hook(&mut self.tree, from, to),
            // Content follows the finger
            None => {
                let dy = to.y - from.y;
                for node in self.tree.iter_mut() {
                    if let Some(rect) = node.rect.as_mut() {
                        rect.y += dy;
                    }
                }
            }
        }
    }

    fn pop_failure(
        failures: &mut HashMap<String, VecDeque<AutomationError>>,
        key: &str,
    ) -> Option<AutomationError> {
        failures.get_mut(key).and_then(VecDeque::pop_front)
    }
}

pub struct FakeDriver {
    base: Instant,
    viewport: Size,
    native: bool,
    state: Mutex<State>,
}

impl FakeDriver {
    pub fn new(tree: Tree) -> Self {
        Self {
            base: Instant::now(),
            viewport: Size::new(400.0, 800.0),
            native: true,
            state: Mutex::new(State {
                tree,
                elapsed: Duration::ZERO,
                calls: Vec::new(),
                scheduled: Vec::new(),
                on_press: None,
                on_drag: None,
                query_failures: HashMap::new(),
                attribute_failures: HashMap::new(),
                bounds_failures: HashMap::new(),
                native_failure: None,
                pointer_failure: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_viewport(mut self, viewport: Size) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn without_native_gestures(mut self) -> Self {
        self.native = false;
        self
    }

    /// Mutate the tree once the virtual clock reaches `at`.
    pub fn schedule(self, at: Duration, mutation: impl FnOnce(&mut Tree) + Send + 'static) -> Self {
        self.state().scheduled.push((at, Box::new(mutation)));
        self
    }

    /// Runs on every tap, long press and pointer-sequence press.
    pub fn on_press(self, hook: impl FnMut(&mut Tree, Point) + Send + 'static) -> Self {
        self.state().on_press = Some(Box::new(hook));
        self
    }

    /// Replaces the default "content follows the finger" drag behaviour.
    pub fn on_drag(self, hook: impl FnMut(&mut Tree, Point, Point) + Send + 'static) -> Self {
        self.state().on_drag = Some(Box::new(hook));
        self
    }

    /// The next `query_all` for this selector fails with `error`. Queue
    /// several to fail several times.
    pub fn fail_query(self, selector: &Selector, error: AutomationError) -> Self {
        self.state()
            .query_failures
            .entry(selector.describe())
            .or_default()
            .push_back(error);
        self
    }

    pub fn fail_attribute(self, id: &str, name: &str, error: AutomationError) -> Self {
        self.state()
            .attribute_failures
            .entry(format!("{id}/{name}"))
            .or_default()
            .push_back(error);
        self
    }

    pub fn fail_bounds(self, id: &str, error: AutomationError) -> Self {
        self.state()
            .bounds_failures
            .entry(id.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Every native gesture primitive fails with `error`.
    pub fn fail_native(self, error: AutomationError) -> Self {
        self.state().native_failure = Some(error);
        self
    }

    pub fn fail_pointer(self, error: AutomationError) -> Self {
        self.state().pointer_failure = Some(error);
        self
    }

    pub fn update_tree(&self, mutation: impl FnOnce(&mut Tree)) {
        mutation(&mut self.state().tree);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn gestures(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_gesture).collect()
    }

    pub fn query_count(&self, selector: &Selector) -> usize {
        let key = selector.describe();
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Query(k) if *k == key))
            .count()
    }

    pub fn taps(&self) -> Vec<Point> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Tap(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn drags(&self) -> Vec<(Point, Point)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Drag(from, to, _) => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    pub fn pointer_sequences(&self) -> Vec<Vec<PointerAction>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PointerSequence(actions) => Some(actions),
                _ => None,
            })
            .collect()
    }

    pub fn sleep_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Sleep(_)))
            .count()
    }

    /// Virtual time elapsed since the driver was created.
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    fn native_gesture(&self, call: Call) -> Result<MutexGuard<'_, State>, AutomationError> {
        let mut state = self.state();
        state.calls.push(call);
        match state.native_failure.clone() {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }
}

impl AutomationDriver for FakeDriver {
    fn query_all(&self, selector: &Selector) -> Result<Vec<AttributeSnapshot>, AutomationError> {
        let key = selector.describe();
        let mut state = self.state();
        state.calls.push(Call::Query(key.clone()));
        if let Some(e) = State::pop_failure(&mut state.query_failures, &key) {
            return Err(e);
        }
        let mut found = Vec::new();
        for node in &state.tree {
            if selector.matches(node)? {
                found.push(node.clone());
            }
        }
        Ok(found)
    }

    fn read_attribute(&self, id: &ElementId, name: &str) -> Result<Option<String>, AutomationError> {
        let mut state = self.state();
        state
            .calls
            .push(Call::ReadAttribute(id.to_string(), name.to_string()));
        if let Some(e) = State::pop_failure(&mut state.attribute_failures, &format!("{id}/{name}")) {
            return Err(e);
        }
        let node = state.find(id)?;
        Ok(match name {
            "type" => Some(node.element_type.clone()),
            "label" => node.label.clone(),
            "name" => node.name.clone(),
            "value" => node.value.clone(),
            "enabled" => Some(node.enabled.to_string()),
            "visible" => node.visible.map(|v| v.to_string()),
            _ => None,
        })
    }

    fn bounds(&self, id: &ElementId) -> Result<Rect, AutomationError> {
        let mut state = self.state();
        state.calls.push(Call::Bounds(id.to_string()));
        if let Some(e) = State::pop_failure(&mut state.bounds_failures, id.as_str()) {
            return Err(e);
        }
        Ok(state.find(id)?.rect.unwrap_or_default())
    }

    fn is_displayed(&self, id: &ElementId) -> Result<bool, AutomationError> {
        let state = self.state();
        let node = state.find(id)?;
        Ok(node.visible.unwrap_or(true) && node.rect.map(|r| !r.is_empty()).unwrap_or(false))
    }

    fn tap(&self, at: Point) -> Result<(), AutomationError> {
        self.native_gesture(Call::Tap(at))?.press(at);
        Ok(())
    }

    fn touch_and_hold(&self, at: Point, duration: Duration) -> Result<(), AutomationError> {
        self.native_gesture(Call::TouchAndHold(at, duration))?
            .press(at);
        Ok(())
    }

    fn drag_from_to(&self, from: Point, to: Point, duration: Duration) -> Result<(), AutomationError> {
        self.native_gesture(Call::Drag(from, to, duration))?
            .drag(from, to);
        Ok(())
    }

    fn perform_pointer_sequence(&self, actions: &[PointerAction]) -> Result<(), AutomationError> {
        let mut state = self.state();
        state.calls.push(Call::PointerSequence(actions.to_vec()));
        if let Some(e) = state.pointer_failure.clone() {
            return Err(e);
        }
        let moves: Vec<Point> = actions
            .iter()
            .filter_map(|a| match a {
                PointerAction::Move { x, y, .. } => Some(Point::new(*x, *y)),
                _ => None,
            })
            .collect();
        match moves.as_slice() {
            [from, .., to] => state.drag(*from, *to),
            [at] => state.press(*at),
            [] => {}
        }
        Ok(())
    }

    fn supports_native_gestures(&self) -> bool {
        self.native
    }

    fn viewport_size(&self) -> Result<Size, AutomationError> {
        self.state().calls.push(Call::Viewport);
        Ok(self.viewport)
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state();
        state.calls.push(Call::Sleep(duration));
        state.elapsed += duration;
        let now = state.elapsed;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        state.scheduled = pending;
        for (_, mutation) in due {
            mutation(&mut state.tree);
        }
    }

    fn now(&self) -> Instant {
        self.base + self.state().elapsed
    }
}

/// A button whose centre sits at `y`.
pub fn button(id: &str, label: &str, y: f64) -> AttributeSnapshot {
    AttributeSnapshot::new(id, "XCUIElementTypeButton")
        .with_label(label)
        .with_rect(Rect::new(100.0, y - 20.0, 80.0, 40.0))
}

/// A full-width table cell whose centre sits at `y`.
pub fn cell(id: &str, label: &str, y: f64) -> AttributeSnapshot {
    AttributeSnapshot::new(id, "XCUIElementTypeCell")
        .with_label(label)
        .with_rect(Rect::new(0.0, y - 22.0, 400.0, 44.0))
}

pub fn text(id: &str, label: &str, y: f64) -> AttributeSnapshot {
    AttributeSnapshot::new(id, "XCUIElementTypeStaticText")
        .with_label(label)
        .with_rect(Rect::new(16.0, y - 10.0, 200.0, 20.0))
}

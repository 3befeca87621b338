use crate::errors::AutomationError;
use crate::platforms::AutomationDriver;
use crate::types::{ElementId, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Helper functions for clean serialization
fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

/// Properties of one live element as returned by a single tree query.
///
/// A snapshot is a copy: it never changes after the query returns, even if
/// the underlying node moves or disappears.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeSnapshot {
    pub id: ElementId,
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub value: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
}

fn default_true() -> bool {
    true
}

impl AttributeSnapshot {
    pub fn new(id: impl Into<ElementId>, element_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            element_type: element_type.into(),
            label: None,
            name: None,
            value: None,
            enabled: true,
            visible: None,
            rect: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    /// Label, falling back to name: drivers are inconsistent about which one
    /// carries the visible text.
    pub fn display_text(&self) -> Option<&str> {
        self.label
            .as_deref()
            .filter(|l| !l.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
    }

    /// Vertical centre of the element, if it has been laid out.
    pub fn center_y(&self) -> Option<f64> {
        self.rect.filter(|r| !r.is_empty()).map(|r| r.center().y)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Debug for AttributeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("AttributeSnapshot");
        debug_struct.field("id", &self.id.0);

        if !self.element_type.is_empty() {
            debug_struct.field("type", &self.element_type);
        }
        if let Some(label) = self.label.as_deref().filter(|s| !s.is_empty()) {
            debug_struct.field("label", &label);
        }
        if let Some(name) = self.name.as_deref().filter(|s| !s.is_empty()) {
            debug_struct.field("name", &name);
        }
        if let Some(value) = self.value.as_deref().filter(|s| !s.is_empty()) {
            debug_struct.field("value", &value);
        }
        // Only show enabled when it is the unusual case
        if !self.enabled {
            debug_struct.field("enabled", &false);
        }
        if let Some(visible) = self.visible {
            debug_struct.field("visible", &visible);
        }
        if let Some(ref rect) = self.rect {
            debug_struct.field("rect", rect);
        }

        debug_struct.finish()
    }
}

/// Ephemeral reference to a live node, produced by one resolution.
///
/// The handle does not own the node and is not refreshed. Anything that
/// mutates the UI (scroll, tap, screen change) may invalidate it, after which
/// the live readers return [`AutomationError::StaleElement`]. Re-resolve the
/// query instead of keeping a handle around.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    snapshot: AttributeSnapshot,
    strategy: String,
}

impl ElementHandle {
    pub fn new(snapshot: AttributeSnapshot, strategy: impl Into<String>) -> Self {
        Self {
            snapshot,
            strategy: strategy.into(),
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.snapshot.id
    }

    /// Attributes as they were when the handle was resolved.
    pub fn snapshot(&self) -> &AttributeSnapshot {
        &self.snapshot
    }

    /// Name of the strategy that produced this handle.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Current frame, read from the driver.
    #[instrument(level = "debug", skip(self, driver), fields(id = %self.snapshot.id))]
    pub fn bounds(&self, driver: &dyn AutomationDriver) -> Result<Rect, AutomationError> {
        driver.bounds(&self.snapshot.id)
    }

    /// Current centre point, read from the driver.
    pub fn centroid(&self, driver: &dyn AutomationDriver) -> Result<Point, AutomationError> {
        Ok(self.bounds(driver)?.center())
    }

    pub fn label(&self, driver: &dyn AutomationDriver) -> Result<Option<String>, AutomationError> {
        driver.read_attribute(&self.snapshot.id, "label")
    }

    pub fn value(&self, driver: &dyn AutomationDriver) -> Result<Option<String>, AutomationError> {
        driver.read_attribute(&self.snapshot.id, "value")
    }

    /// Live enabled state. A missing attribute counts as enabled.
    pub fn is_enabled(&self, driver: &dyn AutomationDriver) -> Result<bool, AutomationError> {
        let raw = driver.read_attribute(&self.snapshot.id, "enabled")?;
        Ok(raw.map(|v| parse_bool_attribute(&v)).unwrap_or(true))
    }

    pub fn is_displayed(&self, driver: &dyn AutomationDriver) -> Result<bool, AutomationError> {
        driver.is_displayed(&self.snapshot.id)
    }
}

/// Drivers report booleans as "true"/"false", "1"/"0" or "YES"/"NO".
pub fn parse_bool_attribute(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

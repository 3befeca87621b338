//! Blocking W3C WebDriver / Appium (XCUITest) adapter
//!
//! Attaches to a session that already exists; creating sessions and
//! launching apps is the caller's business.

use crate::element::{parse_bool_attribute, AttributeSnapshot};
use crate::errors::AutomationError;
use crate::gesture::PointerAction;
use crate::platforms::AutomationDriver;
use crate::selector::Selector;
use crate::types::{ElementId, Point, Rect, Size};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a07c-4c93a2aa2a8e";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";
const PREDICATE_STRATEGY: &str = "-ios predicate string";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WindowRect {
    width: f64,
    height: f64,
}

/// Translate a W3C error code into the engine's taxonomy.
pub fn map_wire_error(code: &str, message: &str) -> AutomationError {
    match code {
        "stale element reference" => AutomationError::StaleElement(message.to_string()),
        "no such element" => AutomationError::not_found(message),
        "invalid session id" => AutomationError::DriverDisconnected(message.to_string()),
        "invalid selector" => AutomationError::InvalidSelector(message.to_string()),
        "timeout" | "script timeout" => AutomationError::Timeout(message.to_string()),
        _ => AutomationError::PlatformError(format!("{code}: {message}")),
    }
}

/// An attached WebDriver session
#[derive(Debug, Clone)]
pub struct WebDriverSession {
    base_url: String,
    session_id: String,
    client: reqwest::blocking::Client,
}

impl WebDriverSession {
    /// Attach to `session_id` on the server at `server_url`
    /// (e.g. `http://127.0.0.1:4723`).
    pub fn attach(server_url: &str, session_id: &str) -> Result<Self, AutomationError> {
        Self::attach_with_timeout(server_url, session_id, DEFAULT_HTTP_TIMEOUT)
    }

    /// Attach with a per-request HTTP timeout; this bounds every driver call.
    pub fn attach_with_timeout(
        server_url: &str,
        session_id: &str,
        timeout: Duration,
    ) -> Result<Self, AutomationError> {
        if session_id.trim().is_empty() {
            return Err(AutomationError::InvalidArgument(
                "session id must not be empty".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            client,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    fn get(&self, path: &str) -> Result<Value, AutomationError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .map_err(|e| transport_error(path, e))?;
        Self::unwrap_value(path, response)
    }

    fn post(&self, path: &str, body: Value) -> Result<Value, AutomationError> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .map_err(|e| transport_error(path, e))?;
        Self::unwrap_value(path, response)
    }

    /// Extract `value` from a W3C response, mapping error payloads.
    fn unwrap_value(path: &str, response: reqwest::blocking::Response) -> Result<Value, AutomationError> {
        let status = response.status();
        let body: Value = response.json().map_err(|e| {
            AutomationError::PlatformError(format!("{path}: unreadable response ({status}): {e}"))
        })?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);

        if let Ok(wire) = serde_json::from_value::<WireError>(value.clone()) {
            debug!(path, code = %wire.error, "driver returned error");
            return Err(map_wire_error(&wire.error, &wire.message));
        }
        if !status.is_success() {
            return Err(AutomationError::PlatformError(format!(
                "{path}: HTTP {status} without error payload"
            )));
        }
        Ok(value)
    }

    fn execute_mobile(&self, command: &str, args: Value) -> Result<(), AutomationError> {
        self.post(
            "/execute/sync",
            json!({ "script": format!("mobile: {command}"), "args": [args] }),
        )
        .map(|_| ())
    }

    fn element_ids(value: &Value) -> Result<Vec<ElementId>, AutomationError> {
        let refs = value.as_array().ok_or_else(|| {
            AutomationError::PlatformError(format!("expected element array, got {value}"))
        })?;
        refs.iter()
            .map(|r| {
                r.get(W3C_ELEMENT_KEY)
                    .or_else(|| r.get(LEGACY_ELEMENT_KEY))
                    .and_then(Value::as_str)
                    .map(ElementId::new)
                    .ok_or_else(|| {
                        AutomationError::PlatformError(format!("malformed element reference {r}"))
                    })
            })
            .collect()
    }

    /// Build a snapshot from individual attribute reads.
    fn snapshot(&self, id: ElementId) -> Result<AttributeSnapshot, AutomationError> {
        let mut snapshot = AttributeSnapshot::new(
            id.clone(),
            self.read_attribute(&id, "type")?.unwrap_or_default(),
        );
        snapshot.label = self.read_attribute(&id, "label")?;
        snapshot.name = self.read_attribute(&id, "name")?;
        snapshot.value = self.read_attribute(&id, "value")?;
        snapshot.enabled = self
            .read_attribute(&id, "enabled")?
            .map(|v| parse_bool_attribute(&v))
            .unwrap_or(true);
        snapshot.visible = self
            .read_attribute(&id, "visible")?
            .map(|v| parse_bool_attribute(&v));
        snapshot.rect = Some(self.bounds(&id)?);
        Ok(snapshot)
    }
}

fn transport_error(path: &str, e: reqwest::Error) -> AutomationError {
    if e.is_timeout() {
        AutomationError::Timeout(format!("{path}: {e}"))
    } else {
        AutomationError::DriverDisconnected(format!("{path}: {e}"))
    }
}

fn pointer_action_json(action: &PointerAction) -> Value {
    match action {
        PointerAction::Move { x, y, duration_ms } => json!({
            "type": "pointerMove",
            "duration": duration_ms,
            "origin": "viewport",
            "x": x.round() as i64,
            "y": y.round() as i64,
        }),
        PointerAction::Down => json!({ "type": "pointerDown", "button": 0 }),
        PointerAction::Pause { duration_ms } => json!({ "type": "pause", "duration": duration_ms }),
        PointerAction::Up => json!({ "type": "pointerUp", "button": 0 }),
    }
}

impl AutomationDriver for WebDriverSession {
    fn query_all(&self, selector: &Selector) -> Result<Vec<AttributeSnapshot>, AutomationError> {
        let predicate = selector.to_predicate()?;
        let value = self.post(
            "/elements",
            json!({ "using": PREDICATE_STRATEGY, "value": predicate }),
        )?;
        let ids = Self::element_ids(&value)?;
        debug!(%predicate, count = ids.len(), "elements found");
        ids.into_iter().map(|id| self.snapshot(id)).collect()
    }

    fn read_attribute(
        &self,
        id: &ElementId,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        let value = self.get(&format!("/element/{id}/attribute/{name}"))?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    fn bounds(&self, id: &ElementId) -> Result<Rect, AutomationError> {
        let value = self.get(&format!("/element/{id}/rect"))?;
        serde_json::from_value(value)
            .map_err(|e| AutomationError::PlatformError(format!("malformed rect for {id}: {e}")))
    }

    fn is_displayed(&self, id: &ElementId) -> Result<bool, AutomationError> {
        let value = self.get(&format!("/element/{id}/displayed"))?;
        value.as_bool().ok_or_else(|| {
            AutomationError::PlatformError(format!("expected boolean for displayed, got {value}"))
        })
    }

    fn tap(&self, at: Point) -> Result<(), AutomationError> {
        self.execute_mobile("tap", json!({ "x": at.x, "y": at.y }))
    }

    fn touch_and_hold(&self, at: Point, duration: Duration) -> Result<(), AutomationError> {
        self.execute_mobile(
            "touchAndHold",
            json!({ "x": at.x, "y": at.y, "duration": duration.as_secs_f64() }),
        )
    }

    fn drag_from_to(
        &self,
        from: Point,
        to: Point,
        duration: Duration,
    ) -> Result<(), AutomationError> {
        self.execute_mobile(
            "dragFromToForDuration",
            json!({
                "fromX": from.x,
                "fromY": from.y,
                "toX": to.x,
                "toY": to.y,
                "duration": duration.as_secs_f64(),
            }),
        )
    }

    fn perform_pointer_sequence(&self, actions: &[PointerAction]) -> Result<(), AutomationError> {
        let steps: Vec<Value> = actions.iter().map(pointer_action_json).collect();
        self.post(
            "/actions",
            json!({
                "actions": [{
                    "type": "pointer",
                    "id": "finger1",
                    "parameters": { "pointerType": "touch" },
                    "actions": steps,
                }]
            }),
        )
        .map(|_| ())
    }

    fn viewport_size(&self) -> Result<Size, AutomationError> {
        let value = self.get("/window/rect")?;
        let rect: WindowRect = serde_json::from_value(value).map_err(|e| {
            AutomationError::PlatformError(format!("malformed window rect: {e}"))
        })?;
        if rect.width <= 0.0 || rect.height <= 0.0 {
            warn!(?rect, "driver reported an empty viewport");
        }
        Ok(Size::new(rect.width, rect.height))
    }
}

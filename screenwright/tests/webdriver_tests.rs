//! WebDriver adapter against a local stub server

use screenwright::{
    AutomationDriver, AutomationError, Automator, ElementId, GestureMethod, Point, PointerAction,
    Selector, WebDriverSession,
};
use serde_json::{json, Value};
use std::io::Read;
use std::sync::{Arc, Mutex};

const W3C_KEY: &str = "element-6066-11e4-a07c-4c93a2aa2a8e";

type Route = dyn Fn(&str, &str, &Value) -> (u16, Value) + Send + Sync;

/// Requests seen by the stub: method, path below the session, JSON body.
#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(String, String, Value)>>>);

impl Recorded {
    fn bodies(&self, method: &str, path: &str) -> Vec<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p, _)| m == method && p == path)
            .map(|(_, _, body)| body.clone())
            .collect()
    }
}

fn start_test_server(route: Arc<Route>) -> (String, Recorded, Arc<tiny_http::Server>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let server_arc = Arc::new(server);
    let server_clone = server_arc.clone();
    let recorded = Recorded::default();
    let log = recorded.clone();

    std::thread::spawn(move || {
        for mut request in server_clone.incoming_requests() {
            let method = request.method().as_str().to_string();
            let path = request
                .url()
                .strip_prefix("/session/s1")
                .unwrap_or(request.url())
                .to_string();
            let mut raw = String::new();
            let _ = request.as_reader().read_to_string(&mut raw);
            let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

            let (status, value) = route(&method, &path, &body);
            log.0.lock().unwrap().push((method, path, body));

            let header: tiny_http::Header = "Content-Type: application/json".parse().unwrap();
            let response = tiny_http::Response::from_string(json!({ "value": value }).to_string())
                .with_status_code(status)
                .with_header(header);
            let _ = request.respond(response);
        }
    });

    (format!("http://127.0.0.1:{port}"), recorded, server_arc)
}

fn wire_error(status: u16, code: &str, message: &str) -> (u16, Value) {
    (
        status,
        json!({ "error": code, "message": message, "stacktrace": "" }),
    )
}

/// Two "Save" buttons, one disabled, on a 390x844 screen.
fn save_screen(method: &str, path: &str, _body: &Value) -> (u16, Value) {
    match (method, path) {
        ("POST", "/elements") => (
            200,
            json!([{ W3C_KEY: "e1" }, { "ELEMENT": "e2" }]),
        ),
        ("GET", "/element/e1/attribute/type") | ("GET", "/element/e2/attribute/type") => {
            (200, json!("XCUIElementTypeButton"))
        }
        ("GET", "/element/e1/attribute/label") => (200, json!("Save")),
        ("GET", "/element/e2/attribute/label") => (200, json!("Save All")),
        ("GET", "/element/e1/attribute/enabled") => (200, json!("true")),
        ("GET", "/element/e2/attribute/enabled") => (200, json!("false")),
        ("GET", "/element/e1/attribute/visible") | ("GET", "/element/e2/attribute/visible") => {
            (200, json!("true"))
        }
        ("GET", p) if p.starts_with("/element/") && p.contains("/attribute/") => (200, Value::Null),
        ("GET", "/element/e1/rect") => (200, json!({ "x": 20, "y": 400, "width": 100, "height": 44 })),
        ("GET", "/element/e2/rect") => (200, json!({ "x": 20, "y": 500, "width": 100, "height": 44 })),
        ("GET", "/element/gone/rect") => wire_error(404, "stale element reference", "element is gone"),
        ("GET", "/window/rect") => (200, json!({ "x": 0, "y": 0, "width": 390, "height": 844 })),
        ("POST", "/execute/sync") | ("POST", "/actions") => (200, Value::Null),
        _ => wire_error(404, "unknown command", path),
    }
}

#[test]
fn query_all_builds_snapshots_from_attribute_reads() {
    let (url, recorded, _server) = start_test_server(Arc::new(save_screen));
    let session = WebDriverSession::attach(&url, "s1").unwrap();

    let found = session
        .query_all(&Selector::LabelContains("Save".into()))
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id, ElementId::new("e1"));
    assert_eq!(found[0].label.as_deref(), Some("Save"));
    assert_eq!(found[0].element_type, "XCUIElementTypeButton");
    assert_eq!(found[0].name, None);
    assert!(found[0].enabled);
    assert_eq!(found[0].visible, Some(true));
    assert_eq!(found[0].center_y(), Some(422.0));
    assert!(!found[1].enabled);

    let bodies = recorded.bodies("POST", "/elements");
    assert_eq!(
        bodies,
        vec![json!({ "using": "-ios predicate string", "value": "label CONTAINS[c] \"Save\"" })]
    );
}

#[test]
fn wire_errors_map_to_engine_errors() {
    let (url, _recorded, _server) = start_test_server(Arc::new(save_screen));
    let session = WebDriverSession::attach(&url, "s1").unwrap();

    let err = session.bounds(&ElementId::new("gone")).unwrap_err();
    assert!(matches!(err, AutomationError::StaleElement(ref m) if m.contains("element is gone")));

    let err = session.is_displayed(&ElementId::new("e1")).unwrap_err();
    assert!(matches!(err, AutomationError::PlatformError(ref m) if m.contains("unknown command")));
}

#[test]
fn invalid_session_is_a_disconnect() {
    let route: Arc<Route> =
        Arc::new(|_: &str, _: &str, _: &Value| wire_error(404, "invalid session id", "session deleted"));
    let (url, _recorded, _server) = start_test_server(route);
    let session = WebDriverSession::attach(&url, "s1").unwrap();

    let err = session.viewport_size().unwrap_err();

    assert!(matches!(err, AutomationError::DriverDisconnected(_)));
}

#[test]
fn unreachable_server_is_a_disconnect() {
    let session = WebDriverSession::attach("http://127.0.0.1:1", "s1").unwrap();

    let err = session.query_all(&Selector::Label("Save".into())).unwrap_err();

    assert!(matches!(err, AutomationError::DriverDisconnected(_)));
}

#[test]
fn empty_session_id_is_rejected() {
    assert!(matches!(
        WebDriverSession::attach("http://127.0.0.1:4723", " "),
        Err(AutomationError::InvalidArgument(_))
    ));
}

#[test]
fn gestures_use_mobile_commands_and_w3c_actions() {
    let (url, recorded, _server) = start_test_server(Arc::new(save_screen));
    let session = WebDriverSession::attach(&url, "s1").unwrap();

    session.tap(Point::new(70.0, 422.0)).unwrap();
    session
        .perform_pointer_sequence(&[
            PointerAction::Move {
                x: 70.0,
                y: 422.0,
                duration_ms: 0,
            },
            PointerAction::Down,
            PointerAction::Pause { duration_ms: 80 },
            PointerAction::Up,
        ])
        .unwrap();

    let scripts = recorded.bodies("POST", "/execute/sync");
    assert_eq!(
        scripts,
        vec![json!({ "script": "mobile: tap", "args": [{ "x": 70.0, "y": 422.0 }] })]
    );

    let actions = recorded.bodies("POST", "/actions");
    assert_eq!(actions.len(), 1);
    let finger = &actions[0]["actions"][0];
    assert_eq!(finger["parameters"]["pointerType"], "touch");
    let steps: Vec<&str> = finger["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["type"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["pointerMove", "pointerDown", "pause", "pointerUp"]);
}

#[test]
fn automator_taps_first_match_over_http() {
    let (url, recorded, _server) = start_test_server(Arc::new(save_screen));
    let session = WebDriverSession::attach(&url, "s1").unwrap();
    let automator = Automator::new(Arc::new(session));

    let result = automator.locator("contains:save").tap().unwrap();

    assert_eq!(result.method, GestureMethod::Native);
    assert_eq!(result.coordinates, Point::new(70.0, 422.0));
    let scripts = recorded.bodies("POST", "/execute/sync");
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0]["args"][0]["y"], 422.0);
    assert_eq!(recorded.bodies("GET", "/window/rect").len(), 1);
}

use crate::element::AttributeSnapshot;
use crate::errors::AutomationError;
use regex::Regex;

/// One predicate in the accessibility-tree query dialect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Label equals the text exactly
    Label(String),
    /// Label contains the text (case-insensitive)
    LabelContains(String),
    /// Label matches a regular expression
    LabelMatches(String),
    /// Select by accessibility identifier / name
    Name(String),
    /// Select by element type, optionally narrowed by a label substring
    Type {
        element_type: String,
        label: Option<String>,
    },
    /// Value contains the text (case-insensitive)
    ValueContains(String),
    /// Raw predicate string passed through to the driver untouched
    Predicate(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
            other => f.write_str(&other.to_predicate().unwrap_or_default()),
        }
    }
}

/// Expand short role names ("button", "cell") to the driver's type names.
pub fn map_generic_type(element_type: &str) -> String {
    if element_type.starts_with("XCUIElementType") {
        return element_type.to_string();
    }
    let canonical = match element_type.to_lowercase().as_str() {
        "button" => "Button",
        "cell" | "row" => "Cell",
        "text" | "statictext" | "label" => "StaticText",
        "textfield" | "input" => "TextField",
        "securetextfield" | "password" => "SecureTextField",
        "switch" | "toggle" => "Switch",
        "navigationbar" | "navbar" => "NavigationBar",
        "table" | "list" => "Table",
        "collectionview" => "CollectionView",
        "picker" => "Picker",
        "pickerwheel" => "PickerWheel",
        "menu" => "Menu",
        "menuitem" => "MenuItem",
        "alert" => "Alert",
        "sheet" => "Sheet",
        "image" => "Image",
        "other" => "Other",
        _ => return format!("XCUIElementType{element_type}"),
    };
    format!("XCUIElementType{canonical}")
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

impl Selector {
    /// Render this selector in the predicate dialect the driver executes.
    pub fn to_predicate(&self) -> Result<String, AutomationError> {
        Ok(match self {
            Selector::Label(label) => format!("label == {}", quote(label)),
            Selector::LabelContains(text) => format!("label CONTAINS[c] {}", quote(text)),
            Selector::LabelMatches(pattern) => format!("label MATCHES {}", quote(pattern)),
            Selector::Name(name) => format!("name == {}", quote(name)),
            Selector::Type {
                element_type,
                label,
            } => {
                let type_clause = format!("type == {}", quote(&map_generic_type(element_type)));
                match label {
                    Some(label) => format!("{type_clause} AND label CONTAINS[c] {}", quote(label)),
                    None => type_clause,
                }
            }
            Selector::ValueContains(text) => format!("value CONTAINS[c] {}", quote(text)),
            Selector::Predicate(raw) => raw.clone(),
            Selector::Invalid(reason) => {
                return Err(AutomationError::InvalidSelector(reason.clone()));
            }
        })
    }

    /// Evaluate this selector against a snapshot without asking the driver.
    ///
    /// Raw `Predicate` selectors are opaque to the engine and can only be
    /// executed by a driver.
    pub fn matches(&self, snapshot: &AttributeSnapshot) -> Result<bool, AutomationError> {
        Ok(match self {
            Selector::Label(label) => snapshot.label.as_deref() == Some(label.as_str()),
            Selector::LabelContains(text) => contains_ci(snapshot.label.as_deref(), text),
            Selector::LabelMatches(pattern) => {
                // MATCHES compares the whole label
                let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    AutomationError::InvalidSelector(format!("bad pattern '{pattern}': {e}"))
                })?;
                snapshot
                    .label
                    .as_deref()
                    .map(|l| re.is_match(l))
                    .unwrap_or(false)
            }
            Selector::Name(name) => snapshot.name.as_deref() == Some(name.as_str()),
            Selector::Type {
                element_type,
                label,
            } => {
                let type_ok = snapshot
                    .element_type
                    .eq_ignore_ascii_case(&map_generic_type(element_type));
                type_ok
                    && label
                        .as_deref()
                        .map(|l| contains_ci(snapshot.label.as_deref(), l))
                        .unwrap_or(true)
            }
            Selector::ValueContains(text) => contains_ci(snapshot.value.as_deref(), text),
            Selector::Predicate(raw) => {
                return Err(AutomationError::InvalidSelector(format!(
                    "raw predicate '{raw}' can only be evaluated by the driver"
                )));
            }
            Selector::Invalid(reason) => {
                return Err(AutomationError::InvalidSelector(reason.clone()));
            }
        })
    }

    /// Default diagnostic name used when a strategy is built without one.
    pub fn describe(&self) -> String {
        match self {
            Selector::Label(l) => format!("label=='{l}'"),
            Selector::LabelContains(t) => format!("label~'{t}'"),
            Selector::LabelMatches(p) => format!("label=~/{p}/"),
            Selector::Name(n) => format!("name=='{n}'"),
            Selector::Type {
                element_type,
                label: Some(label),
            } => format!("{element_type}|{label}"),
            Selector::Type {
                element_type,
                label: None,
            } => format!("type:{element_type}"),
            Selector::ValueContains(t) => format!("value~'{t}'"),
            Selector::Predicate(raw) => format!("predicate:{raw}"),
            Selector::Invalid(reason) => format!("invalid:{reason}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // type|label is the preferred precise format
        if let Some((type_part, label_part)) = s.split_once('|') {
            let element_type = type_part.trim();
            let element_type = element_type
                .strip_prefix("type:")
                .unwrap_or(element_type)
                .trim();
            let label = label_part.trim();
            let label = label.strip_prefix("label:").unwrap_or(label).trim();
            if element_type.is_empty() {
                return Selector::Invalid(format!("Missing element type in '{s}'"));
            }
            return Selector::Type {
                element_type: element_type.to_string(),
                label: (!label.is_empty()).then(|| label.to_string()),
            };
        }

        let lower = s.to_lowercase();
        match lower.as_str() {
            _ if lower.starts_with("label:") => Selector::Label(s[6..].to_string()),
            _ if lower.starts_with("contains:") => Selector::LabelContains(s[9..].to_string()),
            _ if lower.starts_with("matches:") => {
                let pattern = &s[8..];
                match Regex::new(pattern) {
                    Ok(_) => Selector::LabelMatches(pattern.to_string()),
                    Err(e) => Selector::Invalid(format!("Invalid pattern '{pattern}': {e}")),
                }
            }
            _ if lower.starts_with("name:") => Selector::Name(s[5..].to_string()),
            _ if lower.starts_with("id:") => Selector::Name(s[3..].to_string()),
            _ if lower.starts_with("type:") => Selector::Type {
                element_type: s[5..].trim().to_string(),
                label: None,
            },
            _ if lower.starts_with("value:") => Selector::ValueContains(s[6..].to_string()),
            _ if lower.starts_with("predicate:") => Selector::Predicate(s[10..].to_string()),
            "button" | "cell" | "row" | "text" | "textfield" | "switch" | "navigationbar"
            | "table" | "picker" | "pickerwheel" | "menuitem" | "alert" | "sheet" => {
                Selector::Type {
                    element_type: s.to_string(),
                    label: None,
                }
            }
            _ if s.starts_with('#') => Selector::Name(s[1..].to_string()),
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes like 'label:', 'contains:', 'matches:', 'name:', 'type:', 'value:' or 'predicate:', or the 'type|label' form."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

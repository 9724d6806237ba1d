use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Property keys recognized on inbound alert events. Events are free-form
/// bags; these are the fields the store itself interprets.
pub const KEY_LEVEL: &str = "alertLevel";
pub const KEY_ATTRIBUTE: &str = "alertAttribute";
pub const KEY_PATTERN: &str = "alertPattern";
pub const KEY_BACK_TO_NORMAL: &str = "alertBackToNormal";
pub const KEY_UUID: &str = "alertUUID";
pub const KEY_RULE: &str = "alertRule";

/// Alert severity level.
///
/// # Examples
///
/// ```
/// use vigil_common::types::AlertLevel;
///
/// let level: AlertLevel = "error".parse().unwrap();
/// assert_eq!(level, AlertLevel::Error);
/// assert_eq!(level.to_string(), "error");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warn,
    Error,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Warn => write!(f, "warn"),
            AlertLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(AlertLevel::Warn),
            "error" => Ok(AlertLevel::Error),
            _ => Err(format!("unknown alert level: {s}")),
        }
    }
}

/// One tracked alerting condition instance.
///
/// Alerts are created, mutated, and destroyed exclusively by the alert
/// table; they have no identity outside it. The typed fields cover what
/// the store interprets; `properties` keeps the full original event bag
/// for query and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub uuid: String,
    pub level: AlertLevel,
    pub attribute: String,
    pub pattern: String,
    pub back_to_normal: bool,
    #[serde(default)]
    pub rule_name: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl Alert {
    /// Dedup key: two alerts sharing this triple represent the same
    /// logical condition.
    pub fn dedup_key(&self) -> (String, String, AlertLevel) {
        (self.attribute.clone(), self.pattern.clone(), self.level)
    }

    /// Resolve a property by event key, consulting the typed fields first
    /// and the side map second. Values are coerced to their string form.
    pub fn property(&self, key: &str) -> Option<String> {
        match key {
            KEY_UUID | "uuid" => Some(self.uuid.clone()),
            KEY_LEVEL => Some(self.level.to_string()),
            KEY_ATTRIBUTE => Some(self.attribute.clone()),
            KEY_PATTERN => Some(self.pattern.clone()),
            KEY_BACK_TO_NORMAL => Some(self.back_to_normal.to_string()),
            KEY_RULE => self.rule_name.clone(),
            _ => self.properties.get(key).map(value_to_string),
        }
    }
}

/// Coerce a JSON value to the string form used for query matching.
/// Strings render unquoted; everything else uses its JSON rendering.
///
/// # Examples
///
/// ```
/// use vigil_common::types::value_to_string;
/// use serde_json::json;
///
/// assert_eq!(value_to_string(&json!("cpu.usage")), "cpu.usage");
/// assert_eq!(value_to_string(&json!(42)), "42");
/// assert_eq!(value_to_string(&json!(true)), "true");
/// ```
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validated view over an inbound alert event bag.
#[derive(Debug, Clone)]
pub struct AlertFields {
    pub level: AlertLevel,
    pub attribute: String,
    pub pattern: String,
    pub back_to_normal: bool,
    pub properties: HashMap<String, Value>,
}

impl AlertFields {
    /// Extract and validate the alert fields from an event property bag.
    /// Returns the name of the first missing or unparseable required key.
    pub fn from_properties(bag: &HashMap<String, Value>) -> Result<Self, &'static str> {
        let level = bag
            .get(KEY_LEVEL)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<AlertLevel>().ok())
            .ok_or(KEY_LEVEL)?;
        let attribute = bag
            .get(KEY_ATTRIBUTE)
            .and_then(|v| v.as_str())
            .ok_or(KEY_ATTRIBUTE)?
            .to_string();
        let pattern = bag
            .get(KEY_PATTERN)
            .and_then(|v| v.as_str())
            .ok_or(KEY_PATTERN)?
            .to_string();
        // Absent or unrecognized means an active firing, not a recovery.
        let back_to_normal = bag
            .get(KEY_BACK_TO_NORMAL)
            .map(|v| match v {
                Value::Bool(b) => *b,
                Value::String(s) => s == "true",
                _ => false,
            })
            .unwrap_or(false);

        Ok(Self {
            level,
            attribute,
            pattern,
            back_to_normal,
            properties: bag.clone(),
        })
    }
}

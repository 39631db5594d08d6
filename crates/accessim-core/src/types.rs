/*!
 * Core data types for accessim.
 *
 * This module defines the identifiers, parameter values and protocol enums
 * shared by every accessim crate.
 */
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a simulated accessory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self::from_string(uuid.to_string())
    }
}

/// A loosely-typed value carried in command parameters and results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values
    Object(HashMap<String, Value>),
    /// Timestamp
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get an object value
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a field of an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Try to get a timestamp value
    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Build an object value from key/value pairs
    pub fn object<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        i64::try_from(i).map_or(Value::Float(i as f64), Value::Integer)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::from(i as u64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(o: HashMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A key-value map of metadata or state fields
pub type Metadata = HashMap<String, Value>;

/// Command parameters as received from a caller
pub type Params = HashMap<String, Value>;

/// Build a [`Params`] map from `key => value` pairs
///
/// ```
/// use accessim_core::params;
///
/// let params = params! { "left" => 30, "right" => 200 };
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::types::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::types::Params::new();
        $(params.insert(::std::string::String::from($key), $crate::types::Value::from($value));)+
        params
    }};
}

/// Physical link an accessory uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// USB link
    Usb,
    /// Bluetooth link
    Bluetooth,
}

impl ConnectionType {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Usb => "usb",
            ConnectionType::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Usb => write!(f, "USB"),
            ConnectionType::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// Accessory protocol version
///
/// Versions are ordered: a device speaking `V2` also understands `V1`.
/// Human-interface-device style commands exist only from `V2` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// First protocol revision
    #[serde(rename = "aoav1", alias = "v1")]
    V1,
    /// Second revision, adds HID and audio support
    #[serde(rename = "aoav2", alias = "v2")]
    V2,
}

impl ProtocolVersion {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "aoav1",
            ProtocolVersion::V2 => "aoav2",
        }
    }

    /// Whether a device at this version can speak `other`
    pub fn supports(&self, other: ProtocolVersion) -> bool {
        other <= *self
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "AOAv1"),
            ProtocolVersion::V2 => write!(f, "AOAv2"),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aoav1" | "v1" | "1" => Ok(ProtocolVersion::V1),
            "aoav2" | "v2" | "2" => Ok(ProtocolVersion::V2),
            other => Err(format!("unknown protocol version: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = Id::new();
        assert!(!id.as_str().is_empty());

        let id = Id::from_string("test-id");
        assert_eq!(id.as_str(), "test-id");

        let id: Id = "another-id".into();
        assert_eq!(id.as_str(), "another-id");
        assert_eq!(format!("{}", id), "another-id");
    }

    #[test]
    fn test_value_as_methods() {
        let v = Value::Integer(42);
        assert_eq!(v.as_integer(), Some(42));
        assert_eq!(v.as_float(), Some(42.0));

        let v = Value::Float(3.0);
        assert_eq!(v.as_integer(), Some(3));

        let v = Value::Float(3.14);
        assert_eq!(v.as_integer(), None);
        assert_eq!(v.type_name(), "float");

        let v = Value::String("hello".to_string());
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_bool(), None);
    }

    #[test]
    fn test_value_object() {
        let v = Value::object([("brightness", Value::from(75u8)), ("power", true.into())]);
        assert_eq!(v.get("brightness"), Some(&Value::Integer(75)));
        assert_eq!(v.get("power").and_then(Value::as_bool), Some(true));
        assert!(v.get("color").is_none());
    }

    #[test]
    fn test_value_from_json() {
        let json = serde_json::json!({ "x": 1, "y": 0.5, "tags": ["a"], "on": false });
        let v = Value::from(json);
        assert_eq!(v.get("x"), Some(&Value::Integer(1)));
        assert_eq!(v.get("y"), Some(&Value::Float(0.5)));
        assert_eq!(v.get("on"), Some(&Value::Bool(false)));
        assert_eq!(v.get("tags").and_then(Value::as_array).map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_params_macro() {
        let params = crate::params! { "value" => 75, "color" => "#FF0000" };
        assert_eq!(params.get("value"), Some(&Value::Integer(75)));
        assert_eq!(params.get("color").and_then(Value::as_str), Some("#FF0000"));
        assert!(crate::params!().is_empty());
    }

    #[test]
    fn test_protocol_version_ordering() {
        assert!(ProtocolVersion::V2 > ProtocolVersion::V1);
        assert!(ProtocolVersion::V2.supports(ProtocolVersion::V1));
        assert!(!ProtocolVersion::V1.supports(ProtocolVersion::V2));
    }

    #[test]
    fn test_protocol_version_parsing() {
        assert_eq!("AOAv2".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V2));
        assert_eq!("v1".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V1));
        assert!("v3".parse::<ProtocolVersion>().is_err());

        let json = serde_json::to_string(&ProtocolVersion::V1).unwrap();
        assert_eq!(json, "\"aoav1\"");
        let parsed: ProtocolVersion = serde_json::from_str("\"v2\"").unwrap();
        assert_eq!(parsed, ProtocolVersion::V2);
    }

    #[test]
    fn test_connection_type_display() {
        assert_eq!(ConnectionType::Usb.to_string(), "USB");
        assert_eq!(ConnectionType::Bluetooth.as_str(), "bluetooth");
    }
}

//! Remote directory records and dotted field paths
//!
//! The identity API returns users and groups as loosely structured JSON.
//! Fields are addressed with dotted paths of at most two segments
//! (`id`, `profile.email`). Deeper nesting is not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Error raised when a dotted path cannot be used to address a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,
    #[error("field path {0:?} has an empty segment")]
    EmptySegment(String),
    #[error("field path {0:?} is nested more than two levels deep")]
    TooDeep(String),
}

/// A validated dotted path of depth 1 or 2
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPath {
    /// A top-level key, e.g. `id`
    Top(String),
    /// A key inside a nested object, e.g. `profile.email`
    Nested(String, String),
}

impl FieldPath {
    /// Parse a dotted path, rejecting empty segments and depth > 2
    pub fn parse(path: &str) -> Result<Self, FieldPathError> {
        if path.is_empty() {
            return Err(FieldPathError::Empty);
        }

        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(FieldPathError::EmptySegment(path.to_string()));
        }

        match segments.as_slice() {
            [key] => Ok(Self::Top((*key).to_string())),
            [outer, inner] => Ok(Self::Nested((*outer).to_string(), (*inner).to_string())),
            _ => Err(FieldPathError::TooDeep(path.to_string())),
        }
    }
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top(key) => write!(f, "{key}"),
            Self::Nested(outer, inner) => write!(f, "{outer}.{inner}"),
        }
    }
}

impl TryFrom<String> for FieldPath {
    type Error = FieldPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl Serialize for FieldPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One user or group as returned by the identity API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(Value);

impl RemoteRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Resolve a field path to its string representation.
    ///
    /// Returns `None` when any segment is missing, the value is null, or the
    /// value at the path is itself an object or array. A nested array is
    /// viewed as an object keyed by index, so `emails.0` addresses its first
    /// element.
    pub fn resolve(&self, path: &FieldPath) -> Option<String> {
        match path {
            FieldPath::Top(key) => self.0.get(key).and_then(scalar_to_string),
            FieldPath::Nested(outer, inner) => {
                let nested = self.0.get(outer)?;
                let value = match nested {
                    Value::Object(map) => map.get(inner),
                    Value::Array(items) => inner.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                }?;
                scalar_to_string(value)
            }
        }
    }

    /// The remote `id` of this record, if present
    pub fn id(&self) -> Option<String> {
        self.resolve(&FieldPath::Top("id".to_string()))
            .filter(|id| !id.is_empty())
    }
}

impl From<Value> for RemoteRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}

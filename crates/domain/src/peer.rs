use peerwarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Connected peer as reported by the node, kept as an open attribute map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Peer(Map<String, Value>);

impl Peer {
    /// Creates a peer from one JSON object.
    pub fn from_value(value: Value) -> AppResult<Self> {
        match value {
            Value::Object(attributes) => Ok(Self(attributes)),
            other => Err(AppError::Validation(format!(
                "peer entry must be a JSON object, got {other}"
            ))),
        }
    }

    /// Resolves a dot-separated attribute path such as `geolocation.country`.
    #[must_use]
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next().filter(|segment| !segment.is_empty())?;
        let mut current = self.0.get(first)?;

        for segment in segments {
            if segment.is_empty() {
                return None;
            }

            current = current.as_object()?.get(segment)?;
        }

        Some(current)
    }

    /// Returns the node-assigned peer identifier.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::Number(number) => Some(number.to_string()),
            Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
            _ => None,
        }
    }

    /// Returns the peer network address.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.0
            .get("addr")
            .and_then(Value::as_str)
            .filter(|address| !address.trim().is_empty())
    }

    /// Returns a point-in-time copy of the peer attributes.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

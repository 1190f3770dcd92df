//! Per-pass result aggregation.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::ResponseError;

/// Outcome of one handler that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// The handler returned a JSON object.
    Structured(Map<String, Value>),
    /// The handler returned nothing usable as a mapping.
    Empty,
}

impl DispatchResult {
    /// Classifies a returned value: objects are structured, anything else is
    /// empty.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Structured(map),
            _ => Self::Empty,
        }
    }

    /// The structured mapping, if any.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured(map) => Some(map),
            Self::Empty => None,
        }
    }
}

impl Serialize for DispatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Structured(map) => map.serialize(serializer),
            Self::Empty => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Entry {
    name: String,
    response: DispatchResult,
}

/// Ordered, append-only record of results for one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResponseLog {
    entries: Vec<Entry>,
}

impl ResponseLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the result of `name`.
    pub fn record(&mut self, name: impl Into<String>, result: DispatchResult) {
        self.entries.push(Entry {
            name: name.into(),
            response: result,
        });
    }

    /// Most recently recorded result.
    #[must_use]
    pub fn last(&self) -> Option<&DispatchResult> {
        self.entries.last().map(|entry| &entry.response)
    }

    /// Most recent result recorded by `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::NotFound`] when `name` recorded nothing.
    pub fn last_for(&self, name: &str) -> Result<&DispatchResult, ResponseError> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.response)
            .ok_or_else(|| ResponseError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Entries in recording order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DispatchResult)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), &entry.response))
    }

    /// Number of recorded results.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

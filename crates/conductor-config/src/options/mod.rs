//! Free-form option tree shared with every handler invocation.
//!
//! Options start from the document's `options` mapping and are then
//! overlaid with `-o key=value` overrides. Dotted keys address nested
//! mappings, and merging is recursive: mappings merge key by key while any
//! other value is replaced outright.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Nested option mapping handed to handlers as part of the run context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    /// Creates an empty option tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from the document's `options` value.
    ///
    /// `null` is treated as an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSection`] when the value is not a mapping.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(ConfigError::InvalidSection {
                key: "options",
                message: format!("expected a mapping, found {}", value_kind(&other)),
            }),
        }
    }

    /// Parses a list of `key=value` overrides into an option tree.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for the first malformed entry.
    pub fn from_overrides<I, S>(overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::new();
        for text in overrides {
            options.apply_override(text.as_ref())?;
        }
        Ok(options)
    }

    /// Applies one `key=value` override in place.
    ///
    /// The value is read as a YAML flow value so `3`, `true`, or `[a, b]`
    /// arrive typed; anything that does not parse is kept as a string. A key
    /// with no `=` is set to `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] when the key is empty or has an
    /// empty dotted segment.
    pub fn apply_override(&mut self, text: &str) -> Result<(), ConfigError> {
        let (key, value) = match text.split_once('=') {
            Some((key, raw)) => (key, parse_override_value(raw)),
            None => (text, Value::Bool(true)),
        };
        let segments: Vec<&str> = key.trim().split('.').collect();
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(ConfigError::InvalidOption {
                option: text.to_owned(),
                message: String::from("option keys must not contain empty segments"),
            });
        }
        insert_path(&mut self.0, &segments, value);
        Ok(())
    }

    /// Deep-merges `other` over `self`.
    pub fn merge(&mut self, other: Self) {
        merge_maps(&mut self.0, other.0);
    }

    /// Looks up a dotted key.
    #[must_use]
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let mut segments = dotted.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns the underlying mapping.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns `true` when no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_override_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_saphyr::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut target = map;
    for segment in parents {
        let entry = target
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        target = next;
    }
    target.insert((*last).to_owned(), value);
}

fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            (_, incoming) => {
                base.insert(key, incoming);
            }
        }
    }
}

pub(crate) const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

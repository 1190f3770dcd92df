//! Wire types for the handler unit protocol.
//!
//! The protocol is a single-line JSON exchange over stdio. The engine writes
//! one [`UnitRequest`] line to the unit's stdin and closes it. The unit may
//! print freely while it runs; its final non-empty stdout line is the
//! response, either a [`UnitDescription`] or an [`InvokeOutcome`].

use std::collections::{BTreeMap, BTreeSet};

use conductor_config::ConditionSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RunContext;

/// Request written to a unit's stdin.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitRequest<'a> {
    /// Ask the unit which functions and conditions it exposes.
    Describe,
    /// Call one function with the run context.
    Invoke {
        /// Function to call.
        function: &'a str,
        /// Read-only facts about the run.
        context: &'a RunContext<'a>,
    },
}

/// Functions and per-event conditions a unit exposes.
///
/// # Example
///
/// ```
/// use conductor_handlers::protocol::UnitDescription;
///
/// let description: UnitDescription =
///     serde_json::from_str(r#"{"functions":["handle_push"]}"#).unwrap();
/// assert!(description.has_function("handle_push"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescription {
    #[serde(default)]
    functions: BTreeSet<String>,
    #[serde(default)]
    conditions: BTreeMap<String, ConditionSpec>,
}

impl UnitDescription {
    /// Creates a description exposing `functions` and no conditions.
    #[must_use]
    pub fn new<I, S>(functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            functions: functions.into_iter().map(Into::into).collect(),
            conditions: BTreeMap::new(),
        }
    }

    /// Declares the unit's own condition for `event`.
    #[must_use]
    pub fn with_condition(mut self, event: impl Into<String>, spec: ConditionSpec) -> Self {
        self.conditions.insert(event.into(), spec);
        self
    }

    /// Returns `true` when the unit exposes `function`.
    #[must_use]
    pub fn has_function(&self, function: &str) -> bool {
        self.functions.contains(function)
    }

    /// The unit's own condition for `event`, if declared.
    #[must_use]
    pub fn condition_for(&self, event: &str) -> Option<&ConditionSpec> {
        self.conditions.get(event)
    }
}

/// Result of invoking one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvokeOutcome {
    /// The function completed; `result` is recorded in the response log.
    Ok {
        /// Returned value; only JSON objects are kept as structured results.
        #[serde(default)]
        result: Value,
    },
    /// The function failed; the pass stops.
    Failure {
        /// Failure description.
        #[serde(default)]
        message: String,
    },
    /// The function cancelled the run; the pass stops.
    Cancel {
        /// Cancellation reason.
        #[serde(default)]
        message: String,
    },
}

impl InvokeOutcome {
    /// Successful outcome carrying `result`.
    #[must_use]
    pub const fn ok(result: Value) -> Self {
        Self::Ok { result }
    }

    /// Failed outcome with `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Cancelling outcome with `message`.
    #[must_use]
    pub fn cancel(message: impl Into<String>) -> Self {
        Self::Cancel {
            message: message.into(),
        }
    }
}

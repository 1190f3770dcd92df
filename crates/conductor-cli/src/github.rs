//! Event facts from the GitHub Actions environment.
//!
//! Inside Actions the event comes from `GITHUB_*` variables and the JSON
//! payload at `GITHUB_EVENT_PATH`. Outside Actions (or with `--local`) only
//! the event name given on the command line is known.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use conductor_handlers::EventFacts;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const GITHUB_TARGET: &str = "conductor_cli::github";

const PULL_REQUEST_COMMENT: &str = "pull_request_comment";

/// Read access to environment variables.
pub(crate) trait Environment {
    /// Value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Errors raised while reading the CI environment.
#[derive(Debug, Clone, Error)]
pub(crate) enum EnvironmentError {
    /// `GITHUB_EVENT_NAME` is not set.
    #[error("GITHUB_EVENT_NAME is not set; pass --local to run outside GitHub Actions")]
    MissingEventName,
    /// The payload file could not be read.
    #[error("failed to read event payload {}: {source}", path.display())]
    ReadPayload {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    /// The payload file is not valid JSON.
    #[error("failed to parse event payload {}: {message}", path.display())]
    ParsePayload { path: PathBuf, message: String },
}

/// Returns `true` when running inside GitHub Actions.
pub(crate) fn is_ci(env: &impl Environment) -> bool {
    let flag = |key: &str| env.var(key).is_some_and(|value| value == "true");
    flag("GITHUB_ACTIONS") && flag("CI")
}

/// Facts for a local run of `event`.
pub(crate) fn local_facts(event: &str) -> EventFacts {
    EventFacts::new(event)
}

/// Reads the event facts published by GitHub Actions.
pub(crate) fn facts_from_env(env: &impl Environment) -> Result<EventFacts, EnvironmentError> {
    let declared = env
        .var("GITHUB_EVENT_NAME")
        .filter(|name| !name.is_empty())
        .ok_or(EnvironmentError::MissingEventName)?;
    let payload = env
        .var("GITHUB_EVENT_PATH")
        .filter(|path| !path.is_empty())
        .map_or(Ok(Value::Null), |path| read_payload(PathBuf::from(path)))?;

    let name = classify(&declared, &payload);
    let mut facts = EventFacts::new(name);
    facts.repository = env.var("GITHUB_REPOSITORY");
    facts.sha = env.var("GITHUB_SHA");
    facts.git_ref = env.var("GITHUB_REF");
    facts.base_ref = env.var("GITHUB_BASE_REF").filter(|base| !base.is_empty());
    facts.actor = env.var("GITHUB_ACTOR");
    facts.workflow = env.var("GITHUB_WORKFLOW");
    facts.job = env.var("GITHUB_JOB");
    facts.run_id = env.var("GITHUB_RUN_ID");
    facts.run_number = env.var("GITHUB_RUN_NUMBER");
    facts.issue_number = issue_number(&payload);
    facts.changed_paths = changed_paths(&payload);
    facts.payload = payload;
    debug!(
        target: GITHUB_TARGET,
        event = %facts.name,
        git_ref = facts.git_ref.as_deref().unwrap_or_default(),
        changed = facts.changed_paths.len(),
        "read GitHub Actions event"
    );
    Ok(facts)
}

fn read_payload(path: PathBuf) -> Result<Value, EnvironmentError> {
    let text = fs::read_to_string(&path).map_err(|err| EnvironmentError::ReadPayload {
        path: path.clone(),
        source: Arc::new(err),
    })?;
    serde_json::from_str(&text).map_err(|err| EnvironmentError::ParsePayload {
        path,
        message: err.to_string(),
    })
}

/// Comments on pull requests arrive as `issue_comment`; they are dispatched
/// as `pull_request_comment`.
fn classify(declared: &str, payload: &Value) -> String {
    if declared == "issue_comment" && payload.pointer("/issue/pull_request").is_some() {
        return String::from(PULL_REQUEST_COMMENT);
    }
    declared.to_owned()
}

fn issue_number(payload: &Value) -> Option<u64> {
    payload
        .pointer("/issue/number")
        .or_else(|| payload.pointer("/pull_request/number"))
        .and_then(Value::as_u64)
}

fn changed_paths(payload: &Value) -> Vec<String> {
    let Some(commits) = payload.get("commits").and_then(Value::as_array) else {
        return Vec::new();
    };
    let paths: BTreeSet<&str> = commits
        .iter()
        .flat_map(|commit| {
            ["added", "modified", "removed"]
                .into_iter()
                .filter_map(move |key| commit.get(key).and_then(Value::as_array))
                .flatten()
        })
        .filter_map(Value::as_str)
        .collect();
    paths.into_iter().map(str::to_owned).collect()
}

//! Read-only facts handed to every handler invocation.
//!
//! [`EventFacts`] describes the triggering event and is filled in by the
//! caller (the CLI reads it from the CI environment). [`RunContext`] is the
//! per-invocation view serialised into the `invoke` request: the facts, the
//! merged options, the response log so far, and the handler's own identity.

use std::path::{Path, PathBuf};

use conductor_config::Options;
use serde::Serialize;
use serde_json::Value;

use crate::response::ResponseLog;

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";
const PULL_PREFIX: &str = "refs/pull/";

/// Facts about the event being dispatched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventFacts {
    /// Event name, e.g. `push` or `pull_request`.
    pub name: String,
    /// Repository in `owner/name` form.
    pub repository: Option<String>,
    /// Commit SHA that triggered the run.
    pub sha: Option<String>,
    /// Fully qualified git ref, e.g. `refs/heads/main`.
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    /// Target branch of a pull request.
    pub base_ref: Option<String>,
    /// Account that triggered the run.
    pub actor: Option<String>,
    /// Workflow name.
    pub workflow: Option<String>,
    /// Job identifier.
    pub job: Option<String>,
    /// Run identifier.
    pub run_id: Option<String>,
    /// Run number.
    pub run_number: Option<String>,
    /// Issue or pull request number, when the event has one.
    pub issue_number: Option<u64>,
    /// Paths touched by the event's commits.
    pub changed_paths: Vec<String>,
    /// Raw event payload.
    pub payload: Value,
}

impl EventFacts {
    /// Facts for `name` with every other field empty.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the git ref.
    #[must_use]
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// Sets the pull request base branch.
    #[must_use]
    pub fn with_base_ref(mut self, base_ref: impl Into<String>) -> Self {
        self.base_ref = Some(base_ref.into());
        self
    }

    /// Sets the changed paths.
    #[must_use]
    pub fn with_changed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Branch the event applies to.
    ///
    /// For branch refs this is the branch itself; for pull request refs it is
    /// the base branch.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        let git_ref = self.git_ref.as_deref()?;
        if let Some(branch) = git_ref.strip_prefix(BRANCH_PREFIX) {
            return Some(branch);
        }
        if git_ref.starts_with(PULL_PREFIX) {
            return self
                .base_ref
                .as_deref()
                .map(|base| base.strip_prefix(BRANCH_PREFIX).unwrap_or(base));
        }
        None
    }

    /// Tag the event applies to.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.git_ref.as_deref()?.strip_prefix(TAG_PREFIX)
    }
}

#[derive(Debug, Serialize)]
struct EventView<'a> {
    #[serde(flatten)]
    facts: &'a EventFacts,
    branch: Option<&'a str>,
    tag: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct HandlerView<'a> {
    name: &'a str,
    root: &'a Path,
}

/// Everything a handler sees about the run, borrowed for one invocation.
#[derive(Debug, Serialize)]
pub struct RunContext<'a> {
    handler: HandlerView<'a>,
    event: EventView<'a>,
    options: &'a Options,
    responses: &'a ResponseLog,
    workdir: &'a Path,
    local: bool,
}

impl<'a> RunContext<'a> {
    /// Builds the context for invoking `handler`.
    #[must_use]
    pub fn new(
        name: &'a str,
        root: &'a Path,
        run: &'a RunSettings,
        responses: &'a ResponseLog,
    ) -> Self {
        Self {
            handler: HandlerView { name, root },
            event: EventView {
                facts: &run.facts,
                branch: run.facts.branch(),
                tag: run.facts.tag(),
            },
            options: &run.options,
            responses,
            workdir: &run.workdir,
            local: run.local,
        }
    }

    /// Name of the handler being invoked.
    #[must_use]
    pub const fn handler_name(&self) -> &str {
        self.handler.name
    }

    /// Event being dispatched.
    #[must_use]
    pub const fn event(&self) -> &EventFacts {
        self.event.facts
    }

    /// Results recorded before this invocation.
    #[must_use]
    pub const fn responses(&self) -> &ResponseLog {
        self.responses
    }

    /// Merged options.
    #[must_use]
    pub const fn options(&self) -> &Options {
        self.options
    }
}

/// Run-wide inputs shared by every invocation of one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Facts about the event.
    pub facts: EventFacts,
    /// Document options merged with command-line overrides.
    pub options: Options,
    /// Working directory handlers run in.
    pub workdir: PathBuf,
    /// Whether the run happens outside CI.
    pub local: bool,
}

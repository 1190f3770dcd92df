//! Declarative per-event gate attached to a handler.
//!
//! A [`ConditionSpec`] is pure data: glob include/exclude lists over the
//! branch, tag, and changed-path axes of an event. Evaluation against the
//! live event lives in `conductor-handlers`.

use serde::{Deserialize, Serialize};

/// Include/exclude glob lists for one handler and one event.
///
/// The same shape is accepted in the configuration document (under an
/// entry's `conditions` mapping) and in a handler unit's `describe`
/// response.
///
/// # Example
///
/// ```
/// use conductor_config::ConditionSpec;
///
/// let spec = ConditionSpec::default().with_branches(vec!["main".into()]);
/// assert_eq!(spec.branches(), ["main"]);
/// assert!(!spec.is_unconditional());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConditionSpec {
    #[serde(default)]
    branches: Vec<String>,
    #[serde(default)]
    branches_ignore: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    tags_ignore: Vec<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    paths_ignore: Vec<String>,
}

impl ConditionSpec {
    /// Sets the branch include patterns.
    #[must_use]
    pub fn with_branches(mut self, patterns: Vec<String>) -> Self {
        self.branches = patterns;
        self
    }

    /// Sets the branch exclude patterns.
    #[must_use]
    pub fn with_branches_ignore(mut self, patterns: Vec<String>) -> Self {
        self.branches_ignore = patterns;
        self
    }

    /// Sets the tag include patterns.
    #[must_use]
    pub fn with_tags(mut self, patterns: Vec<String>) -> Self {
        self.tags = patterns;
        self
    }

    /// Sets the tag exclude patterns.
    #[must_use]
    pub fn with_tags_ignore(mut self, patterns: Vec<String>) -> Self {
        self.tags_ignore = patterns;
        self
    }

    /// Sets the changed-path include patterns.
    #[must_use]
    pub fn with_paths(mut self, patterns: Vec<String>) -> Self {
        self.paths = patterns;
        self
    }

    /// Sets the changed-path exclude patterns.
    #[must_use]
    pub fn with_paths_ignore(mut self, patterns: Vec<String>) -> Self {
        self.paths_ignore = patterns;
        self
    }

    /// Branch include patterns.
    #[must_use]
    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// Branch exclude patterns.
    #[must_use]
    pub fn branches_ignore(&self) -> &[String] {
        &self.branches_ignore
    }

    /// Tag include patterns.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Tag exclude patterns.
    #[must_use]
    pub fn tags_ignore(&self) -> &[String] {
        &self.tags_ignore
    }

    /// Changed-path include patterns.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Changed-path exclude patterns.
    #[must_use]
    pub fn paths_ignore(&self) -> &[String] {
        &self.paths_ignore
    }

    /// Returns `true` when no list is populated, so every event passes.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.branches.is_empty()
            && self.branches_ignore.is_empty()
            && self.tags.is_empty()
            && self.tags_ignore.is_empty()
            && self.paths.is_empty()
            && self.paths_ignore.is_empty()
    }
}

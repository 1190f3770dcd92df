//! Remote git source declaration.

use std::path::PathBuf;

use serde::Deserialize;

use super::expand_home;

fn default_username() -> String {
    String::from("git")
}

/// A handler fetched from one revision of a remote git repository.
///
/// Credentials are only hints: `key_file` selects an SSH deploy key and
/// `password_env` names an environment variable holding an HTTP password or
/// token. Their compatibility with the origin is checked at acquisition time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSpec {
    #[serde(alias = "origin")]
    url: String,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default, rename = "path", alias = "subpath")]
    subpath: Option<String>,
    #[serde(default)]
    key_file: Option<String>,
    #[serde(default)]
    password_env: Option<String>,
    #[serde(default = "default_username")]
    username: String,
}

impl RemoteSpec {
    /// Declares a remote source tracking the origin's default branch.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: None,
            subpath: None,
            key_file: None,
            password_env: None,
            username: default_username(),
        }
    }

    /// Pins the revision (branch, tag, or commit) to fetch.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Narrows the handler to a subdirectory of the fetched tree.
    #[must_use]
    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    /// Uses an SSH private key when fetching.
    #[must_use]
    pub fn with_key_file(mut self, key_file: impl Into<String>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    /// Reads an HTTP password from the named environment variable.
    #[must_use]
    pub fn with_password_env(mut self, variable: impl Into<String>) -> Self {
        self.password_env = Some(variable.into());
        self
    }

    /// Overrides the user name sent alongside `password_env`.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Origin URL as declared.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Declared revision, if pinned.
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Subdirectory of the fetched tree holding the handler.
    #[must_use]
    pub fn subpath(&self) -> Option<&str> {
        self.subpath.as_deref()
    }

    /// SSH key path with a leading `~/` expanded.
    #[must_use]
    pub fn key_file(&self) -> Option<PathBuf> {
        self.key_file.as_deref().map(expand_home)
    }

    /// Environment variable holding the HTTP password.
    #[must_use]
    pub fn password_env(&self) -> Option<&str> {
        self.password_env.as_deref()
    }

    /// User name for password authentication.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns `true` when the origin uses HTTP or HTTPS.
    #[must_use]
    pub fn is_http(&self) -> bool {
        let lower = self.url.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

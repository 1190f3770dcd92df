//! Package manifest for directory handlers.
//!
//! A directory handler may carry a `handler.toml` describing how to start it:
//!
//! ```toml
//! entrypoint = "main.py"
//! interpreter = "python3"
//! args = ["--quiet"]
//! ```
//!
//! Without a manifest the package's `handler` file is executed directly.

use std::fs;
use std::io;
use std::path::{Component, Path};

use serde::Deserialize;

use crate::error::StageError;

/// File name of the optional package manifest.
pub const MANIFEST_FILE: &str = "handler.toml";

/// Entrypoint used when a package has no manifest or omits the field.
pub const DEFAULT_ENTRYPOINT: &str = "handler";

fn default_entrypoint() -> String {
    String::from(DEFAULT_ENTRYPOINT)
}

/// Launch description of a directory handler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitManifest {
    #[serde(default = "default_entrypoint")]
    entrypoint: String,
    #[serde(default)]
    interpreter: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

impl Default for UnitManifest {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint(),
            interpreter: None,
            args: Vec::new(),
        }
    }
}

impl UnitManifest {
    /// Reads `handler.toml` from `package`, falling back to the defaults when
    /// the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Manifest`] when the file cannot be read, is not
    /// valid TOML, or names an entrypoint outside the package.
    pub fn load(name: &str, package: &Path) -> Result<Self, StageError> {
        let path = package.join(MANIFEST_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(manifest_error(name, format!("{}: {err}", path.display()))),
        };
        let manifest: Self =
            toml::from_str(&text).map_err(|err| manifest_error(name, err.to_string()))?;
        manifest.validate(name)?;
        Ok(manifest)
    }

    fn validate(&self, name: &str) -> Result<(), StageError> {
        let entrypoint = Path::new(&self.entrypoint);
        if self.entrypoint.trim().is_empty() {
            return Err(manifest_error(name, String::from("entrypoint must not be empty")));
        }
        let inside = entrypoint
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !inside {
            return Err(manifest_error(
                name,
                format!(
                    "entrypoint '{}' must be a relative path inside the package",
                    self.entrypoint
                ),
            ));
        }
        Ok(())
    }

    /// Entrypoint path relative to the package root.
    #[must_use]
    pub const fn entrypoint(&self) -> &str {
        self.entrypoint.as_str()
    }

    /// Program that runs the entrypoint, if any.
    #[must_use]
    pub fn interpreter(&self) -> Option<&str> {
        self.interpreter.as_deref()
    }

    /// Extra arguments passed after the entrypoint.
    #[must_use]
    pub const fn args(&self) -> &[String] {
        self.args.as_slice()
    }
}

fn manifest_error(name: &str, message: String) -> StageError {
    StageError::Manifest {
        name: name.to_owned(),
        message,
    }
}

//! Process-scoped temporary directory and persistent revision cache.
//!
//! A [`Workspace`] is created once per run and passed by reference to every
//! collaborator that needs disk space. The temporary directory (staged
//! handlers, askpass helpers, per-run remote snapshots) is removed on
//! [`Workspace::close`] or drop; the cache root survives across runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::debug;

use crate::error::WorkspaceError;

const WORKSPACE_TARGET: &str = "conductor_handlers::workspace";

const TEMP_PREFIX: &str = "conductor_";
const HANDLERS_DIR: &str = "handlers";
const REMOTE_DIR: &str = "remote";

/// Owner of the per-run temporary tree and the persistent cache root.
#[derive(Debug)]
pub struct Workspace {
    temp: TempDir,
    cache_root: PathBuf,
}

impl Workspace {
    /// Creates the temporary tree and ensures the cache root exists.
    ///
    /// `temp_base` selects where the temporary directory is created; the
    /// system temp directory is used when it is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when either directory cannot be created.
    pub fn create(
        cache: impl Into<PathBuf>,
        temp_base: Option<&Path>,
    ) -> Result<Self, WorkspaceError> {
        let cache_root = cache.into();
        fs::create_dir_all(&cache_root).map_err(|source| io_error(&cache_root, source))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        if let Some(base) = temp_base {
            fs::create_dir_all(base).map_err(|source| io_error(base, source))?;
        }
        let temp = temp_base
            .map_or_else(|| builder.tempdir(), |base| builder.tempdir_in(base))
            .map_err(|source| io_error(temp_base.unwrap_or_else(|| Path::new("")), source))?;

        let handlers_root = temp.path().join(HANDLERS_DIR);
        fs::create_dir_all(&handlers_root).map_err(|source| io_error(&handlers_root, source))?;

        debug!(
            target: WORKSPACE_TARGET,
            temp = %temp.path().display(),
            cache = %cache_root.display(),
            "workspace created"
        );
        Ok(Self { temp, cache_root })
    }

    /// Per-run temporary directory.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        self.temp.path()
    }

    /// Root of the persistent revision cache.
    #[must_use]
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Private root that staged handler units are copied into.
    #[must_use]
    pub fn handlers_root(&self) -> PathBuf {
        self.temp.path().join(HANDLERS_DIR)
    }

    /// Run-scoped cache for revisions that must not outlive the run.
    #[must_use]
    pub fn remote_scratch(&self) -> PathBuf {
        self.temp.path().join(REMOTE_DIR)
    }

    /// Removes the temporary tree, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the directory cannot be removed.
    pub fn close(self) -> Result<(), WorkspaceError> {
        let path = self.temp.path().to_path_buf();
        self.temp
            .close()
            .map_err(|source| io_error(&path, source))?;
        debug!(target: WORKSPACE_TARGET, temp = %path.display(), "workspace removed");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn base() -> TempDir {
        TempDir::new().expect("create base dir")
    }

    #[rstest]
    fn create_lays_out_directories(base: TempDir) {
        let cache = base.path().join("cache");
        let workspace =
            Workspace::create(&cache, Some(base.path())).expect("create workspace");

        assert!(cache.is_dir());
        assert!(workspace.handlers_root().is_dir());
        assert!(workspace.temp_dir().starts_with(base.path()));
        let name = workspace
            .temp_dir()
            .file_name()
            .and_then(|n| n.to_str())
            .expect("temp dir name");
        assert!(name.starts_with("conductor_"), "unexpected name: {name}");
        assert!(!workspace.remote_scratch().exists());
    }

    #[rstest]
    fn close_removes_temp_but_keeps_cache(base: TempDir) {
        let cache = base.path().join("cache");
        let workspace =
            Workspace::create(&cache, Some(base.path())).expect("create workspace");
        let temp = workspace.temp_dir().to_path_buf();

        workspace.close().expect("close workspace");

        assert!(!temp.exists());
        assert!(cache.is_dir());
    }

    #[rstest]
    fn drop_removes_temp(base: TempDir) {
        let temp = {
            let workspace = Workspace::create(base.path().join("cache"), Some(base.path()))
                .expect("create workspace");
            workspace.temp_dir().to_path_buf()
        };
        assert!(!temp.exists());
    }

    #[rstest]
    fn workspaces_do_not_share_temp_dirs(base: TempDir) {
        let cache = base.path().join("cache");
        let first = Workspace::create(&cache, Some(base.path())).expect("first");
        let second = Workspace::create(&cache, Some(base.path())).expect("second");
        assert_ne!(first.temp_dir(), second.temp_dir());
        assert_eq!(first.cache_root(), second.cache_root());
    }
}

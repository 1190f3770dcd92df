//! Acquisition of handler sources.
//!
//! [`Acquirer::resolve`] turns a [`HandlerDescriptor`] into an
//! [`AcquiredSource`]: an existing file or directory holding the handler's
//! code. Local sources are checked in place. Remote sources are fetched once
//! per `(origin, revision)` into the workspace cache and reused afterwards.
//!
//! Cache entries are assembled in a sibling `.<revision>.partial-<pid>`
//! directory and renamed into place only once the snapshot is complete, so a
//! half-fetched entry is never mistaken for a hit.

mod git;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use conductor_config::{HandlerDescriptor, HandlerSource, RemoteSpec};
use tracing::{debug, info, warn};

use self::git::{GitAuth, discover_default_branch, fetch_snapshot, origin_id, revision_dir_name};
use crate::command::CommandRunner;
use crate::error::{AcquisitionError, ProcessError};
use crate::workspace::Workspace;

const ACQUIRE_TARGET: &str = "conductor_handlers::acquire";

/// Branch assumed when the origin does not advertise its default branch.
pub const FALLBACK_BRANCH: &str = "main";

/// On-disk materialisation of a handler's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    path: PathBuf,
}

impl AcquiredSource {
    /// Wraps an existing file or directory.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the file or directory holding the handler's code.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` when the source is a single file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.path.is_file()
    }
}

/// Resolves descriptors to on-disk sources, fetching remote revisions as
/// needed.
#[derive(Debug)]
pub struct Acquirer<'w, R> {
    workspace: &'w Workspace,
    runner: R,
    default_branches: HashMap<String, String>,
}

impl<'w, R: CommandRunner> Acquirer<'w, R> {
    /// Creates an acquirer backed by `workspace` that runs git through
    /// `runner`.
    #[must_use]
    pub fn new(workspace: &'w Workspace, runner: R) -> Self {
        Self {
            workspace,
            runner,
            default_branches: HashMap::new(),
        }
    }

    /// Materialises the descriptor's source.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError::NotFound`] for a missing local path, an
    /// auth error for conflicting or unusable credential hints, and
    /// [`AcquisitionError::Fetch`] when git fails.
    pub fn resolve(
        &mut self,
        descriptor: &HandlerDescriptor,
    ) -> Result<AcquiredSource, AcquisitionError> {
        match descriptor.source() {
            HandlerSource::Local { path } => resolve_local(path),
            HandlerSource::Remote(spec) => self.resolve_remote(spec),
        }
    }

    fn resolve_remote(&mut self, spec: &RemoteSpec) -> Result<AcquiredSource, AcquisitionError> {
        let origin = spec.url();
        let auth = GitAuth::prepare(spec, self.workspace.temp_dir())?;

        let (revision, base) = match spec.revision() {
            Some(revision) => (revision.to_owned(), self.workspace.cache_root().to_path_buf()),
            None => (
                self.default_branch(origin, &auth)?,
                self.workspace.remote_scratch(),
            ),
        };
        let entry = base
            .join(origin_id(origin))
            .join(revision_dir_name(origin, &revision)?);

        if entry.is_dir() {
            debug!(
                target: ACQUIRE_TARGET,
                origin,
                revision = %revision,
                path = %entry.display(),
                "cache hit"
            );
        } else {
            self.populate(&entry, &auth, origin, &revision)?;
        }

        let path = match spec.subpath() {
            Some(subpath) => narrow(&entry, origin, subpath)?,
            None => entry,
        };
        Ok(AcquiredSource::new(path))
    }

    fn default_branch(&mut self, origin: &str, auth: &GitAuth) -> Result<String, AcquisitionError> {
        if let Some(branch) = self.default_branches.get(origin) {
            return Ok(branch.clone());
        }
        let discovered = discover_default_branch(&self.runner, auth)
            .map_err(|source| fetch_error(origin, "HEAD", source))?;
        let branch = discovered.unwrap_or_else(|| {
            warn!(
                target: ACQUIRE_TARGET,
                origin,
                fallback = FALLBACK_BRANCH,
                "origin does not advertise a default branch"
            );
            String::from(FALLBACK_BRANCH)
        });
        info!(target: ACQUIRE_TARGET, origin, branch = %branch, "using default branch");
        self.default_branches
            .insert(origin.to_owned(), branch.clone());
        Ok(branch)
    }

    fn populate(
        &self,
        entry: &Path,
        auth: &GitAuth,
        origin: &str,
        revision: &str,
    ) -> Result<(), AcquisitionError> {
        let parent = entry.parent().unwrap_or(entry);
        let mut partial_name = OsString::from(".");
        partial_name.push(entry.file_name().unwrap_or_default());
        partial_name.push(format!(".partial-{}", std::process::id()));
        let partial = parent.join(partial_name);

        if partial.exists() {
            fs::remove_dir_all(&partial).map_err(|source| io_error(&partial, source))?;
        }
        fs::create_dir_all(&partial).map_err(|source| io_error(&partial, source))?;

        info!(
            target: ACQUIRE_TARGET,
            origin,
            revision,
            path = %entry.display(),
            "fetching handler revision"
        );
        if let Err(source) = fetch_snapshot(&self.runner, auth, &partial, revision) {
            discard(&partial);
            return Err(fetch_error(origin, revision, source));
        }

        let metadata = partial.join(".git");
        if metadata.exists() {
            fs::remove_dir_all(&metadata).map_err(|source| io_error(&metadata, source))?;
        }

        if let Err(source) = fs::rename(&partial, entry) {
            discard(&partial);
            if !entry.is_dir() {
                return Err(io_error(entry, source));
            }
        }
        Ok(())
    }
}

fn resolve_local(path: &Path) -> Result<AcquiredSource, AcquisitionError> {
    if path.exists() {
        debug!(target: ACQUIRE_TARGET, path = %path.display(), "using local handler source");
        Ok(AcquiredSource::new(path))
    } else {
        Err(AcquisitionError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

fn narrow(entry: &Path, origin: &str, subpath: &str) -> Result<PathBuf, AcquisitionError> {
    let relative = Path::new(subpath);
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    let narrowed = entry.join(relative);
    if escapes || !narrowed.exists() {
        return Err(AcquisitionError::MissingSubpath {
            origin: origin.to_owned(),
            subpath: subpath.to_owned(),
        });
    }
    Ok(narrowed)
}

fn discard(partial: &Path) {
    if let Err(err) = fs::remove_dir_all(partial) {
        warn!(
            target: ACQUIRE_TARGET,
            path = %partial.display(),
            error = %err,
            "failed to remove partial cache entry"
        );
    }
}

fn fetch_error(origin: &str, revision: &str, source: ProcessError) -> AcquisitionError {
    AcquisitionError::Fetch {
        origin: origin.to_owned(),
        revision: revision.to_owned(),
        source: Box::new(source),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> AcquisitionError {
    AcquisitionError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    }
}

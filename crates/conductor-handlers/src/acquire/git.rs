//! Git plumbing for remote handler sources.
//!
//! Everything here shells out through a [`CommandRunner`]; nothing talks to
//! the network directly.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use conductor_config::RemoteSpec;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{AcquisitionError, ProcessError};

const GIT: &str = "git";

/// Characters kept verbatim in revision directory names.
const REVISION_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Stable, filesystem-safe directory name for an origin URL.
///
/// The readable prefix is the last path segment of the URL; the suffix is the
/// first 16 hex digits of the URL's SHA-256 so distinct origins never share
/// a directory.
pub(crate) fn origin_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest
        .iter()
        .take(8)
        .flat_map(|byte| [byte >> 4, byte & 0x0f])
        .filter_map(|nibble| char::from_digit(u32::from(nibble), 16))
        .collect();

    let tail = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");
    let readable: String = tail
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if readable.is_empty() {
        format!("origin-{hex}")
    } else {
        format!("{readable}-{hex}")
    }
}

/// Encodes a revision as a single directory name.
pub(crate) fn revision_dir_name(origin: &str, revision: &str) -> Result<String, AcquisitionError> {
    if revision.trim().is_empty() || revision == "." || revision == ".." {
        return Err(AcquisitionError::InvalidRevision {
            origin: origin.to_owned(),
            revision: revision.to_owned(),
        });
    }
    Ok(utf8_percent_encode(revision, REVISION_ESCAPES).to_string())
}

/// Credentials and the URL actually handed to git.
#[derive(Debug, Clone, Default)]
pub(crate) struct GitAuth {
    fetch_url: String,
    envs: Vec<(String, OsString)>,
}

impl GitAuth {
    /// Validates the credential hints of `spec` and prepares git's environment.
    ///
    /// A `password_env` hint writes an askpass helper into `scratch`.
    pub(crate) fn prepare(spec: &RemoteSpec, scratch: &Path) -> Result<Self, AcquisitionError> {
        let origin = spec.url();
        let mut auth = Self {
            fetch_url: origin.to_owned(),
            envs: vec![(String::from("GIT_TERMINAL_PROMPT"), OsString::from("0"))],
        };
        match (spec.key_file(), spec.password_env()) {
            (Some(_), Some(_)) => {
                return Err(AcquisitionError::AmbiguousAuth {
                    origin: origin.to_owned(),
                });
            }
            (Some(key), None) => {
                if spec.is_http() {
                    return Err(invalid_auth(origin, "'key_file' requires an SSH origin"));
                }
                auth.envs.push((
                    String::from("GIT_SSH_COMMAND"),
                    OsString::from(format!("ssh -i {} -F /dev/null", key.display())),
                ));
            }
            (None, Some(variable)) => {
                if !spec.is_http() {
                    return Err(invalid_auth(origin, "'password_env' requires an HTTP(S) origin"));
                }
                if std::env::var_os(variable).is_none() {
                    return Err(invalid_auth(
                        origin,
                        &format!("environment variable '{variable}' is not set"),
                    ));
                }
                let helper = write_askpass(scratch, origin, variable)?;
                auth.envs
                    .push((String::from("GIT_ASKPASS"), helper.into_os_string()));
                auth.fetch_url = with_username(origin, spec.username());
            }
            (None, None) => {}
        }
        Ok(auth)
    }

    pub(crate) fn fetch_url(&self) -> &str {
        &self.fetch_url
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(GIT)
            .args(args)
            .envs(self.envs.iter().cloned())
    }
}

fn invalid_auth(origin: &str, message: &str) -> AcquisitionError {
    AcquisitionError::InvalidAuth {
        origin: origin.to_owned(),
        message: message.to_owned(),
    }
}

fn with_username(url: &str, username: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_owned();
    };
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.contains('@') {
        url.to_owned()
    } else {
        format!("{scheme}://{username}@{rest}")
    }
}

fn write_askpass(scratch: &Path, origin: &str, variable: &str) -> Result<PathBuf, AcquisitionError> {
    let path = scratch.join(format!("askpass-{}.sh", origin_id(origin)));
    let script = format!("#!/bin/sh\nprintf '%s\\n' \"${{{variable}}}\"\n");
    let io_error = |source| AcquisitionError::Io {
        path: path.clone(),
        source: Arc::new(source),
    };
    fs::write(&path, script).map_err(io_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).map_err(io_error)?;
    }
    Ok(path)
}

/// Asks the origin for its default branch.
///
/// Returns `None` when the origin does not advertise a symbolic `HEAD`.
pub(crate) fn discover_default_branch<R: CommandRunner>(
    runner: &R,
    auth: &GitAuth,
) -> Result<Option<String>, ProcessError> {
    let output = runner.run(&auth.command(["ls-remote", "--symref", auth.fetch_url(), "HEAD"]))?;
    Ok(parse_symref(&output.stdout))
}

fn parse_symref(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (reference, target) = line.strip_prefix("ref:")?.split_once('\t')?;
        if target.trim() != "HEAD" {
            return None;
        }
        reference
            .trim()
            .strip_prefix("refs/heads/")
            .map(str::to_owned)
    })
}

/// Fetches exactly one revision into `dir` and leaves a plain working tree.
pub(crate) fn fetch_snapshot<R: CommandRunner>(
    runner: &R,
    auth: &GitAuth,
    dir: &Path,
    revision: &str,
) -> Result<(), ProcessError> {
    let steps: [Vec<&str>; 4] = [
        vec!["init", "--quiet"],
        vec!["remote", "add", "origin", auth.fetch_url()],
        vec!["fetch", "--depth", "1", "origin", revision],
        vec!["reset", "--quiet", "--hard", "FETCH_HEAD"],
    ];
    for args in steps {
        runner.run(&auth.command(args).current_dir(dir))?;
    }
    Ok(())
}

//! External command execution.
//!
//! Git acquisition shells out through the [`CommandRunner`] trait so tests can
//! substitute a recording double instead of spawning real processes. The
//! production [`SystemCommandRunner`] captures output and logs it when a
//! command fails.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::ProcessError;

const COMMAND_TARGET: &str = "conductor_handlers::command";

/// A program invocation with arguments, working directory, and extra
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, OsString)>,
}

impl CommandSpec {
    /// Starts a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Adds environment variables on top of the inherited environment.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<OsString>,
    {
        self.envs
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Extra environment variables.
    #[must_use]
    pub fn env_vars(&self) -> &[(String, OsString)] {
        &self.envs
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Runs `spec`, blocking until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] when the program cannot start and
    /// [`ProcessError::Failed`] when it exits unsuccessfully.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        (**self).run(spec)
    }
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let mut command = Command::new(spec.program());
        command.args(spec.arguments());
        if let Some(dir) = spec.cwd() {
            command.current_dir(dir);
        }
        command.envs(spec.env_vars().iter().map(|(key, value)| (key, value)));

        debug!(
            target: COMMAND_TARGET,
            program = spec.program(),
            args = ?spec.arguments(),
            cwd = ?spec.cwd(),
            "running command"
        );

        let output = command.output().map_err(|source| ProcessError::Spawn {
            program: spec.program().to_owned(),
            source: Arc::new(source),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(CommandOutput { stdout, stderr });
        }

        for line in stdout.lines().chain(stderr.lines()) {
            error!(target: COMMAND_TARGET, program = spec.program(), "{line}");
        }
        Err(ProcessError::Failed {
            program: spec.program().to_owned(),
            status: output.status.code(),
            stderr,
        })
    }
}

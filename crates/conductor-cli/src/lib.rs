//! Command-line runtime for the conductor CI event dispatcher.
//!
//! The runtime parses arguments, initialises structured logging, loads the
//! handler document, reads the event from the CI environment (or from
//! `--event` when running locally), and dispatches it across the handler
//! registry. IO streams and the environment are injectable so the whole flow
//! can be exercised from tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use conductor_config::{ConfigDocument, Options, default_cache_root, locate};
use conductor_handlers::{
    Acquirer, Dispatcher, HandlerRegistry, ProcessExecutor, RunSettings, Stager, StatusReporter,
    SystemCommandRunner, Workspace,
};
use tracing::info;

mod cli;
mod errors;
mod github;
mod status;
pub mod telemetry;

use cli::Cli;
use errors::AppError;
use github::{Environment, ProcessEnvironment, facts_from_env, is_ci, local_facts};
use status::TracingStatusReporter;
use telemetry::TelemetrySettings;

const RUN_TARGET: &str = "conductor_cli::run";

/// Exit status for command-line usage errors.
const USAGE_EXIT: u8 = 2;

/// Runs the CLI using the provided arguments and IO handles.
///
/// Failures are written twice: as a GitHub Actions `::error::` annotation on
/// `stdout` and as plain text on `stderr`.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_env(args, &ProcessEnvironment, stdout, stderr)
}

pub(crate) fn run_with_env<I, V, W, E>(
    args: I,
    env: &V,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    V: Environment,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            let _ = write!(stderr, "{}", error.render());
            return ExitCode::from(USAGE_EXIT);
        }
        Err(error) => {
            let _ = write!(stdout, "{}", error.render());
            return ExitCode::SUCCESS;
        }
    };

    match execute(&cli, env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stdout, "::error::{error}");
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli, env: &impl Environment) -> Result<(), AppError> {
    telemetry::initialise(&TelemetrySettings {
        filter: cli.log_filter(),
        format: cli.log_format,
    })?;

    let cwd = std::env::current_dir().map_err(AppError::CurrentDir)?;
    let config_path = locate(cli.config.as_deref(), &cwd)?;
    let document = ConfigDocument::load(&config_path)?;
    let mut options = document.options().clone();
    options.merge(Options::from_overrides(&cli.options)?);

    let local = cli.local || !is_ci(env);
    let facts = if local {
        local_facts(&cli.event)
    } else {
        facts_from_env(env)?
    };
    info!(
        target: RUN_TARGET,
        config = %config_path.display(),
        event = %facts.name,
        local,
        "starting run"
    );

    let workspace = Workspace::create(
        cli.cache_dir.clone().unwrap_or_else(default_cache_root),
        cli.temp_dir.as_deref(),
    )?;
    let run = RunSettings {
        facts,
        options,
        workdir: cwd,
        local,
    };
    let outcome = dispatch_event(&workspace, &document, &run, cli.invoke.as_deref());
    let closed = workspace.close();
    outcome?;
    closed?;
    Ok(())
}

fn dispatch_event(
    workspace: &Workspace,
    document: &ConfigDocument,
    run: &RunSettings,
    invoke: Option<&str>,
) -> Result<(), AppError> {
    let mut acquirer = Acquirer::new(workspace, SystemCommandRunner);
    let stager = Stager::new(workspace.handlers_root());
    let registry = HandlerRegistry::build(document.handlers(), &mut acquirer, &stager)?;

    let mut dispatcher = Dispatcher::new(registry, ProcessExecutor::new(run.workdir.as_path()));
    let reporter = TracingStatusReporter;
    let status: Option<&dyn StatusReporter> = if run.local { None } else { Some(&reporter) };
    dispatcher.dispatch(run, invoke, status)?;
    Ok(())
}

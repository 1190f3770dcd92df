//! Error type for the CLI runtime.

use std::io;

use conductor_config::ConfigError;
use conductor_handlers::{DispatchError, RegistryError, WorkspaceError};
use thiserror::Error;

use crate::github::EnvironmentError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to read the working directory: {0}")]
    CurrentDir(io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

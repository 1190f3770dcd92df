//! Status-check reporting through structured logs.
//!
//! Each check transition becomes one `info` event on the
//! `conductor::status` target, so CI log collectors can follow handler
//! progress without a separate API client.

use conductor_handlers::{CheckConclusion, StatusError, StatusReporter};
use tracing::info;

const STATUS_TARGET: &str = "conductor::status";

/// Reports status checks as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn check_started(&self, name: &str) -> Result<(), StatusError> {
        info!(target: STATUS_TARGET, event = "check_started", check = name, "check started");
        Ok(())
    }

    fn check_completed(&self, name: &str, conclusion: CheckConclusion) -> Result<(), StatusError> {
        info!(
            target: STATUS_TARGET,
            event = "check_completed",
            check = name,
            conclusion = conclusion.as_str(),
            "check completed"
        );
        Ok(())
    }

    fn cancel_run(&self) -> Result<(), StatusError> {
        info!(target: STATUS_TARGET, event = "cancel_run", "run cancelled");
        Ok(())
    }
}

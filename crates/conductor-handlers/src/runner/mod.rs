//! Dispatch of one event across the handler registry.
//!
//! The [`Dispatcher`] walks the [`HandlerRegistry`] in declaration order.
//! For each handler it evaluates the effective condition, resolves the
//! function to call, invokes it through a [`UnitExecutor`], and records the
//! result. A false condition or a missing function skips the handler; a
//! failure, cancellation, or unit error stops the pass.
//!
//! The executor abstraction lets tests script unit behaviour without
//! spawning processes. [`StatusReporter`] is the optional status-check
//! collaborator; its errors are logged and never stop the pass.

use tracing::{debug, info, warn};

use crate::condition;
use crate::context::{RunContext, RunSettings};
use crate::error::{DispatchError, StatusError, UnitError};
use crate::loader::{LoadedHandler, StagedUnit};
use crate::protocol::{InvokeOutcome, UnitDescription};
use crate::registry::HandlerRegistry;
use crate::response::{DispatchResult, ResponseLog};

const DISPATCH_TARGET: &str = "conductor_handlers::dispatch";

/// Prefix of the conventional per-event function name.
pub const FUNCTION_PREFIX: &str = "handle_";

/// Prefix of status-check names.
pub const CHECK_PREFIX: &str = "conductor::";

/// Trait abstracting handler unit execution for testability.
///
/// The production implementation is
/// [`ProcessExecutor`](crate::process::ProcessExecutor), which runs the
/// unit as a short-lived child process.
pub trait UnitExecutor {
    /// Asks the unit which functions and conditions it exposes.
    ///
    /// # Errors
    ///
    /// Returns a [`UnitError`] if the unit cannot be started or replies with
    /// an invalid description.
    fn describe(&self, unit: &StagedUnit) -> Result<UnitDescription, UnitError>;

    /// Calls `function` in the unit with the run context.
    ///
    /// # Errors
    ///
    /// Returns a [`UnitError`] if the unit cannot be started, exits
    /// unsuccessfully without a failure response, or replies with an invalid
    /// outcome.
    fn invoke(
        &self,
        unit: &StagedUnit,
        function: &str,
        context: &RunContext<'_>,
    ) -> Result<InvokeOutcome, UnitError>;
}

impl<T: UnitExecutor + ?Sized> UnitExecutor for &T {
    fn describe(&self, unit: &StagedUnit) -> Result<UnitDescription, UnitError> {
        (**self).describe(unit)
    }

    fn invoke(
        &self,
        unit: &StagedUnit,
        function: &str,
        context: &RunContext<'_>,
    ) -> Result<InvokeOutcome, UnitError> {
        (**self).invoke(unit, function, context)
    }
}

/// Final state of a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckConclusion {
    /// The function completed.
    Success,
    /// The function failed or its unit errored.
    Failure,
    /// The function cancelled the run.
    Cancelled,
}

impl CheckConclusion {
    /// Lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Status-check collaborator bracketing each invocation.
pub trait StatusReporter {
    /// A check named `name` started.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusError`] when the report cannot be delivered.
    fn check_started(&self, name: &str) -> Result<(), StatusError>;

    /// The check named `name` finished with `conclusion`.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusError`] when the report cannot be delivered.
    fn check_completed(&self, name: &str, conclusion: CheckConclusion)
    -> Result<(), StatusError>;

    /// The whole run was cancelled.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusError`] when the report cannot be delivered.
    fn cancel_run(&self) -> Result<(), StatusError>;
}

/// Runs one event through every registered handler.
#[derive(Debug)]
pub struct Dispatcher<E> {
    registry: HandlerRegistry,
    executor: E,
    responses: ResponseLog,
}

impl<E> Dispatcher<E> {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: HandlerRegistry, executor: E) -> Self {
        Self {
            registry,
            executor,
            responses: ResponseLog::new(),
        }
    }

    /// The handler registry.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Results recorded by the most recent pass.
    #[must_use]
    pub const fn responses(&self) -> &ResponseLog {
        &self.responses
    }

    /// Consumes the dispatcher, returning the last pass's results.
    #[must_use]
    pub fn into_responses(self) -> ResponseLog {
        self.responses
    }
}

impl<E: UnitExecutor> Dispatcher<E> {
    /// Dispatches `run.facts` across the registry.
    ///
    /// `invoke` overrides the conventional `handle_<event>` function name.
    /// The response log is reset at the start of every pass; results
    /// recorded before a failing handler are kept.
    ///
    /// # Errors
    ///
    /// Returns the first [`DispatchError`]; later handlers do not run.
    pub fn dispatch(
        &mut self,
        run: &RunSettings,
        invoke: Option<&str>,
        reporter: Option<&dyn StatusReporter>,
    ) -> Result<(), DispatchError> {
        let event = run.facts.name.as_str();
        let function = invoke.map_or_else(|| format!("{FUNCTION_PREFIX}{event}"), str::to_owned);
        self.responses = ResponseLog::new();
        info!(
            target: DISPATCH_TARGET,
            event,
            function = %function,
            handlers = self.registry.len(),
            "dispatching event"
        );

        let pass = Pass {
            executor: &self.executor,
            run,
            function: &function,
            reporter,
        };
        for handler in self.registry.iter() {
            pass.handle(handler, &mut self.responses)?;
        }

        info!(
            target: DISPATCH_TARGET,
            event,
            recorded = self.responses.len(),
            "dispatch complete"
        );
        Ok(())
    }
}

struct Pass<'a, E> {
    executor: &'a E,
    run: &'a RunSettings,
    function: &'a str,
    reporter: Option<&'a dyn StatusReporter>,
}

impl<E: UnitExecutor> Pass<'_, E> {
    const fn event(&self) -> &str {
        self.run.facts.name.as_str()
    }

    fn handle(
        &self,
        handler: &LoadedHandler,
        responses: &mut ResponseLog,
    ) -> Result<(), DispatchError> {
        let name = handler.name();
        let event = self.event();

        let condition = handler
            .get_condition(self.executor, event)
            .map_err(|source| self.unit_error(name, source))?;
        if !condition::check(condition.as_ref(), &self.run.facts) {
            debug!(target: DISPATCH_TARGET, handler = name, event, "condition not met, skipping");
            return Ok(());
        }

        let resolved = handler
            .get_function(self.executor, self.function)
            .map_err(|source| self.unit_error(name, source))?;
        let Some(function) = resolved else {
            debug!(
                target: DISPATCH_TARGET,
                handler = name,
                function = self.function,
                "function not exposed, skipping"
            );
            return Ok(());
        };

        let check = format!("{CHECK_PREFIX}{function}");
        self.report("check_started", |reporter| reporter.check_started(&check));
        let outcome = {
            let context = RunContext::new(name, handler.unit().root(), self.run, responses);
            self.executor.invoke(handler.unit(), &function, &context)
        };

        match outcome {
            Ok(InvokeOutcome::Ok { result }) => {
                responses.record(name, DispatchResult::from_value(result));
                self.complete(&check, CheckConclusion::Success);
                debug!(target: DISPATCH_TARGET, handler = name, function = %function, "handler completed");
                Ok(())
            }
            Ok(InvokeOutcome::Failure { message }) => {
                self.complete(&check, CheckConclusion::Failure);
                Err(DispatchError::Failed {
                    handler: name.to_owned(),
                    event: event.to_owned(),
                    message,
                })
            }
            Ok(InvokeOutcome::Cancel { message }) => {
                self.complete(&check, CheckConclusion::Cancelled);
                self.report("cancel_run", |reporter| reporter.cancel_run());
                Err(DispatchError::Cancelled {
                    handler: name.to_owned(),
                    event: event.to_owned(),
                    message,
                })
            }
            Err(source) => {
                self.complete(&check, CheckConclusion::Failure);
                Err(self.unit_error(name, source))
            }
        }
    }

    fn complete(&self, check: &str, conclusion: CheckConclusion) {
        self.report("check_completed", |reporter| {
            reporter.check_completed(check, conclusion)
        });
    }

    fn report<F>(&self, action: &str, call: F)
    where
        F: FnOnce(&dyn StatusReporter) -> Result<(), StatusError>,
    {
        let Some(reporter) = self.reporter else {
            return;
        };
        if let Err(err) = call(reporter) {
            warn!(target: DISPATCH_TARGET, action, error = %err, "status report failed");
        }
    }

    fn unit_error(&self, name: &str, source: UnitError) -> DispatchError {
        DispatchError::Unit {
            handler: name.to_owned(),
            event: self.event().to_owned(),
            source,
        }
    }
}

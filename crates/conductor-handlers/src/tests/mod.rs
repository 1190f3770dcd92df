//! Crate-level test doubles, end-to-end tests, and BDD scenarios.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use conductor_config::{ConditionSpec, HandlerDescriptor, HandlerSource};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::acquire::Acquirer;
use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::context::{EventFacts, RunContext, RunSettings};
use crate::error::{ProcessError, UnitError};
use crate::loader::{LoadedHandler, StagedUnit, Stager};
use crate::protocol::{InvokeOutcome, UnitDescription};
use crate::registry::HandlerRegistry;
use crate::response::DispatchResult;
use crate::runner::{Dispatcher, UnitExecutor};
use crate::workspace::Workspace;


// ---------------------------------------------------------------------------
// Fake git
// ---------------------------------------------------------------------------

/// Command runner standing in for `git`.
///
/// `init` creates `.git` in the working directory, `reset` writes the
/// configured files there, and `ls-remote` reports the configured default
/// branch. Every command is recorded.
#[derive(Debug, Default)]
pub(crate) struct FakeGit {
    files: Vec<(String, String)>,
    default_branch: Option<String>,
    fail_fetch: bool,
    commands: RefCell<Vec<CommandSpec>>,
}

impl FakeGit {
    pub(crate) fn with_file(mut self, relative: &str, contents: &str) -> Self {
        self.files.push((relative.to_owned(), contents.to_owned()));
        self
    }

    pub(crate) fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = Some(branch.to_owned());
        self
    }

    pub(crate) fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub(crate) fn commands(&self) -> Vec<CommandSpec> {
        self.commands.borrow().clone()
    }

    pub(crate) fn subcommands(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|spec| spec.arguments().first().cloned())
            .collect()
    }

    pub(crate) fn count(&self, subcommand: &str) -> usize {
        self.subcommands()
            .iter()
            .filter(|name| name.as_str() == subcommand)
            .count()
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.count("fetch")
    }

    fn write_tree(&self, spec: &CommandSpec) -> Result<(), ProcessError> {
        let dir = spec.cwd().map(PathBuf::from).unwrap_or_default();
        for (relative, contents) in &self.files {
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| spawn_error(&err))?;
            }
            fs::write(&path, contents).map_err(|err| spawn_error(&err))?;
        }
        Ok(())
    }
}

fn spawn_error(err: &std::io::Error) -> ProcessError {
    ProcessError::Spawn {
        program: String::from("git"),
        source: std::sync::Arc::new(std::io::Error::new(err.kind(), err.to_string())),
    }
}

impl CommandRunner for FakeGit {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.commands.borrow_mut().push(spec.clone());
        let subcommand = spec.arguments().first().map(String::as_str);
        let mut output = CommandOutput::default();
        match subcommand {
            Some("init") => {
                let dir = spec.cwd().map(PathBuf::from).unwrap_or_default();
                fs::create_dir_all(dir.join(".git")).map_err(|err| spawn_error(&err))?;
            }
            Some("fetch") if self.fail_fetch => {
                return Err(ProcessError::Failed {
                    program: String::from("git"),
                    status: Some(128),
                    stderr: String::from("fatal: couldn't find remote ref\n"),
                });
            }
            Some("reset") => self.write_tree(spec)?,
            Some("ls-remote") => {
                if let Some(branch) = &self.default_branch {
                    output.stdout =
                        format!("ref: refs/heads/{branch}\tHEAD\n0123456789abcdef\tHEAD\n");
                }
            }
            _ => {}
        }
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Scripted executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Outcome(InvokeOutcome),
    Crash,
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub(crate) handler: String,
    pub(crate) function: String,
    pub(crate) context: Value,
}

/// Unit executor answering from a script keyed by handler name.
///
/// Unscripted units expose no functions. Scripted units return
/// `{"status":"ok","result":null}` unless a reply was configured.
#[derive(Debug, Default)]
pub(crate) struct ScriptedExecutor {
    descriptions: HashMap<String, UnitDescription>,
    replies: HashMap<String, Reply>,
    broken: Vec<String>,
    describes: RefCell<Vec<String>>,
    invocations: RefCell<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub(crate) fn with_unit(mut self, name: &str, functions: &[&str]) -> Self {
        self.descriptions.insert(
            name.to_owned(),
            UnitDescription::new(functions.iter().copied()),
        );
        self
    }

    pub(crate) fn with_unit_condition(mut self, name: &str, event: &str, spec: ConditionSpec) -> Self {
        let description = self.descriptions.remove(name).unwrap_or_default();
        self.descriptions
            .insert(name.to_owned(), description.with_condition(event, spec));
        self
    }

    pub(crate) fn replying(mut self, name: &str, outcome: InvokeOutcome) -> Self {
        self.replies.insert(name.to_owned(), Reply::Outcome(outcome));
        self
    }

    pub(crate) fn crashing(mut self, name: &str) -> Self {
        self.replies.insert(name.to_owned(), Reply::Crash);
        self
    }

    pub(crate) fn undescribable(mut self, name: &str) -> Self {
        self.broken.push(name.to_owned());
        self
    }

    pub(crate) fn describe_count(&self, name: &str) -> usize {
        self.describes
            .borrow()
            .iter()
            .filter(|described| described.as_str() == name)
            .count()
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }

    pub(crate) fn invoked(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(|call| call.handler.clone())
            .collect()
    }
}

impl UnitExecutor for ScriptedExecutor {
    fn describe(&self, unit: &StagedUnit) -> Result<UnitDescription, UnitError> {
        self.describes.borrow_mut().push(unit.name().to_owned());
        if self.broken.iter().any(|name| name == unit.name()) {
            return Err(UnitError::InvalidResponse {
                name: unit.name().to_owned(),
                message: String::from("not a description"),
            });
        }
        Ok(self
            .descriptions
            .get(unit.name())
            .cloned()
            .unwrap_or_default())
    }

    fn invoke(
        &self,
        unit: &StagedUnit,
        function: &str,
        context: &RunContext<'_>,
    ) -> Result<InvokeOutcome, UnitError> {
        let snapshot = serde_json::to_value(context).map_err(|source| {
            UnitError::SerializeRequest {
                name: unit.name().to_owned(),
                source,
            }
        })?;
        self.invocations.borrow_mut().push(Invocation {
            handler: unit.name().to_owned(),
            function: function.to_owned(),
            context: snapshot,
        });
        match self.replies.get(unit.name()) {
            Some(Reply::Outcome(outcome)) => Ok(outcome.clone()),
            Some(Reply::Crash) => Err(UnitError::NonZeroExit {
                name: unit.name().to_owned(),
                status: 3,
            }),
            None => Ok(InvokeOutcome::ok(Value::Null)),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry helpers
// ---------------------------------------------------------------------------

pub(crate) fn descriptor(name: &str) -> HandlerDescriptor {
    HandlerDescriptor::new(
        name,
        HandlerSource::Local {
            path: PathBuf::from(format!("/handlers/{name}")),
        },
    )
}

pub(crate) fn loaded(descriptor: HandlerDescriptor) -> LoadedHandler {
    let root = PathBuf::from(format!("/staged/{}", descriptor.name()));
    let unit = StagedUnit::new(descriptor.name(), &root, &root);
    LoadedHandler::new(descriptor, unit)
}

pub(crate) fn registry_of(descriptors: Vec<HandlerDescriptor>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for item in descriptors {
        registry.register(loaded(item)).expect("register handler");
    }
    registry
}

pub(crate) fn push_to_main() -> RunSettings {
    RunSettings {
        facts: EventFacts::new("push").with_ref("refs/heads/main"),
        ..RunSettings::default()
    }
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn end_to_end_local_and_remote_handlers() {
    let base = TempDir::new().expect("create base dir");
    let local_file = base.path().join("notify.sh");
    fs::write(&local_file, "#!/bin/sh\n").expect("write local handler");
    let workspace =
        Workspace::create(base.path().join("cache"), Some(base.path())).expect("workspace");

    let descriptors = vec![
        HandlerDescriptor::new("notify", HandlerSource::Local { path: local_file }),
        HandlerDescriptor::new(
            "labels",
            HandlerSource::Remote(
                conductor_config::RemoteSpec::new("https://example.com/org/labels")
                    .with_revision("v1"),
            ),
        ),
    ];
    let git = FakeGit::default().with_file("handler", "#!/bin/sh\n");
    let mut acquirer = Acquirer::new(&workspace, &git);
    let stager = Stager::new(workspace.handlers_root());
    let registry = HandlerRegistry::build(&descriptors, &mut acquirer, &stager).expect("build");

    let executor = ScriptedExecutor::default()
        .with_unit("notify", &["handle_push"])
        .with_unit("labels", &["handle_push"])
        .replying("notify", InvokeOutcome::ok(json!({ "sent": true })));
    let mut dispatcher = Dispatcher::new(registry, &executor);
    dispatcher
        .dispatch(&push_to_main(), None, None)
        .expect("dispatch");

    assert_eq!(executor.invoked(), ["notify", "labels"]);
    let second = executor
        .invocations()
        .into_iter()
        .nth(1)
        .expect("second invocation");
    assert_eq!(
        second.context["responses"],
        json!([{ "name": "notify", "response": { "sent": true } }])
    );
    assert_eq!(second.function, "handle_push");
    let responses = dispatcher.into_responses();
    assert_eq!(responses.last_for("labels"), Ok(&DispatchResult::Empty));
    workspace.close().expect("close workspace");
}

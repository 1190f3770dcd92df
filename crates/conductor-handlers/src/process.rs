//! Process-based execution of handler units.
//!
//! [`ProcessExecutor`] implements [`UnitExecutor`] by starting the staged
//! unit as a short-lived child process for every request. The request is
//! written to stdin as one JSON line and stdin is closed. The child may print
//! freely; its final non-empty stdout line is the response. Earlier stdout
//! lines and all of stderr are forwarded to the log under the handler's name.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::thread;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::error::UnitError;
use crate::loader::StagedUnit;
use crate::protocol::{InvokeOutcome, UnitDescription, UnitRequest};
use crate::runner::UnitExecutor;

/// Tracing target for unit process operations.
const PROCESS_TARGET: &str = "conductor_handlers::process";

/// Environment variable carrying the handler's logical name.
pub const HANDLER_NAME_ENV: &str = "CONDUCTOR_HANDLER_NAME";

/// Environment variable carrying the handler's staged path.
pub const HANDLER_ROOT_ENV: &str = "CONDUCTOR_HANDLER_ROOT";

/// Runs handler units as child processes in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    workdir: PathBuf,
}

impl ProcessExecutor {
    /// Creates an executor whose children run in `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Working directory of every child.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn exchange(&self, unit: &StagedUnit, request: &UnitRequest<'_>) -> Result<Reply, UnitError> {
        let name = unit.name();
        let mut payload =
            serde_json::to_vec(request).map_err(|source| UnitError::SerializeRequest {
                name: name.to_owned(),
                source,
            })?;
        payload.push(b'\n');

        debug!(
            target: PROCESS_TARGET,
            handler = name,
            program = %unit.program().display(),
            request_bytes = payload.len(),
            "starting handler unit"
        );
        let mut child = Command::new(unit.program())
            .args(unit.args())
            .current_dir(&self.workdir)
            .env(HANDLER_NAME_ENV, name)
            .env(HANDLER_ROOT_ENV, unit.root())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| UnitError::Spawn {
                name: name.to_owned(),
                source: Arc::new(err),
            })?;

        let stdin = child.stdin.take();
        let (written, waited) = thread::scope(|scope| {
            let writer = scope.spawn(move || write_request(stdin, &payload));
            let waited = child.wait_with_output();
            (writer.join(), waited)
        });
        let output = waited.map_err(|err| io_error(name, err))?;
        match written {
            Ok(result) => result.map_err(|err| io_error(name, err))?,
            Err(_) => {
                return Err(io_error(
                    name,
                    io::Error::other("request writer thread panicked"),
                ));
            }
        }
        Ok(Reply::from_output(name, &output))
    }
}

impl UnitExecutor for ProcessExecutor {
    fn describe(&self, unit: &StagedUnit) -> Result<UnitDescription, UnitError> {
        let reply = self.exchange(unit, &UnitRequest::Describe)?;
        if !reply.success {
            return Err(reply.non_zero_exit(unit.name()));
        }
        reply.parse(unit.name())
    }

    fn invoke(
        &self,
        unit: &StagedUnit,
        function: &str,
        context: &RunContext<'_>,
    ) -> Result<InvokeOutcome, UnitError> {
        let reply = self.exchange(unit, &UnitRequest::Invoke { function, context })?;
        if reply.success {
            return reply.parse(unit.name());
        }
        match reply.parse::<InvokeOutcome>(unit.name()) {
            Ok(outcome @ (InvokeOutcome::Failure { .. } | InvokeOutcome::Cancel { .. })) => {
                Ok(outcome)
            }
            _ => Err(reply.non_zero_exit(unit.name())),
        }
    }
}

/// What a finished child left behind.
struct Reply {
    success: bool,
    status: i32,
    response: Option<String>,
}

impl Reply {
    fn from_output(name: &str, output: &Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines: Vec<&str> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let response = lines.pop().map(str::to_owned);
        for line in lines {
            info!(target: PROCESS_TARGET, handler = name, stream = "stdout", "{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                info!(target: PROCESS_TARGET, handler = name, stream = "stderr", "{line}");
            }
        }
        debug!(
            target: PROCESS_TARGET,
            handler = name,
            status = ?output.status,
            "handler unit exited"
        );
        Self {
            success: output.status.success(),
            status: output.status.code().unwrap_or(-1),
            response,
        }
    }

    fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, UnitError> {
        let line = self.response.as_deref().ok_or_else(|| UnitError::NoResponse {
            name: name.to_owned(),
        })?;
        serde_json::from_str(line).map_err(|err| UnitError::InvalidResponse {
            name: name.to_owned(),
            message: err.to_string(),
        })
    }

    fn non_zero_exit(&self, name: &str) -> UnitError {
        UnitError::NonZeroExit {
            name: name.to_owned(),
            status: self.status,
        }
    }
}

/// Writes the request and closes stdin. A child that exits without reading
/// its input is not an error.
fn write_request(stdin: Option<impl Write>, payload: &[u8]) -> io::Result<()> {
    let Some(mut pipe) = stdin else {
        return Ok(());
    };
    match pipe.write_all(payload).and_then(|()| pipe.flush()) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn io_error(name: &str, err: io::Error) -> UnitError {
    UnitError::Io {
        name: name.to_owned(),
        source: Arc::new(err),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use rstest::{fixture, rstest};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::*;
    use crate::context::{EventFacts, RunSettings};
    use crate::response::ResponseLog;

    struct Scripts {
        dir: TempDir,
    }

    #[fixture]
    fn scripts() -> Scripts {
        Scripts {
            dir: TempDir::new().expect("script dir"),
        }
    }

    impl Scripts {
        fn unit(&self, name: &str, body: &str) -> StagedUnit {
            let path = self.dir.path().join(format!("{name}.sh"));
            fs::write(&path, body).expect("write script");
            StagedUnit::new(name, &path, "/bin/sh")
                .with_args([&path])
        }

        fn executor(&self) -> ProcessExecutor {
            ProcessExecutor::new(self.dir.path())
        }
    }

    fn invoke(executor: &ProcessExecutor, unit: &StagedUnit) -> Result<InvokeOutcome, UnitError> {
        let run = RunSettings {
            facts: EventFacts::new("push").with_ref("refs/heads/main"),
            ..RunSettings::default()
        };
        let responses = ResponseLog::new();
        let context = RunContext::new(unit.name(), unit.root(), &run, &responses);
        executor.invoke(unit, "handle_push", &context)
    }

    #[rstest]
    fn describe_reads_the_final_line(scripts: Scripts) {
        let unit = scripts.unit(
            "lint",
            "cat >/dev/null\necho 'warming up'\necho '{\"functions\":[\"handle_push\"]}'\n",
        );
        let description = scripts.executor().describe(&unit).expect("describe");
        assert!(description.has_function("handle_push"));
    }

    #[rstest]
    fn units_see_their_identity(scripts: Scripts) {
        let unit = scripts.unit(
            "whoami",
            "cat >/dev/null\nprintf '{\"functions\":[\"%s\"]}\\n' \"$CONDUCTOR_HANDLER_NAME\"\n",
        );
        let description = scripts.executor().describe(&unit).expect("describe");
        assert!(description.has_function("whoami"));
    }

    #[rstest]
    fn invoke_sends_function_and_context(scripts: Scripts) {
        let unit = scripts.unit(
            "echoer",
            "cat > request.json\necho '{\"status\":\"ok\",\"result\":{\"done\":true}}'\n",
        );
        let outcome = invoke(&scripts.executor(), &unit).expect("invoke");
        assert_eq!(outcome, InvokeOutcome::ok(json!({ "done": true })));

        let request: Value = serde_json::from_str(
            &fs::read_to_string(scripts.dir.path().join("request.json")).expect("request"),
        )
        .expect("request json");
        assert_eq!(request["kind"], json!("invoke"));
        assert_eq!(request["function"], json!("handle_push"));
        assert_eq!(request["context"]["handler"]["name"], json!("echoer"));
        assert_eq!(request["context"]["event"]["branch"], json!("main"));
    }

    #[rstest]
    fn failure_response_survives_non_zero_exit(scripts: Scripts) {
        let unit = scripts.unit(
            "fails",
            "cat >/dev/null\necho '{\"status\":\"failure\",\"message\":\"bad config\"}'\nexit 1\n",
        );
        let outcome = invoke(&scripts.executor(), &unit).expect("invoke");
        assert_eq!(outcome, InvokeOutcome::failure("bad config"));
    }

    #[rstest]
    #[case::silent("exit 2\n", 2)]
    #[case::ok_then_crash("echo '{\"status\":\"ok\"}'\nexit 4\n", 4)]
    fn non_zero_exit_without_failure_is_an_error(
        scripts: Scripts,
        #[case] body: &str,
        #[case] expected: i32,
    ) {
        let unit = scripts.unit("crash", body);
        let err = invoke(&scripts.executor(), &unit).expect_err("should fail");
        assert!(matches!(err, UnitError::NonZeroExit { status, .. } if status == expected));
    }

    #[rstest]
    fn invalid_final_line_is_rejected(scripts: Scripts) {
        let unit = scripts.unit("garbled", "cat >/dev/null\necho 'not json'\n");
        let err = scripts.executor().describe(&unit).expect_err("should fail");
        assert!(matches!(err, UnitError::InvalidResponse { .. }));
    }

    #[rstest]
    fn silent_success_has_no_response(scripts: Scripts) {
        let unit = scripts.unit("quiet", "cat >/dev/null\n");
        let err = invoke(&scripts.executor(), &unit).expect_err("should fail");
        assert!(matches!(err, UnitError::NoResponse { .. }));
    }

    #[rstest]
    fn missing_program_is_a_spawn_error(scripts: Scripts) {
        let unit = StagedUnit::new("ghost", scripts.dir.path(), "/nonexistent/conductor-unit");
        let err = scripts.executor().describe(&unit).expect_err("should fail");
        assert!(matches!(err, UnitError::Spawn { .. }));
    }

    #[rstest]
    fn units_may_ignore_their_input(scripts: Scripts) {
        let unit = scripts.unit("deaf", "echo '{\"functions\":[]}'\n");
        let description = scripts.executor().describe(&unit).expect("describe");
        assert!(!description.has_function("handle_push"));
    }
}

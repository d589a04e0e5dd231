//! Runs editor buffers as programs in a fresh interpreter process.
//! （在全新的直譯器程序中執行編輯器內容。）

use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use shellpad_core::{ConsoleTarget, LoopProxy};
use tracing::{debug, info};

use crate::{run_captured, RunError, RunResult, RunSpec};

/// Exit status the Python driver uses after reporting an exception.
pub const DRIVER_EXIT_CODE: i32 = 86;

/// Prefix of the stderr record holding the exception text.
pub const DRIVER_ERROR_MARKER: &str = "[shellpad:error]";

/// Reads the buffer from stdin and runs it with fresh globals. An uncaught
/// `Exception` is reported as `str(e)` after the marker; `SystemExit` and
/// other `BaseException`s keep their own exit status.
const PYTHON_DRIVER: &str = r#"import sys
_shellpad_source = sys.stdin.read()
try:
    exec(_shellpad_source, {})
except Exception as _shellpad_error:
    sys.stdout.flush()
    sys.stderr.write("\n[shellpad:error]" + str(_shellpad_error))
    sys.stderr.flush()
    sys.exit(86)
"#;

/// 直譯器接收程式碼的方式。 / How the interpreter receives a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunProtocol {
    /// `<program> <args...> -c <driver>`, buffer on stdin; exceptions come
    /// back as `Error: <message>`.
    #[default]
    Python,
    /// `<program> <args...>`, buffer on stdin as-is. Failures are described
    /// from the exit status and the last stderr line.
    Stdin,
}

/// Platform default interpreter program.
pub fn default_program() -> String {
    if cfg!(windows) { "python" } else { "python3" }.to_string()
}

/// Interpreter used for runs and package installs.
/// （執行程式與安裝套件時使用的直譯器。）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterSpec {
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra interpreter arguments placed before the program text.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub protocol: RunProtocol,
}

impl Default for InterpreterSpec {
    fn default() -> Self {
        Self::new(default_program(), Vec::<String>::new())
    }
}

impl InterpreterSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            protocol: RunProtocol::default(),
        }
    }

    pub fn with_protocol(mut self, protocol: RunProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Falls back to the platform default when the program is blank.
    pub fn sanitize(&mut self) {
        if self.program.trim().is_empty() {
            self.program = default_program();
        }
    }

    /// Command that executes `source` fed through stdin.
    pub fn run_spec(&self, source: &str) -> RunSpec {
        let mut args = self.args.clone();
        if self.protocol == RunProtocol::Python {
            args.extend(["-c".to_string(), PYTHON_DRIVER.to_string()]);
        }
        RunSpec::new(&self.program, args).with_stdin(source)
    }

    /// `<interpreter> -m pip install <packages...>`; Python-protocol
    /// arguments are kept as interpreter flags.
    pub fn pip_install_spec(&self, packages: &[String]) -> RunSpec {
        let flags = match self.protocol {
            RunProtocol::Python => self.args.as_slice(),
            RunProtocol::Stdin => &[],
        };
        let args = flags
            .iter()
            .cloned()
            .chain(["-m", "pip", "install"].into_iter().map(str::to_string))
            .chain(packages.iter().cloned());
        RunSpec::new(&self.program, args)
    }
}

/// Outcome of one run, consumed once by the presentation thread.
/// （單次執行的結果，只會被呈現執行緒取用一次。）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    Completed { stdout: String, stderr: String },
    /// `stdout` holds whatever the program printed before failing.
    Failed { stdout: String, error: String },
}

impl ExecutionResult {
    /// Classifies a finished process.
    pub fn from_run(result: &RunResult) -> Self {
        let stdout = result.stdout_text();
        if result.success() {
            return ExecutionResult::Completed {
                stdout,
                stderr: result.stderr_text(),
            };
        }
        let stderr = result.stderr_text();
        let description = match result.exit_code {
            Some(DRIVER_EXIT_CODE) if stderr.contains(DRIVER_ERROR_MARKER) => {
                driver_message(&stderr).to_string()
            }
            Some(code) => last_line(&stderr)
                .map(str::to_string)
                .unwrap_or_else(|| format!("process exited with code {code}")),
            None => "terminated by signal".to_string(),
        };
        ExecutionResult::Failed {
            stdout,
            error: format!("Error: {description}"),
        }
    }

    /// A run that never got to execute the program.
    pub fn from_error(err: &RunError) -> Self {
        ExecutionResult::Failed {
            stdout: String::new(),
            error: format!("Error: {err}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Completed { .. })
    }

    /// stdout followed by stderr, or by the error line.
    pub fn console_text(&self) -> String {
        match self {
            ExecutionResult::Completed { stdout, stderr } => format!("{stdout}{stderr}"),
            ExecutionResult::Failed { stdout, error } => format!("{stdout}{error}\n"),
        }
    }
}

/// Exception text the driver wrote after its marker; earlier stderr output
/// of the failed program is dropped.
fn driver_message(stderr: &str) -> &str {
    match stderr.rfind(DRIVER_ERROR_MARKER) {
        Some(at) => &stderr[at + DRIVER_ERROR_MARKER.len()..],
        None => stderr,
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).last()
}

/// Runs source text off the presentation thread, one worker per run.
/// （每次執行都在獨立的背景工作者上進行。）
#[derive(Clone, Debug, Default)]
pub struct ExecutionEngine {
    interpreter: InterpreterSpec,
}

impl ExecutionEngine {
    pub fn new(interpreter: InterpreterSpec) -> Self {
        Self { interpreter }
    }

    /// Executes `source` synchronously in a fresh interpreter process.
    pub fn execute(&self, source: &str) -> ExecutionResult {
        let spec = self.interpreter.run_spec(source);
        match run_captured(&spec) {
            Ok(result) => {
                debug!(exit_code = ?result.exit_code, duration_ms = result.duration_ms as u64, "run finished");
                ExecutionResult::from_run(&result)
            }
            Err(err) => {
                debug!(error = %err, "run could not start");
                ExecutionResult::from_error(&err)
            }
        }
    }

    /// Starts a worker that runs `source` and appends its output to the
    /// console on the presentation loop. Returns immediately.
    pub fn run<S>(&self, source: impl Into<String>, proxy: LoopProxy<S>) -> Result<JoinHandle<()>, RunError>
    where
        S: ConsoleTarget + 'static,
    {
        self.spawn_with(source, move |result| {
            let text = result.console_text();
            proxy.call_soon(move |state: &mut S| state.console().append(&text));
        })
    }

    /// Starts a worker that runs `source` and hands the result to `on_done`
    /// on the worker thread.
    pub fn spawn_with<F>(&self, source: impl Into<String>, on_done: F) -> Result<JoinHandle<()>, RunError>
    where
        F: FnOnce(ExecutionResult) + Send + 'static,
    {
        let source = source.into();
        let engine = self.clone();
        info!(bytes = source.len(), interpreter = %self.interpreter.program, "starting run");
        thread::Builder::new()
            .name("shellpad-run".into())
            .spawn(move || on_done(engine.execute(&source)))
            .map_err(RunError::Worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellpad_core::{ConsoleLog, LoopQueue};

    fn shell_engine() -> ExecutionEngine {
        ExecutionEngine::new(InterpreterSpec::new("sh", ["-s"]).with_protocol(RunProtocol::Stdin))
    }

    fn finish(queue: &LoopQueue<ConsoleLog>, handle: JoinHandle<()>) -> ConsoleLog {
        handle.join().expect("worker should not panic");
        let mut log = ConsoleLog::new();
        queue.drain(&mut log);
        log
    }

    #[test]
    fn default_interpreter_wraps_buffer_in_driver() {
        let spec = InterpreterSpec::default().run_spec("print(2+2)");
        assert_eq!(spec.program, default_program());
        assert_eq!(spec.args, ["-c", PYTHON_DRIVER]);
        assert_eq!(spec.stdin.as_deref(), Some("print(2+2)"));
        assert!(PYTHON_DRIVER.contains(DRIVER_ERROR_MARKER));
        assert!(PYTHON_DRIVER.contains(&format!("sys.exit({DRIVER_EXIT_CODE})")));
    }

    #[test]
    fn stdin_protocol_passes_buffer_untouched() {
        let spec = InterpreterSpec::new("sh", ["-s"])
            .with_protocol(RunProtocol::Stdin)
            .run_spec("echo hi");
        assert_eq!(spec.argv(), ["sh", "-s"]);
        assert_eq!(spec.stdin.as_deref(), Some("echo hi"));
    }

    #[test]
    fn pip_install_spec_has_fixed_argv_shape() {
        let interpreter = InterpreterSpec::new("/usr/bin/python3", ["-I"]);
        let spec = interpreter.pip_install_spec(&["requests".into(), "numpy".into()]);
        assert_eq!(
            spec.argv(),
            ["/usr/bin/python3", "-I", "-m", "pip", "install", "requests", "numpy"]
        );
        assert!(spec.stdin.is_none());

        let piped = InterpreterSpec::new("sh", ["-s"]).with_protocol(RunProtocol::Stdin);
        assert_eq!(
            piped.pip_install_spec(&["x".into()]).argv(),
            ["sh", "-m", "pip", "install", "x"]
        );
    }

    #[test]
    fn driver_record_becomes_error_message() {
        let result = RunResult {
            exit_code: Some(DRIVER_EXIT_CODE),
            stdout: b"before\n".to_vec(),
            stderr: b"warning: noise\n\n[shellpad:error]line one\nline two".to_vec(),
            duration_ms: 2,
        };
        assert_eq!(
            ExecutionResult::from_run(&result).console_text(),
            "before\nError: line one\nline two\n"
        );
    }

    #[test]
    fn driver_exit_code_without_marker_uses_stderr() {
        let result = RunResult {
            exit_code: Some(DRIVER_EXIT_CODE),
            stdout: Vec::new(),
            stderr: b"custom exit\n".to_vec(),
            duration_ms: 0,
        };
        assert_eq!(
            ExecutionResult::from_run(&result).console_text(),
            "Error: custom exit\n"
        );
    }

    #[test]
    fn failed_run_takes_last_stderr_line() {
        let result = RunResult {
            exit_code: Some(1),
            stdout: b"before\n".to_vec(),
            stderr: b"Traceback (most recent call last):\n  File \"<stdin>\", line 1\nValueError: x\n\n".to_vec(),
            duration_ms: 3,
        };
        let outcome = ExecutionResult::from_run(&result);
        assert_eq!(
            outcome,
            ExecutionResult::Failed {
                stdout: "before\n".into(),
                error: "Error: ValueError: x".into()
            }
        );
        assert_eq!(outcome.console_text(), "before\nError: ValueError: x\n");
    }

    #[test]
    fn failure_without_stderr_or_exit_code_is_described() {
        let mut result = RunResult {
            exit_code: Some(3),
            stdout: Vec::new(),
            stderr: Vec::new(),
            duration_ms: 0,
        };
        assert_eq!(
            ExecutionResult::from_run(&result).console_text(),
            "Error: process exited with code 3\n"
        );
        result.exit_code = None;
        assert_eq!(
            ExecutionResult::from_run(&result).console_text(),
            "Error: terminated by signal\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_appends_stdout_to_console() {
        let queue = LoopQueue::new();
        let handle = shell_engine().run("echo 4", queue.proxy()).unwrap();
        let log = finish(&queue, handle);
        assert_eq!(log.text(), "\n4\n");
        assert!(log.text().ends_with("4\n"));
    }

    #[cfg(unix)]
    #[test]
    fn run_puts_stderr_after_stdout() {
        let queue = LoopQueue::new();
        let handle = shell_engine()
            .run("echo warn >&2; echo out", queue.proxy())
            .unwrap();
        let log = finish(&queue, handle);
        assert_eq!(log.text(), "\nout\nwarn\n");
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_becomes_error_line() {
        let queue = LoopQueue::new();
        let handle = shell_engine()
            .run("echo partial; echo 'ValueError: x' >&2; exit 1", queue.proxy())
            .unwrap();
        let log = finish(&queue, handle);
        assert_eq!(log.text(), "\npartial\nError: ValueError: x\n");
    }

    #[cfg(unix)]
    #[test]
    fn each_run_gets_a_fresh_interpreter() {
        let engine = shell_engine();
        assert!(engine.execute("SHELLPAD_STATE=1; echo set").is_success());
        let second = engine.execute("echo ${SHELLPAD_STATE:-unset}");
        assert_eq!(second.console_text(), "unset\n");
    }

    #[test]
    fn missing_interpreter_is_reported_not_raised() {
        let engine = ExecutionEngine::new(InterpreterSpec::new(
            "shellpad-missing-interpreter",
            Vec::<String>::new(),
        ));
        let outcome = engine.execute("print(1)");
        assert!(!outcome.is_success());
        assert!(outcome
            .console_text()
            .starts_with("Error: failed to spawn process:"));
    }

    #[cfg(unix)]
    #[test]
    fn run_returns_before_the_program_finishes() {
        let queue = LoopQueue::new();
        let handle = shell_engine()
            .run("sleep 1; echo late", queue.proxy())
            .unwrap();
        let mut log = ConsoleLog::new();
        assert_eq!(queue.drain(&mut log), 0);
        handle.join().unwrap();
        assert_eq!(queue.drain(&mut log), 1);
        assert_eq!(log.text(), "\nlate\n");
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_runs_deliver_in_completion_order() {
        let engine = shell_engine();
        let queue = LoopQueue::new();
        let slow = engine.run("sleep 1; echo slow", queue.proxy()).unwrap();
        let fast = engine.run("echo fast", queue.proxy()).unwrap();
        fast.join().unwrap();
        slow.join().unwrap();

        let mut log = ConsoleLog::new();
        assert_eq!(queue.drain(&mut log), 2);
        assert_eq!(log.text(), "\nfast\n\nslow\n");
    }

    mod with_python {
        use crate::engine::{ExecutionEngine, ExecutionResult};
        use std::process::{Command, Stdio};

        fn python_engine() -> Option<ExecutionEngine> {
            let engine = ExecutionEngine::default();
            let available = Command::new(&engine.interpreter.program)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            if !available {
                eprintln!("skipping: {} not found", engine.interpreter.program);
                return None;
            }
            Some(engine)
        }

        #[test]
        fn clean_program_prints_its_output() {
            let Some(engine) = python_engine() else { return };
            let outcome = engine.execute("print(2+2)");
            assert_eq!(outcome, ExecutionResult::Completed { stdout: "4\n".into(), stderr: String::new() });
        }

        #[test]
        fn exception_is_reported_by_message() {
            let Some(engine) = python_engine() else { return };
            assert_eq!(engine.execute("raise ValueError('x')").console_text(), "Error: x\n");
        }

        #[test]
        fn output_before_exception_is_kept() {
            let Some(engine) = python_engine() else { return };
            let text = engine
                .execute("print('before')\nraise RuntimeError('line one\\nline two')")
                .console_text();
            assert_eq!(text, "before\nError: line one\nline two\n");
        }

        #[test]
        fn syntax_error_is_one_error_line() {
            let Some(engine) = python_engine() else { return };
            let text = engine.execute("print(").console_text();
            assert!(text.starts_with("Error: "), "{text}");
            assert!(!text.contains("Traceback"), "{text}");
            assert_eq!(text.lines().count(), 1, "{text}");
        }

        #[test]
        fn runs_share_no_state() {
            let Some(engine) = python_engine() else { return };
            assert!(engine.execute("shared = 1").is_success());
            assert_eq!(
                engine.execute("print(shared)").console_text(),
                "Error: name 'shared' is not defined\n"
            );
        }

        #[test]
        fn sys_exit_falls_back_to_exit_status() {
            let Some(engine) = python_engine() else { return };
            assert_eq!(
                engine.execute("import sys\nsys.exit(3)").console_text(),
                "Error: process exited with code 3\n"
            );
        }
    }
}

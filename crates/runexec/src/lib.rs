//! Subprocess plumbing behind ShellPad's `run` and `install` commands.
//! （ShellPad「執行」與「安裝」指令所用的子程序處理。）
//!
//! [`run_captured`] starts one process described by a [`RunSpec`], feeds it
//! an optional stdin text, and waits for its exit status with stdout and
//! stderr captured separately. [`ExecutionEngine`] and [`PackageInstaller`]
//! call it from their own worker threads and report back through the
//! presentation loop.

pub mod engine;
pub mod installer;

use std::io::{self, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace, warn};

pub use engine::{default_program, ExecutionEngine, ExecutionResult, InterpreterSpec, RunProtocol};
pub use installer::{parse_packages, InstallError, InstallResult, PackageInstaller};

/// Reasons a process could not be started or observed to completion.
/// （無法啟動子程序或無法等待其結束的原因。）
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn process: {0}")]
    Spawn(io::Error),
    #[error("child stdin was not piped")]
    StdinUnavailable,
    #[error("failed to send program text: {0}")]
    Stdin(io::Error),
    #[error("failed to collect process output: {0}")]
    Output(io::Error),
    #[error("failed to start worker thread: {0}")]
    Worker(io::Error),
    #[error("stdin writer thread panicked")]
    StdinWriterPanicked,
}

/// One process invocation: argv and optional stdin text.
/// （一次子程序呼叫的描述。）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the child's stdin, which is then closed. `None` gives the
    /// child an empty stdin.
    pub stdin: Option<String>,
}

impl RunSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        argv
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

/// Exit status and both captured streams of a finished process.
/// （子程序結束後的狀態與輸出。）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u128,
}

impl RunResult {
    /// Exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Starts `spec` and blocks the calling thread until the process exits.
/// The host's own stdio is never shared with the child.
pub fn run_captured(spec: &RunSpec) -> Result<RunResult, RunError> {
    let started = Instant::now();
    let mut child = spec.command().spawn().map_err(RunError::Spawn)?;
    debug!(argv = ?spec.argv(), pid = child.id(), "spawned process");

    let feeder = match &spec.stdin {
        Some(text) => Some(feed_or_reap(&mut child, text.clone())?),
        None => None,
    };
    let output = child.wait_with_output().map_err(RunError::Output)?;
    if let Some(feeder) = feeder {
        match feeder.join() {
            Ok(Ok(())) => {}
            // The child exited without reading all of its input.
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {
                trace!("child closed stdin early");
            }
            Ok(Err(err)) => return Err(RunError::Stdin(err)),
            Err(_) => return Err(RunError::StdinWriterPanicked),
        }
    }

    Ok(RunResult {
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
        duration_ms: started.elapsed().as_millis(),
    })
}

/// Starts the stdin writer; if it cannot start, the child is killed and
/// waited on before the error is returned.
fn feed_or_reap(child: &mut Child, text: String) -> Result<JoinHandle<io::Result<()>>, RunError> {
    feed_stdin(child, text).map_err(|err| {
        warn!(error = %err, pid = child.id(), "stdin writer unavailable, killing child");
        let _ = child.kill();
        let _ = child.wait();
        err
    })
}

/// Writes stdin from a helper thread so a child that fills its output pipes
/// first cannot stall the writer.
fn feed_stdin(child: &mut Child, text: String) -> Result<JoinHandle<io::Result<()>>, RunError> {
    let mut stdin = child.stdin.take().ok_or(RunError::StdinUnavailable)?;
    thread::Builder::new()
        .name("shellpad-stdin".into())
        .spawn(move || {
            stdin.write_all(text.as_bytes())?;
            stdin.flush()
        })
        .map_err(RunError::Worker)
}

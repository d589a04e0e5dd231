//! Package installation through `<interpreter> -m pip install`.
//! （透過 `<直譯器> -m pip install` 安裝套件。）

use std::thread::{self, JoinHandle};

use shellpad_core::{ConsoleTarget, LoopProxy};
use thiserror::Error;
use tracing::{info, warn};

use crate::{run_captured, InterpreterSpec, RunError, RunResult};

/// Errors raised before any subprocess is started.
/// （在啟動子程序之前發生的錯誤。）
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Error: No packages entered for installation.")]
    NoPackages,
    #[error("Error during installation: {0}")]
    Worker(RunError),
}

/// Splits the package field into package names; empty input is rejected.
/// （將套件欄位拆成套件名稱；空白輸入會被拒絕。）
pub fn parse_packages(input: &str) -> Result<Vec<String>, InstallError> {
    let packages: Vec<String> = input.split_whitespace().map(str::to_string).collect();
    if packages.is_empty() {
        Err(InstallError::NoPackages)
    } else {
        Ok(packages)
    }
}

/// Outcome of a finished install process.
/// （安裝程序結束後的結果。）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallResult {
    pub succeeded: bool,
    /// Captured stdout on success, captured stderr on failure.
    pub output: String,
}

impl InstallResult {
    pub fn from_run(result: &RunResult) -> Self {
        if result.success() {
            Self {
                succeeded: true,
                output: result.stdout_text(),
            }
        } else {
            Self {
                succeeded: false,
                output: result.stderr_text(),
            }
        }
    }

    pub fn console_text(&self) -> String {
        if self.succeeded {
            format!("Installation succeeded:\n{}", self.output)
        } else {
            format!("Installation failed:\n{}", self.output)
        }
    }
}

/// Console line announcing an install about to start.
pub fn announce(packages: &[String]) -> String {
    format!("Installing packages: {}...", packages.join(", "))
}

/// Spawns the package manager on a background worker per request.
/// （每次請求都在背景工作者上啟動套件管理程式。）
#[derive(Clone, Debug, Default)]
pub struct PackageInstaller {
    interpreter: InterpreterSpec,
}

impl PackageInstaller {
    pub fn new(interpreter: InterpreterSpec) -> Self {
        Self { interpreter }
    }

    /// Runs the install synchronously and renders the console message.
    pub fn install_blocking(&self, packages: &[String]) -> String {
        let spec = self.interpreter.pip_install_spec(packages);
        match run_captured(&spec) {
            Ok(result) => {
                let outcome = InstallResult::from_run(&result);
                if !outcome.succeeded {
                    warn!(exit_code = ?result.exit_code, "package install failed");
                }
                outcome.console_text()
            }
            Err(err) => InstallError::Worker(err).to_string(),
        }
    }

    /// Starts a worker installing `packages`; its message is appended to the
    /// console on the presentation loop. An empty list never spawns.
    pub fn install<S>(&self, packages: Vec<String>, proxy: LoopProxy<S>) -> Result<JoinHandle<()>, InstallError>
    where
        S: ConsoleTarget + 'static,
    {
        if packages.is_empty() {
            return Err(InstallError::NoPackages);
        }
        info!(?packages, interpreter = %self.interpreter.program, "starting package install");
        let installer = self.clone();
        thread::Builder::new()
            .name("shellpad-install".into())
            .spawn(move || {
                let text = installer.install_blocking(&packages);
                proxy.call_soon(move |state: &mut S| state.console().append(&text));
            })
            .map_err(|err| InstallError::Worker(RunError::Worker(err)))
    }
}

use serde::{Deserialize, Serialize};
use shellpad_runexec::InterpreterSpec;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// ShellPad 設定檔內容。 / Contents of the ShellPad configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    /// Interpreter for `run` and `install`; shared with the execution engine.
    pub interpreter: InterpreterSpec,
    #[serde(default)]
    pub commands: CommandSettings,
    #[serde(default)]
    pub files: FileSettings,
    #[serde(default)]
    pub console: ConsoleSettings,
    #[serde(default, rename = "loop")]
    pub event_loop: LoopSettings,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            interpreter: InterpreterSpec::default(),
            commands: CommandSettings::default(),
            files: FileSettings::default(),
            console: ConsoleSettings::default(),
            event_loop: LoopSettings::default(),
        }
    }
}

impl ShellConfig {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        self.interpreter.sanitize();
        self.files.sanitize();
        self.console.sanitize();
        self.event_loop.sanitize();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Lowercase path arguments together with the command keyword.
    #[serde(default)]
    pub fold_arguments: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default = "default_suggested_filename")]
    pub suggested_filename: String,
    /// `open <path>` on a missing file opens an empty document bound to it.
    #[serde(default)]
    pub open_missing_creates_document: bool,
}

fn default_suggested_filename() -> String {
    "untitled.py".to_string()
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            suggested_filename: default_suggested_filename(),
            open_missing_creates_document: false,
        }
    }
}

impl FileSettings {
    fn sanitize(&mut self) {
        if self.suggested_filename.trim().is_empty() {
            self.suggested_filename = default_suggested_filename();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retained_bytes: Option<usize>,
}

impl ConsoleSettings {
    fn sanitize(&mut self) {
        if self.max_retained_bytes == Some(0) {
            self.max_retained_bytes = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSettings {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// How long to keep draining worker results after input closes.
    #[serde(default = "default_exit_grace_ms")]
    pub exit_grace_ms: u64,
}

fn default_tick_ms() -> u64 {
    25
}

fn default_exit_grace_ms() -> u64 {
    30_000
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            exit_grace_ms: default_exit_grace_ms(),
        }
    }
}

impl LoopSettings {
    fn sanitize(&mut self) {
        self.tick_ms = self.tick_ms.clamp(1, 1_000);
    }
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: ShellConfig,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: ShellConfig) -> Self {
        Self {
            path: path.into(),
            data: config,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!(path = %path.display(), "config file absent, using defaults");
            let mut data = ShellConfig::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: ShellConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.data
    }

    pub fn into_config(self) -> ShellConfig {
        self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), ConfigError>
    where
        F: FnMut(&mut ShellConfig),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload =
            serde_json::to_string_pretty(&self.data).map_err(|source| ConfigError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| ConfigError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

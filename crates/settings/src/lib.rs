pub mod config;

pub use config::{
    CommandSettings, ConfigError, ConfigStore, ConsoleSettings, FileSettings, LoopSettings,
    ShellConfig,
};
pub use shellpad_runexec::{InterpreterSpec, RunProtocol};

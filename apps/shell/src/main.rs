mod dialogs;
mod frontend;
mod workbench;

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use shellpad_core::LoopQueue;
use shellpad_settings::{ConfigStore, RunProtocol, ShellConfig};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::frontend::{Flow, Frontend};
use crate::workbench::Workbench;

const CONFIG_FILE: &str = "shellpad.json";

#[derive(Parser)]
#[command(
    name = "shellpad",
    about = "Multi-document scratchpad with a command console",
    author,
    version
)]
struct Cli {
    /// 啟動時開啟的檔案。 / Files opened after the initial empty document.
    files: Vec<PathBuf>,

    /// 設定檔路徑；預設為目前目錄的 shellpad.json。 / Configuration file (defaults to ./shellpad.json).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 覆寫執行程式碼所用的直譯器。 / Interpreter program used by `run` and `install`.
    #[arg(long, value_name = "PROGRAM")]
    interpreter: Option<String>,

    /// 直譯器引數，可重複指定。 / Interpreter argument; repeat for several.
    #[arg(long = "interpreter-arg", value_name = "ARG", allow_hyphen_values = true)]
    interpreter_args: Vec<String>,

    /// 程式碼傳給直譯器的方式。 / How the buffer reaches the interpreter.
    #[arg(long, value_enum, value_name = "PROTOCOL")]
    protocol: Option<ProtocolChoice>,

    /// 套件欄位的初始內容。 / Initial contents of the package field.
    #[arg(long, value_name = "NAMES")]
    packages: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProtocolChoice {
    /// Python driver; exceptions become `Error: <message>`.
    #[value(alias = "py")]
    Python,
    /// Buffer piped to the interpreter's stdin as-is.
    #[value(alias = "raw")]
    Stdin,
}

impl From<ProtocolChoice> for RunProtocol {
    fn from(choice: ProtocolChoice) -> Self {
        match choice {
            ProtocolChoice::Python => RunProtocol::Python,
            ProtocolChoice::Stdin => RunProtocol::Stdin,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SHELLPAD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ShellConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let store = ConfigStore::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    let mut config = store.into_config();
    if let Some(program) = &cli.interpreter {
        config.interpreter.program = program.clone();
    }
    if !cli.interpreter_args.is_empty() {
        config.interpreter.args = cli.interpreter_args.clone();
    }
    if let Some(protocol) = cli.protocol {
        config.interpreter.protocol = protocol.into();
    }
    config.sanitize();
    Ok(config)
}

/// Forwards stdin lines to the loop; the channel closes at end of input.
fn spawn_input_reader() -> Result<Receiver<String>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("shellpad-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line.trim_end_matches('\r').to_string()).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "stopped reading input");
                        break;
                    }
                }
            }
        })
        .context("failed to start input thread")?;
    Ok(receiver)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = load_config(&cli)?;
    info!(
        interpreter = %config.interpreter.program,
        protocol = ?config.interpreter.protocol,
        "starting shellpad"
    );

    let queue: LoopQueue<Workbench> = LoopQueue::new();
    let mut bench = Workbench::new(&config, queue.proxy());
    for path in &cli.files {
        bench.open_path(path);
    }
    if let Some(packages) = &cli.packages {
        bench.set_package_field(packages.clone());
    }

    let stdout = io::stdout();
    let terminal_title = stdout.is_terminal();
    let mut frontend = Frontend::new(stdout.lock(), terminal_title);
    frontend.present(&mut bench)?;

    let lines = spawn_input_reader()?;
    let tick = Duration::from_millis(config.event_loop.tick_ms);
    loop {
        queue.drain(&mut bench);
        frontend.present(&mut bench)?;
        match lines.recv_timeout(tick) {
            Ok(line) => {
                if frontend.handle_line(&mut bench, &line, &lines)? == Flow::Quit {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("input closed");
                break;
            }
        }
    }

    let grace = Duration::from_millis(config.event_loop.exit_grace_ms);
    let deadline = Instant::now() + grace;
    while bench.in_flight() > 0 && Instant::now() < deadline {
        queue.wait_and_drain(&mut bench, tick);
        frontend.present(&mut bench)?;
    }
    queue.drain(&mut bench);
    let abandoned = bench.in_flight();
    if abandoned > 0 {
        warn!(abandoned, "exiting with workers still running");
    }
    frontend.finish(&mut bench)?;
    Ok(())
}

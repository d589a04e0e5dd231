use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use shellpad_cmdline::{parse_line, CaseFolding, Command, HELP_TEXT, UNKNOWN_HINT};
use shellpad_core::{ConsoleLog, ConsoleTarget, Document, DocumentError, DocumentStore, LoopProxy};
use shellpad_runexec::installer::announce;
use shellpad_runexec::{parse_packages, ExecutionEngine, ExecutionResult, PackageInstaller};
use shellpad_settings::{FileSettings, ShellConfig};
use tracing::{debug, info};

use crate::dialogs::FileDialogs;

/// State owned by the presentation loop: open documents, the console, the
/// package field, and the workers started from here.
pub struct Workbench {
    store: DocumentStore,
    console: ConsoleLog,
    engine: ExecutionEngine,
    installer: PackageInstaller,
    package_field: String,
    folding: CaseFolding,
    files: FileSettings,
    proxy: LoopProxy<Workbench>,
    workers: Vec<JoinHandle<()>>,
}

impl ConsoleTarget for Workbench {
    fn console(&mut self) -> &mut ConsoleLog {
        &mut self.console
    }
}

impl Workbench {
    pub fn new(config: &ShellConfig, proxy: LoopProxy<Workbench>) -> Self {
        let folding = if config.commands.fold_arguments {
            CaseFolding::WholeLine
        } else {
            CaseFolding::KeywordOnly
        };
        let mut console = ConsoleLog::with_retention(config.console.max_retained_bytes);
        console.replace("New file created.");
        Self {
            store: DocumentStore::new(),
            console,
            engine: ExecutionEngine::new(config.interpreter.clone()),
            installer: PackageInstaller::new(config.interpreter.clone()),
            package_field: String::new(),
            folding,
            files: config.files.clone(),
            proxy,
            workers: Vec::new(),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    pub fn console_log(&self) -> &ConsoleLog {
        &self.console
    }

    pub fn set_package_field(&mut self, value: impl Into<String>) {
        self.package_field = value.into();
    }

    /// Replaces the active buffer, as typing into the editor would.
    pub fn set_active_contents(&mut self, text: impl Into<String>) {
        self.store.active_mut().set_contents(text);
    }

    /// Workers whose result has not been scheduled yet.
    pub fn in_flight(&mut self) -> usize {
        self.prune_workers();
        self.workers.len()
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.prune_workers();
        self.workers.push(handle);
    }

    fn prune_workers(&mut self) {
        self.workers.retain(|handle| !handle.is_finished());
    }

    /// Parses one console line, echoes it, and carries it out.
    pub fn dispatch(&mut self, raw: &str, dialogs: &mut dyn FileDialogs) {
        let parsed = parse_line(raw, self.folding);
        self.console.append(&parsed.echo());
        debug!(command = ?parsed.command, "dispatching console command");

        if let Err(err) = parsed.command.check() {
            self.console.append(&err.to_string());
            self.console.append(UNKNOWN_HINT);
            return;
        }
        match parsed.command {
            Command::Run => self.run_active(),
            Command::Save => self.save(dialogs),
            Command::New => self.new_file(),
            Command::Close => self.close_active(),
            Command::Install => self.install(),
            Command::SaveAs(path) => self.save_to(path),
            Command::Open(path) => self.open_path(&path),
            Command::Help => self.console.append(HELP_TEXT),
            Command::Unknown(_) => {}
        }
    }

    pub fn new_file(&mut self) {
        self.store.create_document();
        self.console.append("New file created.");
    }

    pub fn open_path(&mut self, path: &Path) {
        match Document::open(path) {
            Ok(document) => {
                self.store.open_document(path, document.into_contents());
                self.console.append(&format!("File opened: {}", path.display()));
            }
            Err(DocumentError::Io(err))
                if err.kind() == io::ErrorKind::NotFound
                    && self.files.open_missing_creates_document =>
            {
                self.store.open_document(path, String::new());
                self.console.append(&format!("File opened: {}", path.display()));
            }
            Err(err) => {
                self.console
                    .append(&format!("Error opening file {}: {err}", path.display()));
            }
        }
    }

    /// The "Open" button: asks the dialog for a path. Cancelling does nothing.
    pub fn open_with_dialog(&mut self, dialogs: &mut dyn FileDialogs) {
        if let Some(path) = dialogs.open_file() {
            self.open_path(&path);
        }
    }

    fn save(&mut self, dialogs: &mut dyn FileDialogs) {
        let path = match self.store.active().path() {
            Some(path) => path.to_path_buf(),
            None => match dialogs.save_file(&self.files.suggested_filename) {
                Some(path) => path,
                None => return,
            },
        };
        self.save_to(path);
    }

    fn save_to(&mut self, path: PathBuf) {
        match self.store.save_active_as(&path) {
            Ok(()) => self.console.append(&format!("File saved: {}", path.display())),
            Err(err) => self.console.append(&format!("Error saving file: {err}")),
        }
    }

    fn close_active(&mut self) {
        match self.store.close_document(self.store.active_index()) {
            Ok(()) => self.console.append("File closed."),
            Err(_) => self
                .console
                .append("Cannot close the last tab. Create a new file first."),
        }
    }

    /// Activates a tab; out-of-range indices only produce a diagnostic.
    pub fn switch_tab(&mut self, index: usize) {
        if let Err(err) = self.store.set_active(index) {
            self.console.append(&format!("Error: {err}"));
        }
    }

    fn run_active(&mut self) {
        self.console.append("Running code...");
        let source = self.store.active().contents().to_string();
        match self.engine.run(source, self.proxy.clone()) {
            Ok(handle) => self.track(handle),
            Err(err) => self
                .console
                .append(&ExecutionResult::from_error(&err).console_text()),
        }
    }

    fn install(&mut self) {
        let packages = match parse_packages(&self.package_field) {
            Ok(packages) => packages,
            Err(err) => {
                self.console.append(&err.to_string());
                return;
            }
        };
        self.console.append(&announce(&packages));
        info!(count = packages.len(), "install requested");
        match self.installer.install(packages, self.proxy.clone()) {
            Ok(handle) => self.track(handle),
            Err(err) => self.console.append(&err.to_string()),
        }
    }
}

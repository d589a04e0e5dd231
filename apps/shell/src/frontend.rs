//! 終端機呈現層：指令列、編輯指令與主控台輸出。
//! Terminal presentation: directives standing in for widgets, console
//! rendering, and title refreshes.

use std::io::{self, Write};
use std::sync::mpsc::Receiver;

use shellpad_core::{ConsoleLog, ConsoleTarget};
use tracing::debug;

use crate::dialogs::LineDialogs;
use crate::workbench::Workbench;

/// 前端指令（以冒號開頭）。 / Front-end directives, written with a leading `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Edit,
    Open,
    Show,
    Tabs,
    Tab(String),
    Packages(String),
    Quit,
    Unknown(String),
}

impl Directive {
    /// Returns `None` for lines meant for the command dispatcher.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(':')?;
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        let directive = match name.to_ascii_lowercase().as_str() {
            "edit" => Directive::Edit,
            "open" => Directive::Open,
            "show" => Directive::Show,
            "tabs" => Directive::Tabs,
            "tab" => Directive::Tab(argument.to_string()),
            "packages" => Directive::Packages(argument.to_string()),
            "quit" | "q" => Directive::Quit,
            _ => Directive::Unknown(rest.to_string()),
        };
        Some(directive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 只輸出主控台新增的部分。 / Prints console growth; a replace re-prints the whole buffer.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    generation: u64,
    /// Absolute offset already printed, counting bytes the cap dropped.
    printed: usize,
}

impl ConsoleRenderer {
    pub fn render(&mut self, log: &ConsoleLog, out: &mut impl Write) -> io::Result<bool> {
        let text = log.text();
        let start = if log.generation() != self.generation {
            self.generation = log.generation();
            0
        } else {
            self.printed.saturating_sub(log.trimmed())
        };
        self.printed = log.trimmed() + text.len();
        match text.get(start..) {
            Some(growth) if !growth.is_empty() => {
                out.write_all(growth.as_bytes())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub struct Frontend<W: Write> {
    out: W,
    renderer: ConsoleRenderer,
    terminal_title: bool,
}

impl<W: Write> Frontend<W> {
    /// `terminal_title` enables the OSC escape that renames the terminal window.
    pub fn new(out: W, terminal_title: bool) -> Self {
        Self {
            out,
            renderer: ConsoleRenderer::default(),
            terminal_title,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Handles one input line; `lines` supplies follow-up input for `:edit`
    /// and dialogs.
    pub fn handle_line(
        &mut self,
        bench: &mut Workbench,
        line: &str,
        lines: &Receiver<String>,
    ) -> io::Result<Flow> {
        let Some(directive) = Directive::parse(line) else {
            bench.dispatch(line, &mut LineDialogs::new(lines));
            return Ok(Flow::Continue);
        };
        debug!(?directive, "front-end directive");
        match directive {
            Directive::Edit => {
                let mut body = Vec::new();
                for next in lines.iter() {
                    if next == "." {
                        break;
                    }
                    body.push(next);
                }
                bench.set_active_contents(body.join("\n"));
            }
            Directive::Open => bench.open_with_dialog(&mut LineDialogs::new(lines)),
            Directive::Show => {
                self.present(bench)?;
                writeln!(self.out)?;
                writeln!(self.out, "{}", bench.store().active().contents())?;
            }
            Directive::Tabs => {
                self.present(bench)?;
                writeln!(self.out)?;
                for label in bench.store().tab_labels() {
                    let marker = if label.active { '*' } else { ' ' };
                    writeln!(self.out, "{marker} {}: {}", label.index + 1, label.title)?;
                }
            }
            Directive::Tab(argument) => match argument.parse::<usize>() {
                Ok(number) if number >= 1 => bench.switch_tab(number - 1),
                _ => {
                    let message = format!("Error: Invalid tab number '{argument}'.");
                    bench.console().append(&message);
                }
            },
            Directive::Packages(names) => bench.set_package_field(names),
            Directive::Quit => return Ok(Flow::Quit),
            Directive::Unknown(name) => {
                let message = format!("Error: Unknown directive ':{name}'.");
                bench.console().append(&message);
            }
        }
        Ok(Flow::Continue)
    }

    /// Prints console growth and applies a pending title refresh.
    pub fn present(&mut self, bench: &mut Workbench) -> io::Result<()> {
        self.renderer.render(bench.console_log(), &mut self.out)?;
        if bench.store_mut().take_refresh() {
            let title = bench.store().window_title();
            debug!(%title, "refreshing window title");
            if self.terminal_title {
                write!(self.out, "\x1b]0;{title}\x07")?;
            }
        }
        self.out.flush()
    }

    pub fn finish(&mut self, bench: &mut Workbench) -> io::Result<()> {
        self.present(bench)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

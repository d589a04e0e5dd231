use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use tracing::debug;

/// 檔案選擇對話框。 / Modal file pickers; `None` means the user cancelled.
pub trait FileDialogs {
    fn open_file(&mut self) -> Option<PathBuf>;
    fn save_file(&mut self, suggested: &str) -> Option<PathBuf>;
}

/// 以下一行輸入回答對話框。 / Answers each dialog with the next input line; an empty line cancels.
pub struct LineDialogs<'a> {
    lines: &'a Receiver<String>,
}

impl<'a> LineDialogs<'a> {
    pub fn new(lines: &'a Receiver<String>) -> Self {
        Self { lines }
    }

    fn ask(&mut self, prompt: &str) -> Option<PathBuf> {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "{prompt}");
        let _ = stdout.flush();
        drop(stdout);

        let answer = match self.lines.recv() {
            Ok(line) => line,
            Err(_) => {
                debug!("input closed while a dialog was open");
                return None;
            }
        };
        let answer = answer.trim();
        if answer.is_empty() {
            None
        } else {
            Some(PathBuf::from(answer))
        }
    }
}

impl FileDialogs for LineDialogs<'_> {
    fn open_file(&mut self) -> Option<PathBuf> {
        self.ask("Open file (empty to cancel): ")
    }

    fn save_file(&mut self, suggested: &str) -> Option<PathBuf> {
        self.ask(&format!("Save as [{suggested}] (empty to cancel): "))
    }
}

/// Dialogs answered from prepared queues, recording every request.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedDialogs {
    pub open_answers: Vec<Option<PathBuf>>,
    pub save_answers: Vec<Option<PathBuf>>,
    pub save_requests: Vec<String>,
}

#[cfg(test)]
impl FileDialogs for ScriptedDialogs {
    fn open_file(&mut self) -> Option<PathBuf> {
        if self.open_answers.is_empty() {
            None
        } else {
            self.open_answers.remove(0)
        }
    }

    fn save_file(&mut self, suggested: &str) -> Option<PathBuf> {
        self.save_requests.push(suggested.to_string());
        if self.save_answers.is_empty() {
            None
        } else {
            self.save_answers.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn line_answers_become_paths_and_blank_cancels() {
        let (tx, rx) = mpsc::channel();
        tx.send("  /tmp/a.py ".to_string()).unwrap();
        tx.send(String::new()).unwrap();
        let mut dialogs = LineDialogs::new(&rx);
        assert_eq!(dialogs.open_file(), Some(PathBuf::from("/tmp/a.py")));
        assert_eq!(dialogs.save_file("untitled.py"), None);
        drop(tx);
        assert_eq!(dialogs.open_file(), None);
    }
}

//! Parser for the commands typed into the ShellPad console.
//! ShellPad 主控台指令解析器。

use std::path::PathBuf;

use thiserror::Error;

/// Static help listing printed by the `help` command.
/// `help` 指令輸出的說明文字。
pub const HELP_TEXT: &str = "Available commands:\n  - new\n  - save\n  - save as <path>\n  - open <path>\n  - run\n  - close\n  - install";

/// A parsed console command.
/// 解析後的主控台指令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    Save,
    SaveAs(PathBuf),
    Open(PathBuf),
    Run,
    Close,
    Install,
    Help,
    Unknown(String),
}

/// How the raw line is case-folded before matching.
/// 比對前如何轉換大小寫。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseFolding {
    /// Lowercase the whole line, path arguments included.
    WholeLine,
    /// Lowercase the command keywords only; arguments keep their case.
    #[default]
    KeywordOnly,
}

/// Result of parsing one line: the echo text and the command.
/// 單行解析結果：回顯文字與指令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub normalized: String,
    pub command: Command,
}

impl ParsedLine {
    /// Console echo for this line, e.g. `> run`.
    pub fn echo(&self) -> String {
        format!("> {}", self.normalized)
    }
}

/// Errors raised for commands that cannot be carried out as typed.
/// 無法依輸入執行的指令錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Error: Unknown command '{0}'.")]
    Unknown(String),
}

impl Command {
    /// Maps `Unknown` to its reportable error.
    pub fn check(&self) -> Result<(), CommandError> {
        match self {
            Command::Unknown(raw) => Err(CommandError::Unknown(raw.clone())),
            _ => Ok(()),
        }
    }
}

/// Hint appended after an unknown command.
pub const UNKNOWN_HINT: &str = "Type 'help' for a list of commands.";

/// Normalizes and parses one raw console line.
/// 正規化並解析一行主控台輸入。
pub fn parse_line(raw: &str, folding: CaseFolding) -> ParsedLine {
    let normalized = normalize(raw, folding);
    let command = classify(&normalized);
    ParsedLine {
        normalized,
        command,
    }
}

fn normalize(raw: &str, folding: CaseFolding) -> String {
    let trimmed = raw.trim();
    match folding {
        CaseFolding::WholeLine => trimmed.to_lowercase(),
        CaseFolding::KeywordOnly => {
            let lowered = trimmed.to_lowercase();
            let keyword_len = if lowered.starts_with("save as ") {
                keyword_span(trimmed, 2)
            } else if lowered.starts_with("open ") {
                keyword_span(trimmed, 1)
            } else {
                return lowered;
            };
            let mut out = trimmed[..keyword_len].to_ascii_lowercase();
            out.push_str(&trimmed[keyword_len..]);
            out
        }
    }
}

/// Byte length covered by the first `words` space-separated tokens.
fn keyword_span(line: &str, words: usize) -> usize {
    let mut seen = 0;
    for (offset, ch) in line.char_indices() {
        if ch == ' ' {
            seen += 1;
            if seen == words {
                return offset;
            }
        }
    }
    line.len()
}

fn classify(line: &str) -> Command {
    match line {
        "run" => return Command::Run,
        "save" => return Command::Save,
        "new" => return Command::New,
        "close" => return Command::Close,
        "install" => return Command::Install,
        _ => {}
    }
    if line.starts_with("save as ") {
        let remainder = nth_remainder(line, 2);
        return Command::SaveAs(PathBuf::from(remainder.trim()));
    }
    if line.starts_with("open ") {
        let remainder = nth_remainder(line, 1);
        return Command::Open(PathBuf::from(remainder.trim()));
    }
    if line == "help" {
        return Command::Help;
    }
    Command::Unknown(line.to_string())
}

/// Text after the first `skip` single-space separators, mirroring a
/// `split(' ', skip)` on the line.
fn nth_remainder(line: &str, skip: usize) -> &str {
    let mut rest = line;
    for _ in 0..skip {
        match rest.split_once(' ') {
            Some((_, tail)) => rest = tail,
            None => return "",
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Command {
        parse_line(raw, CaseFolding::KeywordOnly).command
    }

    #[test]
    fn parses_exact_keywords() {
        assert_eq!(parse("run"), Command::Run);
        assert_eq!(parse("  SAVE "), Command::Save);
        assert_eq!(parse("New"), Command::New);
        assert_eq!(parse("close"), Command::Close);
        assert_eq!(parse("install"), Command::Install);
        assert_eq!(parse("HELP"), Command::Help);
    }

    #[test]
    fn parses_save_as_and_open_arguments() {
        assert_eq!(parse("save as foo.py"), Command::SaveAs(PathBuf::from("foo.py")));
        assert_eq!(
            parse("open  bar.py "),
            Command::Open(PathBuf::from("bar.py"))
        );
        assert_eq!(
            parse("save as my file.py"),
            Command::SaveAs(PathBuf::from("my file.py"))
        );
    }

    #[test]
    fn open_without_a_path_is_unknown() {
        assert_eq!(parse("open"), Command::Unknown("open".into()));
        assert_eq!(parse(" OPEN "), Command::Unknown("open".into()));
    }

    #[test]
    fn keyword_only_folding_preserves_argument_case() {
        let parsed = parse_line("  Save As Docs/Report.PY ", CaseFolding::KeywordOnly);
        assert_eq!(parsed.normalized, "save as Docs/Report.PY");
        assert_eq!(parsed.command, Command::SaveAs(PathBuf::from("Docs/Report.PY")));
        assert_eq!(parsed.echo(), "> save as Docs/Report.PY");

        let parsed = parse_line("OPEN Main.py", CaseFolding::KeywordOnly);
        assert_eq!(parsed.command, Command::Open(PathBuf::from("Main.py")));
    }

    #[test]
    fn whole_line_folding_lowercases_paths() {
        let parsed = parse_line("open Main.py", CaseFolding::WholeLine);
        assert_eq!(parsed.normalized, "open main.py");
        assert_eq!(parsed.command, Command::Open(PathBuf::from("main.py")));
    }

    #[test]
    fn save_as_without_path_is_unknown() {
        assert_eq!(parse("save as "), Command::Unknown("save as".into()));
    }

    #[test]
    fn unknown_commands_keep_their_text() {
        let command = parse("  Compile ");
        assert_eq!(command, Command::Unknown("compile".into()));
        assert_eq!(
            command.check().unwrap_err().to_string(),
            "Error: Unknown command 'compile'."
        );
        assert!(Command::Run.check().is_ok());
    }

    #[test]
    fn help_text_lists_every_command() {
        for keyword in ["new", "save", "save as", "open", "run", "close", "install"] {
            assert!(HELP_TEXT.contains(keyword), "missing {keyword}");
        }
    }
}

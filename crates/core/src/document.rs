use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// 讀寫文件時的錯誤。 / Failures reading or writing a document's file.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("file is not valid UTF-8 text")]
    InvalidEncoding,
    #[error("document has no associated path")]
    NoPath,
}

/// 一份開啟中的文字緩衝區。 / One open text buffer, optionally bound to a file.
#[derive(Debug, Clone, Default)]
pub struct Document {
    path: Option<PathBuf>,
    contents: String,
    dirty: bool,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以既有文字建立未修改的文件。 / A clean document holding `contents`.
    pub fn with_contents(path: Option<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path,
            contents: contents.into(),
            dirty: false,
        }
    }

    /// Reads the whole file at `path` as UTF-8.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let contents = String::from_utf8(bytes).map_err(|_| DocumentError::InvalidEncoding)?;
        Ok(Self::with_contents(Some(path.to_path_buf()), contents))
    }

    /// 寫回目前路徑。 / Writes back to the bound path.
    pub fn save(&mut self) -> Result<(), DocumentError> {
        let target = self.path.clone().ok_or(DocumentError::NoPath)?;
        self.save_as(target)
    }

    /// 寫入 `path` 並改綁定到該路徑。 / Writes to `path` and rebinds the document to it.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let target = path.as_ref();
        write_atomically(target, self.contents.as_bytes())?;
        self.path = Some(target.to_path_buf());
        self.dirty = false;
        Ok(())
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn into_contents(self) -> String {
        self.contents
    }

    /// Replaces the buffer; the document becomes dirty.
    pub fn set_contents(&mut self, text: impl Into<String>) {
        self.contents = text.into();
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 只改路徑，不動 dirty 狀態。 / Rebinds the path without touching the dirty flag.
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    /// Final path component, used for tab and window titles.
    pub fn file_name(&self) -> Option<String> {
        let name = self.path.as_deref()?.file_name()?;
        Some(name.to_string_lossy().into_owned())
    }
}

/// Writes a sibling temp file, then renames it over `target`.
fn write_atomically(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let staging = target.with_extension("tmp_shellpad");
    let written = fs::File::create(&staging).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    let result = written.and_then(|()| fs::rename(&staging, target));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{Document, DocumentError};

/// 視窗標題前綴。 / Prefix used when rendering the window title.
pub const WINDOW_TITLE_PREFIX: &str = "ShellPad";

/// 分頁操作被拒絕的原因。 / Reasons a tab operation was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot close the last remaining document")]
    LastDocument,
    #[error("tab index {index} is out of range (open tabs: {len})")]
    OutOfRange { index: usize, len: usize },
}

/// 分頁列上的一個標籤。 / One entry of the rendered tab bar.
///
/// The index is captured by value when the bar is rendered, so every entry
/// keeps pointing at its own tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabLabel {
    pub index: usize,
    pub title: String,
    pub active: bool,
}

/// 已開啟文件的有序集合與目前作用中的索引。 / Ordered open documents plus the active index.
#[derive(Debug)]
pub struct DocumentStore {
    documents: Vec<Document>,
    active: usize,
    refresh_pending: bool,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    /// 建立含一份空白文件的工作階段。 / Creates a session seeded with one empty document.
    pub fn new() -> Self {
        Self {
            documents: vec![Document::new()],
            active: 0,
            refresh_pending: true,
        }
    }

    /// 新增空白文件並設為作用中。 / Appends an empty, untitled document and activates it.
    pub fn create_document(&mut self) -> usize {
        self.push(Document::new())
    }

    /// 以指定路徑與內容新增文件並設為作用中。 / Appends a document with the given path and contents and activates it.
    pub fn open_document(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> usize {
        self.push(Document::with_contents(Some(path.into()), contents))
    }

    fn push(&mut self, document: Document) -> usize {
        self.documents.push(document);
        let index = self.documents.len() - 1;
        self.active = index;
        self.refresh_pending = true;
        debug!(index, total = self.documents.len(), "document added");
        index
    }

    /// 關閉指定文件；最後一份文件無法關閉。 / Closes the document at `index`; the last remaining one is kept.
    pub fn close_document(&mut self, index: usize) -> Result<(), SessionError> {
        self.check_index(index)?;
        if self.documents.len() == 1 {
            return Err(SessionError::LastDocument);
        }
        self.documents.remove(index);
        self.active = self.active.min(self.documents.len() - 1);
        self.refresh_pending = true;
        debug!(index, active = self.active, "document closed");
        Ok(())
    }

    /// 切換作用中的分頁。 / Switches the active tab.
    pub fn set_active(&mut self, index: usize) -> Result<(), SessionError> {
        self.check_index(index)?;
        self.active = index;
        self.refresh_pending = true;
        Ok(())
    }

    /// 為文件設定路徑（另存新檔後使用）。 / Attaches a path to a document, e.g. after "save as".
    pub fn set_path(&mut self, index: usize, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let len = self.documents.len();
        let document = self
            .documents
            .get_mut(index)
            .ok_or(SessionError::OutOfRange { index, len })?;
        document.set_path(Some(path.into()));
        self.refresh_pending = true;
        Ok(())
    }

    /// 將作用中文件另存並改綁定路徑。 / Writes the active document to `path`
    /// and rebinds it there; the title refresh is scheduled only on success.
    pub fn save_active_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        self.documents[self.active].save_as(path)?;
        self.refresh_pending = true;
        debug!(index = self.active, path = %path.display(), "document saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn active(&self) -> &Document {
        &self.documents[self.active]
    }

    pub fn active_mut(&mut self) -> &mut Document {
        &mut self.documents[self.active]
    }

    /// 取得分頁標題：檔名，或依目前未命名文件順序編號。 / Title of a tab: its file name, or `Untitled <n>` numbered among open untitled documents.
    pub fn title(&self, index: usize) -> Option<String> {
        let document = self.documents.get(index)?;
        if let Some(name) = document.file_name() {
            return Some(name);
        }
        let position = self.documents[..=index]
            .iter()
            .filter(|doc| doc.path().is_none())
            .count();
        Some(format!("Untitled {position}"))
    }

    /// 產生分頁列。 / Renders the tab bar.
    pub fn tab_labels(&self) -> Vec<TabLabel> {
        (0..self.documents.len())
            .filter_map(|index| {
                self.title(index).map(|title| TabLabel {
                    index,
                    title,
                    active: index == self.active,
                })
            })
            .collect()
    }

    /// 依作用中文件產生視窗標題。 / Window title derived from the active document.
    pub fn window_title(&self) -> String {
        let title = self.title(self.active).unwrap_or_default();
        format!("{WINDOW_TITLE_PREFIX} - {title}")
    }

    /// 取出並清除「需要重繪標題/分頁列」旗標。 / Takes the pending title/tab-bar refresh flag.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.documents.len() {
            Ok(())
        } else {
            Err(SessionError::OutOfRange {
                index,
                len: self.documents.len(),
            })
        }
    }
}

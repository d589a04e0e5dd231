/// 主控台輸出：單一、只會增長的文字緩衝區。 / The console: one growing text buffer.
///
/// Unbounded unless a retention cap is configured; with a cap, whole leading
/// lines are dropped once the buffer grows past it.
#[derive(Debug, Default, Clone)]
pub struct ConsoleLog {
    buffer: String,
    max_retained_bytes: Option<usize>,
    revision: u64,
    generation: u64,
    trimmed: usize,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建立有保留上限的主控台。 / Creates a console that keeps at most `max_bytes` of trailing text.
    pub fn with_retention(max_bytes: Option<usize>) -> Self {
        Self {
            max_retained_bytes: max_bytes,
            ..Self::default()
        }
    }

    /// 寫入文字；`append` 為假時取代整個內容。 / Writes text, replacing the whole buffer unless `append` is set.
    pub fn write(&mut self, text: &str, append: bool) {
        if append {
            self.buffer.push('\n');
            self.buffer.push_str(text);
        } else {
            self.buffer.clear();
            self.buffer.push_str(text);
            self.generation += 1;
            self.trimmed = 0;
        }
        self.revision += 1;
        self.enforce_retention();
    }

    pub fn append(&mut self, text: &str) {
        self.write(text, true);
    }

    pub fn replace(&mut self, text: &str) {
        self.write(text, false);
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 每次寫入遞增。 / Bumped on every write.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 每次取代整個內容時遞增。 / Bumped on every replace, so renderers can tell a replace from growth.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 自上次取代以來因保留上限而丟棄的位元組數。 / Bytes dropped by the retention cap since the last replace.
    pub fn trimmed(&self) -> usize {
        self.trimmed
    }

    fn enforce_retention(&mut self) {
        let Some(limit) = self.max_retained_bytes else {
            return;
        };
        if self.buffer.len() <= limit {
            return;
        }
        let mut excess = self.buffer.len() - limit;
        while !self.buffer.is_char_boundary(excess) {
            excess += 1;
        }
        let cut = match self.buffer[excess..].find('\n') {
            Some(offset) => excess + offset + 1,
            None => self.buffer.len(),
        };
        self.buffer.drain(..cut);
        self.trimmed += cut;
    }
}

/// 可透過呈現迴圈存取主控台的狀態。 / State owned by the presentation loop that exposes its console.
pub trait ConsoleTarget {
    fn console(&mut self) -> &mut ConsoleLog;
}

impl ConsoleTarget for ConsoleLog {
    fn console(&mut self) -> &mut ConsoleLog {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_joins_with_newline_and_replace_overwrites() {
        let mut log = ConsoleLog::new();
        log.write("New file created.", false);
        log.write("> run", true);
        log.append("4");
        assert_eq!(log.text(), "New file created.\n> run\n4");

        log.replace("fresh");
        assert_eq!(log.text(), "fresh");
        assert_eq!(log.revision(), 4);
    }

    #[test]
    fn append_on_empty_buffer_starts_with_separator() {
        let mut log = ConsoleLog::new();
        log.append("first");
        assert_eq!(log.text(), "\nfirst");
    }

    #[test]
    fn retention_drops_whole_leading_lines() {
        let mut log = ConsoleLog::with_retention(Some(12));
        log.replace("alpha");
        log.append("beta");
        log.append("gamma");
        assert_eq!(log.text(), "beta\ngamma");
        assert!(log.len() <= 12);

        log.append("delta");
        assert_eq!(log.text(), "gamma\ndelta");
        assert_eq!(log.trimmed(), 11);

        log.replace("reset");
        assert_eq!(log.trimmed(), 0);
        assert_eq!(log.generation(), 2);
    }

    #[test]
    fn retention_respects_multibyte_text() {
        let mut log = ConsoleLog::with_retention(Some(8));
        log.replace("中文測試");
        log.append("ok");
        assert_eq!(log.text(), "ok");
    }

    #[test]
    fn unbounded_by_default() {
        let mut log = ConsoleLog::new();
        for _ in 0..1000 {
            log.append("0123456789");
        }
        assert_eq!(log.len(), 11_000);
    }
}

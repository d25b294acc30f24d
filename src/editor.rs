use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// The active text buffer. One request owns it for the duration of the
/// pipeline; a `closed` buffer rejects further edits.
#[derive(Debug, Default)]
pub struct Document {
    lines: Vec<String>,
    version: u64,
    closed: bool,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&mut self, line: &str) {
        if self.closed {
            return;
        }
        self.lines.push(line.to_string());
        self.version += 1;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.version += 1;
    }

    /// Marks the buffer unavailable; a writer mid-sequence stops silently.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

pub type SharedDocument = Arc<Mutex<Document>>;

pub fn shared_document() -> SharedDocument {
    Arc::new(Mutex::new(Document::new()))
}

/// Inserts `lines` into the document one edit at a time, pausing between
/// lines so the terminal render keeps up. In-order delivery holds because no
/// line starts until the previous edit has been applied and the delay has
/// elapsed. Stops silently if the document is closed mid-sequence.
pub async fn insert_lines(doc: &SharedDocument, lines: &[String], delay: Duration) {
    for line in lines {
        {
            let mut document = doc.lock().await;
            if document.is_closed() {
                return;
            }
            document.append_line(line);
            println!("{}", line);
        }
        sleep(delay).await;
    }
}

/// Waits until the document version moves past `baseline`, up to `ceiling`.
/// After the ceiling the caller proceeds unconditionally; this is a
/// best-effort check, not a correctness guarantee.
pub async fn wait_for_change(doc: &SharedDocument, baseline: u64, ceiling: Duration) {
    let deadline = tokio::time::Instant::now() + ceiling;
    loop {
        if doc.lock().await.version() != baseline {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Writes the buffer into `file_name` under the workspace root. Plain
/// overwrite; no atomic rename, no backup.
pub fn save_document(doc: &Document, workspace_root: &Path, file_name: &str) -> Result<PathBuf> {
    let path = workspace_root.join(file_name);

    let mut content = doc.text();
    if !content.is_empty() {
        content.push('\n');
    }

    fs::write(&path, content)
        .with_context(|| format!("Failed to write file '{}'", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_lines_in_order() {
        let doc = shared_document();
        let lines: Vec<String> = vec!["a".into(), "b".into(), "c".into()];

        insert_lines(&doc, &lines, Duration::from_millis(1)).await;

        let document = doc.lock().await;
        assert_eq!(document.lines(), &["a", "b", "c"]);
        assert_eq!(document.version(), 3);
    }

    #[tokio::test]
    async fn test_closed_document_receives_nothing() {
        let doc = shared_document();
        doc.lock().await.close();

        let lines: Vec<String> = vec!["a".into(), "b".into()];
        insert_lines(&doc, &lines, Duration::from_millis(1)).await;

        assert!(doc.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_closing_mid_sequence_stops_silently_with_ordered_prefix() {
        let doc = shared_document();
        let lines: Vec<String> = (0..50).map(|i| format!("line {}", i)).collect();

        let writer_doc = doc.clone();
        let writer_lines = lines.clone();
        let writer = tokio::spawn(async move {
            insert_lines(&writer_doc, &writer_lines, Duration::from_millis(5)).await;
        });

        sleep(Duration::from_millis(40)).await;
        doc.lock().await.close();
        writer.await.unwrap();

        let document = doc.lock().await;
        let written = document.lines();
        assert!(written.len() < lines.len());
        assert_eq!(written, &lines[..written.len()]);
    }

    #[tokio::test]
    async fn test_wait_for_change_returns_on_edit() {
        let doc = shared_document();
        let baseline = doc.lock().await.version();
        doc.lock().await.append_line("x");

        // Already changed, so this must return well before the ceiling.
        let start = std::time::Instant::now();
        wait_for_change(&doc, baseline, Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_for_change_gives_up_at_ceiling() {
        let doc = shared_document();
        let baseline = doc.lock().await.version();

        let start = std::time::Instant::now();
        wait_for_change(&doc, baseline, Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_save_document_overwrites() {
        let temp_dir = TempDir::new().unwrap();

        let mut doc = Document::new();
        doc.append_line("a,b=b,a");

        let path = save_document(&doc, temp_dir.path(), "swap.py").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b=b,a\n");

        doc.clear();
        doc.append_line("pass");
        save_document(&doc, temp_dir.path(), "swap.py").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "pass\n");
    }

    #[test]
    fn test_save_empty_document_writes_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let doc = Document::new();

        let path = save_document(&doc, temp_dir.path(), "empty.txt").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_append_after_close_is_ignored() {
        let mut doc = Document::new();
        doc.append_line("kept");
        doc.close();
        doc.append_line("dropped");

        assert_eq!(doc.lines(), &["kept"]);
        assert_eq!(doc.version(), 1);
    }
}

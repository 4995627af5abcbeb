//! Thread-safe CSV sinks shared by all workers

use crate::output::traits::{OutputResult, TableRow};
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

struct SinkState {
    writer: csv::Writer<File>,
    rows: usize,
}

/// Serializes appends from many workers into one CSV file
///
/// The header is written when the sink is created. Rows appear in the order the
/// appends acquired the lock; nothing else about ordering is promised.
pub struct SynchronizedSink<R: TableRow> {
    path: PathBuf,
    state: Mutex<SinkState>,
    _row: PhantomData<fn(&R)>,
}

impl<R: TableRow> SynchronizedSink<R> {
    /// Creates the file at `path` and writes the header row
    pub fn create(path: impl Into<PathBuf>) -> OutputResult<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(R::HEADER)?;
        writer.flush()?;

        Ok(Self {
            path,
            state: Mutex::new(SinkState { writer, rows: 0 }),
            _row: PhantomData,
        })
    }

    /// Appends one row
    pub fn append(&self, row: &R) -> OutputResult<()> {
        let fields = row.fields();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writer.write_record(&fields)?;
        state.rows += 1;
        Ok(())
    }

    /// Appends several rows under a single lock acquisition
    pub fn append_all<'a, I>(&self, rows: I) -> OutputResult<()>
    where
        I: IntoIterator<Item = &'a R>,
        R: 'a,
    {
        let rows: Vec<Vec<String>> = rows.into_iter().map(TableRow::fields).collect();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for fields in &rows {
            state.writer.write_record(fields)?;
        }
        state.rows += rows.len();
        Ok(())
    }

    /// Number of data rows written so far (header excluded)
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes buffered rows to disk
    pub fn flush(&self) -> OutputResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::records::{DropRecord, LinkRecord};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_header_written_on_create() {
        let dir = TempDir::new().unwrap();
        let sink: SynchronizedSink<DropRecord> =
            SynchronizedSink::create(dir.path().join("failures.csv")).unwrap();
        assert!(sink.is_empty());

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "url,reason\n");
    }

    #[test]
    fn test_rows_are_quoted_as_needed() {
        let dir = TempDir::new().unwrap();
        let sink = SynchronizedSink::create(dir.path().join("links.csv")).unwrap();
        sink.append(&LinkRecord {
            page_url: "https://example.com/".to_string(),
            link_url: "https://example.com/a/".to_string(),
            link_text: "Read, then \"click\"".to_string(),
        })
        .unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("page_url,link_url,link_text"));
        assert_eq!(
            lines.next(),
            Some(r#"https://example.com/,https://example.com/a/,"Read, then ""click""""#)
        );
    }

    #[test]
    fn test_concurrent_appends() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(
            SynchronizedSink::<DropRecord>::create(dir.path().join("failures.csv")).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        sink.append(&DropRecord {
                            url: format!("https://example.com/{}/{}/", worker, i),
                            reason: "503 after retries".to_string(),
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        sink.flush().unwrap();

        assert_eq!(sink.len(), 200);
        let mut reader = csv::Reader::from_path(sink.path()).unwrap();
        assert_eq!(reader.records().count(), 200);
    }
}

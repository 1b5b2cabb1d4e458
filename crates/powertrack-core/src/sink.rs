//! CSV output sink

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::codec::Row;

/// CSV file writer that owns the header contract.
///
/// A header is written when the file is created. When appending to an
/// existing non-empty file the header is assumed present and not repeated.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    row_count: u64,
    wrote_header: bool,
}

impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("path", &self.path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl CsvSink {
    /// Open `path` for writing, emitting `header` unless appending to existing rows
    pub fn open(path: &Path, header: &[String], append: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let has_content = append && std::fs::metadata(path).is_ok_and(|m| m.len() > 0);
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };

        let mut writer = csv::WriterBuilder::new()
            .flexible(false)
            .from_writer(file);

        let wrote_header = !has_content;
        if wrote_header {
            writer.write_record(header)?;
            writer.flush()?;
        } else {
            log::debug!("Appending to {} without header", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            row_count: 0,
            wrote_header,
        })
    }

    /// Write a single row
    pub fn write_row(&mut self, row: &Row) -> io::Result<()> {
        self.writer.write_record(row)?;
        self.row_count += 1;
        Ok(())
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn wrote_header(&self) -> bool {
        self.wrote_header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered rows and close the file; returns rows written
    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[test]
    fn writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, &header(), false).unwrap();
        assert!(sink.wrote_header());
        sink.write_row(&vec!["1".into(), "x,y".into()]).unwrap();
        sink.write_row(&vec!["2".into(), "say \"hi\"".into()]).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a,b\n1,\"x,y\"\n2,\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn header_only_when_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        CsvSink::open(&path, &header(), false)
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn append_skips_header_on_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut first = CsvSink::open(&path, &header(), true).unwrap();
        assert!(first.wrote_header());
        first.write_row(&vec!["1".into(), "2".into()]).unwrap();
        first.finish().unwrap();

        let mut second = CsvSink::open(&path, &header(), true).unwrap();
        assert!(!second.wrote_header());
        second.write_row(&vec!["3".into(), "4".into()]).unwrap();
        second.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn truncates_without_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale\n").unwrap();
        CsvSink::open(&path, &header(), false)
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.csv");
        CsvSink::open(&path, &header(), false).unwrap();
        assert!(path.exists());
    }
}

//! Zip packaging of the mirror tree and tables

use crate::output::traits::{OutputError, OutputResult};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds the final snapshot archive in memory
///
/// Entries are stored under their path relative to the run's working directory, so
/// `<workdir>/site/example.com/index.html` becomes `site/example.com/index.html`.
pub struct Packager {
    root: PathBuf,
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    entries: usize,
}

impl Packager {
    /// Creates a packager whose archive paths are relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        }
    }

    /// Adds one file
    pub fn add_file(&mut self, path: &Path) -> OutputResult<()> {
        let name = self.archive_name(path)?;
        let bytes = fs::read(path)?;
        self.writer.start_file(name, self.options)?;
        self.writer.write_all(&bytes)?;
        self.entries += 1;
        Ok(())
    }

    /// Adds every file below `dir`, in sorted order
    ///
    /// A missing directory is not an error: a run that mirrored nothing has no tree.
    pub fn add_tree(&mut self, dir: &Path) -> OutputResult<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();
        for file in files {
            self.add_file(&file)?;
        }
        Ok(())
    }

    /// Number of entries added so far
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Finishes the archive and returns its bytes
    pub fn finish(self) -> OutputResult<Vec<u8>> {
        let cursor = self.writer.finish()?;
        Ok(cursor.into_inner())
    }

    fn archive_name(&self, path: &Path) -> OutputResult<String> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| OutputError::OutsideRoot(path.display().to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(name)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

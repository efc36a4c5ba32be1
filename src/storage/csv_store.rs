//! CSV storage implementation
//!
//! This module provides a CSV-file implementation of the RecordStore trait.

use crate::storage::schema::CsvRow;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::RecordSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// CSV file backend
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    /// Creates a store for the CSV file at `path`
    ///
    /// Nothing is touched on disk until the store is used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory the file lives in; temporary files are created there so the
    /// final rename never crosses filesystems
    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// `<file>.bak`, holding the file as it was before rows were dropped
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Copies the current file aside once, before a save drops its unusable rows
    fn keep_backup(&self, skipped: usize) -> StorageResult<()> {
        let backup = self.backup_path();
        if !backup.exists() {
            fs::copy(&self.path, &backup).map_err(|e| self.io_error(e))?;
        }
        tracing::warn!(
            "{} unusable rows in {} will be dropped on the next save; original kept at {}",
            skipped,
            self.path.display(),
            backup.display()
        );
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl RecordStore for CsvStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        let dir = self.directory();
        fs::create_dir_all(dir).map_err(|e| {
            StorageError::NotWritable(format!("cannot create {}: {}", dir.display(), e))
        })?;

        NamedTempFile::new_in(dir).map_err(|e| {
            StorageError::NotWritable(format!("cannot write in {}: {}", dir.display(), e))
        })?;

        if self.path.is_dir() {
            return Err(StorageError::NotWritable(format!(
                "{} is a directory",
                self.path.display()
            )));
        }

        Ok(())
    }

    fn load(&self) -> StorageResult<RecordSet> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No existing output at {}", self.path.display());
                return Ok(RecordSet::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            let line = index + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Skipping unreadable row {} in {}: {}", line, self.path.display(), e);
                    skipped += 1;
                    continue;
                }
            };

            match row.into_record(index as u32 + 1) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::warn!("Skipping row {} in {}: {}", line, self.path.display(), reason);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            self.keep_backup(skipped)?;
        }

        let set: RecordSet = records.into_iter().collect();
        tracing::info!(
            "Loaded {} existing records from {} ({} rows skipped)",
            set.len(),
            self.path.display(),
            skipped
        );

        Ok(set)
    }

    fn persist(&self, records: &RecordSet) -> StorageResult<()> {
        let dir = self.directory();
        fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            for record in records.sorted() {
                writer.serialize(CsvRow::from(record))?;
            }
            writer.flush().map_err(|e| self.io_error(e))?;
        }

        // An empty set still gets a header row
        if records.is_empty() {
            let header = super::COLUMNS.join(",");
            writeln!(tmp.as_file_mut(), "{}", header).map_err(|e| self.io_error(e))?;
        }

        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|source| StorageError::Persist {
            path: self.path.display().to_string(),
            source,
        })?;

        tracing::debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

//! [`RecordSink`] and per-file [`SinkFile`] handles.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use recon_core::types::Record;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::SinkError;
use crate::schema::{header_from_record, is_writable_key, shape_row, SchemaPolicy};

// ---------------------------------------------------------------------------
// Per-file state
// ---------------------------------------------------------------------------

/// State guarded by a file's lock.
#[derive(Debug, Default)]
struct FileState {
    /// Column order fixed by the first successful append in this process,
    /// or adopted from an existing file.
    header: Option<Vec<String>>,
    rows_written: u64,
}

// ---------------------------------------------------------------------------
// RecordSink
// ---------------------------------------------------------------------------

/// Process-wide registry of CSV sink files.
///
/// Cheap to clone; all clones share the same per-path locks. Create one per
/// process and hand clones to every worker.
#[derive(Clone, Default)]
pub struct RecordSink {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    policy: SchemaPolicy,
    files: Mutex<HashMap<PathBuf, Arc<Mutex<FileState>>>>,
}

impl RecordSink {
    pub fn new(policy: SchemaPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                files: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> SchemaPolicy {
        self.inner.policy
    }

    /// Handle for `output_dir/filename`. Does not touch the filesystem.
    pub fn file(&self, output_dir: impl AsRef<Path>, filename: &str) -> Result<SinkFile, SinkError> {
        validate_filename(filename)?;
        let dir = resolve_dir(output_dir.as_ref())?;
        Ok(SinkFile {
            sink: self.clone(),
            path: dir.join(filename),
            dir,
        })
    }

    /// Append records to `output_dir/filename`.
    pub async fn append(
        &self,
        output_dir: impl AsRef<Path>,
        filename: &str,
        records: Vec<Record>,
    ) -> Result<usize, SinkError> {
        self.file(output_dir, filename)?.append(records).await
    }

    /// Rows written to `path` by this process so far.
    pub async fn rows_written(&self, path: &Path) -> u64 {
        let lock = self.inner.files.lock().await.get(path).cloned();
        match lock {
            Some(lock) => lock.lock().await.rows_written,
            None => 0,
        }
    }

    async fn lock_for(&self, path: &Path) -> OwnedMutexGuard<FileState> {
        let lock = {
            let mut files = self.inner.files.lock().await;
            files.entry(path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// SinkFile
// ---------------------------------------------------------------------------

/// One output file within a [`RecordSink`].
#[derive(Clone)]
pub struct SinkFile {
    sink: RecordSink,
    dir: PathBuf,
    path: PathBuf,
}

impl std::fmt::Debug for SinkFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkFile").field("path", &self.path).finish()
    }
}

impl SinkFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub async fn append_one(&self, record: Record) -> Result<usize, SinkError> {
        self.append(vec![record]).await
    }

    /// Append records, deriving the header from the first record if the file
    /// has none yet. Returns the number of data rows written.
    ///
    /// Records with no writable field are skipped with a warning.
    pub async fn append(&self, records: Vec<Record>) -> Result<usize, SinkError> {
        self.append_inner(records, None).await
    }

    /// Append records using `header` as the column order if this append is
    /// the one that establishes it. An already established header wins.
    pub async fn append_with_header(
        &self,
        records: Vec<Record>,
        header: Vec<String>,
    ) -> Result<usize, SinkError> {
        self.append_inner(records, Some(header)).await
    }

    async fn append_inner(
        &self,
        records: Vec<Record>,
        header: Option<Vec<String>>,
    ) -> Result<usize, SinkError> {
        let total = records.len();
        let records: Vec<Record> = records
            .into_iter()
            .filter(|record| record.keys().any(is_writable_key))
            .collect();
        if records.len() < total {
            tracing::warn!(
                path = %self.path.display(),
                skipped = total - records.len(),
                "Skipped records with no writable fields",
            );
        }
        if records.is_empty() {
            return Ok(0);
        }

        let guard = self.sink.lock_for(&self.path).await;
        let policy = self.sink.policy();
        let dir = self.dir.clone();
        let path = self.path.clone();

        let written = tokio::task::spawn_blocking(move || {
            write_locked(guard, &dir, &path, &records, header, policy)
        })
        .await
        .map_err(|e| SinkError::Writer {
            path: self.path.clone(),
            message: e.to_string(),
        })??;

        tracing::debug!(path = %self.path.display(), rows = written, "Appended records");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Blocking write path (runs with the file lock held)
// ---------------------------------------------------------------------------

fn write_locked(
    mut state: OwnedMutexGuard<FileState>,
    dir: &Path,
    path: &Path,
    records: &[Record],
    explicit_header: Option<Vec<String>>,
    policy: SchemaPolicy,
) -> Result<usize, SinkError> {
    let io_err = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let is_new = file.metadata().map_err(io_err)?.len() == 0;

    let header = match state.header.clone() {
        Some(header) => header,
        None => {
            let existing = if is_new { None } else { read_existing_header(path)? };
            existing
                .or(explicit_header.filter(|h| !h.is_empty()))
                .unwrap_or_else(|| header_from_record(&records[0]))
        }
    };

    let rows = records
        .iter()
        .map(|record| shape_row(record, &header, policy, path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut buf = encode(&header, &rows, is_new, path)?;
    // A file from elsewhere may lack its final newline.
    if !is_new && state.header.is_none() && !ends_with_newline(path).map_err(io_err)? {
        buf.insert(0, b'\n');
    }
    write_and_sync(&mut file, &buf).map_err(io_err)?;

    state.header = Some(header);
    state.rows_written += rows.len() as u64;
    Ok(rows.len())
}

fn encode(
    header: &[String],
    rows: &[Vec<String>],
    with_header: bool,
    path: &Path,
) -> Result<Vec<u8>, SinkError> {
    let csv_err = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    if with_header {
        writer.write_record(header).map_err(csv_err)?;
    }
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.into_inner().map_err(|e| SinkError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })
}

fn write_and_sync(file: &mut File, buf: &[u8]) -> std::io::Result<()> {
    file.write_all(buf)?;
    file.flush()?;
    file.sync_all()
}

fn ends_with_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// First line of a non-empty file written by an earlier run.
fn read_existing_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    let headers = reader.headers().map_err(|source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if headers.is_empty() {
        return Ok(None);
    }
    Ok(Some(headers.iter().map(str::to_string).collect()))
}

fn validate_filename(filename: &str) -> Result<(), SinkError> {
    let invalid = filename.trim().is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\');
    if invalid {
        return Err(SinkError::InvalidName(filename.to_string()));
    }
    Ok(())
}

fn resolve_dir(dir: &Path) -> Result<PathBuf, SinkError> {
    std::path::absolute(dir).map_err(|source| SinkError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn filenames_must_be_single_component() {
        assert!(validate_filename("out.csv").is_ok());
        assert_matches!(validate_filename(""), Err(SinkError::InvalidName(_)));
        assert_matches!(validate_filename("../out.csv"), Err(SinkError::InvalidName(_)));
        assert_matches!(validate_filename(".."), Err(SinkError::InvalidName(_)));
    }

    #[test]
    fn relative_dirs_resolve_to_same_key() {
        let a = resolve_dir(Path::new("CSV_FILES")).unwrap();
        let b = resolve_dir(&std::env::current_dir().unwrap().join("CSV_FILES")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encode_quotes_only_when_needed() {
        let header = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec!["plain".to_string(), "x,y".to_string()]];
        let buf = encode(&header, &rows, true, Path::new("t.csv")).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "a,b\nplain,\"x,y\"\n");
    }
}

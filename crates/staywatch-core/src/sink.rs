use crate::{CanonicalRecord, Result, RunParams, StaywatchError};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Destination for one run's assembled records.
pub trait RecordSink: Send + Sync {
    /// Writes every record of the run and returns where they landed.
    fn write(&self, params: &RunParams, records: &[CanonicalRecord]) -> Result<PathBuf>;
}

/// Writes one newline-delimited JSON file per run into a directory.
///
/// The file is staged as a temp file next to its final name and renamed into
/// place, so readers never observe a half-written run. Output is UTF-8 without
/// a byte-order mark and non-ASCII text is written as-is.
#[derive(Debug, Clone)]
pub struct NdjsonSink {
    dir: PathBuf,
}

impl NdjsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_to(&self, path: &Path, records: &[CanonicalRecord]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let staged = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(staged.as_file());
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl RecordSink for NdjsonSink {
    fn write(&self, params: &RunParams, records: &[CanonicalRecord]) -> Result<PathBuf> {
        let path = self.dir.join(params.output_file_name());
        debug!("Writing {} records to {}", records.len(), path.display());

        self.write_to(&path, records)
            .map_err(|source| StaywatchError::SinkWrite {
                path: path.clone(),
                source,
            })?;

        info!("Wrote {} records for {} to {}", records.len(), params, path.display());
        Ok(path)
    }
}

/// Reads a run file back. Blank lines are skipped.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<CanonicalRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

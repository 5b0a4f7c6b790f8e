//! Output files and run reports.
//!
//! Range output is written through a temporary file in the destination
//! directory and renamed into place on `finish()`. Dropping the writer
//! before that removes the temporary file and leaves any previous output
//! untouched.

use crate::error::{Result, UbxLogError};
use crate::extractor::MalformedRecord;
use chrono::{DateTime, Utc};
use csv::{Terminator, Writer, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicCsvWriter {
    pub fn new(final_path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent_dir = output_parent(&final_path);
        validate_output_dir(parent_dir)?;

        let temp_file = NamedTempFile::new_in(parent_dir).map_err(|e| UbxLogError::Permission {
            path: format!(
                "Cannot create temporary file in {}: {}",
                parent_dir.display(),
                e
            ),
        })?;

        Ok(Self {
            writer: csv_writer(BufWriter::new(temp_file), delimiter),
            final_path,
        })
    }

    pub fn writer_mut(&mut self) -> &mut Writer<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    /// Flush and atomically move the output into place. Returns the final path.
    pub fn finish(self) -> Result<PathBuf> {
        let buf_writer = self.writer.into_inner().map_err(|e| UbxLogError::Csv {
            message: format!("Failed to flush CSV writer: {}", e),
        })?;

        let temp_file = buf_writer
            .into_inner()
            .map_err(|e| UbxLogError::Io(e.into_error()))?;

        temp_file
            .persist(&self.final_path)
            .map_err(|e| UbxLogError::Io(e.error))?;

        log::debug!("persisted {}", self.final_path.display());
        Ok(self.final_path)
    }
}

/// Row writer matching the converter's CSV dialect: minimal quoting, CRLF
/// line endings, rows of varying width. Fields are separated by the input
/// delimiter.
pub fn csv_writer<W: std::io::Write>(inner: W, delimiter: u8) -> Writer<W> {
    WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .terminator(Terminator::CRLF)
        .from_writer(inner)
}

pub fn output_parent(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Check that `dir` exists (creating it if needed) and accepts new files.
pub fn validate_output_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| UbxLogError::Permission {
            path: format!("Cannot create output directory {}: {}", dir.display(), e),
        })?;
    }

    if !dir.is_dir() {
        return Err(UbxLogError::InvalidPath {
            path: format!("Output location is not a directory: {}", dir.display()),
        });
    }

    Ok(())
}

/// Make a record key safe to embed in a file name.
pub fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub dry_run: bool,
    pub lines_read: usize,
    pub records_extracted: usize,
    pub rows_written: usize,
    pub lines_ignored: usize,
    pub malformed: Vec<MalformedRecord>,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub generated_at: DateTime<Utc>,
}

impl RangeReport {
    pub fn has_warnings(&self) -> bool {
        !self.malformed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationSummary {
    pub key: String,
    pub path: PathBuf,
    pub lines_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemuxReport {
    pub input: PathBuf,
    pub output_base: PathBuf,
    pub dry_run: bool,
    pub lines_read: usize,
    pub blank_lines: usize,
    pub lines_written: usize,
    pub key_only_lines: usize,
    pub malformed: Vec<MalformedRecord>,
    pub destinations: Vec<DestinationSummary>,
    pub elapsed: Duration,
    pub generated_at: DateTime<Utc>,
}

impl DemuxReport {
    pub fn has_warnings(&self) -> bool {
        !self.malformed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_writer_persists_on_finish() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");

        let mut writer = AtomicCsvWriter::new(&path, b',').unwrap();
        writer.writer_mut().write_record(["1", "2", "3"]).unwrap();
        writer.writer_mut().write_record(["4"]).unwrap();
        let final_path = writer.finish().unwrap();

        assert_eq!(final_path, path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1,2,3\r\n4\r\n");
    }

    #[test]
    fn test_atomic_writer_discards_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        fs::write(&path, "previous").unwrap();

        {
            let mut writer = AtomicCsvWriter::new(&path, b',').unwrap();
            writer.writer_mut().write_record(["partial"]).unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_atomic_writer_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.csv");

        let writer = AtomicCsvWriter::new(&path, b',').unwrap();
        writer.finish().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_csv_writer_quotes_only_when_needed() {
        let mut writer = csv_writer(Vec::new(), b',');
        writer.write_record(["a", "b c", "d\"e"]).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a,b c,\"d\"\"e\"\r\n");
    }

    #[test]
    fn test_csv_writer_uses_given_delimiter() {
        let mut writer = csv_writer(Vec::new(), b';');
        writer.write_record(["1", "a,b", "2"]).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "1;a,b;2\r\n");
    }

    #[test]
    fn test_key_sanitization() {
        assert_eq!(sanitize_key("NAV_SOL"), "NAV_SOL");
        assert_eq!(sanitize_key("../etc_passwd"), ".._etc_passwd");
        assert_eq!(sanitize_key("A:B_C*D"), "A_B_C_D");
        assert_eq!(sanitize_key("TAB\t_X"), "TAB__X");
        assert_eq!(sanitize_key(""), "unnamed");
    }

    #[test]
    fn test_output_parent_of_bare_name() {
        assert_eq!(output_parent(Path::new("out.csv")), Path::new("."));
        assert_eq!(output_parent(Path::new("a/out.csv")), Path::new("a"));
    }
}

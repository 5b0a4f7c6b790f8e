use crate::error::{MalformedReason, Result, UbxLogError};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// How often, in lines, progress callbacks fire.
const PROGRESS_INTERVAL: usize = 256;

/// One line of a converted log, split into its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine<'a> {
    pub number: usize,
    pub fields: Vec<&'a str>,
}

impl<'a> LogLine<'a> {
    pub fn parse(number: usize, line: &'a str, delimiter: char) -> Self {
        Self {
            number,
            fields: line.split(delimiter).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when the first two fields are exactly `class` and `id`.
    pub fn has_markers(&self, class: &str, id: &str) -> bool {
        matches!(self.fields.as_slice(), [c, i, ..] if *c == class && *i == id)
    }

    pub fn malformed(&self, reason: MalformedReason) -> MalformedRecord {
        MalformedRecord {
            line: self.number,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    pub line: usize,
    pub reason: MalformedReason,
}

impl From<MalformedRecord> for UbxLogError {
    fn from(record: MalformedRecord) -> Self {
        UbxLogError::MalformedRecord {
            line: record.line,
            reason: record.reason,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineProgress {
    pub lines_processed: usize,
    pub total_lines: usize,
}

impl LineProgress {
    pub fn new(total_lines: usize) -> Self {
        Self {
            lines_processed: 0,
            total_lines,
        }
    }

    /// Record one more line, firing `callback` every few hundred lines
    /// and on the last one.
    pub fn advance(&mut self, callback: Option<&dyn Fn(&LineProgress)>) {
        self.lines_processed += 1;
        if let Some(callback) = callback {
            if self.lines_processed % PROGRESS_INTERVAL == 0
                || self.lines_processed == self.total_lines
            {
                callback(self);
            }
        }
    }
}

/// Read a whole log file into memory.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; the
/// converter only ever writes ASCII, so a stray byte is line noise.
pub fn read_log(path: &Path) -> Result<String> {
    if path.is_dir() {
        return Err(UbxLogError::InvalidPath {
            path: format!("Input is a directory: {}", path.display()),
        });
    }

    let bytes = fs::read(path).map_err(|e| UbxLogError::from_open(e, path))?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());

    Ok(match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("{} contains invalid UTF-8, replacing bad bytes", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

use crate::config::MalformedPolicy;
use crate::error::{MalformedReason, Result, UbxLogError};
use crate::extractor::output_manager::{AtomicCsvWriter, RangeReport};
use crate::extractor::record::{read_log, LineProgress, LogLine, MalformedRecord};
use chrono::Utc;
use csv::Writer;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Index of the receiver time of week, in milliseconds.
const TIMESTAMP_FIELD: usize = 2;
/// First field of the per-satellite measurement blocks.
const RANGE_START: usize = 5;
const MIN_FIELDS: usize = RANGE_START + 1;

#[derive(Debug, Clone)]
pub struct RangeConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub delimiter: char,
    pub record_class: String,
    pub record_id: String,
    pub policy: MalformedPolicy,
}

/// An `RXM,RAW` record split into its time triple and range list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub line: usize,
    pub seconds: i64,
    pub time_fields: &'a [&'a str],
    pub range_fields: Vec<&'a str>,
}

impl RawRecord<'_> {
    pub fn time_row(&self) -> Vec<String> {
        std::iter::once(self.seconds.to_string())
            .chain(self.time_fields.iter().map(|f| f.to_string()))
            .collect()
    }

    pub fn range_row(&self) -> &[&str] {
        &self.range_fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome<'a> {
    Extracted(RawRecord<'a>),
    Skipped,
    Malformed(MalformedRecord),
}

/// Round milliseconds to the nearest whole second, halves away from zero.
pub fn round_to_seconds(millis: i64) -> i64 {
    let whole = millis / 1000;
    let rem = millis % 1000;
    if rem >= 500 {
        whole + 1
    } else if rem <= -500 {
        whole - 1
    } else {
        whole
    }
}

/// Drop the line terminator carried by the last field of a raw line.
pub fn strip_terminator(field: &str) -> &str {
    match field.rfind('\r') {
        Some(idx) => &field[..idx],
        None => field.strip_suffix('\n').unwrap_or(field),
    }
}

pub fn classify_line<'a>(line: &'a LogLine<'a>, config: &RangeConfig) -> RangeOutcome<'a> {
    if !line.has_markers(&config.record_class, &config.record_id) {
        return RangeOutcome::Skipped;
    }

    if line.len() < MIN_FIELDS {
        return RangeOutcome::Malformed(line.malformed(MalformedReason::TooFewFields {
            found: line.len(),
            required: MIN_FIELDS,
        }));
    }

    let raw_time = line.fields[TIMESTAMP_FIELD];
    let millis = match raw_time.trim().parse::<i64>() {
        Ok(millis) => millis,
        Err(_) => {
            return RangeOutcome::Malformed(line.malformed(MalformedReason::InvalidTimestamp {
                value: raw_time.to_string(),
            }))
        }
    };

    let mut range_fields = line.fields[RANGE_START..].to_vec();
    if let Some(last) = range_fields.last_mut() {
        *last = strip_terminator(*last);
    }

    RangeOutcome::Extracted(RawRecord {
        line: line.number,
        seconds: round_to_seconds(millis),
        time_fields: &line.fields[TIMESTAMP_FIELD + 1..RANGE_START],
        range_fields,
    })
}

/// Range rows are separated by the input delimiter, which must fit in a byte.
pub fn output_delimiter(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| UbxLogError::Config {
            message: format!("delimiter {:?} cannot be used for CSV output", delimiter),
        })
}

/// Destination for extracted rows.
pub trait RowSink {
    fn write_row<I, T>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>;
}

impl<W: Write> RowSink for Writer<W> {
    fn write_row<I, T>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.write_record(row)?;
        Ok(())
    }
}

/// Counts rows without writing them, for dry runs.
#[derive(Debug, Default)]
pub struct RowCounter {
    pub rows: usize,
}

impl RowSink for RowCounter {
    fn write_row<I, T>(&mut self, _row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.rows += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeStats {
    pub lines_read: usize,
    pub records_extracted: usize,
    pub rows_written: usize,
    pub lines_ignored: usize,
    pub malformed: Vec<MalformedRecord>,
}

pub struct RangeExtractor {
    config: RangeConfig,
}

impl RangeExtractor {
    pub fn new(config: RangeConfig) -> Self {
        Self { config }
    }

    /// Extract every matching record from `content` into `sink`.
    pub fn extract_from_str<S: RowSink>(
        &self,
        content: &str,
        sink: &mut S,
        progress_callback: Option<&dyn Fn(&LineProgress)>,
    ) -> Result<RangeStats> {
        let raw_lines: Vec<&str> = content.split_inclusive('\n').collect();
        let mut progress = LineProgress::new(raw_lines.len());
        let mut stats = RangeStats::default();

        for (idx, raw) in raw_lines.iter().enumerate() {
            let line = LogLine::parse(idx + 1, raw, self.config.delimiter);
            stats.lines_read += 1;

            match classify_line(&line, &self.config) {
                RangeOutcome::Extracted(record) => {
                    sink.write_row(record.time_row())?;
                    sink.write_row(record.range_row())?;
                    stats.records_extracted += 1;
                    stats.rows_written += 2;
                }
                RangeOutcome::Skipped => stats.lines_ignored += 1,
                RangeOutcome::Malformed(record) => match self.config.policy {
                    MalformedPolicy::Abort => return Err(record.into()),
                    MalformedPolicy::Skip => {
                        log::warn!("skipping line {}: {}", record.line, record.reason);
                        stats.malformed.push(record);
                    }
                },
            }

            progress.advance(progress_callback);
        }

        Ok(stats)
    }

    /// Read the input, write the range file and report what was done.
    pub fn run(&self, progress_callback: Option<&dyn Fn(&LineProgress)>) -> Result<RangeReport> {
        let start = Instant::now();
        let content = read_log(&self.config.input)?;

        let delimiter = output_delimiter(self.config.delimiter)?;
        let mut writer = AtomicCsvWriter::new(&self.config.output, delimiter)?;
        let stats = self.extract_from_str(&content, writer.writer_mut(), progress_callback)?;
        let output = writer.finish()?;
        let bytes_written = std::fs::metadata(&output)?.len();

        log::info!(
            "extracted {} records from {} into {}",
            stats.records_extracted,
            self.config.input.display(),
            output.display()
        );

        Ok(self.report(stats, bytes_written, start.elapsed(), false))
    }

    /// Classify the input and count rows without touching the output.
    pub fn dry_run(&self) -> Result<RangeReport> {
        let start = Instant::now();
        let content = read_log(&self.config.input)?;

        let mut counter = RowCounter::default();
        let stats = self.extract_from_str(&content, &mut counter, None)?;

        Ok(self.report(stats, 0, start.elapsed(), true))
    }

    fn report(
        &self,
        stats: RangeStats,
        bytes_written: u64,
        elapsed: Duration,
        dry_run: bool,
    ) -> RangeReport {
        RangeReport {
            input: self.config.input.clone(),
            output: self.config.output.clone(),
            dry_run,
            lines_read: stats.lines_read,
            records_extracted: stats.records_extracted,
            rows_written: stats.rows_written,
            lines_ignored: stats.lines_ignored,
            malformed: stats.malformed,
            bytes_written,
            elapsed,
            generated_at: Utc::now(),
        }
    }
}

/// `dir/name.csv` becomes `dir/name<suffix>.csv`.
pub fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}.csv", stem, suffix),
    };
    input.with_file_name(file_name)
}

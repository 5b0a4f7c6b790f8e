use crate::config::MalformedPolicy;
use crate::error::{MalformedReason, Result, UbxLogError};
use crate::extractor::output_manager::{
    output_parent, sanitize_key, validate_output_dir, DemuxReport, DestinationSummary,
};
use crate::extractor::record::{read_log, LineProgress, LogLine, MalformedRecord};
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Fields that form the record key and are dropped from the payload.
const KEY_FIELDS: usize = 2;

#[derive(Debug, Clone)]
pub struct DemuxConfig {
    pub input: PathBuf,
    pub output_base: PathBuf,
    pub extension: String,
    pub delimiter: char,
    pub key_separator: String,
    pub policy: MalformedPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxOutcome<'a> {
    Blank,
    /// Two fields or fewer: the destination exists but nothing is written.
    KeyOnly { key: String },
    Payload { key: String, payload: &'a str },
    Malformed(MalformedRecord),
}

pub fn record_key(fields: &[&str], separator: &str) -> Option<String> {
    match fields {
        [class, id, ..] => Some(format!("{}{}{}", class, separator, id)),
        _ => None,
    }
}

/// Everything after the `count`-th delimiter, or `None` if there are fewer.
pub fn strip_leading_fields(line: &str, delimiter: char, count: usize) -> Option<&str> {
    let mut rest = line;
    for _ in 0..count {
        let idx = rest.find(delimiter)?;
        rest = &rest[idx + delimiter.len_utf8()..];
    }
    Some(rest)
}

pub fn classify_line<'a>(
    number: usize,
    line: &'a str,
    delimiter: char,
    separator: &str,
) -> DemuxOutcome<'a> {
    let line = line.trim();
    if line.is_empty() {
        return DemuxOutcome::Blank;
    }

    let parsed = LogLine::parse(number, line, delimiter);
    let key = match record_key(&parsed.fields, separator) {
        Some(key) => key,
        None => {
            return DemuxOutcome::Malformed(parsed.malformed(MalformedReason::TooFewFields {
                found: parsed.len(),
                required: KEY_FIELDS,
            }))
        }
    };

    match strip_leading_fields(line, delimiter, KEY_FIELDS) {
        Some(payload) => DemuxOutcome::Payload { key, payload },
        None => DemuxOutcome::KeyOnly { key },
    }
}

/// `dir/name.csv` becomes `dir/name`, the prefix of every destination.
pub fn derive_output_base(input: &Path) -> PathBuf {
    input.with_extension("")
}

pub fn destination_path(base: &Path, key: &str, extension: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(sanitize_key(key));
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Directory that holds the destinations of `base`. A base ending in a
/// separator names the directory itself, with an empty file prefix.
pub fn output_base_dir(base: &Path) -> &Path {
    if base.as_os_str().to_string_lossy().ends_with(std::path::is_separator) {
        base
    } else {
        output_parent(base)
    }
}

struct Destination {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines_written: usize,
}

/// Output files keyed by record type, opened on first use and held until
/// the run finishes.
pub struct DemuxRegistry {
    base: PathBuf,
    extension: String,
    dry_run: bool,
    destinations: HashMap<String, Destination>,
    /// Which key owns each destination path. Sanitizing can map two keys
    /// onto one file name.
    owners: HashMap<PathBuf, String>,
}

impl DemuxRegistry {
    pub fn new(base: PathBuf, extension: String) -> Self {
        Self {
            base,
            extension,
            dry_run: false,
            destinations: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// A registry that tracks destinations and counts without creating files.
    pub fn new_dry_run(base: PathBuf, extension: String) -> Self {
        Self {
            base,
            extension,
            dry_run: true,
            destinations: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Open the destination for `key` if it is not open yet.
    pub fn open(&mut self, key: &str) -> Result<&Path> {
        let destination = self.destination(key)?;
        Ok(&destination.path)
    }

    pub fn write_payload(&mut self, key: &str, payload: &str) -> Result<()> {
        let destination = self.destination(key)?;
        if let Some(writer) = destination.writer.as_mut() {
            writeln!(writer, "{}", payload)?;
        }
        destination.lines_written += 1;
        Ok(())
    }

    fn destination(&mut self, key: &str) -> Result<&mut Destination> {
        match self.destinations.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = destination_path(&self.base, key, &self.extension);
                if let Some(owner) = self.owners.get(&path) {
                    return Err(UbxLogError::InvalidPath {
                        path: format!(
                            "record types {:?} and {:?} both map to {}",
                            owner,
                            key,
                            path.display()
                        ),
                    });
                }

                let writer = if self.dry_run {
                    None
                } else {
                    log::debug!("opening {} for key {}", path.display(), key);
                    let file =
                        File::create(&path).map_err(|e| UbxLogError::from_create(e, &path))?;
                    Some(BufWriter::new(file))
                };
                self.owners.insert(path.clone(), key.to_string());
                Ok(entry.insert(Destination {
                    path,
                    writer,
                    lines_written: 0,
                }))
            }
        }
    }

    /// Flush and close every destination, sorted by key.
    pub fn finish(&mut self) -> Result<Vec<DestinationSummary>> {
        let mut summaries = Vec::with_capacity(self.destinations.len());

        for (key, mut destination) in self.destinations.drain() {
            if let Some(writer) = destination.writer.as_mut() {
                writer.flush()?;
            }
            summaries.push(DestinationSummary {
                key,
                path: destination.path,
                lines_written: destination.lines_written,
            });
        }

        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }
}

impl Drop for DemuxRegistry {
    fn drop(&mut self) {
        for destination in self.destinations.values_mut() {
            if let Some(writer) = destination.writer.as_mut() {
                if let Err(e) = writer.flush() {
                    log::warn!("failed to flush {}: {}", destination.path.display(), e);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub lines_read: usize,
    pub blank_lines: usize,
    pub lines_written: usize,
    pub key_only_lines: usize,
    pub malformed: Vec<MalformedRecord>,
}

pub struct TypeDemuxer {
    config: DemuxConfig,
}

impl TypeDemuxer {
    pub fn new(config: DemuxConfig) -> Self {
        Self { config }
    }

    /// Route every line of `content` to its destination in `registry`.
    pub fn demux_str(
        &self,
        content: &str,
        registry: &mut DemuxRegistry,
        progress_callback: Option<&dyn Fn(&LineProgress)>,
    ) -> Result<DemuxStats> {
        let lines: Vec<&str> = content.lines().collect();
        let mut progress = LineProgress::new(lines.len());
        let mut stats = DemuxStats::default();

        for (idx, line) in lines.iter().enumerate() {
            stats.lines_read += 1;

            match classify_line(
                idx + 1,
                line,
                self.config.delimiter,
                &self.config.key_separator,
            ) {
                DemuxOutcome::Blank => stats.blank_lines += 1,
                DemuxOutcome::KeyOnly { key } => {
                    registry.open(&key)?;
                    stats.key_only_lines += 1;
                }
                DemuxOutcome::Payload { key, payload } => {
                    registry.write_payload(&key, payload)?;
                    stats.lines_written += 1;
                }
                DemuxOutcome::Malformed(record) => match self.config.policy {
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

    pub fn run(&self, progress_callback: Option<&dyn Fn(&LineProgress)>) -> Result<DemuxReport> {
        let start = Instant::now();
        let content = read_log(&self.config.input)?;

        validate_output_dir(output_base_dir(&self.config.output_base))?;

        let mut registry = DemuxRegistry::new(
            self.config.output_base.clone(),
            self.config.extension.clone(),
        );
        let stats = self.demux_str(&content, &mut registry, progress_callback)?;
        let destinations = registry.finish()?;

        log::info!(
            "split {} into {} files",
            self.config.input.display(),
            destinations.len()
        );

        Ok(self.report(stats, destinations, start.elapsed(), false))
    }

    pub fn dry_run(&self) -> Result<DemuxReport> {
        let start = Instant::now();
        let content = read_log(&self.config.input)?;

        let mut registry = DemuxRegistry::new_dry_run(
            self.config.output_base.clone(),
            self.config.extension.clone(),
        );
        let stats = self.demux_str(&content, &mut registry, None)?;
        let destinations = registry.finish()?;

        Ok(self.report(stats, destinations, start.elapsed(), true))
    }

    fn report(
        &self,
        stats: DemuxStats,
        destinations: Vec<DestinationSummary>,
        elapsed: Duration,
        dry_run: bool,
    ) -> DemuxReport {
        DemuxReport {
            input: self.config.input.clone(),
            output_base: self.config.output_base.clone(),
            dry_run,
            lines_read: stats.lines_read,
            blank_lines: stats.blank_lines,
            lines_written: stats.lines_written,
            key_only_lines: stats.key_only_lines,
            malformed: stats.malformed,
            destinations,
            elapsed,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir, policy: MalformedPolicy) -> DemuxConfig {
        let input = temp_dir.path().join("COM3_140326_180748.csv");
        DemuxConfig {
            output_base: derive_output_base(&input),
            input,
            extension: "csv".to_string(),
            delimiter: ',',
            key_separator: "_".to_string(),
            policy,
        }
    }

    fn output_file(temp_dir: &TempDir, key: &str) -> PathBuf {
        temp_dir
            .path()
            .join(format!("COM3_140326_180748{}.csv", key))
    }

    #[test]
    fn test_record_key() {
        assert_eq!(record_key(&["NAV", "SOL", "1"], "_"), Some("NAV_SOL".to_string()));
        assert_eq!(record_key(&["NAV", "SOL"], "_"), Some("NAV_SOL".to_string()));
        assert_eq!(record_key(&["NAV"], "_"), None);
    }

    #[test]
    fn test_strip_leading_fields() {
        assert_eq!(strip_leading_fields("AAA,BBB,1,2,3", ',', 2), Some("1,2,3"));
        assert_eq!(strip_leading_fields("AAA,BBB,", ',', 2), Some(""));
        assert_eq!(strip_leading_fields("AAA,BBB", ',', 2), None);
        assert_eq!(strip_leading_fields("A;B;C", ';', 2), Some("C"));
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(1, "  \r", ',', "_"), DemuxOutcome::Blank);
        assert_eq!(
            classify_line(2, "NAV,SOL\r", ',', "_"),
            DemuxOutcome::KeyOnly {
                key: "NAV_SOL".to_string()
            }
        );
        assert_eq!(
            classify_line(3, " AAA,BBB,1,2,3 \r", ',', "_"),
            DemuxOutcome::Payload {
                key: "AAA_BBB".to_string(),
                payload: "1,2,3"
            }
        );
        assert!(matches!(
            classify_line(4, "garbage", ',', "_"),
            DemuxOutcome::Malformed(MalformedRecord { line: 4, .. })
        ));
    }

    #[test]
    fn test_destination_path() {
        let path = destination_path(Path::new("logs/COM3"), "NAV_SOL", "csv");
        assert_eq!(path, PathBuf::from("logs/COM3NAV_SOL.csv"));

        let path = destination_path(Path::new("COM3"), "A/B_C", "csv");
        assert_eq!(path, PathBuf::from("COM3A_B_C.csv"));
    }

    #[test]
    fn test_output_base_dir() {
        assert_eq!(output_base_dir(Path::new("out/")), Path::new("out/"));
        assert_eq!(output_base_dir(Path::new("out/COM3")), Path::new("out"));
        assert_eq!(output_base_dir(Path::new("COM3")), Path::new("."));
    }

    #[test]
    fn test_derive_output_base() {
        assert_eq!(
            derive_output_base(Path::new("data/COM3_140326_180748.csv")),
            PathBuf::from("data/COM3_140326_180748")
        );
    }

    #[test]
    fn test_registry_opens_each_key_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry =
            DemuxRegistry::new(temp_dir.path().join("log"), "csv".to_string());

        registry.write_payload("NAV_SOL", "1,2").unwrap();
        registry.write_payload("NAV_SOL", "3,4").unwrap();
        registry.open("AID_EPH").unwrap();

        let summaries = registry.finish().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, "AID_EPH");
        assert_eq!(summaries[0].lines_written, 0);
        assert_eq!(summaries[1].lines_written, 2);

        let content = fs::read_to_string(temp_dir.path().join("logNAV_SOL.csv")).unwrap();
        assert_eq!(content, "1,2\n3,4\n");
        assert!(temp_dir.path().join("logAID_EPH.csv").exists());
    }

    #[test]
    fn test_registry_flushes_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut registry =
                DemuxRegistry::new(temp_dir.path().join("log"), "csv".to_string());
            registry.write_payload("NAV_SOL", "1,2").unwrap();
        }

        let content = fs::read_to_string(temp_dir.path().join("logNAV_SOL.csv")).unwrap();
        assert_eq!(content, "1,2\n");
    }

    #[test]
    fn test_registry_rejects_keys_sharing_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry =
            DemuxRegistry::new(temp_dir.path().join("log"), "csv".to_string());

        registry.write_payload("A/B_X", "first").unwrap();
        let result = registry.write_payload("A_B_X", "second");
        assert!(matches!(result, Err(UbxLogError::InvalidPath { .. })));

        registry.write_payload("A/B_X", "third").unwrap();
        let summaries = registry.finish().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].lines_written, 2);

        let content = fs::read_to_string(temp_dir.path().join("logA_B_X.csv")).unwrap();
        assert_eq!(content, "first\nthird\n");
    }

    #[test]
    fn test_run_stops_when_keys_share_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, MalformedPolicy::Skip);
        fs::write(&config.input, "A/B,X,first\nA_B,X,second\nA/B,X,third\n").unwrap();

        let result = TypeDemuxer::new(config).run(None);
        assert!(matches!(result, Err(UbxLogError::InvalidPath { .. })));
        assert_eq!(
            fs::read_to_string(output_file(&temp_dir, "A_B_X")).unwrap(),
            "first\n"
        );
    }

    #[test]
    fn test_run_creates_directory_output_base() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, MalformedPolicy::Abort);
        let mut base = temp_dir.path().join("out").into_os_string();
        base.push(std::path::MAIN_SEPARATOR.to_string());
        config.output_base = PathBuf::from(base);
        fs::write(&config.input, "NAV,SOL,1,2\n").unwrap();

        TypeDemuxer::new(config).run(None).unwrap();

        let content = fs::read_to_string(temp_dir.path().join("out").join("NAV_SOL.csv")).unwrap();
        assert_eq!(content, "1,2\n");
    }

    #[test]
    fn test_run_splits_by_key() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, MalformedPolicy::Abort);
        fs::write(
            &config.input,
            "AAA,BBB,1,2,3\r\nNAV,SOL,5\r\n\r\nAAA,BBB,4\r\nMON,VER\r\nNAV,SOL,\r\n",
        )
        .unwrap();

        let report = TypeDemuxer::new(config).run(None).unwrap();

        assert_eq!(report.lines_read, 6);
        assert_eq!(report.blank_lines, 1);
        assert_eq!(report.lines_written, 4);
        assert_eq!(report.key_only_lines, 1);
        assert_eq!(report.destinations.len(), 3);

        assert_eq!(
            fs::read_to_string(output_file(&temp_dir, "AAA_BBB")).unwrap(),
            "1,2,3\n4\n"
        );
        assert_eq!(
            fs::read_to_string(output_file(&temp_dir, "NAV_SOL")).unwrap(),
            "5\n\n"
        );
        assert_eq!(
            fs::read_to_string(output_file(&temp_dir, "MON_VER")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_run_abort_on_keyless_line() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, MalformedPolicy::Abort);
        fs::write(&config.input, "AAA,BBB,1\nlonely\n").unwrap();

        let result = TypeDemuxer::new(config).run(None);
        assert!(matches!(
            result,
            Err(UbxLogError::MalformedRecord { line: 2, .. })
        ));
        assert_eq!(
            fs::read_to_string(output_file(&temp_dir, "AAA_BBB")).unwrap(),
            "1\n"
        );
    }

    #[test]
    fn test_run_skip_on_keyless_line() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, MalformedPolicy::Skip);
        fs::write(&config.input, "lonely\nAAA,BBB,1\n").unwrap();

        let report = TypeDemuxer::new(config).run(None).unwrap();
        assert_eq!(report.malformed.len(), 1);
        assert!(report.has_warnings());
        assert_eq!(report.lines_written, 1);
    }

    #[test]
    fn test_dry_run_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, MalformedPolicy::Abort);
        fs::write(&config.input, "AAA,BBB,1\nCCC,DDD\n").unwrap();

        let report = TypeDemuxer::new(config).dry_run().unwrap();
        assert!(report.dry_run);
        assert_eq!(report.destinations.len(), 2);
        assert!(!output_file(&temp_dir, "AAA_BBB").exists());
        assert!(!output_file(&temp_dir, "CCC_DDD").exists());
    }

    #[test]
    fn test_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, MalformedPolicy::Abort);

        let result = TypeDemuxer::new(config).run(None);
        assert!(matches!(result, Err(UbxLogError::InputNotFound { .. })));
    }
}

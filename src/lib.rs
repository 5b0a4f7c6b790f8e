pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, Command, OutputFormat};
pub use config::{CliOverrides, Config, DemuxSettings, InputConfig, MalformedPolicy, RangeSettings};
pub use error::{MalformedReason, Result, UbxLogError, UserFriendlyError};

// Core functionality re-exports
pub use extractor::{
    DemuxConfig, DemuxRegistry, DemuxReport, LineProgress, MalformedRecord, RangeConfig,
    RangeExtractor, RangeReport, TypeDemuxer,
};
pub use ui::{OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};

/// Main library interface: one configuration, one formatter, either tool.
pub struct UbxLog {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl UbxLog {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);

        Self {
            config,
            output_formatter,
            progress_manager,
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        Ok(Self::new(
            config,
            cli_args.output_mode(),
            cli_args.verbose,
            cli_args.quiet,
        ))
    }

    /// Write the time and range rows of every RXM,RAW record in `input`.
    pub fn extract_ranges(&self, input: &Path, output: Option<PathBuf>) -> Result<RangeReport> {
        let extractor = RangeExtractor::new(self.config.range_config(input, output));
        self.output_formatter.start_operation(&format!(
            "Extracting {},{} records from {}",
            self.config.range.record_class,
            self.config.range.record_id,
            input.display()
        ));

        let pb = self.progress_manager.create_line_progress("scanning");
        let callback = |progress: &LineProgress| ui::progress::update_line_progress(&pb, progress);
        let report = extractor.run(Some(&callback));
        pb.finish_and_clear();

        let report = report?;
        self.output_formatter
            .success(&format!("Wrote {}", report.output.display()));
        Ok(report)
    }

    /// Split `input` into one file per record type.
    pub fn demux(&self, input: &Path, output_base: Option<PathBuf>) -> Result<DemuxReport> {
        let demuxer = TypeDemuxer::new(self.config.demux_config(input, output_base));
        self.output_formatter
            .start_operation(&format!("Splitting {} by record type", input.display()));

        let pb = self.progress_manager.create_line_progress("routing");
        let callback = |progress: &LineProgress| ui::progress::update_line_progress(&pb, progress);
        let report = demuxer.run(Some(&callback));
        pb.finish_and_clear();

        let report = report?;
        self.output_formatter.success(&format!(
            "Wrote {} record type files",
            report.destinations.len()
        ));
        Ok(report)
    }

    pub fn plan_ranges(&self, input: &Path, output: Option<PathBuf>) -> Result<RangeReport> {
        self.output_formatter
            .info("DRY RUN MODE - No files will be written");
        RangeExtractor::new(self.config.range_config(input, output)).dry_run()
    }

    pub fn plan_demux(&self, input: &Path, output_base: Option<PathBuf>) -> Result<DemuxReport> {
        self.output_formatter
            .info("DRY RUN MODE - No files will be written");
        TypeDemuxer::new(self.config.demux_config(input, output_base)).dry_run()
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        std::fs::write(output_path.as_ref(), Config::create_sample_config())?;
        Ok(())
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn handle_error(&self, error: &UbxLogError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn quiet_instance() -> UbxLog {
        UbxLog::new(Config::default(), OutputMode::Plain, 0, true)
    }

    #[test]
    fn test_extract_ranges_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("Home_20151220_0944.csv");
        fs::write(&input, "RXM,RAW,123456,1,2,10,20,30\r\nNAV,SOL,1\r\n").unwrap();

        let report = quiet_instance().extract_ranges(&input, None).unwrap();

        let expected = temp_dir.path().join("Home_20151220_0944(range).csv");
        assert_eq!(report.output, expected);
        assert_eq!(
            fs::read_to_string(expected).unwrap(),
            "123,1,2\r\n10,20,30\r\n"
        );
    }

    #[test]
    fn test_demux_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("COM3_140326_180748.csv");
        fs::write(&input, "AAA,BBB,1,2,3\n").unwrap();

        let report = quiet_instance().demux(&input, None).unwrap();

        assert_eq!(report.destinations.len(), 1);
        let path = temp_dir.path().join("COM3_140326_180748AAA_BBB.csv");
        assert_eq!(fs::read_to_string(path).unwrap(), "1,2,3\n");
    }

    #[test]
    fn test_plan_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("log.csv");
        fs::write(&input, "AAA,BBB,1\nRXM,RAW,1000,1,2,3\n").unwrap();

        let ubxlog = quiet_instance();
        assert_eq!(ubxlog.plan_ranges(&input, None).unwrap().rows_written, 2);
        assert_eq!(ubxlog.plan_demux(&input, None).unwrap().destinations.len(), 2);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("ubxlog.toml");

        UbxLog::generate_sample_config(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[range]"));
        assert!(Config::load_from_file(&config_path).is_ok());
    }

    #[test]
    fn test_version_info() {
        assert!(!version_info().is_empty());
    }
}

use crate::config::{CliOverrides, Config, MalformedPolicy};
use crate::error::Result;
use crate::ui::OutputMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ubxlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Post-process comma-separated UBX receiver log captures")]
#[command(
    long_about = "ubxlog works on the CSV files written by the UBX capture converter. \
                  `range` pulls RXM,RAW records into time and pseudorange rows; \
                  `demux` splits a mixed log into one file per record type."
)]
#[command(after_help = "EXAMPLES:\n  \
    ubxlog range Home_20151220_0944.csv\n  \
    ubxlog range Home_20151220_0944.csv --output ranges.csv --on-malformed skip\n  \
    ubxlog demux COM3_140326_180748.csv\n  \
    ubxlog --dry-run --output-format json demux COM3_140326_180748.csv\n  \
    ubxlog --generate-config --config ubxlog.toml")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file path
    #[arg(short, long, global = true, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Field delimiter of the input log
    #[arg(long, global = true)]
    pub delimiter: Option<char>,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Classify the input and report without writing any file
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract time and range rows from RXM,RAW records
    Range {
        /// Converted UBX log (CSV)
        input: PathBuf,

        /// Output file (defaults to <input>(range).csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// What to do with short lines or bad timestamps
        #[arg(long, value_enum)]
        on_malformed: Option<MalformedPolicy>,
    },

    /// Split a mixed log into one file per record type
    Demux {
        /// Converted UBX log (CSV)
        input: PathBuf,

        /// Prefix of the per-type files (defaults to the input without extension)
        #[arg(long)]
        output_base: Option<PathBuf>,

        /// What to do with lines that carry no record type
        #[arg(long, value_enum)]
        on_malformed: Option<MalformedPolicy>,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl From<&OutputFormat> for OutputMode {
    fn from(format: &OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        }
    }
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        let (range_policy, demux_policy) = match &self.command {
            Some(Command::Range { on_malformed, .. }) => (*on_malformed, None),
            Some(Command::Demux { on_malformed, .. }) => (None, *on_malformed),
            None => (None, None),
        };

        CliOverrides::new()
            .with_delimiter(self.delimiter)
            .with_range_policy(range_policy)
            .with_demux_policy(demux_policy)
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(&self.output_format)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

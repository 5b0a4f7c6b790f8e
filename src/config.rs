use crate::error::{Result, UbxLogError};
use crate::extractor::{demux, range, DemuxConfig, RangeConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub input: InputConfig,
    pub range: RangeSettings,
    pub demux: DemuxSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    pub delimiter: char,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RangeSettings {
    pub record_class: String,
    pub record_id: String,
    pub output_suffix: String,
    pub on_malformed: MalformedPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemuxSettings {
    pub key_separator: String,
    pub extension: String,
    pub on_malformed: MalformedPolicy,
}

/// What to do with a line that is too short or carries a bad timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Stop the run and report the offending line
    Abort,
    /// Log a warning, count the line and keep going
    Skip,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self {
            record_class: "RXM".to_string(),
            record_id: "RAW".to_string(),
            output_suffix: "(range)".to_string(),
            on_malformed: MalformedPolicy::Abort,
        }
    }
}

impl Default for DemuxSettings {
    fn default() -> Self {
        Self {
            key_separator: "_".to_string(),
            extension: "csv".to_string(),
            on_malformed: MalformedPolicy::Abort,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(UbxLogError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| UbxLogError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| UbxLogError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["ubxlog.toml", ".ubxlog.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        log::debug!("loading configuration from {}", default_path);
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(delimiter) = cli_args.delimiter {
            self.input.delimiter = delimiter;
        }

        if let Some(policy) = cli_args.range_policy {
            self.range.on_malformed = policy;
        }

        if let Some(policy) = cli_args.demux_policy {
            self.demux.on_malformed = policy;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| UbxLogError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| UbxLogError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.input.delimiter, '\n' | '\r') {
            return Err(UbxLogError::Config {
                message: "Delimiter cannot be a line terminator".to_string(),
            });
        }

        if self.range.record_class.is_empty() || self.range.record_id.is_empty() {
            return Err(UbxLogError::Config {
                message: "Range record markers must be non-empty".to_string(),
            });
        }

        if self.range.record_class.contains(self.input.delimiter)
            || self.range.record_id.contains(self.input.delimiter)
        {
            return Err(UbxLogError::Config {
                message: "Range record markers cannot contain the delimiter".to_string(),
            });
        }

        if self.demux.extension.is_empty() {
            return Err(UbxLogError::Config {
                message: "Demux output extension must be non-empty".to_string(),
            });
        }

        Ok(())
    }

    /// Build the settings for one range extraction run.
    pub fn range_config(&self, input: &Path, output: Option<PathBuf>) -> RangeConfig {
        let output = output
            .unwrap_or_else(|| range::derive_output_path(input, &self.range.output_suffix));

        RangeConfig {
            input: input.to_path_buf(),
            output,
            delimiter: self.input.delimiter,
            record_class: self.range.record_class.clone(),
            record_id: self.range.record_id.clone(),
            policy: self.range.on_malformed,
        }
    }

    /// Build the settings for one demultiplexing run.
    pub fn demux_config(&self, input: &Path, output_base: Option<PathBuf>) -> DemuxConfig {
        let output_base = output_base.unwrap_or_else(|| demux::derive_output_base(input));

        DemuxConfig {
            input: input.to_path_buf(),
            output_base,
            extension: self.demux.extension.clone(),
            delimiter: self.input.delimiter,
            key_separator: self.demux.key_separator.clone(),
            policy: self.demux.on_malformed,
        }
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub delimiter: Option<char>,
    pub range_policy: Option<MalformedPolicy>,
    pub demux_policy: Option<MalformedPolicy>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: Option<char>) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_range_policy(mut self, policy: Option<MalformedPolicy>) -> Self {
        self.range_policy = policy;
        self
    }

    pub fn with_demux_policy(mut self, policy: Option<MalformedPolicy>) -> Self {
        self.demux_policy = policy;
        self
    }
}

use std::fmt;
use thiserror::Error;

/// Why a log line could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedReason {
    TooFewFields { found: usize, required: usize },
    InvalidTimestamp { value: String },
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::TooFewFields { found, required } => {
                write!(f, "expected at least {} fields, found {}", required, found)
            }
            MalformedReason::InvalidTimestamp { value } => {
                write!(f, "timestamp field {:?} is not an integer", value)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum UbxLogError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    #[error("Permission denied: {path}")]
    Permission { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: MalformedReason },

    #[error("CSV write failed: {message}")]
    Csv { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for UbxLogError {
    fn user_message(&self) -> String {
        match self {
            UbxLogError::InputNotFound { path } => {
                format!("Input log file not found: {}", path)
            }
            UbxLogError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            UbxLogError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            UbxLogError::MalformedRecord { line, reason } => {
                format!("Line {} is malformed: {}", line, reason)
            }
            UbxLogError::Csv { message } => {
                format!("Failed to write CSV output: {}", message)
            }
            UbxLogError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            UbxLogError::InputNotFound { .. } => Some(
                "Check the path to the converted log file (e.g., Home_20151220_0944.csv).".to_string()
            ),
            UbxLogError::Permission { .. } => Some(
                "Ensure you have read access to the input and write access to its directory.".to_string()
            ),
            UbxLogError::Config { .. } => Some(
                "Check your configuration file syntax, or regenerate one with --generate-config.".to_string()
            ),
            UbxLogError::MalformedRecord { .. } => Some(
                "Fix the offending line, or rerun with --on-malformed skip to continue past bad records.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for UbxLogError {
    fn from(error: toml::de::Error) -> Self {
        UbxLogError::Config {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for UbxLogError {
    fn from(error: csv::Error) -> Self {
        match error.into_kind() {
            csv::ErrorKind::Io(io) => UbxLogError::Io(io),
            other => UbxLogError::Csv {
                message: format!("{:?}", other),
            },
        }
    }
}

impl UbxLogError {
    /// Map an error from opening `path` for reading to the matching variant.
    pub fn from_open(error: std::io::Error, path: &std::path::Path) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => UbxLogError::InputNotFound {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::PermissionDenied => UbxLogError::Permission {
                path: path.display().to_string(),
            },
            _ => UbxLogError::Io(error),
        }
    }

    /// Map an error from creating the output file `path`.
    pub fn from_create(error: std::io::Error, path: &std::path::Path) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => UbxLogError::Permission {
                path: path.display().to_string(),
            },
            _ => UbxLogError::Io(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, UbxLogError>;

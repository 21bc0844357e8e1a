use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The file exists but figment could not extract it.
    #[error("cannot load configuration file: {0}")]
    Load(String),

    #[error("{kind} '{name}': not found")]
    NotFound { kind: &'static str, name: String },

    /// The section exists but cannot be turned into a usable profile, group or
    /// global section.
    #[error("invalid {kind} '{name}': {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound { .. })
    }

    pub(crate) fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

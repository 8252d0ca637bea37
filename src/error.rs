//! Error taxonomy for board construction and recompute.
//!
//! Construction problems (bad data source, slider default outside its
//! range, a control targeting a column the panel does not have) surface as
//! [`BoardError::Configuration`] or [`BoardError::MissingColumn`] before any
//! panel renders. Recompute failures are surfaced to the caller and never
//! partially applied; empty selections and patch-merge conflicts are not
//! errors at all.

use std::path::PathBuf;

/// Stable machine-readable code for an error, independent of display text.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Failure materializing a data source through the storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed delimited data: {0}")]
    Csv(#[from] csv::Error),
}

impl ErrorCode for LoadError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "E_LOAD_IO",
            Self::Csv(_) => "E_LOAD_PARSE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unknown control kind: {0}")]
    UnknownControlKind(String),
    #[error("unknown panel: {0}")]
    UnknownPanel(String),
    #[error("unknown control: {0}")]
    UnknownControl(String),
    #[error("unknown navigation context: {0}")]
    UnknownContext(String),
    #[error("panel {panel} has no column `{column}`")]
    MissingColumn { panel: String, column: String },
    #[error("invalid value for {kind_tag}: {reason}")]
    InvalidControlValue { kind_tag: String, reason: String },
    #[error("data source failed to load: {0}")]
    Load(#[from] LoadError),
    #[error("data state codec error: {0}")]
    Codec(#[from] datastate::CodecError),
}

impl BoardError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn invalid_value(kind_tag: &str, reason: impl Into<String>) -> Self {
        Self::InvalidControlValue { kind_tag: kind_tag.to_owned(), reason: reason.into() }
    }
}

impl ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "E_CONFIGURATION",
            Self::UnknownControlKind(_) => "E_UNKNOWN_CONTROL_KIND",
            Self::UnknownPanel(_) => "E_UNKNOWN_PANEL",
            Self::UnknownControl(_) => "E_UNKNOWN_CONTROL",
            Self::UnknownContext(_) => "E_UNKNOWN_CONTEXT",
            Self::MissingColumn { .. } => "E_MISSING_COLUMN",
            Self::InvalidControlValue { .. } => "E_INVALID_CONTROL_VALUE",
            Self::Load(err) => err.error_code(),
            Self::Codec(_) => "E_CODEC",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Load(err) => err.retryable(),
            _ => false,
        }
    }
}

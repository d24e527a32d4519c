use thiserror::Error;

use crate::id::IdError;

/// Why a record's fixed-format part could not be read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("bad commit id: {0}")]
    CommitId(IdError),
    #[error("bad tree id: {0}")]
    TreeId(IdError),
    #[error("bad parent id: {0}")]
    ParentId(IdError),
    #[error("header line is not terminated")]
    UnterminatedHeader,
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("{field} is not a unix timestamp")]
    Timestamp { field: &'static str },
}

/// Errors produced while reading the record stream
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed record #{record}: {reason}")]
    MalformedRecord {
        record: usize,
        reason: MalformedReason,
    },

    #[error("failed to read record stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown text encoding `{0}`")]
    UnknownEncoding(String),
}

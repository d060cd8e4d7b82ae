use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} environment variable is required")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Why a raw record could not become a [`crate::Record`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("record has no identifier")]
    MissingId,

    #[error("record has no timestamp")]
    MissingTimestamp,
}

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single `write` on a sink.
///
/// The guard is always back in the free state by the time one of these reaches
/// the caller.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write record to destination: {0}")]
    Destination(#[from] io::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl SinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SinkError::Lock(LockError::Timeout { .. }))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("gave up waiting for the lock after {waited:?}")]
    Timeout { waited: Duration },

    #[error("lock is held by another writer")]
    WouldBlock,

    #[error("release called on a lock that is not held")]
    NotHeld,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

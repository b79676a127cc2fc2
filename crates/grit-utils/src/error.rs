use std::path::PathBuf;

/// Base error type for grit-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// Another writer holds the lock on this target.
    #[error("lock on '{0}' is held by another process")]
    Busy(PathBuf),

    #[error("cannot take lock '{path}': {source}")]
    LockCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot publish '{path}' over its lock: {source}")]
    LockCommit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! Library error type.
//!
//! Faults raised by executed fragments are never reported through this type;
//! they are folded into [`crate::execution::StructuredResult`].

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("alternate runtime unavailable: {0}")]
    TargetUnavailable(String),

    #[error("alternate runtime launch failed: {0}")]
    TargetFailed(String),

    #[error("no install command configured for this platform")]
    NoInstaller,

    #[error("failed to export task to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

//! World capture error types.

use std::path::PathBuf;

use crate::provider::ProviderError;

/// Errors surfaced by the store, session and finalizer.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The storage provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// No durable backend is open.
    #[error("no world is open")]
    NotOpen,
    /// Preparing the world folder failed.
    #[error("failed to prepare {path}: {source}")]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Moving the world folder failed; the store is left closed.
    #[error("failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

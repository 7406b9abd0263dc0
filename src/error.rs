use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Errors surfaced by the listing engine and the CLI around it.
#[derive(Debug, Error)]
pub enum ViewError {
    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The filesystem watcher could not be created or attached.
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// A name filter is not a valid glob pattern.
    #[error("Invalid name filter: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The directory view has been shut down.
    #[error("View closed: {0}")]
    Closed(String),

    /// A background thread could not be started.
    #[error("Failed to spawn {0} thread")]
    Spawn(String),
}

//! Library-wide error types.
//!
//! Library modules return [`Error`] through the [`Result`] alias, while the
//! CLI layer uses `anyhow` for convenient error propagation.
//!
//! # Taxonomy
//!
//! - [`Error::NotFound`] / [`Error::RowNotFound`]: a missing file or a
//!   missing artist/album/track row. Recoverable, the caller decides.
//! - [`Error::Metadata`]: the tag reader could not parse a file. Logged by the
//!   writer, the file is skipped.
//! - [`Error::Io`] / [`Error::Database`]: filesystem and store failures.
//! - [`Error::Config`]: missing or empty schema, store not open. Fatal at
//!   initialization.

use std::path::PathBuf;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for indexing and lookups.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Tags could not be read from a media file
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// File not found on disk
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// No row matched a natural key lookup
    #[error("{entity} not found: {key}")]
    RowNotFound { entity: &'static str, key: String },

    /// Configuration or initialization error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a missing row error.
    pub fn row_not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::RowNotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True for a missing file or a missing row, looking through context.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::RowNotFound { .. } => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

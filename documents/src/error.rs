//! Error types for the document reader.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur while reading the corpus.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Corpus location does not exist.
    #[error("corpus location not found: {0}")]
    LocationNotFound(PathBuf),

    /// Corpus location is not a directory.
    #[error("corpus location is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The archive has no `word/document.xml` part.
    #[error("missing document body in {0}")]
    MissingDocumentBody(PathBuf),

    /// Text extraction failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// ZIP archive error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

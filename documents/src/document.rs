//! Documents produced by a reader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One source document reduced to plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id, unique within one corpus snapshot.
    pub id: String,

    /// Extracted text.
    pub text: String,

    /// Where the document was read from, if it came from disk.
    pub source: Option<PathBuf>,
}

impl Document {
    /// Create a document without a source path.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: None,
        }
    }

    /// Record the file the document was read from.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A file the reader could not turn into a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    /// Path to the file.
    pub path: PathBuf,

    /// Why it was skipped.
    pub reason: String,
}

impl SkippedDocument {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SkippedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

//! Corpus readers.
//!
//! A reader enumerates a corpus location up front (so an unreadable location
//! fails immediately) and then extracts documents lazily, one file per
//! iteration step. Files that cannot be turned into text are yielded as
//! [`SkippedDocument`]s rather than ending the enumeration.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{IdScheme, ReaderConfig};
use crate::document::{Document, SkippedDocument};
use crate::error::{ReaderError, Result};
use crate::extract::extract_text;

/// One step of a corpus enumeration.
pub type ReadOutcome = std::result::Result<Document, SkippedDocument>;

/// Lazy sequence of documents from one corpus location.
pub type DocumentStream = Box<dyn Iterator<Item = ReadOutcome> + Send>;

/// Turns a corpus location into `{id, text}` documents.
pub trait DocumentReader: Send + Sync {
    /// Start reading `location`.
    ///
    /// Fails only if the location itself cannot be enumerated.
    fn read(&self, location: &Path) -> Result<DocumentStream>;
}

/// Reads every supported file under a directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryReader {
    config: ReaderConfig,
}

impl DirectoryReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Collect candidate files under `root`, sorted for deterministic ids.
    fn collect_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable corpus entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let accepted = entry
                .path()
                .extension()
                .and_then(std::ffi::OsStr::to_str)
                .is_some_and(|ext| self.config.accepts(ext));
            if accepted && !is_lock_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        files
    }
}

/// Office writes `~$name.docx` owner files next to open documents.
fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|n| n.starts_with("~$"))
}

impl DocumentReader for DirectoryReader {
    fn read(&self, location: &Path) -> Result<DocumentStream> {
        if !location.exists() {
            return Err(ReaderError::LocationNotFound(location.to_path_buf()));
        }
        if !location.is_dir() {
            return Err(ReaderError::NotADirectory(location.to_path_buf()));
        }
        // Surface permission problems on the root itself as fatal.
        std::fs::read_dir(location)?;

        let files = self.collect_files(location);
        info!(
            "Found {} candidate documents in {}",
            files.len(),
            location.display()
        );

        Ok(Box::new(DirectoryDocuments {
            root: location.to_path_buf(),
            files: files.into_iter(),
            id_scheme: self.config.id_scheme,
            next_sequence: 0,
        }))
    }
}

struct DirectoryDocuments {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
    id_scheme: IdScheme,
    next_sequence: usize,
}

impl DirectoryDocuments {
    fn id_for(&mut self, path: &Path) -> String {
        match self.id_scheme {
            IdScheme::Sequential => {
                let id = format!("doc_{}", self.next_sequence);
                self.next_sequence += 1;
                id
            }
            IdScheme::Path => path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        }
    }
}

impl Iterator for DirectoryDocuments {
    type Item = ReadOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        debug!("Reading document {}", path.display());

        let outcome = match extract_text(&path) {
            Ok(text) if text.trim().is_empty() => {
                Err(SkippedDocument::new(&path, "no extractable text"))
            }
            Ok(text) => {
                let id = self.id_for(&path);
                Ok(Document::new(id, text).with_source(&path))
            }
            Err(e) => Err(SkippedDocument::new(&path, e.to_string())),
        };

        if let Err(ref skipped) = outcome {
            warn!("Skipping document {skipped}");
        }
        Some(outcome)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.files.len()))
    }
}

/// Reader over a fixed, in-memory set of outcomes. Ignores the location.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    outcomes: Vec<ReadOutcome>,
}

impl MemoryReader {
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            outcomes: documents.into_iter().map(Ok).collect(),
        }
    }

    /// Append a file that fails to parse.
    pub fn with_skipped(mut self, skipped: SkippedDocument) -> Self {
        self.outcomes.push(Err(skipped));
        self
    }
}

impl DocumentReader for MemoryReader {
    fn read(&self, _location: &Path) -> Result<DocumentStream> {
        Ok(Box::new(self.outcomes.clone().into_iter()))
    }
}

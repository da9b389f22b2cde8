//! Configuration types for reading a corpus directory.

use serde::{Deserialize, Serialize};

/// How document ids are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    /// `doc_0`, `doc_1`, ... in sorted path order, counting readable documents.
    #[default]
    Sequential,

    /// Path relative to the corpus root, `/`-separated.
    Path,
}

/// Configuration for a corpus directory reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// File extensions to read (lowercase, without the dot).
    pub extensions: Vec<String>,

    /// How ids are assigned.
    pub id_scheme: IdScheme,

    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,

    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,
}

impl ReaderConfig {
    /// Create a config with the default extension set.
    pub fn new() -> Self {
        Self {
            extensions: Self::default_extensions(),
            id_scheme: IdScheme::default(),
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Replace the extension set.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Set the id scheme.
    pub fn with_id_scheme(mut self, scheme: IdScheme) -> Self {
        self.id_scheme = scheme;
        self
    }

    /// Set the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    /// Whether a file with this extension should be read.
    pub fn accepts(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.extensions.iter().any(|e| *e == extension)
    }

    fn default_extensions() -> Vec<String> {
        vec!["docx".to_string(), "txt".to_string(), "md".to_string()]
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

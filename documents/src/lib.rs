//! # Documents
//!
//! This crate turns a corpus location into plain-text documents for the
//! docqa ingestion pipeline.
//!
//! ## Features
//!
//! - **Directory Reading**: Walk a corpus directory with deterministic ordering
//! - **Text Extraction**: `.docx` (WordprocessingML) and plain text files
//! - **Stable Ids**: Sequential (`doc_0`, `doc_1`, ...) or path-based ids
//! - **Skip, Don't Abort**: Unparsable files are reported, enumeration continues

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod reader;

pub use config::{IdScheme, ReaderConfig};
pub use document::{Document, SkippedDocument};
pub use error::{ReaderError, Result};
pub use reader::{DirectoryReader, DocumentReader, DocumentStream, MemoryReader, ReadOutcome};

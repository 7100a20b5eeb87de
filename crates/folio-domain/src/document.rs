//! Document module - the unit of input to an extraction run

use crate::hash::content_hash;
use std::path::{Path, PathBuf};

/// A source document read from disk
///
/// Documents are immutable once read. Identity for resume purposes is the
/// content hash, so renaming a file does not force re-extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path the document was read from
    pub path: PathBuf,

    /// SHA-256 of `content`, hex encoded
    pub hash: String,

    /// Raw document text
    pub content: String,
}

impl Document {
    /// Create a document, computing its content hash
    ///
    /// # Examples
    ///
    /// ```
    /// use folio_domain::Document;
    ///
    /// let doc = Document::new("papers/a.md", "# Title");
    /// assert_eq!(doc.hash.len(), 64);
    /// assert_eq!(doc.source_path(), "papers/a.md");
    /// ```
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            hash: content_hash(&content),
            content,
        }
    }

    /// Path as a display string, as recorded in outputs
    pub fn source_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Borrow the path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of characters in the content
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

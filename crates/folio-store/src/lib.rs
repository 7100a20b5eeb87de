//! Folio Storage Layer
//!
//! Implements the `StageStore` trait with one JSON file per stage output, plus
//! the aggregate and error report files a run produces.
//!
//! # Architecture
//!
//! - `JsonStageStore`: `<root>/<source_hash>/<stage_name>.json`
//! - `MemoryStageStore`: in-process map for tests and dry runs
//! - Every write goes through [`write_json_atomic`]: temp file + rename, so a
//!   crash mid-write leaves the previous file intact
//!
//! # Examples
//!
//! ```no_run
//! use folio_store::JsonStageStore;
//! use folio_domain::StageStore;
//!
//! let store = JsonStageStore::new("out/stages").unwrap();
//! let records = store.load_all().unwrap();
//! println!("{} stage outputs on disk", records.len());
//! ```

#![warn(missing_docs)]

pub mod aggregate;
pub mod atomic;
pub mod json_store;
pub mod memory;
pub mod report;

use std::path::PathBuf;
use thiserror::Error;

pub use aggregate::{load_aggregate, save_aggregate, split_file_name, write_split, AggregateOutput};
pub use atomic::write_json_atomic;
pub use json_store::JsonStageStore;
pub use memory::MemoryStageStore;
pub use report::{load_error_report, save_error_report};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem error, with the path involved
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

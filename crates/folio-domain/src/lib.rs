//! Folio Domain Layer
//!
//! Core vocabulary for the document extraction pipeline. Every other crate in the
//! workspace speaks in these types; none of them live here with any IO attached.
//!
//! ## Key Concepts
//!
//! - **Document**: a source file identified by the SHA-256 of its content, not its path
//! - **Template**: an ordered list of modules, each one request + schema
//! - **Task Unit**: a (document, module) pair scheduled for one run
//! - **Stage Record**: the persisted output of one module for one document
//! - **Provider**: the boundary to an LLM backend
//!
//! ## Architecture
//!
//! - Pure data and hashing only
//! - Infrastructure implementations live in other crates
//! - Trait definitions for all external interactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod hash;
pub mod stage;
pub mod template;
pub mod traits;
pub mod unit;

// Re-exports for convenience
pub use document::Document;
pub use hash::{content_hash, prompt_hash};
pub use stage::{merge_stage_outputs, ErrorEntry, FailureKind, StageKey, StageRecord};
pub use template::{Module, Template, TemplateError};
pub use traits::{Provider, ProviderError, ProviderRequest, StageStore};
pub use unit::{TaskUnit, UnitStatus};

//! Command implementations.

pub mod extract;
pub mod templates;

pub use self::extract::execute_extract;
pub use self::templates::execute_templates;

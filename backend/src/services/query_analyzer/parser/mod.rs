//! Completed-request parser module
//!
//! Provides parsing capabilities for completed-request dumps, plans and
//! index catalogs.

pub mod composer;
pub mod core;
pub mod error;

// Re-export commonly used items
pub use composer::RecordComposer;
pub use error::{ParseError, ParseResult};

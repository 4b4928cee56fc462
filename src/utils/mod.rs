//! Utility modules shared by the lowering passes.
//!
//! - Error types
//! - Source location tags

pub mod errors;
pub mod location;

// Re-exports
pub use errors::*;
pub use location::Location;

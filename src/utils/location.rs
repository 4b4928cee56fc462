//! Source location tags attached to operations.
//!
//! Every synthesized operation inherits the location of the operation it was
//! derived from, so diagnostics raised while lowering point back at the
//! original contraction.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A position in source code (file, line and column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// Originating file, empty for unknown locations
    pub file: String,
    /// Line number (1-indexed, 0 when unknown)
    pub line: usize,
    /// Column number (1-indexed, 0 when unknown)
    pub column: usize,
}

impl Location {
    /// Create a new source location.
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self { file: file.into(), line, column }
    }

    /// Location of generated code with no source counterpart.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Check if this location is unknown.
    pub fn is_unknown(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "loc(unknown)")
        } else {
            write!(f, "loc(\"{}\":{}:{})", self.file, self.line, self.column)
        }
    }
}

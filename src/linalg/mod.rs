//! Linear-algebra operations: contractions over strided views.

pub mod contraction;
pub mod view;

pub use contraction::{Contraction, ContractionInfo, ContractionKind, ScalarBodyFn};
pub use view::{fully_composed_indexings, range_parts, view_root_indexing, RangeOperands};

//! Symbolic affine layer.
//!
//! This module provides the pure, graph-independent half of the lowering:
//! - Affine expressions with eager constant folding
//! - Affine maps with composition, concatenation and partial inversion

pub mod expr;
pub mod map;

pub use expr::{AffineBinaryKind, AffineExpr};
pub use map::AffineMap;

//! Operation kinds and value types.

use crate::affine::AffineMap;
use crate::linalg::ContractionKind;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Type of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Integer index (loop bounds, induction variables, subscripts)
    Index,
    /// Scalar floating-point element
    Float,
    /// A (min, max, step) triple
    Range,
    /// A strided view of the given rank over a buffer
    View(usize),
    /// A raw buffer
    Buffer,
}

impl Type {
    /// Rank of a view type.
    pub fn view_rank(&self) -> Option<usize> {
        match self {
            Self::View(rank) => Some(*rank),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Float => write!(f, "f32"),
            Self::Range => write!(f, "!linalg.range"),
            Self::View(rank) => {
                write!(f, "!linalg.view<")?;
                for _ in 0..*rank {
                    write!(f, "?x")?;
                }
                write!(f, "f32>")
            }
            Self::Buffer => write!(f, "!linalg.buffer<f32>"),
        }
    }
}

/// The closed set of operation kinds known to the lowering passes.
///
/// Operand layout per kind:
/// - `Constant`, `Alloc`: dynamic sizes only (`Alloc`), nothing otherwise
/// - `AffineApply`: map inputs, dimensions first
/// - `Range`: `[min, max, step]`
/// - `View`: `[buffer, indexing...]`
/// - `Slice`: `[view, indexing]`
/// - `For`: `[lower, upper, step]`, one region whose block argument is the
///   induction variable
/// - `Load`: `[view, index...]`
/// - `Store`: `[value, view, index...]`
/// - `AddF`, `MulF`: `[lhs, rhs]`
/// - `Contraction`: the views, inputs first and the output last
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Index constant
    Constant(i64),
    /// Affine map applied to index operands
    AffineApply(AffineMap),
    /// Range triple
    Range,
    /// Buffer allocation
    Alloc,
    /// View of a buffer
    View,
    /// Range or index slice of a view along one dimension
    Slice {
        /// Sliced dimension
        dim: usize,
    },
    /// Affine loop
    For,
    /// Scalar load from a view
    Load,
    /// Scalar store into a view
    Store,
    /// Float addition
    AddF,
    /// Float multiplication
    MulF,
    /// Tensor contraction
    Contraction(ContractionKind),
}

impl OpKind {
    /// Printed operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::AffineApply(_) => "affine.apply",
            Self::Range => "linalg.range",
            Self::Alloc => "linalg.buffer_alloc",
            Self::View => "linalg.view",
            Self::Slice { .. } => "linalg.slice",
            Self::For => "affine.for",
            Self::Load => "linalg.load",
            Self::Store => "linalg.store",
            Self::AddF => "addf",
            Self::MulF => "mulf",
            Self::Contraction(kind) => kind.op_name(),
        }
    }

    /// The contraction kind, if this is a contraction.
    pub fn as_contraction(&self) -> Option<ContractionKind> {
        match self {
            Self::Contraction(kind) => Some(*kind),
            _ => None,
        }
    }
}

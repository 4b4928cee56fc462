//! Walking view and slice chains back to their root buffer.

use crate::ir::{Function, OpKind, Type, ValueId};
use crate::utils::errors::{LoweringError, LoweringResult};

/// The `(min, max, step)` operands of a range value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOperands {
    /// Lower bound
    pub min: ValueId,
    /// Upper bound
    pub max: ValueId,
    /// Step
    pub step: ValueId,
}

/// Read the parts of `range`, which must be produced by a range operation.
pub fn range_parts(func: &Function, range: ValueId) -> LoweringResult<RangeOperands> {
    match func.defining_op(range) {
        Some(op) if matches!(func.op(op).kind, OpKind::Range) => {
            let ops = &func.op(op).operands;
            Ok(RangeOperands { min: ops[0], max: ops[1], step: ops[2] })
        }
        Some(op) => Err(LoweringError::unexpected_defining_op(format!(
            "{} is produced by `{}`, expected `linalg.range`", range, func.op(op).kind.name()
        )).with_location(func.op(op).location.clone())),
        None => Err(LoweringError::unexpected_defining_op(format!(
            "{} is a block argument, expected a `linalg.range` result", range
        ))),
    }
}

/// The range of the root view that dimension `dim` of `view` walks over.
///
/// Range slices taken at `dim` answer directly, slices at other dimensions
/// defer to their parent. Index slices drop a dimension, so dimensions at or
/// past the slice position shift up by one in the parent.
pub fn view_root_indexing(func: &Function, view: ValueId, dim: usize) -> LoweringResult<ValueId> {
    let mut view = view;
    let mut dim = dim;
    loop {
        let op = func.defining_op(view).ok_or_else(|| LoweringError::unexpected_defining_op(
            format!("view {} is not produced by an operation", view)
        ))?;
        let operation = func.op(op);
        match operation.kind {
            OpKind::View => {
                return operation.operands[1..].iter()
                    .copied()
                    .filter(|&i| func.value_type(i) == Type::Range)
                    .nth(dim)
                    .ok_or_else(|| LoweringError::arity_mismatch(format!(
                        "view {} has no dimension {}", view, dim
                    )).with_location(operation.location.clone()));
            }
            OpKind::Slice { dim: slice_dim } => {
                let (parent, indexing) = (operation.operands[0], operation.operands[1]);
                if func.value_type(indexing) == Type::Range {
                    if dim == slice_dim {
                        return Ok(indexing);
                    }
                } else if dim >= slice_dim {
                    dim += 1;
                }
                view = parent;
            }
            ref other => {
                return Err(LoweringError::unexpected_defining_op(format!(
                    "{} is produced by `{}`, expected a view or slice", view, other.name()
                )).with_location(operation.location.clone()));
            }
        }
    }
}

/// The buffer under `view` and one indexing per buffer dimension with every
/// slice on the way folded in.
///
/// A range slice replaces the root range of its dimension; its bounds are
/// already in the root index space. An index slice pins its dimension.
pub fn fully_composed_indexings(func: &Function, view: ValueId) -> LoweringResult<(ValueId, Vec<ValueId>)> {
    let op = func.defining_op(view).ok_or_else(|| LoweringError::unexpected_defining_op(
        format!("view {} is not produced by an operation", view)
    ))?;
    let operation = func.op(op);
    match operation.kind {
        OpKind::View => Ok((operation.operands[0], operation.operands[1..].to_vec())),
        OpKind::Slice { dim } => {
            let (parent, indexing) = (operation.operands[0], operation.operands[1]);
            let (buffer, mut indexings) = fully_composed_indexings(func, parent)?;
            // position of the parent's `dim`-th live dimension
            let pos = indexings.iter()
                .enumerate()
                .filter(|&(_, &i)| func.value_type(i) == Type::Range)
                .map(|(pos, _)| pos)
                .nth(dim)
                .ok_or_else(|| LoweringError::arity_mismatch(format!(
                    "slice dimension {} out of rank of {}", dim, parent
                )).with_location(operation.location.clone()))?;
            indexings[pos] = indexing;
            Ok((buffer, indexings))
        }
        ref other => Err(LoweringError::unexpected_defining_op(format!(
            "{} is produced by `{}`, expected a view or slice", view, other.name()
        )).with_location(operation.location.clone())),
    }
}

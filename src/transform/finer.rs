//! Rewriting contractions into loops of smaller contractions.
//!
//! ```text
//! matmul(A, B, C)  =>  for j in B[:, *]: matvec(A, B[:, j], C[:, j])
//! matvec(A, B, C)  =>  for i in A[*, :]: dot(A[i, :], B, C[i])
//! ```
//!
//! `dot` is already the finest grain.

use crate::ir::{Builder, Function, OpId, ValueId};
use crate::linalg::{range_parts, view_root_indexing, Contraction, ContractionKind};
use crate::utils::errors::{LoweringError, LoweringResult};
use log::debug;

/// Emit the finer-grained form of contraction `op` right before it.
///
/// Returns the new loop, or `None` when `op` has no finer form. The caller
/// erases `op` when a loop was emitted.
pub fn write_as_finer_grain_contraction(func: &mut Function, op: OpId) -> LoweringResult<Option<OpId>> {
    let contraction = Contraction::from_op(func, op).ok_or_else(|| {
        LoweringError::unexpected_defining_op(format!(
            "{} (`{}`) is not a contraction", op, func.op(op).kind.name()
        ))
    })?;
    contraction.verify(func)?;
    let location = contraction.location.clone();
    let (a, bv, c) = (contraction.views[0], contraction.views[1], contraction.views[2]);

    let rewritten = match contraction.kind {
        // loop over the columns of B and C
        ContractionKind::Matmul => Some(emit_sliced_loop(func, op, bv, 1, |b, j| {
            let column = b.slice(bv, j, 1);
            let out = b.slice(c, j, 1);
            b.matvec(a, column, out);
        })),
        // loop over the rows of A and C
        ContractionKind::Matvec => Some(emit_sliced_loop(func, op, a, 0, |b, i| {
            let row = b.slice(a, i, 0);
            let out = b.slice(c, i, 0);
            b.dot(row, bv, out);
        })),
        ContractionKind::Dot => None,
    };
    let rewritten = rewritten.transpose().map_err(|e| e.with_location(location))?;
    if let Some(loop_op) = rewritten {
        debug!("split {} {} into {}", contraction.kind.op_name(), op, loop_op);
    }
    Ok(rewritten)
}

/// Loop over the root range of `view`'s dimension `dim` right before `op`.
fn emit_sliced_loop(
    func: &mut Function,
    op: OpId,
    view: ValueId,
    dim: usize,
    body: impl FnOnce(&mut Builder<'_>, ValueId),
) -> LoweringResult<OpId> {
    let range = view_root_indexing(func, view, dim)?;
    let parts = range_parts(func, range)?;
    let mut b = Builder::before(func, op);
    let (loop_op, ()) = b.for_loop(parts.min, parts.max, parts.step, body);
    Ok(loop_op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OpKind;
    use crate::kernels::build_kernel;

    fn find(func: &Function, kind: ContractionKind) -> Vec<OpId> {
        func.walk_pre_order().into_iter()
            .filter(|&o| func.op(o).kind.as_contraction() == Some(kind))
            .collect()
    }

    #[test]
    fn test_matmul_becomes_matvec_loop() {
        let mut func = build_kernel(ContractionKind::Matmul, &[4, 5, 6], false);
        let matmul = find(&func, ContractionKind::Matmul)[0];
        let loop_op = write_as_finer_grain_contraction(&mut func, matmul).unwrap().unwrap();
        // N = 5 columns
        let upper = func.op(loop_op).operands[1];
        assert_eq!(func.constant_value(upper), Some(5));

        let inner = &func.block(func.op(loop_op).regions[0]).ops;
        assert_eq!(inner.len(), 3);
        assert!(matches!(func.op(inner[0]).kind, OpKind::Slice { dim: 1 }));
        assert!(matches!(func.op(inner[1]).kind, OpKind::Slice { dim: 1 }));
        let matvec = inner[2];
        assert_eq!(func.op(matvec).kind.as_contraction(), Some(ContractionKind::Matvec));
        let contraction = Contraction::from_op(&func, matvec).unwrap();
        assert!(contraction.verify(&func).is_ok());
    }

    #[test]
    fn test_matvec_becomes_dot_loop() {
        let mut func = build_kernel(ContractionKind::Matvec, &[7, 3], false);
        let matvec = find(&func, ContractionKind::Matvec)[0];
        let loop_op = write_as_finer_grain_contraction(&mut func, matvec).unwrap().unwrap();
        let upper = func.op(loop_op).operands[1];
        assert_eq!(func.constant_value(upper), Some(7));
        let inner = &func.block(func.op(loop_op).regions[0]).ops;
        let dot = inner[2];
        let contraction = Contraction::from_op(&func, dot).unwrap();
        assert!(contraction.verify(&func).is_ok());
        // the row slice still walks the K range
        let ranges = contraction.operand_ranges(&func).unwrap();
        let k = range_parts(&func, ranges[0]).unwrap().max;
        assert_eq!(func.constant_value(k), Some(3));
    }

    #[test]
    fn test_dot_has_no_finer_form() {
        let mut func = build_kernel(ContractionKind::Dot, &[8], false);
        let dot = find(&func, ContractionKind::Dot)[0];
        let before = func.num_ops();
        assert_eq!(write_as_finer_grain_contraction(&mut func, dot).unwrap(), None);
        assert_eq!(func.num_ops(), before);
    }
}

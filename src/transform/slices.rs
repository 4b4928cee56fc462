//! Folding slice chains into views over the root buffer.

use crate::ir::{Builder, Function, OpId, OpKind};
use crate::linalg::fully_composed_indexings;
use crate::utils::errors::LoweringResult;
use log::debug;

/// Replace the slice `op` with an equivalent `linalg.view` of its root
/// buffer, redirect its uses and erase it.
pub fn compose_slice(func: &mut Function, op: OpId) -> LoweringResult<OpId> {
    let slice = func.op(op).result();
    let (buffer, indexings) = fully_composed_indexings(func, slice)
        .map_err(|e| e.with_location(func.op(op).location.clone()))?;
    let mut b = Builder::before(func, op);
    let view = b.view(buffer, &indexings);
    func.replace_all_uses_with(slice, view);
    func.erase_op(op);
    let view_op = func.defining_op(view).unwrap_or(op);
    debug!("composed slice {} into {}", op, view_op);
    Ok(view_op)
}

/// Compose every slice in `func`. Returns how many were rewritten.
pub fn compose_slice_ops_in(func: &mut Function) -> LoweringResult<usize> {
    let mut count = 0;
    for op in func.walk_post_order() {
        if !func.is_live(op) || !matches!(func.op(op).kind, OpKind::Slice { .. }) {
            continue;
        }
        compose_slice(func, op)?;
        count += 1;
    }
    Ok(count)
}

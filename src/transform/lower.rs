//! Function-level drivers: walk, rewrite, erase.
//!
//! Each driver snapshots the post-order walk before touching the graph.
//! Operations created by a rewrite are not in the snapshot and are not
//! revisited; operations erased by an earlier rewrite are skipped.

use crate::ir::{Function, OpId};
use crate::linalg::ContractionKind;
use crate::transform::finer::write_as_finer_grain_contraction;
use crate::transform::loops::write_contraction_as_loops;
use crate::utils::errors::LoweringResult;
use log::debug;
use std::collections::BTreeMap;

/// Counters reported by a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoweringStats {
    /// Operations rewritten and erased
    pub rewritten: usize,
    /// Operations created in their place
    pub created: usize,
    /// Loops emitted
    pub loops: usize,
}

fn contractions_post_order(func: &Function) -> Vec<(OpId, ContractionKind)> {
    func.walk_post_order()
        .into_iter()
        .filter_map(|op| func.op(op).kind.as_contraction().map(|kind| (op, kind)))
        .collect()
}

/// Replace every contraction with its loop nest.
///
/// `tile_sizes` gives per-kind step factors; kinds without an entry are not
/// tiled.
pub fn lower_contractions_to_loops(
    func: &mut Function,
    tile_sizes: &BTreeMap<ContractionKind, Vec<i64>>,
) -> LoweringResult<LoweringStats> {
    let mut stats = LoweringStats::default();
    for (op, kind) in contractions_post_order(func) {
        if !func.is_live(op) {
            continue;
        }
        let before = func.num_ops();
        let loops = write_contraction_as_loops(func, op, tile_sizes.get(&kind).map(Vec::as_slice))?;
        func.erase_op(op);
        debug!("lowered {} {} to loops", kind.op_name(), op);
        stats.rewritten += 1;
        stats.loops += loops.len();
        stats.created += func.num_ops() + 1 - before;
    }
    Ok(stats)
}

/// Replace every matmul and matvec with a loop of the next finer kind.
///
/// One application refines by a single level.
pub fn lower_to_finer_grained_contractions(func: &mut Function) -> LoweringResult<LoweringStats> {
    let mut stats = LoweringStats::default();
    for (op, _) in contractions_post_order(func) {
        if !func.is_live(op) {
            continue;
        }
        let before = func.num_ops();
        if write_as_finer_grain_contraction(func, op)?.is_some() {
            func.erase_op(op);
            stats.rewritten += 1;
            stats.loops += 1;
            stats.created += func.num_ops() + 1 - before;
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, OpKind, Type};
    use crate::kernels::build_kernel;

    #[test]
    fn test_no_contractions_leaves_graph_alone() {
        let mut func = Function::new("f", &[Type::Index]);
        let n = func.argument(0);
        let mut b = Builder::at_body_end(&mut func);
        let c0 = b.constant_index(0);
        let c1 = b.constant_index(1);
        let r = b.range(c0, n, c1);
        let buf = b.alloc(&[n]);
        b.view(buf, &[r]);
        let snapshot: Vec<_> = func.walk_pre_order().into_iter()
            .map(|op| func.op(op).clone())
            .collect();
        let stats = lower_contractions_to_loops(&mut func, &BTreeMap::new()).unwrap();
        assert_eq!(stats, LoweringStats::default());
        let after: Vec<_> = func.walk_pre_order().into_iter()
            .map(|op| func.op(op).clone())
            .collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_matmul_lowered_and_erased() {
        let mut func = build_kernel(ContractionKind::Matmul, &[4, 5, 6], false);
        let stats = lower_contractions_to_loops(&mut func, &BTreeMap::new()).unwrap();
        assert_eq!(stats.rewritten, 1);
        assert_eq!(stats.loops, 3);
        assert!(func.walk_pre_order().iter().all(|&o| func.op(o).kind.as_contraction().is_none()));
        let fors = func.walk_pre_order().iter().filter(|&&o| matches!(func.op(o).kind, OpKind::For)).count();
        assert_eq!(fors, 3);
    }

    #[test]
    fn test_tile_sizes_apply_per_kind() {
        let mut func = build_kernel(ContractionKind::Matvec, &[8, 8], false);
        let mut tiles = BTreeMap::new();
        tiles.insert(ContractionKind::Matvec, vec![2, 4]);
        tiles.insert(ContractionKind::Dot, vec![16]);
        lower_contractions_to_loops(&mut func, &tiles).unwrap();
        let steps: Vec<_> = func.walk_pre_order().into_iter()
            .filter(|&o| matches!(func.op(o).kind, OpKind::For))
            .map(|o| func.constant_value(func.op(o).operands[2]))
            .collect();
        assert_eq!(steps, vec![Some(2), Some(4)]);
    }

    #[test]
    fn test_finer_then_loops() {
        let mut func = build_kernel(ContractionKind::Matmul, &[2, 3, 4], false);
        let first = lower_to_finer_grained_contractions(&mut func).unwrap();
        assert_eq!(first.rewritten, 1);
        let second = lower_to_finer_grained_contractions(&mut func).unwrap();
        assert_eq!(second.rewritten, 1);
        let third = lower_to_finer_grained_contractions(&mut func).unwrap();
        assert_eq!(third.rewritten, 0);
        let kinds: Vec<_> = func.walk_pre_order().into_iter()
            .filter_map(|o| func.op(o).kind.as_contraction())
            .collect();
        assert_eq!(kinds, vec![ContractionKind::Dot]);

        let stats = lower_contractions_to_loops(&mut func, &BTreeMap::new()).unwrap();
        assert_eq!(stats.rewritten, 1);
        let fors = func.walk_pre_order().iter().filter(|&&o| matches!(func.op(o).kind, OpKind::For)).count();
        assert_eq!(fors, 3);
    }
}

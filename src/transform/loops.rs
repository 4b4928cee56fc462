//! Loop nest synthesis for contractions.
//!
//! Parallel loops go outside, reduction loops inside, each group in its
//! original order. The scalar body is emitted once, at the innermost point.

use crate::ir::{Builder, Function, OpId, ValueId};
use crate::linalg::Contraction;
use crate::transform::ranges::{make_generic_loop_ranges, LoopRange};
use crate::utils::errors::{LoweringError, LoweringResult};
use log::debug;

/// Build one loop per range, outermost first, and run `body` with the
/// induction variables at the innermost point.
///
/// Every loop is built through [`Builder::for_loop`], so the insertion point
/// is restored when `body` returns, error or not.
pub fn build_loop_nest<R>(
    b: &mut Builder<'_>,
    ranges: &[LoopRange],
    body: impl FnOnce(&mut Builder<'_>, &[ValueId]) -> LoweringResult<R>,
) -> LoweringResult<R> {
    fn nest<'f, R, F>(b: &mut Builder<'f>, ranges: &[LoopRange], ivs: &mut Vec<ValueId>, body: F) -> LoweringResult<R>
    where
        F: FnOnce(&mut Builder<'_>, &[ValueId]) -> LoweringResult<R>,
    {
        match ranges.split_first() {
            None => body(b, ivs.as_slice()),
            Some((range, rest)) => {
                let (_, result) = b.for_loop(range.min, range.max, range.step, |b, iv| {
                    ivs.push(iv);
                    nest(b, rest, ivs, body)
                });
                result
            }
        }
    }
    let mut ivs = Vec::with_capacity(ranges.len());
    nest(b, ranges, &mut ivs, body)
}

/// Emit parallel loops around reduction loops around `body`.
///
/// Returns the loops, outermost first.
pub fn synthesize_loop_nest(
    b: &mut Builder<'_>,
    parallel: &[LoopRange],
    reduction: &[LoopRange],
    body: impl FnOnce(&mut Builder<'_>, &[ValueId], &[ValueId]) -> LoweringResult<()>,
) -> LoweringResult<Vec<OpId>> {
    let ivs = build_loop_nest(b, parallel, |b, parallel_ivs| {
        let parallel_ivs = parallel_ivs.to_vec();
        build_loop_nest(b, reduction, |b, reduction_ivs| {
            body(b, &parallel_ivs, reduction_ivs)?;
            Ok(parallel_ivs.iter().chain(reduction_ivs).copied().collect::<Vec<_>>())
        })
    })?;
    Ok(loops_of(b.func(), &ivs))
}

fn loops_of(func: &Function, ivs: &[ValueId]) -> Vec<OpId> {
    ivs.iter().filter_map(|&iv| func.induction_var_owner(iv)).collect()
}

/// Emit the loop nest computing contraction `op` right before it.
///
/// `tile_sizes`, when given, coarsens the loop steps. The caller erases
/// `op` afterwards.
pub fn write_contraction_as_loops(
    func: &mut Function,
    op: OpId,
    tile_sizes: Option<&[i64]>,
) -> LoweringResult<Vec<OpId>> {
    let contraction = Contraction::from_op(func, op).ok_or_else(|| {
        LoweringError::unexpected_defining_op(format!(
            "{} (`{}`) is not a contraction", op, func.op(op).kind.name()
        ))
    })?;
    let location = contraction.location.clone();
    write_as_loops(func, &contraction, tile_sizes).map_err(|e| e.with_location(location))
}

fn write_as_loops(
    func: &mut Function,
    contraction: &Contraction,
    tile_sizes: Option<&[i64]>,
) -> LoweringResult<Vec<OpId>> {
    let map = contraction.operand_ranges_to_loops_map()?;
    let ranges = contraction.operand_ranges(func)?;
    let mut b = Builder::before(func, contraction.op);
    let loop_ranges = make_generic_loop_ranges(&mut b, &map, &ranges, tile_sizes)?;

    let num_parallel = contraction.num_parallel_dims();
    let num_reduction = contraction.num_reduction_dims();
    if num_parallel + num_reduction != loop_ranges.len() {
        return Err(LoweringError::arity_mismatch(format!(
            "{} declares {} parallel and {} reduction loops but its map yields {}",
            contraction.kind.op_name(), num_parallel, num_reduction, loop_ranges.len()
        )));
    }
    let (parallel, reduction) = loop_ranges.split_at(num_parallel);
    let loops = synthesize_loop_nest(&mut b, parallel, reduction, |b, pivs, rivs| {
        contraction.emit_scalar_implementation(b, pivs, rivs)
    })?;
    debug!("wrote {} {} as {} loops", contraction.kind.op_name(), contraction.op, loops.len());
    Ok(loops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InsertPoint, OpKind, Type};
    use crate::kernels::build_kernel;
    use crate::linalg::ContractionKind;

    fn ranges(b: &mut Builder<'_>, n: usize) -> Vec<LoopRange> {
        (0..n)
            .map(|i| {
                let min = b.constant_index(0);
                let max = b.constant_index(10 + i as i64);
                let step = b.constant_index(1);
                LoopRange { min, max, step }
            })
            .collect()
    }

    #[test]
    fn test_nest_shape_two_parallel_one_reduction() {
        let mut func = Function::new("f", &[]);
        let mut b = Builder::at_body_end(&mut func);
        let all = ranges(&mut b, 3);
        let mut calls = 0;
        let mut seen = (Vec::new(), Vec::new(), None);
        let loops = synthesize_loop_nest(&mut b, &all[..2], &all[2..], |b, pivs, rivs| {
            calls += 1;
            seen = (pivs.to_vec(), rivs.to_vec(), Some(b.insert_point()));
            Ok(())
        }).unwrap();
        assert_eq!(calls, 1);
        assert_eq!(loops.len(), 3);

        // each loop nests in the previous one and carries its range in order
        for (i, &l) in loops.iter().enumerate() {
            let upper = func.op(l).operands[1];
            assert_eq!(func.constant_value(upper), Some(10 + i as i64));
            if i > 0 {
                assert_eq!(func.parent_op(l), Some(loops[i - 1]));
            }
        }
        let innermost = func.op(loops[2]).regions[0];
        assert_eq!(seen.2, Some(InsertPoint::End(innermost)));
        assert_eq!(seen.0.len(), 2);
        assert_eq!(seen.1.len(), 1);
        assert_eq!(func.induction_var_owner(seen.1[0]), Some(loops[2]));
    }

    #[test]
    fn test_insert_point_restored_after_error() {
        let mut func = Function::new("f", &[]);
        let body = func.body();
        let mut b = Builder::at_body_end(&mut func);
        let all = ranges(&mut b, 2);
        let result = synthesize_loop_nest(&mut b, &all, &[], |_, _, _| {
            Err(LoweringError::arity_mismatch("boom"))
        });
        assert!(result.is_err());
        assert_eq!(b.insert_point(), InsertPoint::End(body));
    }

    #[test]
    fn test_write_dot_as_loops() {
        let mut func = build_kernel(ContractionKind::Dot, &[16], false);
        let dot = func.walk_post_order().into_iter()
            .find(|&o| func.op(o).kind.as_contraction().is_some())
            .unwrap();
        let existing = func.walk_pre_order();
        let loops = write_contraction_as_loops(&mut func, dot, None).unwrap();
        assert_eq!(loops.len(), 1);

        // everything emitted for the dot carries its location
        let location = func.op(dot).location.clone();
        assert_eq!(location.line, 7);
        let emitted: Vec<_> = func.walk_pre_order().into_iter()
            .filter(|o| !existing.contains(o))
            .collect();
        assert!(emitted.contains(&loops[0]));
        assert!(emitted.len() >= 7);
        for op in emitted {
            assert_eq!(func.op(op).location, location, "{}", func.op(op).kind.name());
        }
        let bounds: Vec<_> = func.op(loops[0]).operands.iter()
            .map(|&v| func.constant_value(v))
            .collect();
        assert_eq!(bounds, vec![Some(0), Some(16), Some(1)]);

        let inner = func.block(func.op(loops[0]).regions[0]).ops.clone();
        let kinds: Vec<&str> = inner.iter().map(|&o| func.op(o).kind.name()).collect();
        assert_eq!(kinds, vec!["linalg.load", "linalg.load", "linalg.load", "mulf", "addf", "linalg.store"]);
        // the loop sits right before the dot
        let top = &func.block(func.body()).ops;
        let pos = top.iter().position(|&o| o == loops[0]).unwrap();
        assert_eq!(top[pos + 1], dot);
    }

    #[test]
    fn test_write_rejects_non_contraction() {
        let mut func = Function::new("f", &[Type::Index]);
        let mut b = Builder::at_body_end(&mut func);
        let c = b.constant_index(1);
        let op = func.defining_op(c).unwrap();
        assert!(matches!(func.op(op).kind, OpKind::Constant(1)));
        assert!(write_contraction_as_loops(&mut func, op, None).is_err());
    }
}

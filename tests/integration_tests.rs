//! Integration tests for the lowering pipeline.

use linalg_lower::prelude::*;
use linalg_lower::ir::InsertPoint;
use linalg_lower::linalg::range_parts;
use linalg_lower::transform::fold::make_folded_composed_affine_apply;
use linalg_lower::utils::location::Location;
use linalg_lower::transform::{apply_tiling, make_generic_loop_ranges, synthesize_loop_nest};
use linalg_lower::{compose_slice_ops, lower_to_finer_grained_contractions, lower_to_loops, run_pipeline};

fn count(func: &Function, pred: impl Fn(&OpKind) -> bool) -> usize {
    func.walk_pre_order().into_iter().filter(|&o| pred(&func.op(o).kind)).count()
}

fn loops(func: &Function) -> Vec<OpId> {
    func.walk_pre_order().into_iter()
        .filter(|&o| matches!(func.op(o).kind, OpKind::For))
        .collect()
}

#[test]
fn test_identity_map_returns_same_range() {
    let mut func = Function::new("f", &[Type::Index]);
    let n = func.argument(0);
    let mut b = Builder::at_body_end(&mut func);
    let c0 = b.constant_index(0);
    let c1 = b.constant_index(1);
    let r = b.range(c0, n, c1);
    let before = b.func().num_ops();

    let derived = make_generic_loop_ranges(&mut b, &AffineMap::identity(1), &[r], None).unwrap();
    assert_eq!(derived, vec![LoopRange { min: c0, max: n, step: c1 }]);
    assert_eq!(func.num_ops(), before);
}

#[test]
fn test_constant_map_ignores_operands() {
    let mut func = Function::new("f", &[Type::Index, Type::Index]);
    let (x, y) = (func.argument(0), func.argument(1));
    let mut b = Builder::at_body_end(&mut func);
    let map = AffineMap::constant(42);
    for operands in [vec![], vec![x], vec![x, y, x]] {
        let v = make_folded_composed_affine_apply(&mut b, &map, &operands).unwrap();
        assert_eq!(b.func().constant_value(v), Some(42));
    }
}

#[test]
fn test_fold_after_apply_matches_composition() {
    let g = AffineMap::new(1, 1, vec![AffineExpr::dim(0) * 3 + AffineExpr::symbol(0)]);
    let f = AffineMap::new(1, 0, vec![(AffineExpr::dim(0) + 1).floor_div(2)]);
    let direct = f.compose(&g);

    for (x, s) in [(0, 0), (5, 1), (7, -4), (10, 3)] {
        let expected = direct.apply(&[x], &[s]).unwrap()[0];

        // concrete operands fold to a constant
        let mut func = Function::new("f", &[]);
        let mut b = Builder::at_body_end(&mut func);
        let cx = b.constant_index(x);
        let cs = b.constant_index(s);
        let inner = b.affine_apply(g.clone(), vec![cx, cs]);
        let v = make_folded_composed_affine_apply(&mut b, &f, &[inner]).unwrap();
        assert_eq!(func.constant_value(v), Some(expected));
    }

    // symbolic operands produce one apply whose map agrees with f ∘ g
    let mut func = Function::new("f", &[Type::Index, Type::Index]);
    let (x, s) = (func.argument(0), func.argument(1));
    let mut b = Builder::at_body_end(&mut func);
    let inner = b.affine_apply(g.clone(), vec![x, s]);
    let v = make_folded_composed_affine_apply(&mut b, &f, &[inner]).unwrap();
    let op = func.defining_op(v).unwrap();
    assert_eq!(func.op(op).operands, vec![x, s]);
    let OpKind::AffineApply(map) = &func.op(op).kind else {
        panic!("expected affine.apply");
    };
    for (xv, sv) in [(1, 2), (9, -3)] {
        assert_eq!(map.apply(&[xv], &[sv]), direct.apply(&[xv], &[sv]));
    }
}

#[test]
fn test_tiling_exactness() {
    let mut func = Function::new("f", &[Type::Index]);
    let n = func.argument(0);
    let mut b = Builder::at_body_end(&mut func);
    let c0 = b.constant_index(0);
    let c4 = b.constant_index(4);
    let tiled = apply_tiling(&mut b, &[LoopRange { min: c0, max: n, step: c4 }], &[3]).unwrap();
    assert_eq!(b.func().constant_value(tiled[0].step), Some(12));

    let err = apply_tiling(&mut b, &[LoopRange { min: c0, max: n, step: n }], &[3]).unwrap_err();
    assert_eq!(err.kind, LoweringErrorKind::NonConstantStep);
}

#[test]
fn test_nest_shape() {
    let mut func = Function::new("f", &[Type::Index, Type::Index, Type::Index]);
    let args = func.arguments().to_vec();
    let mut b = Builder::at_body_end(&mut func);
    let c0 = b.constant_index(0);
    let c1 = b.constant_index(1);
    let ranges: Vec<LoopRange> = args.iter()
        .map(|&max| LoopRange { min: c0, max, step: c1 })
        .collect();

    let mut calls = 0;
    let mut body_point = None;
    let nest = synthesize_loop_nest(&mut b, &ranges[..2], &ranges[2..], |b, par, red| {
        calls += 1;
        assert_eq!((par.len(), red.len()), (2, 1));
        body_point = Some(b.insert_point());
        Ok(())
    }).unwrap();

    assert_eq!(calls, 1);
    assert_eq!(nest.len(), 3);
    for (l, &max) in nest.iter().zip(&args) {
        assert_eq!(func.op(*l).operands[1], max);
    }
    assert_eq!(func.parent_op(nest[1]), Some(nest[0]));
    assert_eq!(func.parent_op(nest[2]), Some(nest[1]));
    assert_eq!(body_point, Some(InsertPoint::End(func.op(nest[2]).regions[0])));
}

#[test]
fn test_lowering_without_contractions_is_identity() {
    let mut func = Function::new("f", &[Type::Index]);
    let n = func.argument(0);
    let mut b = Builder::at_body_end(&mut func);
    let c0 = b.constant_index(0);
    let c1 = b.constant_index(1);
    let r = b.range(c0, n, c1);
    let buf = b.alloc(&[n]);
    let v = b.view(buf, &[r]);
    b.for_loop(c0, n, c1, |b, iv| {
        let x = b.load(v, &[iv]);
        let y = b.addf(x, x);
        b.store(y, v, &[iv]);
    });

    let before = func.clone();
    let stats = lower_to_loops(&mut func, &LoweringConfig::default()).unwrap();
    assert_eq!(stats, LoweringStats::default());
    assert_eq!(func.num_ops(), before.num_ops());
    let ops = func.walk_pre_order();
    assert_eq!(ops, before.walk_pre_order());
    for op in ops {
        assert_eq!(func.op(op), before.op(op));
    }
}

#[test]
fn test_dot_end_to_end() {
    let mut func = build_kernel(ContractionKind::Dot, &[128], false);
    lower_to_loops(&mut func, &LoweringConfig::default()).unwrap();

    let fors = loops(&func);
    assert_eq!(fors.len(), 1);
    let bounds: Vec<_> = func.op(fors[0]).operands.iter()
        .map(|&v| func.constant_value(v))
        .collect();
    assert_eq!(bounds, vec![Some(0), Some(128), Some(1)]);
    assert_eq!(count(&func, |k| matches!(k, OpKind::Store)), 1);
    assert_eq!(count(&func, |k| k.as_contraction().is_some()), 0);
}

#[test]
fn test_symbolic_matmul_uses_arguments_as_bounds() {
    let mut func = build_kernel(ContractionKind::Matmul, &[0, 0, 0], true);
    let (m, n, k) = (func.argument(0), func.argument(1), func.argument(2));
    lower_to_loops(&mut func, &LoweringConfig::default()).unwrap();
    let uppers: Vec<_> = loops(&func).iter().map(|&l| func.op(l).operands[1]).collect();
    // parallel i, j outside, reduction k inside
    assert_eq!(uppers, vec![m, n, k]);
    assert_eq!(count(&func, |k| matches!(k, OpKind::AffineApply(_))), 0);
}

#[test]
fn test_tiled_matmul_pipeline() {
    let mut func = build_kernel(ContractionKind::Matmul, &[64, 64, 64], true);
    let config = LoweringConfig::default()
        .with_tile_sizes(ContractionKind::Matmul, vec![8, 4, 1]);
    let result = run_pipeline(&mut func, &config).unwrap();
    assert!(result.modified);
    let steps: Vec<_> = loops(&func).iter()
        .map(|&l| func.constant_value(func.op(l).operands[2]))
        .collect();
    assert_eq!(steps, vec![Some(8), Some(4), Some(1)]);
}

#[test]
fn test_symbolic_step_cannot_be_tiled() {
    let mut func = Function::new("f", &[Type::Index, Type::Index]);
    let (n, step) = (func.argument(0), func.argument(1));
    let mut b = Builder::at_body_end(&mut func);
    let c0 = b.constant_index(0);
    let r = b.range(c0, n, step);
    let a = b.alloc(&[n]);
    let va = b.view(a, &[r]);
    let vb = b.view(a, &[r]);
    let vc = b.view(a, &[]);
    b.dot(va, vb, vc);

    let config = LoweringConfig::default().with_tile_sizes(ContractionKind::Dot, vec![2]);
    let err = lower_to_loops(&mut func, &config).unwrap_err();
    let lowering = err.downcast_ref::<LoweringError>().unwrap();
    assert_eq!(lowering.kind, LoweringErrorKind::NonConstantStep);
}

#[test]
fn test_oversized_tile_factor_is_reported() {
    let mut func = Function::new("f", &[Type::Index]);
    let n = func.argument(0);
    let mut b = Builder::at_body_end(&mut func);
    let c0 = b.constant_index(0);
    let c2 = b.constant_index(2);
    let r = b.range(c0, n, c2);
    let a = b.alloc(&[n]);
    let va = b.view(a, &[r]);
    let vb = b.view(a, &[r]);
    let vc = b.view(a, &[]);
    b.set_location(Location::new("dot.mlir", 9, 3));
    b.dot(va, vb, vc);

    let config = LoweringConfig::default().with_tile_sizes(ContractionKind::Dot, vec![i64::MAX]);
    let err = lower_to_loops(&mut func, &config).unwrap_err();
    let lowering = err.downcast_ref::<LoweringError>().unwrap();
    assert_eq!(lowering.kind, LoweringErrorKind::StepOverflow);
    assert_eq!(lowering.location.as_ref().map(|l| l.line), Some(9));
}

#[test]
fn test_finer_grained_then_slices_then_loops() {
    let mut func = build_kernel(ContractionKind::Matmul, &[3, 4, 5], false);
    lower_to_finer_grained_contractions(&mut func).unwrap();
    assert_eq!(count(&func, |k| k.as_contraction() == Some(ContractionKind::Matvec)), 1);
    lower_to_finer_grained_contractions(&mut func).unwrap();
    assert_eq!(count(&func, |k| k.as_contraction() == Some(ContractionKind::Dot)), 1);

    let slices = count(&func, |k| matches!(k, OpKind::Slice { .. }));
    assert_eq!(slices, 4);
    let stats = compose_slice_ops(&mut func).unwrap();
    assert_eq!(stats.rewritten, slices);
    assert_eq!(count(&func, |k| matches!(k, OpKind::Slice { .. })), 0);

    lower_to_loops(&mut func, &LoweringConfig::default()).unwrap();
    let fors = loops(&func);
    let uppers: Vec<_> = fors.iter()
        .map(|&l| func.constant_value(func.op(l).operands[1]))
        .collect();
    // j over N, i over M, k over K
    assert_eq!(uppers, vec![Some(4), Some(3), Some(5)]);
}

#[test]
fn test_composed_views_keep_pinned_indices() {
    let mut func = build_kernel(ContractionKind::Matvec, &[6, 2], false);
    lower_to_finer_grained_contractions(&mut func).unwrap();
    compose_slice_ops(&mut func).unwrap();

    let dot = func.walk_pre_order().into_iter()
        .find(|&o| func.op(o).kind.as_contraction() == Some(ContractionKind::Dot))
        .unwrap();
    let row = func.op(dot).operands[0];
    let row_view = func.defining_op(row).unwrap();
    let iv = func.op(row_view).operands[1];
    assert!(func.induction_var_owner(iv).is_some());
    let k_range = func.op(row_view).operands[2];
    assert_eq!(func.constant_value(range_parts(&func, k_range).unwrap().max), Some(2));
}

#[test]
fn test_printed_output() {
    let mut func = build_kernel(ContractionKind::Dot, &[8], false);
    lower_to_loops(&mut func, &LoweringConfig::default()).unwrap();
    let text = print_function(&func);
    assert!(text.starts_with("func @dot() {"));
    assert!(text.contains("affine.for"));
    assert!(text.contains("mulf"));
    assert!(!text.contains("linalg.dot"));
}

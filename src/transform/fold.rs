//! Folding single-result affine applications.
//!
//! Before anything is emitted, the map is composed with every `affine.apply`
//! that produces one of its operands, so chains of derived bounds collapse
//! into a single map over the original values. If the composed result is a
//! bare dimension or symbol, the matching operand is reused as is; if it is a
//! constant, a constant is materialized. Only otherwise is a new
//! `affine.apply` emitted.

use crate::affine::{AffineExpr, AffineMap};
use crate::ir::{Builder, Function, OpKind, ValueId};
use crate::utils::errors::{LoweringError, LoweringResult};
use log::trace;

/// Compose `map` with the affine applications defining its operands until no
/// operand is produced by an `affine.apply`.
///
/// Operands of the inner applications take the place of the folded operand:
/// inner dimensions become new dimensions, inner symbols new symbols.
pub fn fully_compose_affine_map_and_operands(
    func: &Function,
    map: &AffineMap,
    operands: &[ValueId],
) -> (AffineMap, Vec<ValueId>) {
    let mut map = map.clone();
    let mut operands = operands.to_vec();
    while operands.iter().any(|&v| matches!(func.defining_kind(v), Some(OpKind::AffineApply(_)))) {
        let (next_map, next_operands) = compose_once(func, &map, &operands);
        map = next_map;
        operands = next_operands;
    }
    (map, operands)
}

fn compose_once(func: &Function, map: &AffineMap, operands: &[ValueId]) -> (AffineMap, Vec<ValueId>) {
    let mut dims = Vec::new();
    let mut symbols = Vec::new();
    let mut dim_repl = Vec::with_capacity(map.num_dims());
    let mut sym_repl = Vec::with_capacity(map.num_symbols());

    for (pos, &value) in operands.iter().enumerate() {
        let is_dim = pos < map.num_dims();
        let replacement = match func.defining_op(value).map(|op| func.op(op)) {
            Some(inner_op) => match &inner_op.kind {
                OpKind::AffineApply(inner) => {
                    let inner_dims: Vec<AffineExpr> = inner_op.operands[..inner.num_dims()]
                        .iter()
                        .map(|&v| {
                            dims.push(v);
                            AffineExpr::dim(dims.len() - 1)
                        })
                        .collect();
                    let inner_syms: Vec<AffineExpr> = inner_op.operands[inner.num_dims()..]
                        .iter()
                        .map(|&v| {
                            symbols.push(v);
                            AffineExpr::symbol(symbols.len() - 1)
                        })
                        .collect();
                    inner.result(0).replace_dims_and_symbols(&inner_dims, &inner_syms)
                }
                _ => keep_operand(value, is_dim, &mut dims, &mut symbols),
            },
            None => keep_operand(value, is_dim, &mut dims, &mut symbols),
        };
        if is_dim {
            dim_repl.push(replacement);
        } else {
            sym_repl.push(replacement);
        }
    }

    let results = map.results().iter()
        .map(|e| e.replace_dims_and_symbols(&dim_repl, &sym_repl))
        .collect();
    let composed = AffineMap::new(dims.len(), symbols.len(), results);
    dims.extend(symbols);
    (composed, dims)
}

fn keep_operand(value: ValueId, is_dim: bool, dims: &mut Vec<ValueId>, symbols: &mut Vec<ValueId>) -> AffineExpr {
    if is_dim {
        dims.push(value);
        AffineExpr::dim(dims.len() - 1)
    } else {
        symbols.push(value);
        AffineExpr::symbol(symbols.len() - 1)
    }
}

/// Substitute operands produced by constants into the map and drop them.
pub fn fold_constant_operands(
    func: &Function,
    map: &AffineMap,
    operands: &[ValueId],
) -> (AffineMap, Vec<ValueId>) {
    let mut dims = Vec::new();
    let mut symbols = Vec::new();
    let mut dim_repl = Vec::with_capacity(map.num_dims());
    let mut sym_repl = Vec::with_capacity(map.num_symbols());
    for (pos, &value) in operands.iter().enumerate() {
        let is_dim = pos < map.num_dims();
        let replacement = match func.constant_value(value) {
            Some(c) => AffineExpr::constant(c),
            None => keep_operand(value, is_dim, &mut dims, &mut symbols),
        };
        if is_dim {
            dim_repl.push(replacement);
        } else {
            sym_repl.push(replacement);
        }
    }
    let results = map.results().iter()
        .map(|e| e.replace_dims_and_symbols(&dim_repl, &sym_repl))
        .collect();
    let folded = AffineMap::new(dims.len(), symbols.len(), results);
    dims.extend(symbols);
    (folded, dims)
}

/// Reuse an operand or materialize a constant when the single result of
/// `map` allows it.
pub fn try_fold(b: &mut Builder<'_>, map: &AffineMap, operands: &[ValueId]) -> Option<ValueId> {
    let expr = map.result(0);
    if let Some(pos) = expr.as_dim() {
        return Some(operands[pos]);
    }
    if let Some(pos) = expr.as_symbol() {
        return Some(operands[map.num_dims() + pos]);
    }
    expr.as_constant().map(|c| b.constant_index(c))
}

/// Fold `map` applied to `operands` into a value at the builder's position.
///
/// A constant result does not look at the operands at all.
pub fn make_folded_composed_affine_apply(
    b: &mut Builder<'_>,
    map: &AffineMap,
    operands: &[ValueId],
) -> LoweringResult<ValueId> {
    if map.num_results() != 1 {
        return Err(LoweringError::arity_mismatch(format!(
            "expected a single-result map, got {}", map
        )));
    }
    if let Some(c) = map.result(0).as_constant() {
        trace!("folded {} to constant {}", map, c);
        return Ok(b.constant_index(c));
    }
    if map.num_inputs() != operands.len() {
        return Err(LoweringError::arity_mismatch(format!(
            "map {} takes {} operands, got {}", map, map.num_inputs(), operands.len()
        )));
    }

    let (composed, composed_operands) = fully_compose_affine_map_and_operands(b.func(), map, operands);
    if let Some(value) = try_fold(b, &composed, &composed_operands) {
        trace!("folded {} to {}", composed, value);
        return Ok(value);
    }
    let (folded, folded_operands) = fold_constant_operands(b.func(), &composed, &composed_operands);
    if let Some(value) = try_fold(b, &folded, &folded_operands) {
        trace!("folded {} to {} after constant propagation", folded, value);
        return Ok(value);
    }
    let value = b.affine_apply(folded, folded_operands);
    trace!("materialized affine.apply {}", value);
    Ok(value)
}

//! Deriving loop ranges from operand ranges.
//!
//! The map sends the concatenated operand dimensions to the loop dimensions.
//! Mins, maxes and steps are pushed through it as three separate vectors:
//! each result expression becomes its own single-result map and is folded
//! once per component.

use crate::affine::AffineMap;
use crate::ir::{Builder, Function, ValueId};
use crate::linalg::range_parts;
use crate::transform::fold::make_folded_composed_affine_apply;
use crate::transform::tiling::apply_tiling;
use crate::utils::errors::{LoweringError, LoweringResult};

/// Bounds of one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRange {
    /// Lower bound, inclusive
    pub min: ValueId,
    /// Upper bound, exclusive
    pub max: ValueId,
    /// Step
    pub step: ValueId,
}

/// Range components split into parallel vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeParts {
    /// Lower bounds
    pub mins: Vec<ValueId>,
    /// Upper bounds
    pub maxes: Vec<ValueId>,
    /// Steps
    pub steps: Vec<ValueId>,
}

impl RangeParts {
    /// Empty parts with room for `n` ranges.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            mins: Vec::with_capacity(n),
            maxes: Vec::with_capacity(n),
            steps: Vec::with_capacity(n),
        }
    }

    /// Split range values into their components.
    pub fn from_ranges(func: &Function, ranges: &[ValueId]) -> LoweringResult<Self> {
        let mut parts = Self::with_capacity(ranges.len());
        for &range in ranges {
            let r = range_parts(func, range)?;
            parts.mins.push(r.min);
            parts.maxes.push(r.max);
            parts.steps.push(r.step);
        }
        Ok(parts)
    }

    /// Zip the components back into triples.
    pub fn into_loop_ranges(self) -> Vec<LoopRange> {
        self.mins.into_iter()
            .zip(self.maxes)
            .zip(self.steps)
            .map(|((min, max), step)| LoopRange { min, max, step })
            .collect()
    }
}

/// Push the components of `ranges` through `map`, one fold per result and
/// component.
///
/// `map` must take one dimension per range and no symbols.
pub fn make_generic_range_parts(
    b: &mut Builder<'_>,
    map: &AffineMap,
    ranges: &[ValueId],
) -> LoweringResult<RangeParts> {
    if map.num_symbols() != 0 || !map.range_sizes().is_empty() {
        return Err(LoweringError::symbols_not_allowed(format!(
            "range derivation needs a map without symbols or range sizes, got {}", map
        )));
    }
    if map.num_inputs() != ranges.len() {
        return Err(LoweringError::arity_mismatch(format!(
            "map {} takes {} ranges, got {}", map, map.num_inputs(), ranges.len()
        )));
    }

    let parts = RangeParts::from_ranges(b.func(), ranges)?;
    let mut res = RangeParts::with_capacity(map.num_results());
    for expr in map.results() {
        let single = AffineMap::single_result(map.num_dims(), 0, expr.clone());
        res.mins.push(make_folded_composed_affine_apply(b, &single, &parts.mins)?);
        res.maxes.push(make_folded_composed_affine_apply(b, &single, &parts.maxes)?);
        res.steps.push(make_folded_composed_affine_apply(b, &single, &parts.steps)?);
    }
    Ok(res)
}

/// Loop ranges derived through `map`, optionally with tiled steps.
pub fn make_generic_loop_ranges(
    b: &mut Builder<'_>,
    map: &AffineMap,
    ranges: &[ValueId],
    tile_sizes: Option<&[i64]>,
) -> LoweringResult<Vec<LoopRange>> {
    let loop_ranges = make_generic_range_parts(b, map, ranges)?.into_loop_ranges();
    match tile_sizes {
        Some(sizes) => apply_tiling(b, &loop_ranges, sizes),
        None => Ok(loop_ranges),
    }
}

/// Like [`make_generic_loop_ranges`] without tiling, but materialized as
/// `linalg.range` values.
pub fn make_generic_ranges(
    b: &mut Builder<'_>,
    map: &AffineMap,
    ranges: &[ValueId],
) -> LoweringResult<Vec<ValueId>> {
    let loop_ranges = make_generic_range_parts(b, map, ranges)?.into_loop_ranges();
    Ok(loop_ranges.into_iter()
        .map(|r| b.range(r.min, r.max, r.step))
        .collect())
}

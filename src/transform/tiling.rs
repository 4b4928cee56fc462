//! Step tiling.
//!
//! Tiling here only coarsens each loop's step by a constant factor:
//!
//! ```text
//! for i = lo to hi step s        for i = lo to hi step s * t
//! ```
//!
//! Bounds are left alone. A later stage would add the intra-tile loop.

use crate::ir::Builder;
use crate::transform::ranges::LoopRange;
use crate::utils::errors::{LoweringError, LoweringResult};

/// Multiply each constant step by its tile factor.
///
/// Steps must be positive constants. Factors are taken as given, but a
/// product that does not fit in an `i64` is rejected.
pub fn apply_tiling(
    b: &mut Builder<'_>,
    ranges: &[LoopRange],
    tile_sizes: &[i64],
) -> LoweringResult<Vec<LoopRange>> {
    if tile_sizes.len() != ranges.len() {
        return Err(LoweringError::arity_mismatch(format!(
            "{} tile sizes for {} loops", tile_sizes.len(), ranges.len()
        )));
    }
    let mut tiled = Vec::with_capacity(ranges.len());
    for (range, &factor) in ranges.iter().zip(tile_sizes) {
        let step = b.func().constant_value(range.step).ok_or_else(|| {
            LoweringError::non_constant_step(format!(
                "cannot tile loop with step {}: not a constant", range.step
            ))
        })?;
        if step <= 0 {
            return Err(LoweringError::non_positive_step(format!(
                "cannot tile loop with step {}", step
            )));
        }
        let product = step.checked_mul(factor).ok_or_else(|| {
            LoweringError::step_overflow(format!("step {} times tile size {}", step, factor))
        })?;
        let step = b.constant_index(product);
        tiled.push(LoopRange { step, ..*range });
    }
    Ok(tiled)
}

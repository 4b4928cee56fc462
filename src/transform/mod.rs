//! Lowering passes.
//!
//! Bottom-up: `fold` folds affine applications, `ranges` derives loop ranges
//! from operand ranges, `tiling` coarsens steps, `loops` synthesizes loop
//! nests, `lower` drives them over a function. `finer` and `slices` are the
//! sibling rewrites, and `pipeline` sequences everything.

pub mod fold;
pub mod ranges;
pub mod tiling;
pub mod loops;
pub mod finer;
pub mod slices;
pub mod lower;
pub mod pipeline;

pub use fold::make_folded_composed_affine_apply;
pub use ranges::{make_generic_loop_ranges, make_generic_ranges, LoopRange, RangeParts};
pub use tiling::apply_tiling;
pub use loops::{build_loop_nest, synthesize_loop_nest, write_contraction_as_loops};
pub use lower::{lower_contractions_to_loops, lower_to_finer_grained_contractions, LoweringStats};
pub use slices::compose_slice_ops_in;
pub use pipeline::{
    ComposeSliceOps, LowerToFinerGrainedContractions, LowerToLoops, PassKind, Pipeline, PipelineResult,
};

use crate::ir::Function;
use anyhow::Result;

/// A rewrite over a whole function.
pub trait Pass {
    /// Run the pass. Any violated precondition aborts it.
    fn run(&self, func: &mut Function) -> Result<LoweringStats>;

    /// Command-line name of the pass.
    fn name(&self) -> &str;
}

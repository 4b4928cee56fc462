//! # linalg-lower - Loop-nest lowering for tensor contractions
//!
//! Rewrites abstract contractions (matmul, matvec, dot) over strided views
//! into explicit affine loop nests:
//! - Affine expressions and maps with eager constant folding
//! - Loop ranges derived from operand ranges through inverted indexing maps
//! - Optional step tiling
//! - Parallel-outer, reduction-inner loop nest synthesis
//! - Sibling rewrites: finer-grained contractions and slice composition
//!
//! ## Architecture
//!
//! ```text
//! LoweringDriver → LoopNestSynthesizer → RangeComposer [→ Tiler] → AffineExpressionFolder
//!  (transform::lower)  (transform::loops)  (transform::ranges)  (transform::tiling)  (transform::fold)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use linalg_lower::prelude::*;
//!
//! let mut func = build_kernel(ContractionKind::Matmul, &[64, 64, 64], true);
//! let config = LoweringConfig::default()
//!     .with_tile_sizes(ContractionKind::Matmul, vec![4, 4, 1]);
//! linalg_lower::run_pipeline(&mut func, &config)?;
//! println!("{}", print_function(&func));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod affine;
pub mod ir;
pub mod linalg;
pub mod transform;
pub mod kernels;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::affine::{AffineBinaryKind, AffineExpr, AffineMap};
    pub use crate::ir::{print_function, Builder, Function, OpId, OpKind, Type, ValueId};
    pub use crate::linalg::{Contraction, ContractionInfo, ContractionKind};
    pub use crate::transform::{LoopRange, LoweringStats, Pass, PassKind, Pipeline, PipelineResult};
    pub use crate::kernels::build_kernel;
    pub use crate::utils::errors::*;
    pub use crate::LoweringConfig;
}

use anyhow::Result;
use ir::Function;
use linalg::ContractionKind;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use transform::{LoweringStats, Pass, PassKind, Pipeline, PipelineResult};

/// Configuration for the lowering pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoweringConfig {
    /// Step tiling factors per contraction kind, one per loop
    pub tile_sizes: BTreeMap<ContractionKind, Vec<i64>>,
    /// Passes to run, in order
    pub passes: Vec<PassKind>,
    /// Verbosity level: 0 logs errors only, 1 warnings, up to 4 for trace
    pub verbosity: u8,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            tile_sizes: BTreeMap::new(),
            passes: vec![PassKind::LowerToLoops],
            verbosity: 1,
        }
    }
}

impl LoweringConfig {
    /// Tile loops of `kind` by `sizes`.
    pub fn with_tile_sizes(mut self, kind: ContractionKind, sizes: Vec<i64>) -> Self {
        self.tile_sizes.insert(kind, sizes);
        self
    }

    /// Replace the pass list.
    pub fn with_passes(mut self, passes: Vec<PassKind>) -> Self {
        self.passes = passes;
        self
    }

    /// Log level filter matching `verbosity`.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbosity {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Replace every contraction in `func` with its loop nest.
pub fn lower_to_loops(func: &mut Function, config: &LoweringConfig) -> Result<LoweringStats> {
    PassKind::LowerToLoops.create(config).run(func)
}

/// Refine every matmul and matvec in `func` by one level.
pub fn lower_to_finer_grained_contractions(func: &mut Function) -> Result<LoweringStats> {
    transform::LowerToFinerGrainedContractions.run(func)
}

/// Fold every slice chain in `func` into a view over its root buffer.
pub fn compose_slice_ops(func: &mut Function) -> Result<LoweringStats> {
    transform::ComposeSliceOps.run(func)
}

/// Run the passes listed in `config`, in order.
pub fn run_pipeline(func: &mut Function, config: &LoweringConfig) -> Result<PipelineResult> {
    Pipeline::new(config).run(func)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = LoweringConfig::default();
        assert_eq!(config.passes, vec![PassKind::LowerToLoops]);
        assert!(config.tile_sizes.is_empty());
        let tiled = config.with_tile_sizes(ContractionKind::Dot, vec![4]);
        assert_eq!(tiled.tile_sizes[&ContractionKind::Dot], vec![4]);
    }

    #[test]
    fn test_verbosity_sets_log_level() {
        let mut config = LoweringConfig::default();
        assert_eq!(config.log_level(), log::LevelFilter::Warn);
        config.verbosity = 0;
        assert_eq!(config.log_level(), log::LevelFilter::Error);
        config.verbosity = 3;
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
        config.verbosity = 9;
        assert_eq!(config.log_level(), log::LevelFilter::Trace);
    }
}

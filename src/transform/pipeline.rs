//! Pass pipeline.
//!
//! The three rewrites can run in any order. A pipeline is built from a
//! [`LoweringConfig`] and stops at the first failing pass.

use crate::ir::Function;
use crate::linalg::ContractionKind;
use crate::transform::lower::{lower_contractions_to_loops, lower_to_finer_grained_contractions, LoweringStats};
use crate::transform::slices::compose_slice_ops_in;
use crate::transform::Pass;
use crate::LoweringConfig;
use anyhow::{Context, Result};
use log::info;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The available passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    /// Fold slice chains into views
    ComposeSliceOps,
    /// Split matmul and matvec into loops of smaller contractions
    LowerToFinerGrainedContractions,
    /// Replace contractions by loop nests
    LowerToLoops,
}

impl PassKind {
    /// All passes.
    pub const ALL: [PassKind; 3] = [
        Self::ComposeSliceOps,
        Self::LowerToFinerGrainedContractions,
        Self::LowerToLoops,
    ];

    /// Command-line and config name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ComposeSliceOps => "compose-slice-ops",
            Self::LowerToFinerGrainedContractions => "lower-to-finer-grained-contractions",
            Self::LowerToLoops => "lower-to-loops",
        }
    }

    /// Instantiate the pass with the settings of `config`.
    pub fn create(self, config: &LoweringConfig) -> Box<dyn Pass> {
        match self {
            Self::ComposeSliceOps => Box::new(ComposeSliceOps),
            Self::LowerToFinerGrainedContractions => Box::new(LowerToFinerGrainedContractions),
            Self::LowerToLoops => Box::new(LowerToLoops::new(config.tile_sizes.clone())),
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PassKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown pass `{}`", s))
    }
}

/// Contraction-to-loops lowering with optional per-kind tiling.
#[derive(Debug, Clone, Default)]
pub struct LowerToLoops {
    tile_sizes: BTreeMap<ContractionKind, Vec<i64>>,
}

impl LowerToLoops {
    /// Lowering that tiles each kind by its entry in `tile_sizes`.
    pub fn new(tile_sizes: BTreeMap<ContractionKind, Vec<i64>>) -> Self {
        Self { tile_sizes }
    }
}

impl Pass for LowerToLoops {
    fn run(&self, func: &mut Function) -> Result<LoweringStats> {
        lower_contractions_to_loops(func, &self.tile_sizes)
            .with_context(|| format!("{} failed on @{}", self.name(), func.name()))
    }

    fn name(&self) -> &str {
        PassKind::LowerToLoops.name()
    }
}

/// One level of contraction refinement.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerToFinerGrainedContractions;

impl Pass for LowerToFinerGrainedContractions {
    fn run(&self, func: &mut Function) -> Result<LoweringStats> {
        lower_to_finer_grained_contractions(func)
            .with_context(|| format!("{} failed on @{}", self.name(), func.name()))
    }

    fn name(&self) -> &str {
        PassKind::LowerToFinerGrainedContractions.name()
    }
}

/// Slice composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeSliceOps;

impl Pass for ComposeSliceOps {
    fn run(&self, func: &mut Function) -> Result<LoweringStats> {
        let rewritten = compose_slice_ops_in(func)
            .with_context(|| format!("{} failed on @{}", self.name(), func.name()))?;
        Ok(LoweringStats { rewritten, created: rewritten, loops: 0 })
    }

    fn name(&self) -> &str {
        PassKind::ComposeSliceOps.name()
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineResult {
    /// Passes run, with what each did
    pub applied_passes: Vec<(String, LoweringStats)>,
    /// Whether any pass changed the function
    pub modified: bool,
}

impl PipelineResult {
    /// Total operations rewritten.
    pub fn total_rewritten(&self) -> usize {
        self.applied_passes.iter().map(|(_, s)| s.rewritten).sum()
    }
}

/// An ordered list of passes.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// Create a pipeline from a configuration.
    pub fn new(config: &LoweringConfig) -> Self {
        Self {
            passes: config.passes.iter().map(|p| p.create(config)).collect(),
        }
    }

    /// Pipeline with the default configuration.
    pub fn default_pipeline() -> Self {
        Self::new(&LoweringConfig::default())
    }

    /// Append a pass.
    pub fn with_pass(mut self, pass: Box<dyn Pass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Names of the passes, in run order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass in order.
    pub fn run(&self, func: &mut Function) -> Result<PipelineResult> {
        let mut result = PipelineResult::default();
        for pass in &self.passes {
            let stats = pass.run(func)?;
            info!(
                "{}: rewrote {} ops, created {} ops, {} loops",
                pass.name(), stats.rewritten, stats.created, stats.loops
            );
            result.modified |= stats.rewritten > 0;
            result.applied_passes.push((pass.name().to_string(), stats));
        }
        Ok(result)
    }
}

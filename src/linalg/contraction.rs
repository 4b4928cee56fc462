//! Tensor contractions: matmul, matvec and dot.
//!
//! Each kind is described by a static [`ContractionInfo`] capability record:
//! its view arity, how many of its loops are parallel and how many are
//! reductions, how loops index the operand views, and the scalar body that
//! goes in the innermost loop.

use crate::affine::{AffineExpr, AffineMap};
use crate::ir::{Builder, Function, OpId, ValueId};
use crate::linalg::view::view_root_indexing;
use crate::utils::errors::{LoweringError, LoweringResult};
use crate::utils::location::Location;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

/// The contraction kinds the lowering recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractionKind {
    /// `C(i, j) += A(i, k) * B(k, j)`
    Matmul,
    /// `C(i) += A(i, k) * B(k)`
    Matvec,
    /// `C() += A(k) * B(k)`
    Dot,
}

/// Emits the per-element computation given the views (inputs then output),
/// the parallel induction variables and the reduction induction variables.
pub type ScalarBodyFn =
    fn(&mut Builder<'_>, &[ValueId], &[ValueId], &[ValueId]) -> LoweringResult<()>;

/// Per-kind capability record.
pub struct ContractionInfo {
    /// Number of input views
    pub num_inputs: usize,
    /// Number of views, inputs and output
    pub num_views: usize,
    /// Rank expected for each view
    pub view_ranks: &'static [usize],
    /// Loops whose iterations write distinct output elements
    pub num_parallel_dims: usize,
    /// Loops accumulating into the same output element
    pub num_reduction_dims: usize,
    /// Scalar body emitter
    pub scalar_body: ScalarBodyFn,
}

impl ContractionInfo {
    /// Total number of loops.
    pub fn num_loops(&self) -> usize {
        self.num_parallel_dims + self.num_reduction_dims
    }
}

static MATMUL_INFO: ContractionInfo = ContractionInfo {
    num_inputs: 2,
    num_views: 3,
    view_ranks: &[2, 2, 2],
    num_parallel_dims: 2,
    num_reduction_dims: 1,
    scalar_body: emit_matmul,
};

static MATVEC_INFO: ContractionInfo = ContractionInfo {
    num_inputs: 2,
    num_views: 3,
    view_ranks: &[2, 1, 1],
    num_parallel_dims: 1,
    num_reduction_dims: 1,
    scalar_body: emit_matvec,
};

static DOT_INFO: ContractionInfo = ContractionInfo {
    num_inputs: 2,
    num_views: 3,
    view_ranks: &[1, 1, 0],
    num_parallel_dims: 0,
    num_reduction_dims: 1,
    scalar_body: emit_dot,
};

impl ContractionKind {
    /// All kinds.
    pub const ALL: [ContractionKind; 3] = [Self::Matmul, Self::Matvec, Self::Dot];

    /// Capability record of this kind.
    pub fn info(self) -> &'static ContractionInfo {
        match self {
            Self::Matmul => &MATMUL_INFO,
            Self::Matvec => &MATVEC_INFO,
            Self::Dot => &DOT_INFO,
        }
    }

    /// Printed operation name.
    pub fn op_name(self) -> &'static str {
        match self {
            Self::Matmul => "linalg.matmul",
            Self::Matvec => "linalg.matvec",
            Self::Dot => "linalg.dot",
        }
    }

    /// For each view, the map from loop indices to the view's subscripts.
    ///
    /// Loops are numbered parallel dimensions first, then reductions.
    pub fn loops_to_operand_range_maps(self) -> Vec<AffineMap> {
        let d = AffineExpr::dim;
        match self {
            // (i, j, k) -> A(i, k), B(k, j), C(i, j)
            Self::Matmul => vec![
                AffineMap::new(3, 0, vec![d(0), d(2)]),
                AffineMap::new(3, 0, vec![d(2), d(1)]),
                AffineMap::new(3, 0, vec![d(0), d(1)]),
            ],
            // (i, k) -> A(i, k), B(k), C(i)
            Self::Matvec => vec![
                AffineMap::new(2, 0, vec![d(0), d(1)]),
                AffineMap::new(2, 0, vec![d(1)]),
                AffineMap::new(2, 0, vec![d(0)]),
            ],
            // (k) -> A(k), B(k), C()
            Self::Dot => vec![
                AffineMap::new(1, 0, vec![d(0)]),
                AffineMap::new(1, 0, vec![d(0)]),
                AffineMap::new(1, 0, vec![]),
            ],
        }
    }

    /// Map from the concatenated operand ranges to the loop ranges.
    ///
    /// Individual view maps need not be invertible, but their concatenation
    /// must produce every loop index as a plain subscript somewhere.
    pub fn operand_ranges_to_loops_map(self) -> LoweringResult<AffineMap> {
        let maps = self.loops_to_operand_range_maps();
        AffineMap::concat(&maps)
            .and_then(|m| m.inverse_sub_map())
            .ok_or_else(|| LoweringError::arity_mismatch(format!(
                "{} does not index every loop with a plain subscript", self.op_name()
            )))
    }
}

impl fmt::Display for ContractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Matmul => "matmul",
            Self::Matvec => "matvec",
            Self::Dot => "dot",
        };
        f.write_str(name)
    }
}

impl FromStr for ContractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matmul" => Ok(Self::Matmul),
            "matvec" => Ok(Self::Matvec),
            "dot" => Ok(Self::Dot),
            other => Err(format!("unknown contraction kind `{}`", other)),
        }
    }
}

/// A contraction operation read out of the graph.
#[derive(Debug, Clone)]
pub struct Contraction {
    /// The contraction operation
    pub op: OpId,
    /// Its kind
    pub kind: ContractionKind,
    /// Views, inputs first and the output last
    pub views: Vec<ValueId>,
    /// Location of the operation
    pub location: Location,
}

impl Contraction {
    /// Read a contraction; `None` if `op` is some other kind.
    pub fn from_op(func: &Function, op: OpId) -> Option<Self> {
        let operation = func.op(op);
        let kind = operation.kind.as_contraction()?;
        Some(Self {
            op,
            kind,
            views: operation.operands.clone(),
            location: operation.location.clone(),
        })
    }

    /// Capability record of this contraction's kind.
    pub fn info(&self) -> &'static ContractionInfo {
        self.kind.info()
    }

    /// Input views.
    pub fn inputs(&self) -> &[ValueId] {
        &self.views[..self.info().num_inputs]
    }

    /// Output view.
    pub fn output(&self) -> ValueId {
        self.views[self.info().num_inputs]
    }

    /// Number of parallel loops.
    pub fn num_parallel_dims(&self) -> usize {
        self.info().num_parallel_dims
    }

    /// Number of reduction loops.
    pub fn num_reduction_dims(&self) -> usize {
        self.info().num_reduction_dims
    }

    /// Same as [`ContractionKind::operand_ranges_to_loops_map`], with errors
    /// located at this operation.
    pub fn operand_ranges_to_loops_map(&self) -> LoweringResult<AffineMap> {
        self.kind.operand_ranges_to_loops_map()
            .map_err(|e| e.with_location(self.location.clone()))
    }

    /// Check view count and ranks against the capability record.
    pub fn verify(&self, func: &Function) -> LoweringResult<()> {
        let info = self.info();
        if self.views.len() != info.num_views {
            return Err(LoweringError::arity_mismatch(format!(
                "{} expects {} views, found {}", self.kind.op_name(), info.num_views, self.views.len()
            )).with_location(self.location.clone()));
        }
        for (pos, (&view, &rank)) in self.views.iter().zip(info.view_ranks).enumerate() {
            let found = func.value_type(view).view_rank();
            if found != Some(rank) {
                return Err(LoweringError::arity_mismatch(format!(
                    "{} operand {} ({}) must be a rank-{} view, found {}",
                    self.kind.op_name(), pos, view, rank, func.value_type(view)
                )).with_location(self.location.clone()));
            }
        }
        Ok(())
    }

    /// The root range of every dimension of every view, inputs first.
    pub fn operand_ranges(&self, func: &Function) -> LoweringResult<Vec<ValueId>> {
        self.verify(func)?;
        let mut ranges = Vec::new();
        for (&view, &rank) in self.views.iter().zip(self.info().view_ranks) {
            for dim in 0..rank {
                let range = view_root_indexing(func, view, dim)
                    .map_err(|e| e.with_location(self.location.clone()))?;
                ranges.push(range);
            }
        }
        Ok(ranges)
    }

    /// Emit the scalar computation at the current insertion point.
    pub fn emit_scalar_implementation(
        &self,
        b: &mut Builder<'_>,
        parallel_ivs: &[ValueId],
        reduction_ivs: &[ValueId],
    ) -> LoweringResult<()> {
        let info = self.info();
        if parallel_ivs.len() != info.num_parallel_dims || reduction_ivs.len() != info.num_reduction_dims {
            return Err(LoweringError::arity_mismatch(format!(
                "{} body expects {}+{} induction variables, got {}+{}",
                self.kind.op_name(),
                info.num_parallel_dims, info.num_reduction_dims,
                parallel_ivs.len(), reduction_ivs.len()
            )).with_location(self.location.clone()));
        }
        (info.scalar_body)(b, &self.views, parallel_ivs, reduction_ivs)
    }
}

/// `C(i, j) = C(i, j) + A(i, r_k) * B(r_k, j)`
fn emit_matmul(b: &mut Builder<'_>, views: &[ValueId], par: &[ValueId], red: &[ValueId]) -> LoweringResult<()> {
    let (a, bv, c) = (views[0], views[1], views[2]);
    let (i, j, k) = (par[0], par[1], red[0]);
    let acc = b.load(c, &[i, j]);
    let lhs = b.load(a, &[i, k]);
    let rhs = b.load(bv, &[k, j]);
    let prod = b.mulf(lhs, rhs);
    let sum = b.addf(acc, prod);
    b.store(sum, c, &[i, j]);
    Ok(())
}

/// `C(i) = C(i) + A(i, r_j) * B(r_j)`
fn emit_matvec(b: &mut Builder<'_>, views: &[ValueId], par: &[ValueId], red: &[ValueId]) -> LoweringResult<()> {
    let (a, bv, c) = (views[0], views[1], views[2]);
    let (i, k) = (par[0], red[0]);
    let acc = b.load(c, &[i]);
    let lhs = b.load(a, &[i, k]);
    let rhs = b.load(bv, &[k]);
    let prod = b.mulf(lhs, rhs);
    let sum = b.addf(acc, prod);
    b.store(sum, c, &[i]);
    Ok(())
}

/// `C() = C() + A(r_i) * B(r_i)`
fn emit_dot(b: &mut Builder<'_>, views: &[ValueId], _par: &[ValueId], red: &[ValueId]) -> LoweringResult<()> {
    let (a, bv, c) = (views[0], views[1], views[2]);
    let k = red[0];
    let acc = b.load(c, &[]);
    let lhs = b.load(a, &[k]);
    let rhs = b.load(bv, &[k]);
    let prod = b.mulf(lhs, rhs);
    let sum = b.addf(acc, prod);
    b.store(sum, c, &[]);
    Ok(())
}

//! Affine maps: ordered tuples of affine expressions sharing one arity.

use crate::affine::expr::AffineExpr;
use serde::{Serialize, Deserialize};
use std::fmt;

/// A pure function `(d0, ..., dn)[s0, ..., sm] -> (e0, ..., ek)`.
///
/// `range_sizes` is the optional extra-constraint set bounding each result;
/// the lowering passes only accept maps where it is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffineMap {
    num_dims: usize,
    num_symbols: usize,
    results: Vec<AffineExpr>,
    range_sizes: Vec<AffineExpr>,
}

impl AffineMap {
    /// Create a map from its result expressions.
    ///
    /// Panics if a result refers to a dimension or symbol outside the
    /// declared arity.
    pub fn new(num_dims: usize, num_symbols: usize, results: Vec<AffineExpr>) -> Self {
        for expr in &results {
            assert!(
                expr.is_well_formed(num_dims, num_symbols),
                "affine expression {} does not fit ({} dims, {} symbols)",
                expr, num_dims, num_symbols
            );
        }
        Self {
            num_dims,
            num_symbols,
            results,
            range_sizes: Vec::new(),
        }
    }

    /// Attach range sizes (one per result).
    pub fn with_range_sizes(mut self, range_sizes: Vec<AffineExpr>) -> Self {
        assert_eq!(range_sizes.len(), self.results.len());
        self.range_sizes = range_sizes;
        self
    }

    /// Create an identity map of given dimension.
    pub fn identity(n_dim: usize) -> Self {
        Self::new(n_dim, 0, (0..n_dim).map(AffineExpr::dim).collect())
    }

    /// Create a map without inputs and a single constant result.
    pub fn constant(value: i64) -> Self {
        Self::new(0, 0, vec![AffineExpr::constant(value)])
    }

    /// Create a single-result map.
    pub fn single_result(num_dims: usize, num_symbols: usize, expr: AffineExpr) -> Self {
        Self::new(num_dims, num_symbols, vec![expr])
    }

    /// Number of dimension inputs.
    pub fn num_dims(&self) -> usize { self.num_dims }

    /// Number of symbol inputs.
    pub fn num_symbols(&self) -> usize { self.num_symbols }

    /// Total number of inputs (dimensions then symbols).
    pub fn num_inputs(&self) -> usize { self.num_dims + self.num_symbols }

    /// Number of results.
    pub fn num_results(&self) -> usize { self.results.len() }

    /// All result expressions.
    pub fn results(&self) -> &[AffineExpr] { &self.results }

    /// Result expression at the given position.
    pub fn result(&self, pos: usize) -> &AffineExpr { &self.results[pos] }

    /// Extra range constraints.
    pub fn range_sizes(&self) -> &[AffineExpr] { &self.range_sizes }

    /// Check if this is an identity map.
    pub fn is_identity(&self) -> bool {
        self.num_symbols == 0
            && self.num_dims == self.results.len()
            && self.results.iter().enumerate().all(|(i, e)| e.as_dim() == Some(i))
    }

    /// Keep only the results at the given positions.
    pub fn get_sub_map(&self, positions: &[usize]) -> Self {
        let results = positions.iter().map(|&p| self.results[p].clone()).collect();
        Self::new(self.num_dims, self.num_symbols, results)
    }

    /// Apply the map to a point.
    pub fn apply(&self, dims: &[i64], symbols: &[i64]) -> Option<Vec<i64>> {
        self.results.iter()
            .map(|expr| expr.evaluate(dims, symbols))
            .collect()
    }

    /// Compose two maps: `self` after `other`.
    ///
    /// The composed map takes `other`'s dimensions; its symbols are `self`'s
    /// symbols followed by `other`'s.
    pub fn compose(&self, other: &AffineMap) -> AffineMap {
        assert_eq!(self.num_dims, other.num_results(), "composition arity mismatch");
        let dim_repl: Vec<AffineExpr> = other.results.iter()
            .map(|e| e.shift_symbols(other.num_symbols, self.num_symbols))
            .collect();
        let results = self.results.iter()
            .map(|e| e.replace_dims_and_symbols(&dim_repl, &[]))
            .collect();
        AffineMap::new(other.num_dims, self.num_symbols + other.num_symbols, results)
    }

    /// Concatenate the results of maps sharing the same inputs.
    pub fn concat(maps: &[AffineMap]) -> Option<AffineMap> {
        let first = maps.first()?;
        let mut results = Vec::new();
        for map in maps {
            assert_eq!(map.num_dims, first.num_dims);
            assert_eq!(map.num_symbols, first.num_symbols);
            results.extend(map.results.iter().cloned());
        }
        Some(AffineMap::new(first.num_dims, first.num_symbols, results))
    }

    /// Invert the map on the results that are plain dimensions.
    ///
    /// For every dimension `d` the first result that is exactly `d` is picked.
    /// The inverse takes one input per result of `self` and has one result per
    /// dimension of `self`. Returns `None` if some dimension is never produced.
    pub fn inverse_sub_map(&self) -> Option<AffineMap> {
        let mut inverse = Vec::with_capacity(self.num_dims);
        for d in 0..self.num_dims {
            let pos = self.results.iter().position(|e| e.as_dim() == Some(d))?;
            inverse.push(AffineExpr::dim(pos));
        }
        Some(AffineMap::new(self.results.len(), 0, inverse))
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for i in 0..self.num_dims {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "d{}", i)?;
        }
        write!(f, ")")?;
        if self.num_symbols > 0 {
            write!(f, "[")?;
            for i in 0..self.num_symbols {
                if i > 0 { write!(f, ", ")?; }
                write!(f, "s{}", i)?;
            }
            write!(f, "]")?;
        }
        write!(f, " -> (")?;
        for (i, expr) in self.results.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", expr)?;
        }
        write!(f, ")")?;
        if !self.range_sizes.is_empty() {
            write!(f, " size (")?;
            for (i, expr) in self.range_sizes.iter().enumerate() {
                if i > 0 { write!(f, ", ")?; }
                write!(f, "{}", expr)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

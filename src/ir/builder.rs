//! Explicit insertion context for building operations.
//!
//! A [`Builder`] carries the function being mutated, the insertion point and
//! the location tag stamped on every operation it creates. Nested scopes
//! (loop bodies) are entered through [`Builder::scoped`], which restores the
//! enclosing insertion point when the scope exits, whatever the scope returns.

use crate::affine::AffineMap;
use crate::ir::graph::{BlockId, Function, InsertPoint, OpId, ValueId};
use crate::ir::ops::{OpKind, Type};
use crate::linalg::ContractionKind;
use crate::utils::location::Location;
use log::trace;

/// Insertion context: target function, insertion point and location.
pub struct Builder<'f> {
    func: &'f mut Function,
    insert_point: InsertPoint,
    location: Location,
}

impl<'f> Builder<'f> {
    /// Insert immediately before `op`, tagging new operations with its location.
    pub fn before(func: &'f mut Function, op: OpId) -> Self {
        let location = func.op(op).location.clone();
        Self {
            func,
            insert_point: InsertPoint::Before(op),
            location,
        }
    }

    /// Insert at the end of `block`.
    pub fn at_end(func: &'f mut Function, block: BlockId, location: Location) -> Self {
        Self {
            func,
            insert_point: InsertPoint::End(block),
            location,
        }
    }

    /// Insert at the end of the function body.
    pub fn at_body_end(func: &'f mut Function) -> Self {
        let body = func.body();
        let location = func.location().clone();
        Self::at_end(func, body, location)
    }

    /// The function being built.
    pub fn func(&self) -> &Function {
        &*self.func
    }

    /// Current insertion point.
    pub fn insert_point(&self) -> InsertPoint {
        self.insert_point
    }

    /// Location stamped on new operations.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Change the location stamped on subsequently created operations.
    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    /// Run `f` with the insertion point moved to the end of `block`.
    pub fn scoped<R>(&mut self, block: BlockId, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.insert_point, InsertPoint::End(block));
        let result = f(self);
        self.insert_point = saved;
        result
    }

    /// Create an operation at the current insertion point.
    pub fn create(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: &[Type],
        regions: &[Vec<Type>],
    ) -> OpId {
        let op = self.func.create_op(
            self.insert_point,
            kind,
            operands,
            result_types,
            regions,
            self.location.clone(),
        );
        trace!("created {} {}", self.func.op(op).kind.name(), op);
        op
    }

    fn create_value(&mut self, kind: OpKind, operands: Vec<ValueId>, ty: Type) -> ValueId {
        let op = self.create(kind, operands, &[ty], &[]);
        self.func.op(op).result()
    }

    /// Materialize an index constant.
    pub fn constant_index(&mut self, value: i64) -> ValueId {
        self.create_value(OpKind::Constant(value), vec![], Type::Index)
    }

    /// Apply a single-result affine map to operands.
    pub fn affine_apply(&mut self, map: AffineMap, operands: Vec<ValueId>) -> ValueId {
        assert_eq!(map.num_results(), 1, "affine.apply takes a single-result map");
        assert_eq!(map.num_inputs(), operands.len(), "affine.apply operand count");
        self.create_value(OpKind::AffineApply(map), operands, Type::Index)
    }

    /// Build a `(min, max, step)` range.
    pub fn range(&mut self, min: ValueId, max: ValueId, step: ValueId) -> ValueId {
        self.create_value(OpKind::Range, vec![min, max, step], Type::Range)
    }

    /// Allocate a buffer with the given dynamic extents.
    pub fn alloc(&mut self, sizes: &[ValueId]) -> ValueId {
        self.create_value(OpKind::Alloc, sizes.to_vec(), Type::Buffer)
    }

    /// Create a view over a buffer. Range indexings keep a dimension, index
    /// indexings drop it.
    pub fn view(&mut self, buffer: ValueId, indexings: &[ValueId]) -> ValueId {
        let rank = indexings.iter()
            .filter(|&&i| self.func.value_type(i) == Type::Range)
            .count();
        let mut operands = vec![buffer];
        operands.extend_from_slice(indexings);
        self.create_value(OpKind::View, operands, Type::View(rank))
    }

    /// Slice `view` along `dim` with a range or an index.
    pub fn slice(&mut self, view: ValueId, indexing: ValueId, dim: usize) -> ValueId {
        let parent_rank = self.func.value_type(view).view_rank().unwrap_or(0);
        assert!(dim < parent_rank, "slice dimension {} out of rank {}", dim, parent_rank);
        let rank = if self.func.value_type(indexing) == Type::Range {
            parent_rank
        } else {
            parent_rank - 1
        };
        self.create_value(OpKind::Slice { dim }, vec![view, indexing], Type::View(rank))
    }

    /// Build a loop and populate its body.
    ///
    /// `body` runs with the insertion point inside the loop and receives the
    /// induction variable.
    pub fn for_loop<R>(
        &mut self,
        lower: ValueId,
        upper: ValueId,
        step: ValueId,
        body: impl FnOnce(&mut Self, ValueId) -> R,
    ) -> (OpId, R) {
        let op = self.create(OpKind::For, vec![lower, upper, step], &[], &[vec![Type::Index]]);
        let block = self.func.op(op).regions[0];
        let iv = self.func.block(block).arguments[0];
        let result = self.scoped(block, |b| body(b, iv));
        (op, result)
    }

    /// Load a scalar from a view.
    pub fn load(&mut self, view: ValueId, indices: &[ValueId]) -> ValueId {
        let mut operands = vec![view];
        operands.extend_from_slice(indices);
        self.create_value(OpKind::Load, operands, Type::Float)
    }

    /// Store a scalar into a view.
    pub fn store(&mut self, value: ValueId, view: ValueId, indices: &[ValueId]) -> OpId {
        let mut operands = vec![value, view];
        operands.extend_from_slice(indices);
        self.create(OpKind::Store, operands, &[], &[])
    }

    /// Float addition.
    pub fn addf(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.create_value(OpKind::AddF, vec![lhs, rhs], Type::Float)
    }

    /// Float multiplication.
    pub fn mulf(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.create_value(OpKind::MulF, vec![lhs, rhs], Type::Float)
    }

    /// Create a contraction over views (inputs first, output last).
    pub fn contraction(&mut self, kind: ContractionKind, views: &[ValueId]) -> OpId {
        assert_eq!(views.len(), kind.info().num_views, "{} view count", kind.op_name());
        self.create(OpKind::Contraction(kind), views.to_vec(), &[], &[])
    }

    /// `c += a * b` over matrices.
    pub fn matmul(&mut self, a: ValueId, b: ValueId, c: ValueId) -> OpId {
        self.contraction(ContractionKind::Matmul, &[a, b, c])
    }

    /// `c += a * b` for a matrix `a` and vector `b`.
    pub fn matvec(&mut self, a: ValueId, b: ValueId, c: ValueId) -> OpId {
        self.contraction(ContractionKind::Matvec, &[a, b, c])
    }

    /// `c += a . b` over vectors.
    pub fn dot(&mut self, a: ValueId, b: ValueId, c: ValueId) -> OpId {
        self.contraction(ContractionKind::Dot, &[a, b, c])
    }
}

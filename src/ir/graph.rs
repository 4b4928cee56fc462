//! Arena-backed operation graph.
//!
//! A [`Function`] owns every operation, value and block it contains. Nodes are
//! addressed by integer handles. Erasing an operation tombstones its slot and
//! detaches it from its block and from the use lists of its operands; slots
//! are never reused, so a stale handle can be detected but never aliases a
//! newer operation.

use crate::ir::ops::{OpKind, Type};
use crate::utils::location::Location;
use std::fmt;

/// Handle to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

/// Handle to an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Handle to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Function argument at the given position
    Argument(usize),
    /// Result of an operation
    OpResult {
        /// Defining operation
        op: OpId,
        /// Result position
        index: usize,
    },
    /// Argument of a block (loop induction variables)
    BlockArgument {
        /// Owning block
        block: BlockId,
        /// Argument position
        index: usize,
    },
}

/// An SSA value.
#[derive(Debug, Clone)]
pub struct ValueData {
    /// Type of the value
    pub ty: Type,
    /// Definition site
    pub def: ValueDef,
    /// Users, one entry per operand slot referring to this value
    pub uses: Vec<OpId>,
}

/// A straight-line list of operations.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Operations in program order
    pub ops: Vec<OpId>,
    /// Block arguments
    pub arguments: Vec<ValueId>,
    /// Operation owning this block (None for the function body)
    pub parent_op: Option<OpId>,
}

/// A node of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Kind tag
    pub kind: OpKind,
    /// Ordered operands
    pub operands: Vec<ValueId>,
    /// Ordered results
    pub results: Vec<ValueId>,
    /// Nested regions (one block each)
    pub regions: Vec<BlockId>,
    /// Source location
    pub location: Location,
    /// Block containing this operation
    pub parent: BlockId,
}

impl Operation {
    /// Single result of this operation.
    ///
    /// Panics if the operation does not have exactly one result.
    pub fn result(&self) -> ValueId {
        assert_eq!(self.results.len(), 1, "{} does not have a single result", self.kind.name());
        self.results[0]
    }
}

/// Position at which new operations are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Immediately before an existing operation
    Before(OpId),
    /// At the end of a block
    End(BlockId),
}

/// A function: the unit a lowering pass operates on.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    arguments: Vec<ValueId>,
    body: BlockId,
    location: Location,
    ops: Vec<Option<Operation>>,
    values: Vec<ValueData>,
    blocks: Vec<Block>,
}

impl Function {
    /// Create an empty function with arguments of the given types.
    pub fn new(name: impl Into<String>, argument_types: &[Type]) -> Self {
        let mut func = Self {
            name: name.into(),
            arguments: Vec::new(),
            body: BlockId(0),
            location: Location::unknown(),
            ops: Vec::new(),
            values: Vec::new(),
            blocks: vec![Block::default()],
        };
        for (i, &ty) in argument_types.iter().enumerate() {
            let v = func.new_value(ty, ValueDef::Argument(i));
            func.arguments.push(v);
        }
        func
    }

    /// Set the location attached to the function.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Function name.
    pub fn name(&self) -> &str { &self.name }

    /// Location of the function itself.
    pub fn location(&self) -> &Location { &self.location }

    /// Function arguments.
    pub fn arguments(&self) -> &[ValueId] { &self.arguments }

    /// Function argument at the given position.
    pub fn argument(&self, pos: usize) -> ValueId { self.arguments[pos] }

    /// The top-level block.
    pub fn body(&self) -> BlockId { self.body }

    /// Access a block.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    /// Access a live operation.
    ///
    /// Panics if the operation was erased.
    pub fn op(&self, id: OpId) -> &Operation {
        match self.get_op(id) {
            Some(op) => op,
            None => panic!("use of erased operation {}", id),
        }
    }

    /// Access an operation if it is still live.
    pub fn get_op(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Check whether an operation handle still refers to a live operation.
    pub fn is_live(&self, id: OpId) -> bool {
        self.get_op(id).is_some()
    }

    /// Number of live operations, nested ones included.
    pub fn num_ops(&self) -> usize {
        self.ops.iter().filter(|slot| slot.is_some()).count()
    }

    /// Access a value.
    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.0 as usize]
    }

    /// Type of a value.
    pub fn value_type(&self, id: ValueId) -> Type {
        self.value(id).ty
    }

    /// Operation defining a value, if it is an operation result.
    pub fn defining_op(&self, id: ValueId) -> Option<OpId> {
        match self.value(id).def {
            ValueDef::OpResult { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Kind of the operation defining a value.
    pub fn defining_kind(&self, id: ValueId) -> Option<&OpKind> {
        self.defining_op(id).map(|op| &self.op(op).kind)
    }

    /// Constant held by a value defined by a `constant` operation.
    pub fn constant_value(&self, id: ValueId) -> Option<i64> {
        match self.defining_kind(id)? {
            OpKind::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Operations using a value (one entry per operand slot).
    pub fn uses(&self, id: ValueId) -> &[OpId] {
        &self.value(id).uses
    }

    /// The `For` operation owning an induction variable.
    pub fn induction_var_owner(&self, iv: ValueId) -> Option<OpId> {
        match self.value(iv).def {
            ValueDef::BlockArgument { block, .. } => {
                let owner = self.block(block).parent_op?;
                matches!(self.op(owner).kind, OpKind::For).then_some(owner)
            }
            _ => None,
        }
    }

    /// Operation enclosing the given one, if it is nested in a region.
    pub fn parent_op(&self, id: OpId) -> Option<OpId> {
        self.block(self.op(id).parent).parent_op
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, def, uses: Vec::new() });
        id
    }

    fn new_block(&mut self, parent_op: OpId, argument_types: &[Type]) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            ops: Vec::new(),
            arguments: Vec::new(),
            parent_op: Some(parent_op),
        });
        for (index, &ty) in argument_types.iter().enumerate() {
            let arg = self.new_value(ty, ValueDef::BlockArgument { block: id, index });
            self.blocks[id.0 as usize].arguments.push(arg);
        }
        id
    }

    /// Create an operation and insert it at the given point.
    ///
    /// `regions` lists, for each nested region, the types of its block
    /// arguments.
    pub fn create_op(
        &mut self,
        at: InsertPoint,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: &[Type],
        regions: &[Vec<Type>],
        location: Location,
    ) -> OpId {
        let (parent, index) = self.resolve(at);
        let id = OpId(self.ops.len() as u32);

        for &operand in &operands {
            self.values[operand.0 as usize].uses.push(id);
        }
        let results = result_types.iter()
            .enumerate()
            .map(|(index, &ty)| self.new_value(ty, ValueDef::OpResult { op: id, index }))
            .collect();
        let regions = regions.iter()
            .map(|args| self.new_block(id, args))
            .collect();

        self.ops.push(Some(Operation {
            kind,
            operands,
            results,
            regions,
            location,
            parent,
        }));
        self.blocks[parent.0 as usize].ops.insert(index, id);
        id
    }

    fn resolve(&self, at: InsertPoint) -> (BlockId, usize) {
        match at {
            InsertPoint::End(block) => (block, self.block(block).ops.len()),
            InsertPoint::Before(op) => {
                let parent = self.op(op).parent;
                let index = self.block(parent).ops.iter()
                    .position(|&o| o == op)
                    .unwrap_or_else(|| panic!("{} is not in its parent block", op));
                (parent, index)
            }
        }
    }

    /// Erase an operation together with everything nested in its regions.
    ///
    /// Panics if one of its results still has users outside the erased
    /// subtree.
    pub fn erase_op(&mut self, id: OpId) {
        let regions = self.op(id).regions.clone();
        for block in regions {
            let nested = self.block(block).ops.clone();
            for op in nested.into_iter().rev() {
                self.erase_op(op);
            }
        }

        let op = match self.ops[id.0 as usize].take() {
            Some(op) => op,
            None => panic!("double erase of {}", id),
        };
        for &result in &op.results {
            assert!(
                self.value(result).uses.is_empty(),
                "erasing {} ({}) whose result {} is still used",
                id, op.kind.name(), result
            );
        }
        for &operand in &op.operands {
            let uses = &mut self.values[operand.0 as usize].uses;
            if let Some(pos) = uses.iter().position(|&u| u == id) {
                uses.swap_remove(pos);
            }
        }
        self.blocks[op.parent.0 as usize].ops.retain(|&o| o != id);
    }

    /// Redirect every use of `from` to `to`.
    pub fn replace_all_uses_with(&mut self, from: ValueId, to: ValueId) {
        if from == to {
            return;
        }
        let users = std::mem::take(&mut self.values[from.0 as usize].uses);
        for &user in &users {
            if let Some(Some(op)) = self.ops.get_mut(user.0 as usize) {
                for operand in op.operands.iter_mut().filter(|o| **o == from) {
                    *operand = to;
                }
            }
        }
        let mut deduped = users;
        deduped.sort();
        deduped.dedup();
        for user in deduped {
            let count = self.op(user).operands.iter().filter(|&&o| o == to).count();
            let uses = &mut self.values[to.0 as usize].uses;
            uses.retain(|&u| u != user);
            uses.extend(std::iter::repeat(user).take(count));
        }
    }

    /// Snapshot of all live operations in post-order: the operations nested in
    /// a region come before the operation owning the region.
    pub fn walk_post_order(&self) -> Vec<OpId> {
        let mut order = Vec::with_capacity(self.num_ops());
        self.collect_post_order(self.body, &mut order);
        order
    }

    fn collect_post_order(&self, block: BlockId, order: &mut Vec<OpId>) {
        for &op in &self.block(block).ops {
            for &region in &self.op(op).regions {
                self.collect_post_order(region, order);
            }
            order.push(op);
        }
    }

    /// Snapshot of all live operations in pre-order.
    pub fn walk_pre_order(&self) -> Vec<OpId> {
        let mut order = Vec::with_capacity(self.num_ops());
        self.collect_pre_order(self.body, &mut order);
        order
    }

    fn collect_pre_order(&self, block: BlockId, order: &mut Vec<OpId>) {
        for &op in &self.block(block).ops {
            order.push(op);
            for &region in &self.op(op).regions {
                self.collect_pre_order(region, order);
            }
        }
    }
}

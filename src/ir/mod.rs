//! The operation graph the lowering passes rewrite.
//!
//! - `graph`: arena of operations, values and blocks
//! - `ops`: the closed set of operation kinds and value types
//! - `builder`: explicit, scoped insertion context
//! - `printer`: textual dump

pub mod graph;
pub mod ops;
pub mod builder;
pub mod printer;

pub use graph::{Block, BlockId, Function, InsertPoint, OpId, Operation, ValueData, ValueDef, ValueId};
pub use ops::{OpKind, Type};
pub use builder::Builder;
pub use printer::{print_function, IrPrinter};

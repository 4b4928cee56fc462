//! Textual rendering of functions.
//!
//! The syntax loosely follows MLIR's custom assembly:
//!
//! ```text
//! func @dot(%0: index) {
//!   %1 = constant 0 : index
//!   %4 = linalg.range %1:%0:%2 : !linalg.range
//!   affine.for %9 = %1 to %0 step %2 {
//!     ...
//!   }
//! }
//! ```

use crate::ir::graph::{BlockId, Function, OpId, ValueId};
use crate::ir::ops::OpKind;
use std::fmt::Write;

/// Pretty printer for functions.
pub struct IrPrinter<'a> {
    func: &'a Function,
    /// Indentation level
    indent: usize,
    /// Output buffer
    buffer: String,
    /// Print location tags after each operation
    with_locations: bool,
}

impl<'a> IrPrinter<'a> {
    /// Create a new printer.
    pub fn new(func: &'a Function) -> Self {
        Self {
            func,
            indent: 0,
            buffer: String::new(),
            with_locations: false,
        }
    }

    /// Also print the location of every operation.
    pub fn with_locations(mut self, enable: bool) -> Self {
        self.with_locations = enable;
        self
    }

    /// Take the output.
    pub fn take_output(self) -> String {
        self.buffer
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.buffer.push_str("  ");
        }
    }

    fn join(values: &[ValueId]) -> String {
        values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
    }

    /// Print the whole function.
    pub fn print_function(&mut self) {
        let func = self.func;
        let args: Vec<String> = func.arguments().iter()
            .map(|&a| format!("{}: {}", a, func.value_type(a)))
            .collect();
        let _ = writeln!(self.buffer, "func @{}({}) {{", func.name(), args.join(", "));
        self.indent += 1;
        self.print_block(func.body());
        self.indent -= 1;
        self.buffer.push_str("}\n");
    }

    fn print_block(&mut self, block: BlockId) {
        let ops = self.func.block(block).ops.clone();
        for op in ops {
            self.print_op(op);
        }
    }

    /// Print a single operation (and its regions).
    pub fn print_op(&mut self, id: OpId) {
        let func = self.func;
        let op = func.op(id);
        self.write_indent();

        if !op.results.is_empty() {
            let _ = write!(self.buffer, "{} = ", Self::join(&op.results));
        }
        let name = op.kind.name();
        let ops = &op.operands;
        let ty = op.results.first().map(|&r| func.value_type(r));
        let _ = match &op.kind {
            OpKind::Constant(c) => write!(self.buffer, "{} {}", name, c),
            OpKind::AffineApply(map) => write!(self.buffer, "{} {}({})", name, map, Self::join(ops)),
            OpKind::Range => write!(self.buffer, "{} {}:{}:{}", name, ops[0], ops[1], ops[2]),
            OpKind::View | OpKind::Load => {
                write!(self.buffer, "{} {}[{}]", name, ops[0], Self::join(&ops[1..]))
            }
            OpKind::Slice { dim } => {
                write!(self.buffer, "{} {}[{}] {{dim = {}}}", name, ops[0], ops[1], dim)
            }
            OpKind::Store => {
                write!(self.buffer, "{} {}, {}[{}]", name, ops[0], ops[1], Self::join(&ops[2..]))
            }
            OpKind::For => {
                let iv = func.block(op.regions[0]).arguments[0];
                write!(self.buffer, "{} {} = {} to {} step {}", name, iv, ops[0], ops[1], ops[2])
            }
            OpKind::Contraction(_) => write!(self.buffer, "{}({})", name, Self::join(ops)),
            OpKind::Alloc | OpKind::AddF | OpKind::MulF => {
                write!(self.buffer, "{} {}", name, Self::join(ops))
            }
        };
        if let Some(ty) = ty {
            let _ = write!(self.buffer, " : {}", ty);
        }
        if self.with_locations {
            let _ = write!(self.buffer, " {}", op.location);
        }

        if op.regions.is_empty() {
            self.buffer.push('\n');
            return;
        }
        self.buffer.push_str(" {\n");
        for &region in &op.regions {
            self.indent += 1;
            self.print_block(region);
            self.indent -= 1;
        }
        self.write_indent();
        self.buffer.push_str("}\n");
    }
}

/// Render a function to a string.
pub fn print_function(func: &Function) -> String {
    let mut printer = IrPrinter::new(func);
    printer.print_function();
    printer.take_output()
}

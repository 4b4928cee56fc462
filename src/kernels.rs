//! Ready-made contraction kernels.
//!
//! Each kernel allocates its operands, builds full-extent ranges and views,
//! and ends with a single contraction:
//!
//! ```text
//! func @matmul(%M, %N, %K) {
//!   %rM = linalg.range %c0:%M:%c1
//!   ...
//!   %A = linalg.view %bufA[%rM, %rK]
//!   %B = linalg.view %bufB[%rK, %rN]
//!   %C = linalg.view %bufC[%rM, %rN]
//!   linalg.matmul(%A, %B, %C)
//! }
//! ```

use crate::ir::{Builder, Function, Type, ValueId};
use crate::linalg::ContractionKind;
use crate::utils::location::Location;

/// Names of the size parameters of each kind, in the order `build_kernel`
/// expects them.
pub fn size_names(kind: ContractionKind) -> &'static [&'static str] {
    match kind {
        ContractionKind::Matmul => &["M", "N", "K"],
        ContractionKind::Matvec => &["M", "K"],
        ContractionKind::Dot => &["K"],
    }
}

/// Build a function running one contraction of `kind`.
///
/// `sizes` follows [`size_names`]. With `symbolic`, the sizes become index
/// arguments of the function and `sizes` only fixes their count.
///
/// Panics if `sizes` has the wrong length.
pub fn build_kernel(kind: ContractionKind, sizes: &[i64], symbolic: bool) -> Function {
    let names = size_names(kind);
    assert_eq!(sizes.len(), names.len(), "{} takes sizes {:?}", kind, names);

    let file = format!("{}.mlir", kind);
    let arg_types = if symbolic { vec![Type::Index; sizes.len()] } else { Vec::new() };
    let mut func = Function::new(kind.to_string(), &arg_types)
        .with_location(Location::new(file.clone(), 1, 1));
    let args = func.arguments().to_vec();

    let mut b = Builder::at_body_end(&mut func);
    let mut line = 2;
    let mut at_next_line = |b: &mut Builder<'_>| {
        b.set_location(Location::new(file.clone(), line, 3));
        line += 1;
    };

    at_next_line(&mut b);
    let c0 = b.constant_index(0);
    let c1 = b.constant_index(1);
    let extents: Vec<ValueId> = if symbolic {
        args
    } else {
        sizes.iter().map(|&s| b.constant_index(s)).collect()
    };

    at_next_line(&mut b);
    let ranges: Vec<ValueId> = extents.iter().map(|&e| b.range(c0, e, c1)).collect();

    let (a_dims, b_dims, c_dims): (&[usize], &[usize], &[usize]) = match kind {
        // M, N, K
        ContractionKind::Matmul => (&[0, 2], &[2, 1], &[0, 1]),
        // M, K
        ContractionKind::Matvec => (&[0, 1], &[1], &[0]),
        // K
        ContractionKind::Dot => (&[0], &[0], &[]),
    };
    let mut operand = |b: &mut Builder<'_>, dims: &[usize]| {
        at_next_line(b);
        let sizes: Vec<ValueId> = dims.iter().map(|&d| extents[d]).collect();
        let buffer = b.alloc(&sizes);
        let indexings: Vec<ValueId> = dims.iter().map(|&d| ranges[d]).collect();
        b.view(buffer, &indexings)
    };
    let a = operand(&mut b, a_dims);
    let bv = operand(&mut b, b_dims);
    let c = operand(&mut b, c_dims);

    at_next_line(&mut b);
    b.contraction(kind, &[a, bv, c]);
    func
}

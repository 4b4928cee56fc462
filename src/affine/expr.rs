//! Affine expressions over dimension and symbol slots.
//!
//! An affine expression is a tree built from the grammar
//! `e ::= d_i | s_j | c | e + e | e * e | e floordiv e | e ceildiv e | e mod e`.
//!
//! Constructors fold eagerly: operations on two constants are evaluated and
//! neutral elements disappear, so chained substitutions stay small and a
//! composed expression collapses to a constant whenever it can.

use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub, Mul, Neg};

/// Binary operator of an affine expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffineBinaryKind {
    /// `lhs + rhs`
    Add,
    /// `lhs * rhs`
    Mul,
    /// `lhs floordiv rhs`, rounds toward negative infinity
    FloorDiv,
    /// `lhs ceildiv rhs`, rounds toward positive infinity
    CeilDiv,
    /// `lhs mod rhs`, always non-negative for a positive divisor
    Mod,
}

impl AffineBinaryKind {
    /// Evaluate the operator on two integers.
    ///
    /// Division and modulo are only defined for a positive divisor.
    pub fn fold(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            Self::Add => lhs.checked_add(rhs),
            Self::Mul => lhs.checked_mul(rhs),
            Self::FloorDiv if rhs > 0 => Some(Integer::div_floor(&lhs, &rhs)),
            Self::CeilDiv if rhs > 0 => Some(Integer::div_ceil(&lhs, &rhs)),
            Self::Mod if rhs > 0 => Some(Integer::mod_floor(&lhs, &rhs)),
            _ => None,
        }
    }

    fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul)
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Mul => "*",
            Self::FloorDiv => "floordiv",
            Self::CeilDiv => "ceildiv",
            Self::Mod => "mod",
        }
    }
}

/// An immutable affine expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffineExpr {
    /// Reference to the dimension at the given position
    Dim(usize),
    /// Reference to the symbol at the given position
    Symbol(usize),
    /// Integer constant
    Constant(i64),
    /// Binary operation
    Binary {
        /// Operator
        kind: AffineBinaryKind,
        /// Left operand
        lhs: Box<AffineExpr>,
        /// Right operand
        rhs: Box<AffineExpr>,
    },
}

impl AffineExpr {
    /// Create a dimension reference.
    pub fn dim(pos: usize) -> Self {
        Self::Dim(pos)
    }

    /// Create a symbol reference.
    pub fn symbol(pos: usize) -> Self {
        Self::Symbol(pos)
    }

    /// Create a constant expression.
    pub fn constant(value: i64) -> Self {
        Self::Constant(value)
    }

    /// Build `lhs <kind> rhs`, folding whatever can be folded.
    pub fn binary(kind: AffineBinaryKind, lhs: AffineExpr, rhs: AffineExpr) -> Self {
        if let (Some(l), Some(r)) = (lhs.as_constant(), rhs.as_constant()) {
            if let Some(value) = kind.fold(l, r) {
                return Self::Constant(value);
            }
        }

        // Constants go to the right of commutative operators.
        let (lhs, rhs) = if kind.is_commutative() && lhs.is_constant() && !rhs.is_constant() {
            (rhs, lhs)
        } else {
            (lhs, rhs)
        };

        match (kind, rhs.as_constant()) {
            (AffineBinaryKind::Add, Some(0)) => return lhs,
            (AffineBinaryKind::Mul, Some(1)) => return lhs,
            (AffineBinaryKind::Mul, Some(0)) => return Self::Constant(0),
            (AffineBinaryKind::FloorDiv | AffineBinaryKind::CeilDiv, Some(1)) => return lhs,
            (AffineBinaryKind::Mod, Some(1)) => return Self::Constant(0),
            _ => {}
        }

        // (x + c1) + c2 -> x + (c1 + c2), and the same for products.
        if kind.is_commutative() {
            if let (Some(c2), Self::Binary { kind: inner, lhs: x, rhs: c1 }) = (rhs.as_constant(), &lhs) {
                if *inner == kind {
                    if let Some(merged) = c1.as_constant().and_then(|c1| kind.fold(c1, c2)) {
                        return Self::binary(kind, (**x).clone(), Self::Constant(merged));
                    }
                }
            }
        }

        Self::Binary {
            kind,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `self floordiv rhs`
    pub fn floor_div(self, rhs: impl Into<AffineExpr>) -> Self {
        Self::binary(AffineBinaryKind::FloorDiv, self, rhs.into())
    }

    /// `self ceildiv rhs`
    pub fn ceil_div(self, rhs: impl Into<AffineExpr>) -> Self {
        Self::binary(AffineBinaryKind::CeilDiv, self, rhs.into())
    }

    /// `self mod rhs`
    pub fn modulo(self, rhs: impl Into<AffineExpr>) -> Self {
        Self::binary(AffineBinaryKind::Mod, self, rhs.into())
    }

    /// Position of the dimension if this is exactly a dimension reference.
    pub fn as_dim(&self) -> Option<usize> {
        match self {
            Self::Dim(pos) => Some(*pos),
            _ => None,
        }
    }

    /// Position of the symbol if this is exactly a symbol reference.
    pub fn as_symbol(&self) -> Option<usize> {
        match self {
            Self::Symbol(pos) => Some(*pos),
            _ => None,
        }
    }

    /// Value of the constant if this is exactly a constant.
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Self::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Check that every dimension and symbol reference is in bounds.
    pub fn is_well_formed(&self, num_dims: usize, num_symbols: usize) -> bool {
        match self {
            Self::Dim(pos) => *pos < num_dims,
            Self::Symbol(pos) => *pos < num_symbols,
            Self::Constant(_) => true,
            Self::Binary { lhs, rhs, .. } => {
                lhs.is_well_formed(num_dims, num_symbols) && rhs.is_well_formed(num_dims, num_symbols)
            }
        }
    }

    /// Evaluate the expression given concrete values.
    ///
    /// Returns `None` when a reference is out of range, on overflow, or when a
    /// division or modulo has a non-positive divisor.
    pub fn evaluate(&self, dims: &[i64], symbols: &[i64]) -> Option<i64> {
        match self {
            Self::Dim(pos) => dims.get(*pos).copied(),
            Self::Symbol(pos) => symbols.get(*pos).copied(),
            Self::Constant(value) => Some(*value),
            Self::Binary { kind, lhs, rhs } => {
                let l = lhs.evaluate(dims, symbols)?;
                let r = rhs.evaluate(dims, symbols)?;
                kind.fold(l, r)
            }
        }
    }

    /// Substitute dimensions and symbols by the given expressions and refold.
    ///
    /// References without a replacement are kept as they are.
    pub fn replace_dims_and_symbols(&self, dim_repl: &[AffineExpr], sym_repl: &[AffineExpr]) -> Self {
        match self {
            Self::Dim(pos) => dim_repl.get(*pos).cloned().unwrap_or(Self::Dim(*pos)),
            Self::Symbol(pos) => sym_repl.get(*pos).cloned().unwrap_or(Self::Symbol(*pos)),
            Self::Constant(value) => Self::Constant(*value),
            Self::Binary { kind, lhs, rhs } => Self::binary(
                *kind,
                lhs.replace_dims_and_symbols(dim_repl, sym_repl),
                rhs.replace_dims_and_symbols(dim_repl, sym_repl),
            ),
        }
    }

    /// Renumber symbols `s_j` to `s_(j + offset)`.
    pub fn shift_symbols(&self, num_symbols: usize, offset: usize) -> Self {
        let sym_repl: Vec<AffineExpr> = (0..num_symbols).map(|j| Self::Symbol(j + offset)).collect();
        self.replace_dims_and_symbols(&[], &sym_repl)
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: AffineBinaryKind) -> fmt::Result {
        let needs_parens = match self {
            Self::Binary { kind, .. } => {
                (parent != AffineBinaryKind::Add && *kind == AffineBinaryKind::Add)
                    || matches!(parent, AffineBinaryKind::FloorDiv | AffineBinaryKind::CeilDiv | AffineBinaryKind::Mod)
            }
            _ => false,
        };
        if needs_parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl From<i64> for AffineExpr {
    fn from(value: i64) -> Self {
        Self::Constant(value)
    }
}

impl Add for AffineExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::binary(AffineBinaryKind::Add, self, other)
    }
}

impl Add<i64> for AffineExpr {
    type Output = Self;

    fn add(self, other: i64) -> Self {
        self + Self::Constant(other)
    }
}

impl Mul for AffineExpr {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self::binary(AffineBinaryKind::Mul, self, other)
    }
}

impl Mul<i64> for AffineExpr {
    type Output = Self;

    fn mul(self, other: i64) -> Self {
        self * Self::Constant(other)
    }
}

impl Neg for AffineExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self * -1
    }
}

impl Sub for AffineExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Sub<i64> for AffineExpr {
    type Output = Self;

    fn sub(self, other: i64) -> Self {
        self - Self::Constant(other)
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dim(pos) => write!(f, "d{}", pos),
            Self::Symbol(pos) => write!(f, "s{}", pos),
            Self::Constant(value) => write!(f, "{}", value),
            Self::Binary { kind: AffineBinaryKind::Add, lhs, rhs } => {
                lhs.fmt_operand(f, AffineBinaryKind::Add)?;
                match rhs.as_ref() {
                    Self::Constant(c) if *c < 0 => write!(f, " - {}", c.unsigned_abs()),
                    Self::Binary { kind: AffineBinaryKind::Mul, lhs: x, rhs: c }
                        if c.as_constant() == Some(-1) =>
                    {
                        write!(f, " - ")?;
                        x.fmt_operand(f, AffineBinaryKind::Mul)
                    }
                    _ => {
                        write!(f, " + ")?;
                        rhs.fmt_operand(f, AffineBinaryKind::Add)
                    }
                }
            }
            Self::Binary { kind, lhs, rhs } => {
                lhs.fmt_operand(f, *kind)?;
                write!(f, " {} ", kind.keyword())?;
                rhs.fmt_operand(f, *kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = AffineExpr::constant(6) + AffineExpr::constant(4);
        assert_eq!(e, AffineExpr::constant(10));
        let e = AffineExpr::constant(7).floor_div(2);
        assert_eq!(e, AffineExpr::constant(3));
        let e = AffineExpr::constant(-7).floor_div(2);
        assert_eq!(e, AffineExpr::constant(-4));
        let e = AffineExpr::constant(7).ceil_div(2);
        assert_eq!(e, AffineExpr::constant(4));
        let e = AffineExpr::constant(-7).modulo(3);
        assert_eq!(e, AffineExpr::constant(2));
    }

    #[test]
    fn test_neutral_elements() {
        let d0 = AffineExpr::dim(0);
        assert_eq!(d0.clone() + 0, d0);
        assert_eq!(d0.clone() * 1, d0);
        assert_eq!(d0.clone() * 0, AffineExpr::constant(0));
        assert_eq!(d0.clone().floor_div(1), d0);
        assert_eq!(d0.clone().modulo(1), AffineExpr::constant(0));
    }

    #[test]
    fn test_constant_moves_right() {
        let e = AffineExpr::constant(3) * AffineExpr::dim(1);
        match e {
            AffineExpr::Binary { kind, lhs, rhs } => {
                assert_eq!(kind, AffineBinaryKind::Mul);
                assert_eq!(*lhs, AffineExpr::dim(1));
                assert_eq!(*rhs, AffineExpr::constant(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nested_constants_merge() {
        let e = (AffineExpr::dim(0) + 2) + 3;
        assert_eq!(e, AffineExpr::dim(0) + 5);
        let e = (AffineExpr::dim(0) * 2) * 3;
        assert_eq!(e, AffineExpr::dim(0) * 6);
    }

    #[test]
    fn test_zero_divisor_is_not_folded() {
        let e = AffineExpr::constant(4).floor_div(0);
        assert!(!e.is_constant());
        assert_eq!(e.evaluate(&[], &[]), None);
    }

    #[test]
    fn test_evaluate() {
        // d0 * 2 + s0 floordiv 3
        let e = AffineExpr::dim(0) * 2 + AffineExpr::symbol(0).floor_div(3);
        assert_eq!(e.evaluate(&[5], &[10]), Some(13));
        assert_eq!(e.evaluate(&[], &[10]), None);
    }

    #[test]
    fn test_replace_folds_to_constant() {
        let e = AffineExpr::dim(0) + AffineExpr::dim(1) * 4;
        let replaced = e.replace_dims_and_symbols(
            &[AffineExpr::constant(1), AffineExpr::constant(2)],
            &[],
        );
        assert_eq!(replaced, AffineExpr::constant(9));
    }

    #[test]
    fn test_well_formed() {
        let e = AffineExpr::dim(1) + AffineExpr::symbol(0);
        assert!(e.is_well_formed(2, 1));
        assert!(!e.is_well_formed(1, 1));
        assert!(!e.is_well_formed(2, 0));
    }

    #[test]
    fn test_display() {
        let e = AffineExpr::dim(0) + AffineExpr::symbol(0) * 4;
        assert_eq!(e.to_string(), "d0 + s0 * 4");
        let e = AffineExpr::dim(0) - 1;
        assert_eq!(e.to_string(), "d0 - 1");
        let e = (AffineExpr::dim(0) + AffineExpr::dim(1)).floor_div(2);
        assert_eq!(e.to_string(), "(d0 + d1) floordiv 2");
        let e = AffineExpr::dim(0) - AffineExpr::dim(1);
        assert_eq!(e.to_string(), "d0 - d1");
    }
}

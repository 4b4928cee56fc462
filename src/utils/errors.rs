//! Error types for the lowering passes.
//!
//! Every error here is a violated precondition: malformed metadata produced
//! by an earlier pass. A pass that hits one stops immediately and the error
//! is reported to the driver; lowering never continues on partial data.

use thiserror::Error;
use crate::utils::location::Location;
use std::fmt;

/// Error raised when a lowering precondition does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct LoweringError {
    /// The error message
    pub message: String,
    /// The violated invariant
    pub kind: LoweringErrorKind,
    /// Location of the operation being rewritten (if known)
    pub location: Option<Location>,
}

impl fmt::Display for LoweringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(ref loc) = self.location {
            write!(f, " at {}", loc)?;
        }
        Ok(())
    }
}

/// Which precondition a [`LoweringError`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoweringErrorKind {
    /// Map inputs do not match the operand count, or map results do not
    /// match the declared parallel + reduction dimensions
    ArityMismatch,
    /// A map used for range derivation carries symbols or range sizes
    SymbolsNotAllowed,
    /// Tiling requested on a step that is not a compile-time constant
    NonConstantStep,
    /// Tiling requested on a constant step that is not positive
    NonPositiveStep,
    /// A tiled step does not fit in an `i64`
    StepOverflow,
    /// A value is not produced by the kind of operation the rewrite needs
    UnexpectedDefiningOp,
}

impl fmt::Display for LoweringErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ArityMismatch => "arity mismatch",
            Self::SymbolsNotAllowed => "symbols not allowed",
            Self::NonConstantStep => "non-constant step",
            Self::NonPositiveStep => "non-positive step",
            Self::StepOverflow => "step overflow",
            Self::UnexpectedDefiningOp => "unexpected defining operation",
        };
        f.write_str(name)
    }
}

impl LoweringError {
    /// Create a new error of the given kind.
    pub fn new(kind: LoweringErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            location: None,
        }
    }

    /// Shorthand for an [`LoweringErrorKind::ArityMismatch`] error.
    pub fn arity_mismatch(message: impl Into<String>) -> Self {
        Self::new(LoweringErrorKind::ArityMismatch, message)
    }

    /// Shorthand for a [`LoweringErrorKind::SymbolsNotAllowed`] error.
    pub fn symbols_not_allowed(message: impl Into<String>) -> Self {
        Self::new(LoweringErrorKind::SymbolsNotAllowed, message)
    }

    /// Shorthand for a [`LoweringErrorKind::NonConstantStep`] error.
    pub fn non_constant_step(message: impl Into<String>) -> Self {
        Self::new(LoweringErrorKind::NonConstantStep, message)
    }

    /// Shorthand for a [`LoweringErrorKind::NonPositiveStep`] error.
    pub fn non_positive_step(message: impl Into<String>) -> Self {
        Self::new(LoweringErrorKind::NonPositiveStep, message)
    }

    /// Shorthand for a [`LoweringErrorKind::StepOverflow`] error.
    pub fn step_overflow(message: impl Into<String>) -> Self {
        Self::new(LoweringErrorKind::StepOverflow, message)
    }

    /// Shorthand for an [`LoweringErrorKind::UnexpectedDefiningOp`] error.
    pub fn unexpected_defining_op(message: impl Into<String>) -> Self {
        Self::new(LoweringErrorKind::UnexpectedDefiningOp, message)
    }

    /// Attach the location of the operation being rewritten.
    ///
    /// An already attached location is kept.
    pub fn with_location(mut self, location: Location) -> Self {
        if self.location.is_none() && !location.is_unknown() {
            self.location = Some(location);
        }
        self
    }
}

/// Result type using LoweringError.
pub type LoweringResult<T> = Result<T, LoweringError>;

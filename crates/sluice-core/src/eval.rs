// SPDX-License-Identifier: Apache-2.0
//! The expression sandbox used to evaluate per-node guards and action
//! formulas is an external collaborator (spec §1, §9 "Expression sandbox as
//! a collaborator"): this crate only defines the interface it consumes.
//!
//! A real implementation compiles a list of assignment/expression statements
//! (separated by newline or semicolon) against an [`Evaluator`], producing a
//! [`NumericFn`] or [`BooleanFn`] that is later evaluated against a
//! [`crate::scope::Scope`]. This crate ships [`NoopEvaluator`], a trivial
//! stand-in used by tests and by callers that have not yet wired a real
//! language in; it treats every source string as an always-false condition
//! and an always-zero action, which is sufficient for graphs whose dynamics
//! come entirely from edge rates (as in every end-to-end scenario in spec
//! §8).
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::scope::Scope;

/// Error returned when an [`Evaluator`] fails to compile a source string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to compile expression: {0}")]
pub struct EvalError(pub String);

/// A compiled numeric expression (spec's `NumericFn`).
pub trait NumericFn: Send + Sync {
    /// Evaluates this expression against `scope`.
    fn eval(&self, scope: &dyn Scope) -> f64;
}

/// A compiled boolean expression (spec's `BooleanFn`).
pub trait BooleanFn: Send + Sync {
    /// Evaluates this expression against `scope`.
    fn eval(&self, scope: &dyn Scope) -> bool;
}

/// Compiles source strings into [`NumericFn`]/[`BooleanFn`] closures.
///
/// Statement separators are newline or semicolon, per spec §6. The scope
/// contract requires read-through for graph-visible labels, a local
/// write-only cache, and key enumeration that unions both — see
/// [`crate::scope::CachingScope`].
pub trait Evaluator: Send + Sync {
    /// Compiles `source` into a numeric expression.
    fn compile_numeric(&self, source: &str) -> Result<Arc<dyn NumericFn>, EvalError>;

    /// Compiles `source` into a boolean expression.
    fn compile_boolean(&self, source: &str) -> Result<Arc<dyn BooleanFn>, EvalError>;
}

impl fmt::Debug for dyn Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Evaluator")
    }
}

struct AlwaysZero;
impl NumericFn for AlwaysZero {
    fn eval(&self, _scope: &dyn Scope) -> f64 {
        0.0
    }
}

struct AlwaysFalse;
impl BooleanFn for AlwaysFalse {
    fn eval(&self, _scope: &dyn Scope) -> bool {
        false
    }
}

/// Stand-in [`Evaluator`] that compiles every source string to a constant
/// (`0.0` numerically, `false` for booleans), regardless of its contents.
///
/// Graphs exercised purely through edge rates (no guard/action formulas)
/// behave identically under `NoopEvaluator` and under a real expression
/// language, since `condition = false` means the action is never evaluated.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvaluator;

impl Evaluator for NoopEvaluator {
    fn compile_numeric(&self, _source: &str) -> Result<Arc<dyn NumericFn>, EvalError> {
        Ok(Arc::new(AlwaysZero))
    }

    fn compile_boolean(&self, _source: &str) -> Result<Arc<dyn BooleanFn>, EvalError> {
        Ok(Arc::new(AlwaysFalse))
    }
}

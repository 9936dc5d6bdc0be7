// SPDX-License-Identifier: Apache-2.0
//! Exchanger ("Swap") node kind: a constant-product pair exchanger.
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::eval::BooleanFn;
use crate::ident::{ElementId, Label, Token};
use crate::scope::Scope;

/// One `(in, out)` splice through an exchanger. A pipe is *valid* when both
/// ends are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pipe {
    /// Inbound edge feeding this pipe's swap direction, if connected.
    pub input_edge: Option<ElementId>,
    /// Outbound edge receiving this pipe's swap result, if connected.
    pub output_edge: Option<ElementId>,
}

impl Pipe {
    /// Returns `true` when both ends of this pipe are connected.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.input_edge.is_some() && self.output_edge.is_some()
    }
}

/// Constant-product pair `(A, B)`: `k = amount_a * amount_b`, fixed at
/// configuration time. May splice multiple independent `(in, out)` pipes.
#[derive(Clone)]
pub struct Exchanger {
    /// Stable identifier.
    pub id: ElementId,
    /// Mutable display label.
    pub label: Label,
    /// Token on the `A` side, once configured.
    pub token_a: Option<Token>,
    /// Token on the `B` side, once configured.
    pub token_b: Option<Token>,
    /// Current pool on the `A` side.
    pub amount_a: f64,
    /// Current pool on the `B` side.
    pub amount_b: f64,
    /// Guard gating swaps.
    pub condition: Option<Arc<dyn BooleanFn>>,
    /// Source string for `condition`, retained for clone/JSON round-trip.
    pub condition_src: Option<String>,
    /// Ordered list of pipe slots, indices contiguous from zero.
    pub pipes: Vec<Pipe>,
}

impl Exchanger {
    /// Creates an unconfigured exchanger (fails `is_configured`, surfaced by
    /// `checkGraph` as an `Error`).
    #[must_use]
    pub fn new(id: ElementId, label: Label) -> Self {
        Self {
            id,
            label,
            token_a: None,
            token_b: None,
            amount_a: 0.0,
            amount_b: 0.0,
            condition: None,
            condition_src: None,
            pipes: Vec::new(),
        }
    }

    /// Fixes `k = amount_a * amount_b` given the current pools. Callers
    /// configure `token_a`/`token_b`/`amount_a`/`amount_b` first, then call
    /// this to validate and (implicitly) lock `k`.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let (Some(a), Some(b)) = (&self.token_a, &self.token_b) else {
            return false;
        };
        a != b && self.amount_a > 0.0 && self.amount_b > 0.0
    }

    /// The invariant product `k`, or `0.0` when unconfigured.
    #[must_use]
    pub fn k(&self) -> f64 {
        if self.is_configured() {
            self.amount_a * self.amount_b
        } else {
            0.0
        }
    }

    /// Returns the pipe at `index`, creating it if `index == pipes.len()`.
    ///
    /// Indices must be contiguous from zero (spec §9 open question):
    /// creating a new slot at any other index is rejected.
    pub fn get_or_create_pipe(&mut self, index: usize) -> Option<&mut Pipe> {
        if index < self.pipes.len() {
            return self.pipes.get_mut(index);
        }
        if index == self.pipes.len() {
            self.pipes.push(Pipe::default());
            return self.pipes.last_mut();
        }
        None
    }

    /// Swaps `amount` of `token_in` for the other side.
    ///
    /// Returns `Ok(None)` when the exchanger is unconfigured, `amount == 0`,
    /// `condition` fails, or `token_in` is neither `token_a` nor `token_b`.
    /// Otherwise increases the input side's pool by `amount`, resets the
    /// other side to `k / new_input_pool`, and returns `(token_out,
    /// amount_out)` where `amount_out` is the delta of the other side's pool.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NegativeSwapAmount`] for `amount < 0.0` (spec:
    /// "`amount < 0` is an error"); every other "can't swap" condition is
    /// `Ok(None)` rather than an error.
    pub fn swap(
        &mut self,
        amount: f64,
        token_in: &Token,
        scope: &dyn Scope,
    ) -> GraphResult<Option<(Token, f64)>> {
        if amount < 0.0 {
            return Err(GraphError::NegativeSwapAmount);
        }
        if !self.is_configured() || amount == 0.0 {
            return Ok(None);
        }
        if let Some(condition) = &self.condition {
            if !condition.eval(scope) {
                return Ok(None);
            }
        }
        let k = self.k();
        let (Some(token_a), Some(token_b)) = (self.token_a.clone(), self.token_b.clone()) else {
            return Ok(None);
        };
        if *token_in == token_a {
            let new_a = self.amount_a + amount;
            let new_b = k / new_a;
            let delta_out = self.amount_b - new_b;
            self.amount_a = new_a;
            self.amount_b = new_b;
            Ok(Some((token_b, delta_out)))
        } else if *token_in == token_b {
            let new_b = self.amount_b + amount;
            let new_a = k / new_b;
            let delta_out = self.amount_a - new_a;
            self.amount_b = new_b;
            self.amount_a = new_a;
            Ok(Some((token_a, delta_out)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Ident;
    use crate::scope::CachingScope;

    fn scope() -> CachingScope<'static> {
        fn src(_: &str) -> Option<f64> {
            None
        }
        static KEYS: [String; 0] = [];
        CachingScope::new(&src, &KEYS)
    }

    #[allow(clippy::unwrap_used)]
    fn configured() -> Exchanger {
        let mut e = Exchanger::new(ElementId::new("x0"), Ident::parse("x0").unwrap());
        e.token_a = Some(Ident::parse("metal").unwrap());
        e.token_b = Some(Ident::parse("wood").unwrap());
        e.amount_a = 100.0;
        e.amount_b = 100.0;
        e
    }

    #[test]
    fn unconfigured_swap_returns_none() {
        let mut e = Exchanger::new(ElementId::new("x0"), Ident::parse("x0").unwrap());
        let s = scope();
        #[allow(clippy::unwrap_used)]
        let metal = Ident::parse("metal").unwrap();
        assert_eq!(e.swap(10.0, &metal, &s), Ok(None));
        assert!(!e.is_configured());
    }

    #[test]
    fn constant_product_invariant_holds_after_swap() {
        let mut e = configured();
        let s = scope();
        #[allow(clippy::unwrap_used)]
        let metal = Ident::parse("metal").unwrap();
        let k_before = e.k();
        let (token_out, amount_out) = e
            .swap(10.0, &metal, &s)
            .expect("configured swap")
            .expect("configured swap");
        assert_eq!(token_out.as_str(), "wood");
        assert!(amount_out > 0.0);
        assert!((e.amount_a * e.amount_b - k_before).abs() < 1e-9);
    }

    #[test]
    fn negative_amount_is_an_error() {
        let mut e = configured();
        let s = scope();
        #[allow(clippy::unwrap_used)]
        let metal = Ident::parse("metal").unwrap();
        assert_eq!(e.swap(-1.0, &metal, &s), Err(GraphError::NegativeSwapAmount));
    }

    #[test]
    fn pipe_indices_must_be_contiguous() {
        let mut e = configured();
        assert!(e.get_or_create_pipe(0).is_some());
        assert!(e.get_or_create_pipe(1).is_some());
        assert!(e.get_or_create_pipe(5).is_none());
    }
}

// SPDX-License-Identifier: Apache-2.0
//! Transformer ("Converter") node kind: a multi-input recipe with a buffer.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::eval::BooleanFn;
use crate::ident::{ElementId, Label, Token};
use crate::scope::Scope;

/// Multi-input recipe node: accumulates per-token inputs in a buffer and
/// produces one unit of its own `token` per complete recipe's worth.
#[derive(Clone)]
pub struct Transformer {
    /// Stable identifier.
    pub id: ElementId,
    /// Mutable display label.
    pub label: Label,
    /// Kind of quantity this transformer produces.
    pub token: Token,
    /// Ids of every connected input edge.
    pub inputs: BTreeSet<ElementId>,
    /// Id of the single output edge, if connected.
    pub output_edge: Option<ElementId>,
    /// Positive amount of each input token required per unit of output.
    pub required_input_per_unit: BTreeMap<Token, f64>,
    /// Accumulated amount of each input token received so far.
    pub buffer: BTreeMap<Token, f64>,
    /// Guard gating conversion.
    pub condition: Option<Arc<dyn BooleanFn>>,
    /// Source string for `condition`, retained for clone/JSON round-trip.
    pub condition_src: Option<String>,
}

impl Transformer {
    /// Creates a transformer with no inputs, no recipe, and no guard.
    #[must_use]
    pub fn new(id: ElementId, label: Label, token: Token) -> Self {
        Self {
            id,
            label,
            token,
            inputs: BTreeSet::new(),
            output_edge: None,
            required_input_per_unit: BTreeMap::new(),
            buffer: BTreeMap::new(),
            condition: None,
            condition_src: None,
        }
    }

    /// Accumulates `delta` (must be non-negative) of `token` into the buffer.
    pub fn add_to_buffer(&mut self, token: &Token, delta: f64) -> GraphResult<()> {
        if delta < 0.0 {
            return Err(GraphError::NegativeDelta);
        }
        *self.buffer.entry(token.clone()).or_insert(0.0) += delta;
        Ok(())
    }

    /// Maximum units of output convertible from the current buffer.
    ///
    /// Returns `0` when `condition` fails, any required token is missing
    /// from the buffer, or `required_input_per_unit` is empty (open
    /// question resolved per spec §9: empty recipe is never convertable,
    /// not "always convertable").
    #[must_use]
    pub fn maximum_convertable(&self, scope: &dyn Scope) -> f64 {
        if self.required_input_per_unit.is_empty() {
            return 0.0;
        }
        if let Some(condition) = &self.condition {
            if !condition.eval(scope) {
                return 0.0;
            }
        }
        let mut limit = f64::INFINITY;
        for (token, required) in &self.required_input_per_unit {
            let Some(available) = self.buffer.get(token) else {
                return 0.0;
            };
            limit = limit.min(available / required);
        }
        if limit.is_finite() {
            limit
        } else {
            0.0
        }
    }

    /// Produces up to `amount` units of output, consuming
    /// `required[t] * produced` of each required token from the buffer.
    /// Returns the amount actually produced: `min(amount, maximum_convertable)`.
    pub fn take_from_state(&mut self, amount: f64, scope: &dyn Scope) -> f64 {
        debug_assert!(amount >= 0.0, "take_from_state requires a non-negative amount");
        let produced = amount.max(0.0).min(self.maximum_convertable(scope));
        if produced <= 0.0 {
            return 0.0;
        }
        for (token, required) in &self.required_input_per_unit {
            if let Some(available) = self.buffer.get_mut(token) {
                *available -= required * produced;
            }
        }
        produced
    }
}

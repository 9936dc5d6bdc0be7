// SPDX-License-Identifier: Apache-2.0
//! Reservoir ("Pool") node kind: a bounded quantity container.
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::eval::{BooleanFn, NumericFn};
use crate::ident::{ElementId, Label, Token};
use crate::scope::Scope;

/// A quantity container bounded by an optional capacity.
///
/// `capacity < 0.0` means unbounded; otherwise `state` is clamped to
/// `[0, capacity]`. Has at most one input edge and one output edge.
#[derive(Clone)]
pub struct Reservoir {
    /// Stable identifier.
    pub id: ElementId,
    /// Mutable display label, also usable as a variable name in expressions.
    pub label: Label,
    /// Kind of quantity this reservoir produces.
    pub token: Token,
    /// Current quantity held, always in `[0, capacity]` (or `[0, ∞)`).
    pub state: f64,
    /// Capacity bound; negative means unbounded.
    pub capacity: f64,
    /// Numeric action evaluated each tick (when `condition` holds) to set `state`.
    pub action: Option<Arc<dyn NumericFn>>,
    /// Source string for `action`, retained for clone/JSON round-trip.
    pub action_src: Option<String>,
    /// Guard evaluated each tick to decide whether `action` runs.
    pub condition: Option<Arc<dyn BooleanFn>>,
    /// Source string for `condition`, retained for clone/JSON round-trip.
    pub condition_src: Option<String>,
    /// Id of the single inbound edge, if connected.
    pub input_edge: Option<ElementId>,
    /// Id of the single outbound edge, if connected.
    pub output_edge: Option<ElementId>,
}

impl Reservoir {
    /// Creates an unbounded, empty reservoir with no action/condition.
    #[must_use]
    pub fn new(id: ElementId, label: Label, token: Token) -> Self {
        Self {
            id,
            label,
            token,
            state: 0.0,
            capacity: -1.0,
            action: None,
            action_src: None,
            condition: None,
            condition_src: None,
            input_edge: None,
            output_edge: None,
        }
    }

    /// Returns `true` when this reservoir has no capacity bound.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.capacity < 0.0
    }

    fn clamp(&self, x: f64) -> f64 {
        if self.is_unbounded() {
            x.max(0.0)
        } else {
            x.max(0.0).min(self.capacity)
        }
    }

    /// Adds `delta` (must be non-negative) to `state`, clamped by capacity.
    /// Returns the amount actually added.
    pub fn add_to_pool(&mut self, delta: f64) -> GraphResult<f64> {
        if delta < 0.0 {
            return Err(GraphError::NegativeDelta);
        }
        let before = self.state;
        self.state = self.clamp(self.state + delta);
        Ok(self.state - before)
    }

    /// Removes up to `delta` (must be non-negative) from `state`, clamped at
    /// zero. Returns the amount actually taken.
    pub fn take_from_pool(&mut self, delta: f64) -> GraphResult<f64> {
        if delta < 0.0 {
            return Err(GraphError::NegativeDelta);
        }
        let before = self.state;
        self.state = self.clamp(self.state - delta);
        Ok(before - self.state)
    }

    /// Sets `state` directly, clamped to `[0, capacity]`.
    pub fn set_state(&mut self, x: f64) {
        self.state = self.clamp(x);
    }

    /// Sets `capacity`. Negative means unbounded. Truncates `state` if the
    /// new capacity is lower than the current state.
    pub fn set_capacity(&mut self, capacity: f64) {
        self.capacity = capacity;
        self.state = self.clamp(self.state);
    }

    /// Advances this reservoir by one tick: binds `x` to the current state in
    /// `scope`, then — if `condition` holds (absent counts as holding, same
    /// default as router/transformer guards) — evaluates `action` and commits
    /// the (re-clamped) result as the next state.
    pub fn advance(&mut self, scope: &mut dyn Scope) {
        scope.set("x", self.state);
        if !self.condition.as_ref().map_or(true, |c| c.eval(scope)) {
            return;
        }
        let Some(action) = &self.action else {
            return;
        };
        let next = action.eval(scope);
        self.set_state(next);
    }
}

// SPDX-License-Identifier: Apache-2.0
//! Router ("Gate") node kind: weighted random output selection.
use std::collections::BTreeMap;
use std::sync::Arc;

use rand::RngCore;

use crate::eval::BooleanFn;
use crate::ident::{ElementId, Label};
use crate::rng::weighted_select;
use crate::scope::Scope;

/// Weighted random routing node: samples exactly one output edge per tick.
#[derive(Clone)]
pub struct Router {
    /// Stable identifier.
    pub id: ElementId,
    /// Mutable display label.
    pub label: Label,
    /// Non-negative weight per output edge id. Zero-weight outputs are never
    /// selected; all-zero means no selection.
    pub weights: BTreeMap<ElementId, f64>,
    /// Id of the single inbound edge, if connected.
    pub input_edge: Option<ElementId>,
    /// Guard gating forwarding at execution time.
    pub condition: Option<Arc<dyn BooleanFn>>,
    /// Source string for `condition`, retained for clone/JSON round-trip.
    pub condition_src: Option<String>,
    /// Output edge sampled by the most recent [`Router::advance`] call.
    pub selected_output: Option<ElementId>,
}

impl Router {
    /// Creates a router with no outputs, no input, and no guard.
    #[must_use]
    pub fn new(id: ElementId, label: Label) -> Self {
        Self {
            id,
            label,
            weights: BTreeMap::new(),
            input_edge: None,
            condition: None,
            condition_src: None,
            selected_output: None,
        }
    }

    /// Samples `selected_output` from `weights` using weighted selection
    /// (spec §4.3). Iteration order over `weights` is the `BTreeMap`'s
    /// `ElementId` order, which must match whatever order callers rely on
    /// for deterministic replay.
    pub fn advance(&mut self, rng: &mut dyn RngCore) {
        let ids: Vec<&ElementId> = self.weights.keys().collect();
        let values: Vec<f64> = self.weights.values().copied().collect();
        self.selected_output = weighted_select(&values, rng).map(|i| ids[i].clone());
    }

    /// Evaluates `condition` against `scope`; `true` when there is no guard.
    #[must_use]
    pub fn evaluate_condition(&self, scope: &dyn Scope) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |c| c.eval(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Ident;
    use rand::rngs::mock::StepRng;

    #[allow(clippy::unwrap_used)]
    fn router() -> Router {
        Router::new(ElementId::new("r0"), Ident::parse("r0").unwrap())
    }

    #[test]
    fn no_outputs_selects_none() {
        let mut r = router();
        let mut rng = StepRng::new(0, 1);
        r.advance(&mut rng);
        assert_eq!(r.selected_output, None);
    }

    #[test]
    fn all_zero_weights_selects_none() {
        let mut r = router();
        r.weights.insert(ElementId::new("e0"), 0.0);
        r.weights.insert(ElementId::new("e1"), 0.0);
        let mut rng = StepRng::new(0, 1);
        r.advance(&mut rng);
        assert_eq!(r.selected_output, None);
    }

    #[test]
    fn single_deterministic_weight_wins() {
        let mut r = router();
        r.weights.insert(ElementId::new("e0"), 0.0);
        r.weights.insert(ElementId::new("e1"), 1.0);
        let mut rng = StepRng::new(0, 1);
        r.advance(&mut rng);
        assert_eq!(r.selected_output, Some(ElementId::new("e1")));
    }
}

// SPDX-License-Identifier: Apache-2.0
//! The directed, rate-limited edge type.
use crate::eval::BooleanFn;
use crate::ident::ElementId;
use std::sync::Arc;

/// A directed edge connecting two non-edge elements.
///
/// `rate < 0` encodes "unlimited" (take all available). `swap_input_index` is
/// set when either endpoint is an [`crate::node::exchanger::Exchanger`] pipe
/// slot.
#[derive(Clone)]
pub struct Edge {
    /// Stable identifier for this edge.
    pub id: ElementId,
    /// Mutable display label.
    pub label: crate::ident::Label,
    /// Source element id. Never another edge (invariant 1).
    pub from: ElementId,
    /// Destination element id. Never another edge (invariant 1).
    pub to: ElementId,
    /// Non-negative throughput limit per tick; negative means unlimited.
    pub rate: f64,
    /// Optional guard gating traversal through this edge.
    pub condition: Option<Arc<dyn BooleanFn>>,
    /// Source string for `condition`, retained for clone/JSON round-trip.
    pub condition_src: Option<String>,
    /// Pipe slot index when connecting to/from an Exchanger.
    pub swap_input_index: Option<u32>,
}

impl Edge {
    /// Returns `true` when this edge carries unlimited throughput.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.rate < 0.0
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("rate", &self.rate)
            .field("swap_input_index", &self.swap_input_index)
            .finish_non_exhaustive()
    }
}

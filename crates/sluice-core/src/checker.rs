// SPDX-License-Identifier: Apache-2.0
//! Structural checker: runs the compiler in non-mutating mode and reports
//! cyclic-transformer warnings or malformed-exchanger errors (spec §4.6).
use std::collections::BTreeSet;

use rand::rngs::mock::StepRng;

use crate::compiler::{compile, GroupKind};
use crate::graph::GraphModel;
use crate::ident::ElementId;

/// Outcome of [`check_graph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Nothing structurally wrong.
    NoError,
    /// Non-fatal: `nextTick` still runs, using the Cyclic strategy for
    /// each listed set of mutually-dependent transformers.
    Warning {
        /// One set of transformer ids per Cyclic parallel group.
        cyclic_transformer_sets: Vec<BTreeSet<ElementId>>,
    },
    /// Fatal structural problem: at least one Exchanger is malformed.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Runs the compiler in check mode (reservoirs not advanced, routers not
/// sampled) against a scratch clone of `graph`, so the caller's graph is
/// never mutated.
#[must_use]
pub fn check_graph(graph: &GraphModel) -> CheckResult {
    let mut scratch = graph.deep_clone();
    let mut rng = StepRng::new(0, 1);
    let compiled = compile(&mut scratch, &mut rng, true);

    if !compiled.malformed_exchangers.is_empty() {
        let ids = compiled
            .malformed_exchangers
            .iter()
            .map(ElementId::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return CheckResult::Error {
            message: format!("unconfigured exchanger(s): {ids}"),
        };
    }

    let cyclic_transformer_sets: Vec<BTreeSet<ElementId>> = compiled
        .groups
        .iter()
        .filter(|g| matches!(g.kind, GroupKind::Cyclic))
        .map(|g| g.subgroups.iter().filter_map(|s| s.converter.clone()).collect())
        .filter(|set: &BTreeSet<ElementId>| !set.is_empty())
        .collect();

    if cyclic_transformer_sets.is_empty() {
        CheckResult::NoError
    } else {
        CheckResult::Warning {
            cyclic_transformer_sets,
        }
    }
}

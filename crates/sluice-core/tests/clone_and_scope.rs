//! Clone determinism and read-through scope laws (spec §8 "Algebraic
//! properties": clone isolates state; `variableScope` never mutates the graph).
#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::sync::Arc;

use rand::rngs::mock::StepRng;
use sluice_core::eval::NoopEvaluator;
use sluice_core::scope::Scope;
use sluice_core::{run_tick, Element, ElementId, GraphModel, NodeKind};

fn reservoir(g: &mut GraphModel, id: &str, state: f64) -> ElementId {
    let elem_id = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new(id)), Some(id))
        .unwrap();
    if let Element::Reservoir(r) = g.node_mut(&elem_id).unwrap() {
        r.state = state;
    }
    elem_id
}

fn state_of(g: &GraphModel, id: &ElementId) -> f64 {
    match g.node(id).unwrap() {
        Element::Reservoir(r) => r.state,
        _ => panic!("not a reservoir"),
    }
}

#[test]
fn ticking_a_clone_never_mutates_the_original() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = reservoir(&mut g, "p0", 10.0);
    let p1 = reservoir(&mut g, "p1", 0.0);
    g.add_edge(None, p0.clone(), p1.clone(), Some(3.0), None, None)
        .unwrap();

    let mut clone = g.deep_clone();
    let mut rng = StepRng::new(0, 1);
    for _ in 0..4 {
        run_tick(&mut clone, &mut rng);
    }

    assert_eq!(state_of(&g, &p0), 10.0, "original untouched by ticking the clone");
    assert_eq!(state_of(&g, &p1), 0.0, "original untouched by ticking the clone");
    assert_eq!(state_of(&clone, &p0), 0.0);
    assert_eq!(state_of(&clone, &p1), 10.0);
    assert_eq!(g.tick_seq(), 0, "original's tick sequence does not advance");
    assert_eq!(clone.tick_seq(), 4);
}

#[test]
fn same_seed_same_structure_produces_identical_trajectories() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = reservoir(&mut g, "p0", 8.0);
    let p1 = reservoir(&mut g, "p1", 12.0);
    let c0 = g
        .add_node(NodeKind::Transformer, Some(ElementId::new("c0")), Some("c0"))
        .unwrap();
    g.add_edge(None, p0.clone(), c0.clone(), Some(4.0), None, None)
        .unwrap();
    g.add_edge(None, p1.clone(), c0.clone(), Some(4.0), None, None)
        .unwrap();
    g.set_converter_required_input_per_unit(&c0, "p0_token", 2.0)
        .unwrap();
    g.set_converter_required_input_per_unit(&c0, "p1_token", 1.0)
        .unwrap();
    let r0 = g
        .add_node(NodeKind::Router, Some(ElementId::new("r0")), Some("r0"))
        .unwrap();
    g.add_edge(None, c0.clone(), r0.clone(), Some(1.0), None, None)
        .unwrap();
    let e_to_p0 = g
        .add_edge(None, r0.clone(), p0.clone(), Some(-1.0), None, None)
        .unwrap();
    let e_to_p1 = g
        .add_edge(None, r0.clone(), p1.clone(), Some(-1.0), None, None)
        .unwrap();
    g.set_gate_output_weight(&r0, &e_to_p0, 1.0).unwrap();
    g.set_gate_output_weight(&r0, &e_to_p1, 3.0).unwrap();

    let mut left = g.deep_clone();
    let mut right = g.deep_clone();
    let mut rng_left = StepRng::new(42, 7);
    let mut rng_right = StepRng::new(42, 7);

    for _ in 0..6 {
        run_tick(&mut left, &mut rng_left);
        run_tick(&mut right, &mut rng_right);
        assert_eq!(state_of(&left, &p0), state_of(&right, &p0));
        assert_eq!(state_of(&left, &p1), state_of(&right, &p1));
    }
}

#[test]
fn disjoint_subgraphs_tick_independently_of_execution_order() {
    // Two reservoir pairs sharing no element: the result for one pair must
    // match what it would produce in total isolation, regardless of how the
    // compiler orders the other pair's parallel group.
    let mut combined = GraphModel::new(Arc::new(NoopEvaluator));
    let a0 = reservoir(&mut combined, "a0", 10.0);
    let a1 = reservoir(&mut combined, "a1", 0.0);
    combined
        .add_edge(None, a0.clone(), a1.clone(), Some(3.0), None, None)
        .unwrap();
    let b0 = reservoir(&mut combined, "b0", 5.0);
    let b1 = reservoir(&mut combined, "b1", 0.0);
    combined
        .add_edge(None, b0.clone(), b1.clone(), Some(1.0), None, None)
        .unwrap();

    let mut isolated_a = GraphModel::new(Arc::new(NoopEvaluator));
    let ia0 = reservoir(&mut isolated_a, "a0", 10.0);
    let ia1 = reservoir(&mut isolated_a, "a1", 0.0);
    isolated_a
        .add_edge(None, ia0.clone(), ia1.clone(), Some(3.0), None, None)
        .unwrap();

    let mut rng = StepRng::new(0, 1);
    let mut rng_isolated = StepRng::new(0, 1);
    for _ in 0..3 {
        run_tick(&mut combined, &mut rng);
        run_tick(&mut isolated_a, &mut rng_isolated);
        assert_eq!(state_of(&combined, &a0), state_of(&isolated_a, &ia0));
        assert_eq!(state_of(&combined, &a1), state_of(&isolated_a, &ia1));
    }
}

#[test]
fn variable_scope_reads_through_without_mutating_the_graph() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = reservoir(&mut g, "p0", 7.0);
    let p1 = reservoir(&mut g, "p1", 0.0);
    let edge = g
        .add_edge(None, p0.clone(), p1, Some(2.0), None, Some("feed"))
        .unwrap();
    let _ = edge;

    let mut scope = g.variable_scope();
    assert_eq!(scope.get("p0"), Some(7.0));
    assert_eq!(scope.get("feed"), Some(2.0));
    assert_eq!(scope.get("nonexistent"), None);

    scope.set("p0", 99.0);
    assert_eq!(scope.get("p0"), Some(99.0), "write cache shadows the read-through source");
    assert_eq!(state_of(&g, &p0), 7.0, "the underlying graph is never mutated by a scope write");
}

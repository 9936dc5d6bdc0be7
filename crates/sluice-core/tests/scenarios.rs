//! End-to-end scenarios from spec §8.
#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::sync::Arc;

use rand::rngs::mock::StepRng;
use sluice_core::eval::NoopEvaluator;
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
fn two_reservoirs_one_rated_edge() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = reservoir(&mut g, "p0", 10.0);
    let p1 = reservoir(&mut g, "p1", 0.0);
    g.add_edge(None, p0.clone(), p1.clone(), Some(1.0), None, None)
        .unwrap();

    let mut rng = StepRng::new(0, 1);
    for _ in 0..10 {
        run_tick(&mut g, &mut rng);
    }
    assert_eq!(state_of(&g, &p0), 0.0);
    assert_eq!(state_of(&g, &p1), 10.0);

    run_tick(&mut g, &mut rng);
    assert_eq!(state_of(&g, &p0), 0.0);
    assert_eq!(state_of(&g, &p1), 10.0);
}

#[test]
fn two_reservoirs_unlimited_edge() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = reservoir(&mut g, "p0", 10.0);
    let p1 = reservoir(&mut g, "p1", 0.0);
    g.add_edge(None, p0.clone(), p1.clone(), Some(-1.0), None, None)
        .unwrap();

    let mut rng = StepRng::new(0, 1);
    run_tick(&mut g, &mut rng);
    assert_eq!(state_of(&g, &p0), 0.0);
    assert_eq!(state_of(&g, &p1), 10.0);
}

#[test]
fn three_reservoir_cycle_with_rated_edges() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = reservoir(&mut g, "p0", 10.0);
    let p1 = reservoir(&mut g, "p1", 10.0);
    let p2 = reservoir(&mut g, "p2", 10.0);
    g.add_edge(None, p0.clone(), p1.clone(), Some(1.0), None, None)
        .unwrap();
    g.add_edge(None, p1.clone(), p2.clone(), Some(2.0), None, None)
        .unwrap();
    g.add_edge(None, p2.clone(), p0.clone(), Some(3.0), None, None)
        .unwrap();

    let mut rng = StepRng::new(0, 1);
    for _ in 0..8 {
        run_tick(&mut g, &mut rng);
    }
    // First 8 ticks: P0 += 2, P1 += -1, P2 += -1 each tick.
    assert_eq!(state_of(&g, &p0), 26.0);
    assert_eq!(state_of(&g, &p1), 2.0);
    assert_eq!(state_of(&g, &p2), 2.0);

    run_tick(&mut g, &mut rng); // tick 9
    assert_eq!(state_of(&g, &p0), 27.0);
    assert_eq!(state_of(&g, &p1), 1.0);
    assert_eq!(state_of(&g, &p2), 2.0);

    run_tick(&mut g, &mut rng); // tick 10
    assert_eq!(state_of(&g, &p0), 28.0);
    assert_eq!(state_of(&g, &p1), 1.0);
    assert_eq!(state_of(&g, &p2), 1.0);

    for _ in 0..5 {
        run_tick(&mut g, &mut rng);
        assert_eq!(state_of(&g, &p0), 28.0);
        assert_eq!(state_of(&g, &p1), 1.0);
        assert_eq!(state_of(&g, &p2), 1.0);
    }
}

fn buffer_of(g: &GraphModel, id: &ElementId) -> (f64, f64) {
    match g.node(id).unwrap() {
        Element::Transformer(t) => {
            let p0_token = sluice_core::Ident::parse("p0_token").unwrap();
            let p1_token = sluice_core::Ident::parse("p1_token").unwrap();
            (
                t.buffer.get(&p0_token).copied().unwrap_or(0.0),
                t.buffer.get(&p1_token).copied().unwrap_or(0.0),
            )
        }
        _ => panic!("not a transformer"),
    }
}

#[test]
fn transformer_with_router_and_rated_edges() {
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
    g.set_gate_output_weight(&r0, &e_to_p0, 0.0).unwrap();
    g.set_gate_output_weight(&r0, &e_to_p1, 0.0).unwrap();

    let mut rng = StepRng::new(0, 1);

    run_tick(&mut g, &mut rng);
    assert_eq!(state_of(&g, &p0), 4.0);
    assert_eq!(state_of(&g, &p1), 8.0);
    assert_eq!(buffer_of(&g, &c0), (2.0, 3.0));

    run_tick(&mut g, &mut rng);
    assert_eq!(state_of(&g, &p0), 0.0);
    assert_eq!(state_of(&g, &p1), 4.0);
    assert_eq!(buffer_of(&g, &c0), (4.0, 6.0));

    run_tick(&mut g, &mut rng);
    assert_eq!(state_of(&g, &p0), 0.0);
    assert_eq!(state_of(&g, &p1), 0.0);
    assert_eq!(buffer_of(&g, &c0), (2.0, 9.0));

    run_tick(&mut g, &mut rng);
    assert_eq!(buffer_of(&g, &c0), (0.0, 8.0));

    let steady = buffer_of(&g, &c0);
    run_tick(&mut g, &mut rng);
    assert_eq!(state_of(&g, &p0), 0.0);
    assert_eq!(state_of(&g, &p1), 0.0);
    assert_eq!(buffer_of(&g, &c0), steady);
}

#[test]
fn transformer_feedback_through_router() {
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
    // Deterministically always selects the p0 branch.
    g.set_gate_output_weight(&r0, &e_to_p0, 1.0).unwrap();
    g.set_gate_output_weight(&r0, &e_to_p1, 0.0).unwrap();

    let mut rng = StepRng::new(0, 1);
    let expected = [
        (5.0, 8.0, (2.0, 3.0)),
        (2.0, 4.0, (4.0, 6.0)),
        (1.0, 0.0, (4.0, 9.0)),
        (1.0, 0.0, (3.0, 8.0)),
        (1.0, 0.0, (2.0, 7.0)),
    ];
    for (p0_expected, p1_expected, buffer_expected) in expected {
        run_tick(&mut g, &mut rng);
        assert_eq!(state_of(&g, &p0), p0_expected);
        assert_eq!(state_of(&g, &p1), p1_expected);
        assert_eq!(buffer_of(&g, &c0), buffer_expected);
    }
}

#[test]
fn constant_product_exchanger_holds_k_invariant() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let metal = reservoir(&mut g, "metal", 100.0);
    let wood = reservoir(&mut g, "wood", 100.0);
    let swap = g
        .add_node(NodeKind::Exchanger, Some(ElementId::new("swap")), Some("swap"))
        .unwrap();
    g.configure_exchanger(&swap, Some("metal_token"), Some("wood_token"), 100.0, 100.0)
        .unwrap();
    let k_before = match g.node(&swap).unwrap() {
        Element::Exchanger(e) => e.k(),
        _ => unreachable!(),
    };
    assert_eq!(k_before, 10_000.0);

    g.add_edge(None, metal.clone(), swap.clone(), Some(10.0), Some(0), None)
        .unwrap();
    g.add_edge(None, swap.clone(), wood.clone(), Some(10.0), Some(0), None)
        .unwrap();

    let mut rng = StepRng::new(0, 1);
    run_tick(&mut g, &mut rng);

    let (k_after, amount_a, amount_b) = match g.node(&swap).unwrap() {
        Element::Exchanger(e) => (e.k(), e.amount_a, e.amount_b),
        _ => unreachable!(),
    };
    assert!((k_after - k_before).abs() < 1e-6, "k invariant preserved");
    assert!(amount_a > 100.0, "metal side absorbed the swapped-in amount");
    assert!(amount_b < 100.0, "wood side gave up the swapped-out amount");
    assert!(state_of(&g, &metal) < 100.0, "metal reservoir fed the swap");
    assert!(state_of(&g, &wood) > 100.0, "wood reservoir received the swap output");
}

//! `checkGraph` structural diagnostics (spec §4.6, §7 taxonomy items 3-4).
#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::sync::Arc;

use sluice_core::eval::NoopEvaluator;
use sluice_core::{check_graph, CheckResult, Element, ElementId, GraphModel, NodeKind};

#[test]
fn acyclic_well_formed_graph_has_no_error() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new("p0")), Some("p0"))
        .unwrap();
    let p1 = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new("p1")), Some("p1"))
        .unwrap();
    g.add_edge(None, p0, p1, Some(1.0), None, None).unwrap();

    assert_eq!(check_graph(&g), CheckResult::NoError);
}

#[test]
fn unconfigured_exchanger_is_an_error() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    g.add_node(NodeKind::Exchanger, Some(ElementId::new("x0")), Some("x0"))
        .unwrap();

    match check_graph(&g) {
        CheckResult::Error { .. } => {}
        other => panic!("expected Error, got {other:?}"),
    }
}

#[test]
fn configured_exchanger_with_both_pipes_has_no_error() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let metal = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new("metal")), Some("metal"))
        .unwrap();
    let wood = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new("wood")), Some("wood"))
        .unwrap();
    let swap = g
        .add_node(NodeKind::Exchanger, Some(ElementId::new("swap")), Some("swap"))
        .unwrap();
    g.configure_exchanger(&swap, Some("metal_token"), Some("wood_token"), 100.0, 100.0)
        .unwrap();
    g.add_edge(None, metal, swap.clone(), Some(10.0), Some(0), None)
        .unwrap();
    g.add_edge(None, swap, wood, Some(10.0), Some(0), None)
        .unwrap();

    assert_eq!(check_graph(&g), CheckResult::NoError);
}

#[test]
fn transformer_dependency_cycle_is_a_warning() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let c0 = g
        .add_node(NodeKind::Transformer, Some(ElementId::new("c0")), Some("c0"))
        .unwrap();
    let c1 = g
        .add_node(NodeKind::Transformer, Some(ElementId::new("c1")), Some("c1"))
        .unwrap();
    g.add_edge(None, c0.clone(), c1.clone(), Some(1.0), None, None)
        .unwrap();
    g.add_edge(None, c1.clone(), c0.clone(), Some(1.0), None, None)
        .unwrap();

    match check_graph(&g) {
        CheckResult::Warning {
            cyclic_transformer_sets,
        } => {
            assert_eq!(cyclic_transformer_sets.len(), 1);
            assert_eq!(
                cyclic_transformer_sets[0],
                [c0, c1].into_iter().collect()
            );
        }
        other => panic!("expected Warning, got {other:?}"),
    }
}

#[test]
fn check_graph_does_not_mutate_the_caller_s_graph() {
    let mut g = GraphModel::new(Arc::new(NoopEvaluator));
    let p0 = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new("p0")), Some("p0"))
        .unwrap();
    let p1 = g
        .add_node(NodeKind::Reservoir, Some(ElementId::new("p1")), Some("p1"))
        .unwrap();
    if let Element::Reservoir(r) = g.node_mut(&p0).unwrap() {
        r.state = 10.0;
    }
    g.add_edge(None, p0.clone(), p1, Some(1.0), None, None)
        .unwrap();

    let tick_seq_before = g.tick_seq();
    let _ = check_graph(&g);
    assert_eq!(g.tick_seq(), tick_seq_before);
    match g.node(&p0).unwrap() {
        Element::Reservoir(r) => assert_eq!(r.state, 10.0),
        _ => panic!("not a reservoir"),
    }
}

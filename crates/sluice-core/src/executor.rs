// SPDX-License-Identifier: Apache-2.0
//! Tick executor: walks each compiled subgroup's entry edges, propagates
//! packets, and commits staged outputs atomically (spec §4.5).
use std::collections::{BTreeMap, BTreeSet};

use rand::RngCore;
use tracing::{trace, trace_span, warn};

use crate::compiler::{compile, GroupKind, ParallelGroup, Subgroup};
use crate::graph::GraphModel;
use crate::ident::{ElementId, Token};
use crate::node::Element;

/// One unit of flow in transit: the originating element, the kind of
/// quantity, and how much.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The element that originally produced this packet (a Reservoir,
    /// Transformer, or Exchanger — preserved across Router/Exchanger hops).
    pub from: ElementId,
    /// Kind of quantity carried.
    pub token: Token,
    /// Amount carried; always `> 0`.
    pub value: f64,
}

type OutputMap = BTreeMap<ElementId, Vec<Packet>>;

/// Runs one tick: compiles the active topology, executes every parallel
/// group, and commits staged packets to their destinations.
pub fn run_tick(graph: &mut GraphModel, rng: &mut dyn RngCore) {
    let tick = graph.bump_tick_seq();
    let _span = trace_span!("tick", tick).entered();
    let compiled = compile(graph, rng, false);

    let mut output: OutputMap = BTreeMap::new();
    for group in &compiled.groups {
        run_parallel_group(graph, group, &mut output);
    }

    commit(graph, output);
}

fn run_parallel_group(graph: &mut GraphModel, group: &ParallelGroup, output: &mut OutputMap) {
    match &group.kind {
        GroupKind::Ordered(order) => {
            for &idx in order {
                let subgroup = &group.subgroups[idx];
                let mut staged: OutputMap = BTreeMap::new();
                run_subgroup(graph, subgroup, &mut staged);
                if let Some(converter) = &subgroup.converter {
                    if let Some(packets) = staged.remove(converter) {
                        apply_to_converter_buffer(graph, converter, &packets);
                    }
                }
                merge(output, staged);
            }
        }
        GroupKind::Cyclic => {
            // No in-tick propagation between subgroups of a cyclic group:
            // every subgroup's staged output always waits for the final
            // commit, even when addressed to another subgroup's converter.
            for subgroup in &group.subgroups {
                let mut staged: OutputMap = BTreeMap::new();
                run_subgroup(graph, subgroup, &mut staged);
                merge(output, staged);
            }
        }
    }
}

fn apply_to_converter_buffer(graph: &mut GraphModel, converter: &ElementId, packets: &[Packet]) {
    let Some(element) = graph.node_mut(converter) else {
        return;
    };
    if let Element::Transformer(t) = element {
        for packet in packets {
            // `packet.value` is always > 0 by construction, but the buffer
            // guards its own invariant regardless of the caller.
            if let Err(e) = t.add_to_buffer(&packet.token, packet.value) {
                warn!(error = %e, converter = %converter, "dropped packet applying to converter buffer");
            }
        }
    }
}

fn run_subgroup(graph: &mut GraphModel, subgroup: &Subgroup, staged: &mut OutputMap) {
    let mut visited: BTreeSet<ElementId> = BTreeSet::new();
    for entry in &subgroup.entry_edges {
        traverse(graph, entry, None, &mut visited, staged);
    }
}

/// Walks edge `edge_id`, continuing an in-flight `packet` if this edge's
/// source requires one (Router/Exchanger).
fn traverse(
    graph: &mut GraphModel,
    edge_id: &ElementId,
    packet: Option<Packet>,
    visited: &mut BTreeSet<ElementId>,
    staged: &mut OutputMap,
) {
    if !visited.insert(edge_id.clone()) {
        return;
    }
    let Some(edge) = graph.edge(edge_id).cloned() else {
        return;
    };

    if let Some(condition) = &edge.condition {
        let scope = graph.variable_scope();
        if !condition.eval(&scope) {
            return;
        }
    }

    let Some(resolved) = resolve_packet(graph, &edge, packet) else {
        return;
    };
    if resolved.value <= 0.0 {
        return;
    }

    dispatch(graph, &edge, resolved, visited, staged);
}

/// Resolves the packet emerging from `edge`'s source, mutating that
/// source's internal state (draining a Reservoir/Transformer/Exchanger).
///
/// Transformer and Exchanger sources need to read the rest of the graph
/// (via a [`crate::graph::GraphScope`]) while also mutating themselves, so
/// they're pulled out of the graph for the duration of the read (see
/// [`GraphModel::take_node`]/[`GraphModel::put_node`]).
fn resolve_packet(graph: &mut GraphModel, edge: &crate::edge::Edge, packet: Option<Packet>) -> Option<Packet> {
    let kind = graph.node(&edge.from)?.kind();
    match kind {
        crate::kind::NodeKind::Reservoir => {
            let Some(Element::Reservoir(r)) = graph.node_mut(&edge.from) else {
                return None;
            };
            // `edge.rate` and `r.state` are both non-negative by construction,
            // so these calls never actually hit `NegativeDelta`.
            let taken = if edge.is_unlimited() {
                r.take_from_pool(r.state)
            } else {
                r.take_from_pool(edge.rate)
            };
            let value = match taken {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, reservoir = %edge.from, "reservoir refused to drain");
                    return None;
                }
            };
            Some(Packet {
                from: edge.from.clone(),
                token: r.token.clone(),
                value,
            })
        }
        crate::kind::NodeKind::Transformer => {
            let mut element = graph.take_node(&edge.from)?;
            let result = {
                let Element::Transformer(t) = &mut element else {
                    unreachable!("kind() said Transformer");
                };
                let scope = graph.variable_scope();
                let amount = if edge.is_unlimited() {
                    t.maximum_convertable(&scope)
                } else {
                    edge.rate
                };
                let value = t.take_from_state(amount, &scope);
                (t.token.clone(), value)
            };
            graph.put_node(edge.from.clone(), element);
            Some(Packet {
                from: edge.from.clone(),
                token: result.0,
                value: result.1,
            })
        }
        crate::kind::NodeKind::Router => {
            let packet = packet?;
            let Some(Element::Router(r)) = graph.node(&edge.from) else {
                return None;
            };
            let scope = graph.variable_scope();
            if !r.evaluate_condition(&scope) {
                return None;
            }
            let value = if edge.is_unlimited() {
                packet.value
            } else {
                packet.value.min(edge.rate)
            };
            Some(Packet {
                from: packet.from,
                token: packet.token,
                value,
            })
        }
        crate::kind::NodeKind::Exchanger => {
            let packet = packet?;
            let mut element = graph.take_node(&edge.from)?;
            let result = {
                let Element::Exchanger(e) = &mut element else {
                    unreachable!("kind() said Exchanger");
                };
                let scope = graph.variable_scope();
                // `packet.value` is always > 0 by construction, so this
                // never actually hits `NegativeSwapAmount`.
                e.swap(packet.value, &packet.token, &scope)
            };
            graph.put_node(edge.from.clone(), element);
            let (token, value) = match result {
                Ok(swapped) => swapped?,
                Err(e) => {
                    warn!(error = %e, exchanger = %edge.from, "exchanger refused to swap");
                    return None;
                }
            };
            Some(Packet {
                from: packet.from,
                token,
                value,
            })
        }
    }
}

fn dispatch(
    graph: &mut GraphModel,
    edge: &crate::edge::Edge,
    packet: Packet,
    visited: &mut BTreeSet<ElementId>,
    staged: &mut OutputMap,
) {
    match graph.node(&edge.to) {
        Some(Element::Router(r)) => {
            if let Some(next) = r.selected_output.clone() {
                traverse(graph, &next, Some(packet), visited, staged);
            }
        }
        Some(Element::Exchanger(e)) => {
            let next = e
                .pipes
                .iter()
                .find(|p| p.input_edge.as_ref() == Some(&edge.id))
                .and_then(|p| p.output_edge.clone());
            if let Some(next) = next {
                traverse(graph, &next, Some(packet), visited, staged);
            }
        }
        Some(Element::Reservoir(_) | Element::Transformer(_)) => {
            trace!(dest = %edge.to, value = packet.value, "stage packet");
            staged.entry(edge.to.clone()).or_default().push(packet);
        }
        None => {}
    }
}

/// Concatenates `next`'s packet lists onto `all`'s, per destination id,
/// preserving within-subgroup order (spec §4.5 "Merging").
fn merge(all: &mut OutputMap, next: OutputMap) {
    for (dest, packets) in next {
        all.entry(dest).or_default().extend(packets);
    }
}

fn commit(graph: &mut GraphModel, output: OutputMap) {
    for (dest, packets) in output {
        match graph.node_mut(&dest) {
            Some(Element::Reservoir(r)) => {
                if let Some(packet) = packets.first() {
                    if let Err(e) = r.add_to_pool(packet.value) {
                        warn!(error = %e, reservoir = %dest, "dropped packet committing to reservoir");
                    }
                }
            }
            Some(Element::Transformer(t)) => {
                for packet in &packets {
                    if let Err(e) = t.add_to_buffer(&packet.token, packet.value) {
                        warn!(error = %e, converter = %dest, "dropped packet committing to converter buffer");
                    }
                }
            }
            _ => {}
        }
    }
}

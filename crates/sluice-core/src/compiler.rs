// SPDX-License-Identifier: Apache-2.0
//! Per-tick graph compiler: slices the active topology into parallel
//! groups, each further sliced into subgroups, and orders subgroups by
//! producer→consumer precedence (spec §4.4).
use std::collections::{BTreeMap, BTreeSet};

use rand::RngCore;
use tracing::debug;

use crate::graph::GraphModel;
use crate::ident::ElementId;
use crate::node::Element;

/// One independently-executable slice of a parallel group: at most one
/// Transformer (its `converter`), plus every edge reachable without
/// crossing into another Transformer's inputs or a Reservoir's input.
#[derive(Debug, Clone, Default)]
pub struct Subgroup {
    /// The single Transformer owning this subgroup, if any.
    pub converter: Option<ElementId>,
    /// Edges whose source is a Transformer or a Reservoir: where this
    /// subgroup's traversal begins.
    pub entry_edges: Vec<ElementId>,
    /// Every active edge assigned to this subgroup.
    pub member_edges: BTreeSet<ElementId>,
}

/// How a parallel group's subgroups relate to each other.
#[derive(Debug, Clone)]
pub enum GroupKind {
    /// No dependency cycle between subgroups; execute in this order
    /// (indices into [`ParallelGroup::subgroups`]).
    Ordered(Vec<usize>),
    /// The subgroups' converters form a dependency cycle.
    Cyclic,
}

/// A connected component of the active topology, cut at reservoir inputs,
/// partitioned into subgroups cut at transformer inputs.
#[derive(Debug, Clone)]
pub struct ParallelGroup {
    /// This group's subgroups, in a fixed deterministic (not necessarily
    /// execution) order.
    pub subgroups: Vec<Subgroup>,
    /// Execution strategy for this group's subgroups.
    pub kind: GroupKind,
}

/// The result of compiling one tick: every parallel group plus bookkeeping
/// the checker consumes.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    /// Parallel groups, in a fixed deterministic order.
    pub groups: Vec<ParallelGroup>,
    /// Edges marked inactive this tick (non-selected router outputs, or
    /// zero-weight outputs in check mode).
    pub disabled_edges: BTreeSet<ElementId>,
    /// Exchangers that are not configured (spec invariant 7); surfaced by
    /// the checker as an `Error`.
    pub malformed_exchangers: Vec<ElementId>,
}

struct Activation {
    disabled_edges: BTreeSet<ElementId>,
    router_active_outputs: BTreeMap<ElementId, Vec<ElementId>>,
}

fn activate(graph: &mut GraphModel, rng: &mut dyn RngCore, check_mode: bool) -> Activation {
    if !check_mode {
        let reservoir_ids: Vec<ElementId> = graph
            .node_ids()
            .filter(|id| matches!(graph.node(id), Some(Element::Reservoir(_))))
            .cloned()
            .collect();
        for id in reservoir_ids {
            let Some(mut element) = graph.take_node(&id) else {
                continue;
            };
            if let Element::Reservoir(r) = &mut element {
                let mut scope = graph.variable_scope();
                r.advance(&mut scope);
            }
            graph.put_node(id, element);
        }
    }

    let mut disabled_edges = BTreeSet::new();
    let mut router_active_outputs = BTreeMap::new();
    let router_ids: Vec<ElementId> = graph
        .node_ids()
        .filter(|id| matches!(graph.node(id), Some(Element::Router(_))))
        .cloned()
        .collect();
    for id in router_ids {
        let Some(Element::Router(r)) = graph.node_mut(&id) else {
            continue;
        };
        if check_mode {
            let (active, zero): (Vec<(ElementId, f64)>, Vec<(ElementId, f64)>) = r
                .weights
                .iter()
                .map(|(edge, weight)| (edge.clone(), *weight))
                .partition(|(_, weight)| *weight > 0.0);
            disabled_edges.extend(zero.into_iter().map(|(edge, _)| edge));
            router_active_outputs.insert(id.clone(), active.into_iter().map(|(edge, _)| edge).collect());
        } else {
            r.advance(rng);
            let selected = r.selected_output.clone();
            let non_selected: Vec<ElementId> = r
                .weights
                .keys()
                .filter(|e| Some((*e).clone()) != selected)
                .cloned()
                .collect();
            disabled_edges.extend(non_selected);
            router_active_outputs.insert(id.clone(), selected.into_iter().collect());
        }
    }

    Activation {
        disabled_edges,
        router_active_outputs,
    }
}

/// Minimal union-find over a fixed universe of edge ids.
struct UnionFind {
    parent: BTreeMap<ElementId, ElementId>,
}

impl UnionFind {
    fn new(items: impl Iterator<Item = ElementId>) -> Self {
        let mut parent = BTreeMap::new();
        for item in items {
            parent.insert(item.clone(), item);
        }
        Self { parent }
    }

    fn find(&mut self, x: &ElementId) -> ElementId {
        let p = self.parent.get(x).cloned().unwrap_or_else(|| x.clone());
        if &p == x {
            return p;
        }
        let root = self.find(&p);
        self.parent.insert(x.clone(), root.clone());
        root
    }

    fn union(&mut self, a: &ElementId, b: &ElementId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Deterministic: attach the lexicographically larger root under
            // the smaller, so the resulting root is stable given the same
            // input regardless of union call order.
            if ra < rb {
                self.parent.insert(rb, ra);
            } else {
                self.parent.insert(ra, rb);
            }
        }
    }

    fn union_all(&mut self, items: &[ElementId]) {
        let mut iter = items.iter();
        let Some(first) = iter.next() else {
            return;
        };
        for other in iter {
            self.union(first, other);
        }
    }

    fn components(&mut self, universe: &BTreeSet<ElementId>) -> Vec<BTreeSet<ElementId>> {
        let mut by_root: BTreeMap<ElementId, BTreeSet<ElementId>> = BTreeMap::new();
        let ids: Vec<ElementId> = universe.iter().cloned().collect();
        for id in ids {
            let root = self.find(&id);
            by_root.entry(root).or_default().insert(id);
        }
        by_root.into_values().collect()
    }
}

/// Computes connected components of `universe` (a subset of active edges)
/// under the phase B/C adjacency rules. `cut_transformer_output` selects
/// phase C's additional cut (a Transformer no longer unions its output
/// with its inputs).
fn union_components(
    graph: &GraphModel,
    universe: &BTreeSet<ElementId>,
    activation: &Activation,
    cut_transformer_output: bool,
) -> Vec<BTreeSet<ElementId>> {
    let mut uf = UnionFind::new(universe.iter().cloned());
    for node_id in graph.node_ids() {
        match graph.node(node_id) {
            Some(Element::Reservoir(_)) => {
                // Cut: a reservoir never unions its input with its output.
            }
            Some(Element::Router(r)) => {
                let Some(input) = &r.input_edge else { continue };
                if !universe.contains(input) {
                    continue;
                }
                if let Some(outputs) = activation.router_active_outputs.get(node_id) {
                    for out in outputs {
                        if universe.contains(out) {
                            uf.union(input, out);
                        }
                    }
                }
            }
            Some(Element::Transformer(t)) => {
                let mut members: Vec<ElementId> = t
                    .inputs
                    .iter()
                    .filter(|e| universe.contains(*e))
                    .cloned()
                    .collect();
                if !cut_transformer_output {
                    if let Some(out) = &t.output_edge {
                        if universe.contains(out) {
                            members.push(out.clone());
                        }
                    }
                }
                uf.union_all(&members);
            }
            Some(Element::Exchanger(e)) => {
                for pipe in &e.pipes {
                    if let (Some(i), Some(o)) = (&pipe.input_edge, &pipe.output_edge) {
                        if universe.contains(i) && universe.contains(o) {
                            uf.union(i, o);
                        }
                    }
                }
            }
            None => {}
        }
    }
    uf.components(universe)
}

fn is_entry_edge(graph: &GraphModel, edge_id: &ElementId) -> bool {
    let Some(edge) = graph.edge(edge_id) else {
        return false;
    };
    matches!(
        graph.node(&edge.from),
        Some(Element::Transformer(_) | Element::Reservoir(_))
    )
}

fn build_subgroup(graph: &GraphModel, member_edges: BTreeSet<ElementId>) -> Subgroup {
    let converter = graph
        .node_ids()
        .find(|id| {
            matches!(graph.node(id), Some(Element::Transformer(t)) if t.inputs.iter().any(|e| member_edges.contains(e)))
        })
        .cloned();
    let entry_edges: Vec<ElementId> = member_edges
        .iter()
        .filter(|e| is_entry_edge(graph, e))
        .cloned()
        .collect();
    Subgroup {
        converter,
        entry_edges,
        member_edges,
    }
}

fn min_member(set: &BTreeSet<ElementId>) -> Option<ElementId> {
    set.iter().next().cloned()
}

fn order_subgroups(graph: &GraphModel, subgroups: &[Subgroup]) -> GroupKind {
    let owner_of: BTreeMap<ElementId, usize> = subgroups
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.converter.clone().map(|c| (c, i)))
        .collect();

    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); subgroups.len()];
    for (i, s) in subgroups.iter().enumerate() {
        for entry in &s.entry_edges {
            let Some(edge) = graph.edge(entry) else { continue };
            if matches!(graph.node(&edge.from), Some(Element::Transformer(_))) {
                if let Some(owner) = owner_of.get(&edge.from) {
                    if *owner != i {
                        deps[i].insert(*owner);
                    }
                }
            }
        }
    }

    // Kahn's algorithm: deps[i] = set of subgroups that must run before i.
    let mut remaining = deps.clone();
    let mut order = Vec::with_capacity(subgroups.len());
    let mut done = vec![false; subgroups.len()];
    loop {
        let next = (0..subgroups.len())
            .find(|i| !done[*i] && remaining[*i].is_empty());
        let Some(i) = next else { break };
        done[i] = true;
        order.push(i);
        for r in &mut remaining {
            r.remove(&i);
        }
    }
    if order.len() == subgroups.len() {
        GroupKind::Ordered(order)
    } else {
        GroupKind::Cyclic
    }
}

/// Compiles the graph's active topology for one tick.
///
/// In `check_mode`, no graph state is mutated: reservoirs are not advanced
/// and routers are not sampled, so this is safe to call against a live
/// graph from [`crate::checker::check_graph`].
pub fn compile(graph: &mut GraphModel, rng: &mut dyn RngCore, check_mode: bool) -> CompiledGraph {
    let activation = activate(graph, rng, check_mode);
    let all_edges: BTreeSet<ElementId> = graph.edge_ids().cloned().collect();
    let active_edges: BTreeSet<ElementId> = all_edges
        .difference(&activation.disabled_edges)
        .cloned()
        .collect();

    let mut parallel_components = union_components(graph, &active_edges, &activation, false);
    parallel_components.sort_by_key(min_member);

    let mut groups = Vec::with_capacity(parallel_components.len());
    for component in parallel_components {
        let mut subgroup_components = union_components(graph, &component, &activation, true);
        subgroup_components.sort_by_key(min_member);
        let subgroups: Vec<Subgroup> = subgroup_components
            .into_iter()
            .map(|m| build_subgroup(graph, m))
            .collect();
        let kind = order_subgroups(graph, &subgroups);
        groups.push(ParallelGroup { subgroups, kind });
    }

    let malformed_exchangers: Vec<ElementId> = graph
        .node_ids()
        .filter(|id| matches!(graph.node(id), Some(Element::Exchanger(e)) if !e.is_configured()))
        .cloned()
        .collect();

    debug!(
        groups = groups.len(),
        disabled = activation.disabled_edges.len(),
        malformed = malformed_exchangers.len(),
        "compiled tick"
    );

    CompiledGraph {
        groups,
        disabled_edges: activation.disabled_edges,
        malformed_exchangers,
    }
}

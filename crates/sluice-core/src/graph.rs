// SPDX-License-Identifier: Apache-2.0
//! `GraphModel`: the entity store, its label/id indices, and every edit
//! operation that preserves referential-integrity invariants (spec §3, §4.1).
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::trace;

use crate::edge::Edge;
use crate::error::{GraphError, GraphResult};
use crate::eval::{Evaluator, NoopEvaluator};
use crate::ident::{default_token_for_label, ElementId, Ident, Label, Token};
use crate::kind::{ElementKind, NodeKind};
use crate::node::{Element, Exchanger, Pipe, Reservoir, Router, Transformer};
use crate::scope::Scope;

/// Either a node element or an edge, keyed by the same id space (spec §3:
/// "Every element has a stable, globally unique id").
#[derive(Clone, Debug)]
enum Item {
    Node(Element),
    Edge(Edge),
}

impl Item {
    fn label(&self) -> &Label {
        match self {
            Self::Node(e) => e.label(),
            Self::Edge(e) => &e.label,
        }
    }

    fn kind(&self) -> ElementKind {
        match self {
            Self::Node(e) => e.kind().into(),
            Self::Edge(_) => ElementKind::Edge,
        }
    }
}

/// The entity store: nodes, edges, and the indices over them.
#[derive(Clone)]
pub struct GraphModel {
    items: BTreeMap<ElementId, Item>,
    labels: BTreeMap<Label, ElementId>,
    auto_counters: BTreeMap<&'static str, u64>,
    evaluator: Arc<dyn Evaluator>,
    tick_seq: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new(Arc::new(NoopEvaluator))
    }
}

impl GraphModel {
    /// Creates an empty graph using `evaluator` to compile every
    /// action/condition source string supplied to node setters.
    #[must_use]
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            items: BTreeMap::new(),
            labels: BTreeMap::new(),
            auto_counters: BTreeMap::new(),
            evaluator,
            tick_seq: 0,
        }
    }

    /// Returns the evaluator this graph compiles expressions with.
    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Number of ticks executed (or checked) so far, used to correlate
    /// tracing spans across a run. Purely observational.
    #[must_use]
    pub fn tick_seq(&self) -> u64 {
        self.tick_seq
    }

    pub(crate) fn bump_tick_seq(&mut self) -> u64 {
        self.tick_seq += 1;
        self.tick_seq
    }

    fn next_auto_id(&mut self, tag: &'static str) -> ElementId {
        loop {
            let counter = self.auto_counters.entry(tag).or_insert(0);
            *counter += 1;
            let id = ElementId::auto(tag, *counter);
            if !self.items.contains_key(&id) {
                return id;
            }
        }
    }

    fn next_auto_label(&mut self, tag: &'static str) -> Label {
        loop {
            let counter = self.auto_counters.entry(tag).or_insert(0);
            *counter += 1;
            #[allow(clippy::unwrap_used)]
            let label = Ident::parse(&format!("{tag}${}", *counter)).unwrap();
            if !self.labels.contains_key(&label) {
                return label;
            }
        }
    }

    // ---- lookups -----------------------------------------------------

    /// Returns the element (node or edge) with `id`, if any.
    #[must_use]
    pub fn get_element(&self, id: &ElementId) -> Option<ElementRef<'_>> {
        match self.items.get(id)? {
            Item::Node(e) => Some(ElementRef::Node(e)),
            Item::Edge(e) => Some(ElementRef::Edge(e)),
        }
    }

    /// Returns the id bound to `label`, if any.
    #[must_use]
    pub fn get_element_by_label(&self, label: &str) -> Option<&ElementId> {
        self.labels.get(&Ident::parse(label)?)
    }

    /// Returns a reference to the node with `id`, if it exists and is a node.
    #[must_use]
    pub fn node(&self, id: &ElementId) -> Option<&Element> {
        match self.items.get(id)? {
            Item::Node(e) => Some(e),
            Item::Edge(_) => None,
        }
    }

    /// Returns a mutable reference to the node with `id`.
    pub fn node_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        match self.items.get_mut(id)? {
            Item::Node(e) => Some(e),
            Item::Edge(_) => None,
        }
    }

    /// Returns a reference to the edge with `id`, if it exists and is an edge.
    #[must_use]
    pub fn edge(&self, id: &ElementId) -> Option<&Edge> {
        match self.items.get(id)? {
            Item::Edge(e) => Some(e),
            Item::Node(_) => None,
        }
    }

    /// Returns a mutable reference to the edge with `id`.
    pub fn edge_mut(&mut self, id: &ElementId) -> Option<&mut Edge> {
        match self.items.get_mut(id)? {
            Item::Edge(e) => Some(e),
            Item::Node(_) => None,
        }
    }

    /// Iterates over every node id, in deterministic `ElementId` order.
    pub fn node_ids(&self) -> impl Iterator<Item = &ElementId> {
        self.items.iter().filter_map(|(id, item)| match item {
            Item::Node(_) => Some(id),
            Item::Edge(_) => None,
        })
    }

    /// Iterates over every edge id, in deterministic `ElementId` order.
    pub fn edge_ids(&self) -> impl Iterator<Item = &ElementId> {
        self.items.iter().filter_map(|(id, item)| match item {
            Item::Edge(_) => Some(id),
            Item::Node(_) => None,
        })
    }

    /// Removes and returns the node `id`, for callers that need exclusive
    /// mutable access to the node while also reading the rest of the graph
    /// (e.g. evaluating an expression scope). Pair with [`Self::put_node`].
    pub(crate) fn take_node(&mut self, id: &ElementId) -> Option<Element> {
        match self.items.remove(id) {
            Some(Item::Node(e)) => Some(e),
            Some(other @ Item::Edge(_)) => {
                self.items.insert(id.clone(), other);
                None
            }
            None => None,
        }
    }

    /// Reinserts a node previously removed by [`Self::take_node`].
    pub(crate) fn put_node(&mut self, id: ElementId, element: Element) {
        self.items.insert(id, Item::Node(element));
    }

    // ---- addNode / addEdge --------------------------------------------

    /// Adds a node of `kind`, with caller-supplied or auto-generated `id`
    /// and `label`. Errors if `id` exists or `label` collides or is
    /// lexically invalid.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        id: Option<ElementId>,
        label: Option<&str>,
    ) -> GraphResult<ElementId> {
        let id = match id {
            Some(id) => {
                if self.items.contains_key(&id) {
                    return Err(GraphError::IdAlreadyExists);
                }
                id
            }
            None => self.next_auto_id(kind.tag()),
        };
        let label = match label {
            Some(raw) => {
                let label = Ident::parse(raw).ok_or(GraphError::InvalidLabelFormat)?;
                if self.labels.contains_key(&label) {
                    return Err(GraphError::DuplicateLabel);
                }
                label
            }
            None => self.next_auto_label(kind.tag()),
        };
        let token = default_token_for_label(label.as_str());
        let element = match kind {
            NodeKind::Reservoir => Element::Reservoir(Reservoir::new(id.clone(), label.clone(), token)),
            NodeKind::Router => Element::Router(Router::new(id.clone(), label.clone())),
            NodeKind::Transformer => {
                Element::Transformer(Transformer::new(id.clone(), label.clone(), token))
            }
            NodeKind::Exchanger => Element::Exchanger(Exchanger::new(id.clone(), label.clone())),
        };
        self.items.insert(id.clone(), Item::Node(element));
        self.labels.insert(label, id.clone());
        trace!(id = %id, kind = ?kind, "addNode");
        Ok(id)
    }

    /// Adds a directed edge from `from` to `to`. May displace pre-existing
    /// conflicting edges per invariant (3).
    #[allow(clippy::too_many_arguments)]
    pub fn add_edge(
        &mut self,
        id: Option<ElementId>,
        from: ElementId,
        to: ElementId,
        rate: Option<f64>,
        swap_input_index: Option<u32>,
        label: Option<&str>,
    ) -> GraphResult<ElementId> {
        if from == to {
            return Err(GraphError::CannotConnectToSelf);
        }
        self.require_connectable(&from, true)?;
        self.require_connectable(&to, false)?;

        let from_is_exchanger = self.node(&from).is_some_and(|e| e.as_exchanger().is_some());
        let to_is_exchanger = self.node(&to).is_some_and(|e| e.as_exchanger().is_some());
        if (from_is_exchanger || to_is_exchanger) && swap_input_index.is_none() {
            return Err(GraphError::MissingSwapInputIndex);
        }

        let id = match id {
            Some(id) => {
                if self.items.contains_key(&id) {
                    return Err(GraphError::EdgeIdAlreadyExists);
                }
                id
            }
            None => self.next_auto_id("edge"),
        };
        let label = match label {
            Some(raw) => {
                let label = Ident::parse(raw).ok_or(GraphError::InvalidLabelFormat)?;
                if self.labels.contains_key(&label) {
                    return Err(GraphError::DuplicateLabel);
                }
                label
            }
            None => self.next_auto_label("edge"),
        };

        // Displace any pre-existing edge occupying the slot this edge wants.
        self.clear_source_slot(&from, swap_input_index);
        self.clear_dest_slot(&to, swap_input_index);

        let edge = Edge {
            id: id.clone(),
            label: label.clone(),
            from: from.clone(),
            to: to.clone(),
            rate: rate.unwrap_or(-1.0),
            condition: None,
            condition_src: None,
            swap_input_index,
        };
        self.items.insert(id.clone(), Item::Edge(edge));
        self.labels.insert(label, id.clone());
        self.attach_source(&from, &id, swap_input_index)?;
        self.attach_dest(&to, &id, swap_input_index)?;
        trace!(id = %id, from = %from, to = %to, "addEdge");
        Ok(id)
    }

    fn require_connectable(&self, id: &ElementId, is_source: bool) -> GraphResult<()> {
        match self.items.get(id) {
            None => Err(GraphError::ConnectingNonExistingId),
            Some(Item::Edge(_)) if is_source => Err(GraphError::EdgeMustNotStartFromEdge),
            Some(Item::Edge(_)) => Err(GraphError::EdgeMustNotPointToEdge),
            Some(Item::Node(_)) => Ok(()),
        }
    }

    fn clear_source_slot(&mut self, from: &ElementId, swap_index: Option<u32>) {
        let displaced = match self.node(from) {
            Some(Element::Reservoir(r)) => r.output_edge.clone(),
            Some(Element::Transformer(t)) => t.output_edge.clone(),
            Some(Element::Exchanger(e)) => {
                let idx = swap_index.unwrap_or(0) as usize;
                e.pipes.get(idx).and_then(|p| p.output_edge.clone())
            }
            Some(Element::Router(_)) | None => None,
        };
        if let Some(old) = displaced {
            self.delete_edge_internal(&old);
        }
    }

    fn clear_dest_slot(&mut self, to: &ElementId, swap_index: Option<u32>) {
        let displaced = match self.node(to) {
            Some(Element::Reservoir(r)) => r.input_edge.clone(),
            Some(Element::Router(r)) => r.input_edge.clone(),
            Some(Element::Exchanger(e)) => {
                let idx = swap_index.unwrap_or(0) as usize;
                e.pipes.get(idx).and_then(|p| p.input_edge.clone())
            }
            Some(Element::Transformer(_)) | None => None,
        };
        if let Some(old) = displaced {
            self.delete_edge_internal(&old);
        }
    }

    fn attach_source(
        &mut self,
        from: &ElementId,
        edge_id: &ElementId,
        swap_index: Option<u32>,
    ) -> GraphResult<()> {
        match self.node_mut(from) {
            Some(Element::Reservoir(r)) => r.output_edge = Some(edge_id.clone()),
            Some(Element::Transformer(t)) => t.output_edge = Some(edge_id.clone()),
            Some(Element::Router(r)) => {
                r.weights.entry(edge_id.clone()).or_insert(0.0);
            }
            Some(Element::Exchanger(e)) => {
                #[allow(clippy::unwrap_used)]
                let idx = swap_index.unwrap() as usize;
                let pipe = e
                    .get_or_create_pipe(idx)
                    .ok_or(GraphError::SwapIndexOutOfRange)?;
                pipe.output_edge = Some(edge_id.clone());
            }
            None => return Err(GraphError::IdNotFound),
        }
        Ok(())
    }

    fn attach_dest(
        &mut self,
        to: &ElementId,
        edge_id: &ElementId,
        swap_index: Option<u32>,
    ) -> GraphResult<()> {
        match self.node_mut(to) {
            Some(Element::Reservoir(r)) => r.input_edge = Some(edge_id.clone()),
            Some(Element::Router(r)) => r.input_edge = Some(edge_id.clone()),
            Some(Element::Transformer(t)) => {
                t.inputs.insert(edge_id.clone());
            }
            Some(Element::Exchanger(e)) => {
                #[allow(clippy::unwrap_used)]
                let idx = swap_index.unwrap() as usize;
                let pipe = e
                    .get_or_create_pipe(idx)
                    .ok_or(GraphError::SwapIndexOutOfRange)?;
                pipe.input_edge = Some(edge_id.clone());
            }
            None => return Err(GraphError::IdNotFound),
        }
        Ok(())
    }

    // ---- deleteElement --------------------------------------------------

    /// Deletes the element `id` (node or edge), cascading to incident edges
    /// when `id` is a node. Returns every id actually removed.
    pub fn delete_element(&mut self, id: &ElementId) -> GraphResult<Vec<ElementId>> {
        match self.items.get(id) {
            None => Err(GraphError::IdNotFound),
            Some(Item::Edge(_)) => {
                self.delete_edge_internal(id);
                Ok(vec![id.clone()])
            }
            Some(Item::Node(_)) => {
                let incident: Vec<ElementId> = self
                    .items
                    .iter()
                    .filter_map(|(eid, item)| match item {
                        Item::Edge(e) if &e.from == id || &e.to == id => Some(eid.clone()),
                        _ => None,
                    })
                    .collect();
                for eid in &incident {
                    self.delete_edge_internal(eid);
                }
                if let Some(item) = self.items.remove(id) {
                    self.labels.remove(item.label());
                }
                let mut removed = incident;
                removed.push(id.clone());
                trace!(id = %id, removed = removed.len(), "deleteElement");
                Ok(removed)
            }
        }
    }

    fn delete_edge_internal(&mut self, edge_id: &ElementId) -> bool {
        let Some(Item::Edge(edge)) = self.items.remove(edge_id) else {
            return false;
        };
        self.labels.remove(&edge.label);
        if let Some(Element::Reservoir(r)) = self.node_mut(&edge.from) {
            if r.output_edge.as_ref() == Some(edge_id) {
                r.output_edge = None;
            }
        }
        if let Some(Element::Transformer(t)) = self.node_mut(&edge.from) {
            if t.output_edge.as_ref() == Some(edge_id) {
                t.output_edge = None;
            }
        }
        if let Some(Element::Router(r)) = self.node_mut(&edge.from) {
            r.weights.remove(edge_id);
        }
        if let Some(Element::Exchanger(e)) = self.node_mut(&edge.from) {
            for pipe in &mut e.pipes {
                if pipe.output_edge.as_ref() == Some(edge_id) {
                    pipe.output_edge = None;
                }
            }
        }
        if let Some(Element::Reservoir(r)) = self.node_mut(&edge.to) {
            if r.input_edge.as_ref() == Some(edge_id) {
                r.input_edge = None;
            }
        }
        if let Some(Element::Router(r)) = self.node_mut(&edge.to) {
            if r.input_edge.as_ref() == Some(edge_id) {
                r.input_edge = None;
            }
        }
        if let Some(Element::Transformer(t)) = self.node_mut(&edge.to) {
            t.inputs.remove(edge_id);
        }
        if let Some(Element::Exchanger(e)) = self.node_mut(&edge.to) {
            for pipe in &mut e.pipes {
                if pipe.input_edge.as_ref() == Some(edge_id) {
                    pipe.input_edge = None;
                }
            }
        }
        true
    }

    // ---- setLabel ---------------------------------------------------------

    /// Renames the element `id` to `new_label`, validating lexical form and
    /// uniqueness.
    pub fn set_label(&mut self, id: &ElementId, new_label: &str) -> GraphResult<()> {
        let new_label = Ident::parse(new_label).ok_or(GraphError::InvalidLabelFormat)?;
        if self.labels.get(&new_label).is_some_and(|existing| existing != id) {
            return Err(GraphError::DuplicateLabel);
        }
        let item = self.items.get_mut(id).ok_or(GraphError::IdNotFound)?;
        let old_label = item.label().clone();
        match item {
            Item::Node(e) => e.set_label(new_label.clone()),
            Item::Edge(e) => e.label = new_label.clone(),
        }
        self.labels.remove(&old_label);
        self.labels.insert(new_label, id.clone());
        Ok(())
    }

    // ---- setConverterRequiredInputPerUnit ---------------------------------

    /// Sets (or, for non-positive `amount`, clears) the per-unit requirement
    /// of `token` on transformer `conv_id`.
    pub fn set_converter_required_input_per_unit(
        &mut self,
        conv_id: &ElementId,
        token: &str,
        amount: f64,
    ) -> GraphResult<()> {
        let token = Ident::parse(token).ok_or(GraphError::InvalidTokenFormat)?;
        if amount > 0.0 {
            let upstream = self.upstream_tokens_of(conv_id)?;
            if !upstream.contains(&token) {
                return Err(GraphError::UnreachableToken(token.as_str().to_owned()));
            }
        } else {
            // Non-positive amount clears an existing requirement; with no
            // existing entry to clear there is nothing a non-positive amount
            // could sensibly mean.
            let t = self.transformer(conv_id)?;
            if !t.required_input_per_unit.contains_key(&token) {
                return Err(GraphError::NonPositiveConstraint);
            }
        }
        let Some(Element::Transformer(t)) = self.node_mut(conv_id) else {
            return Err(GraphError::WrongElementKind("converter"));
        };
        if amount > 0.0 {
            t.required_input_per_unit.insert(token, amount);
        } else {
            t.required_input_per_unit.remove(&token);
        }
        Ok(())
    }

    fn transformer(&self, id: &ElementId) -> GraphResult<&Transformer> {
        match self.node(id) {
            Some(Element::Transformer(t)) => Ok(t),
            Some(_) => Err(GraphError::WrongElementKind("converter")),
            None => Err(GraphError::IdNotFound),
        }
    }

    // ---- setGateOutputWeight -----------------------------------------------

    /// Sets the weight of `edge_id` on router `router_id`. Rejects negative
    /// weights and edges not connected to this router.
    pub fn set_gate_output_weight(
        &mut self,
        router_id: &ElementId,
        edge_id: &ElementId,
        weight: f64,
    ) -> GraphResult<()> {
        if weight < 0.0 {
            return Err(GraphError::NegativeOutputWeight);
        }
        let Some(Element::Router(r)) = self.node_mut(router_id) else {
            return match self.node(router_id) {
                Some(_) => Err(GraphError::WrongElementKind("gate")),
                None => Err(GraphError::IdNotFound),
            };
        };
        if !r.weights.contains_key(edge_id) {
            return Err(GraphError::EdgeNotConnectedToGate);
        }
        r.weights.insert(edge_id.clone(), weight.max(0.0));
        Ok(())
    }

    // ---- setReservoirAction / setCondition ----------------------------------

    /// Compiles `src` through this graph's evaluator and installs it as
    /// reservoir `id`'s numeric action.
    pub fn set_reservoir_action(&mut self, id: &ElementId, src: &str) -> GraphResult<()> {
        let compiled = self
            .evaluator
            .compile_numeric(src)
            .map_err(|e| GraphError::ExpressionCompileFailed(e.0))?;
        let Some(Element::Reservoir(r)) = self.node_mut(id) else {
            return match self.node(id) {
                Some(_) => Err(GraphError::WrongElementKind("pool")),
                None => Err(GraphError::IdNotFound),
            };
        };
        r.action = Some(compiled);
        r.action_src = Some(src.to_owned());
        Ok(())
    }

    /// Compiles `src` through this graph's evaluator and installs it as `id`'s
    /// guard. Works on any element carrying a `condition`: Reservoir, Router,
    /// Transformer, Exchanger, and Edge alike.
    pub fn set_condition(&mut self, id: &ElementId, src: &str) -> GraphResult<()> {
        let compiled = self
            .evaluator
            .compile_boolean(src)
            .map_err(|e| GraphError::ExpressionCompileFailed(e.0))?;
        match self.items.get_mut(id) {
            Some(Item::Node(Element::Reservoir(r))) => {
                r.condition = Some(compiled);
                r.condition_src = Some(src.to_owned());
            }
            Some(Item::Node(Element::Router(r))) => {
                r.condition = Some(compiled);
                r.condition_src = Some(src.to_owned());
            }
            Some(Item::Node(Element::Transformer(t))) => {
                t.condition = Some(compiled);
                t.condition_src = Some(src.to_owned());
            }
            Some(Item::Node(Element::Exchanger(e))) => {
                e.condition = Some(compiled);
                e.condition_src = Some(src.to_owned());
            }
            Some(Item::Edge(e)) => {
                e.condition = Some(compiled);
                e.condition_src = Some(src.to_owned());
            }
            None => return Err(GraphError::IdNotFound),
        }
        Ok(())
    }

    // ---- configureExchanger --------------------------------------------------

    fn exchanger(&self, id: &ElementId) -> GraphResult<&Exchanger> {
        match self.node(id) {
            Some(Element::Exchanger(e)) => Ok(e),
            Some(_) => Err(GraphError::WrongElementKind("swap")),
            None => Err(GraphError::IdNotFound),
        }
    }

    /// Configures exchanger `id`'s token pair and initial pools: both tokens
    /// must be named, distinct, and both amounts strictly positive (spec §6
    /// "all tokens must have positive amount").
    pub fn configure_exchanger(
        &mut self,
        id: &ElementId,
        token_a: Option<&str>,
        token_b: Option<&str>,
        amount_a: f64,
        amount_b: f64,
    ) -> GraphResult<()> {
        let _ = self.exchanger(id)?;
        let (Some(token_a), Some(token_b)) = (token_a, token_b) else {
            return Err(GraphError::UndefinedTokenNames);
        };
        let token_a = Ident::parse(token_a).ok_or(GraphError::InvalidTokenFormat)?;
        let token_b = Ident::parse(token_b).ok_or(GraphError::InvalidTokenFormat)?;
        if token_a == token_b {
            return Err(GraphError::DuplicateTokenTypes);
        }
        if amount_a <= 0.0 || amount_b <= 0.0 {
            return Err(GraphError::NonPositiveAmount);
        }
        let Some(Element::Exchanger(e)) = self.node_mut(id) else {
            return Err(GraphError::WrongElementKind("swap"));
        };
        e.token_a = Some(token_a);
        e.token_b = Some(token_b);
        e.amount_a = amount_a;
        e.amount_b = amount_b;
        Ok(())
    }

    // ---- upstreamTokensOf ---------------------------------------------------

    /// Computes, for each input edge of transformer `conv_id`, the set of
    /// tokens that could flow in (spec §4.1 "Upstream-token discovery").
    pub fn upstream_tokens_of(&self, conv_id: &ElementId) -> GraphResult<BTreeSet<Token>> {
        let t = self.transformer(conv_id)?;
        let mut tokens = BTreeSet::new();
        for edge_id in &t.inputs {
            tokens.extend(self.tokens_via_edge(edge_id, &mut BTreeSet::new()));
        }
        Ok(tokens)
    }

    fn tokens_via_edge(&self, edge_id: &ElementId, seen: &mut BTreeSet<ElementId>) -> BTreeSet<Token> {
        let Some(edge) = self.edge(edge_id) else {
            return BTreeSet::new();
        };
        self.tokens_of_node(&edge.from, seen)
    }

    fn tokens_of_node(&self, node_id: &ElementId, seen: &mut BTreeSet<ElementId>) -> BTreeSet<Token> {
        if !seen.insert(node_id.clone()) {
            return BTreeSet::new();
        }
        match self.node(node_id) {
            Some(Element::Reservoir(r)) => std::iter::once(r.token.clone()).collect(),
            Some(Element::Transformer(t)) => std::iter::once(t.token.clone()).collect(),
            Some(Element::Router(r)) => match &r.input_edge {
                Some(input) => self.tokens_via_edge(input, seen),
                None => BTreeSet::new(),
            },
            // Not specified by the backward-follow algorithm; an exchanger
            // may emit either configured token depending on swap direction,
            // so both are offered upstream (see DESIGN.md).
            Some(Element::Exchanger(e)) => {
                let mut tokens = BTreeSet::new();
                tokens.extend(e.token_a.clone());
                tokens.extend(e.token_b.clone());
                tokens
            }
            None => BTreeSet::new(),
        }
    }

    // ---- clone --------------------------------------------------------------

    /// Deep-clones this graph. Every element is copied by value; indices are
    /// reconstructed via `#[derive(Clone)]`. The evaluator is a shared,
    /// stateless collaborator and is not deep-copied.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }

    // ---- variableScope --------------------------------------------------------

    /// Returns a read-through [`Scope`] over this graph's labels: reservoirs
    /// expose `state`, edges expose `rate`. Writes go to a local cache that
    /// overrides reads; the graph itself is never mutated.
    #[must_use]
    pub fn variable_scope(&self) -> GraphScope<'_> {
        GraphScope {
            graph: self,
            cache: HashMap::new(),
        }
    }
}

#[cfg(feature = "serde")]
impl GraphModel {
    /// Serializes this graph to JSON. Compiled `action`/`condition` closures
    /// cannot be serialized; their source strings are carried instead and
    /// recompiled by [`Self::from_json`].
    pub fn to_json(&self) -> GraphResult<String> {
        let wire = json::WireGraph::from_model(self);
        serde_json::to_string(&wire).map_err(|e| GraphError::JsonError(e.to_string()))
    }

    /// Rebuilds a graph from JSON produced by [`Self::to_json`], recompiling
    /// every retained action/condition source string through `evaluator`.
    pub fn from_json(json: &str, evaluator: Arc<dyn Evaluator>) -> GraphResult<Self> {
        let wire: json::WireGraph =
            serde_json::from_str(json).map_err(|e| GraphError::JsonError(e.to_string()))?;
        wire.into_model(evaluator)
    }
}

#[cfg(feature = "serde")]
mod json {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use super::{GraphModel, Item};
    use crate::edge::Edge;
    use crate::error::{GraphError, GraphResult};
    use crate::eval::Evaluator;
    use crate::ident::{ElementId, Label, Token};
    use crate::node::{Element, Exchanger, Pipe, Reservoir, Router, Transformer};

    #[derive(Serialize, Deserialize)]
    pub(super) struct WireGraph {
        auto_counters: BTreeMap<String, u64>,
        tick_seq: u64,
        elements: Vec<WireItem>,
    }

    #[derive(Serialize, Deserialize)]
    #[serde(tag = "kind")]
    enum WireItem {
        #[serde(rename = "pool")]
        Reservoir(WireReservoir),
        #[serde(rename = "gate")]
        Router(WireRouter),
        #[serde(rename = "converter")]
        Transformer(WireTransformer),
        #[serde(rename = "swap")]
        Exchanger(WireExchanger),
        #[serde(rename = "edge")]
        Edge(WireEdge),
    }

    #[derive(Serialize, Deserialize)]
    struct WireReservoir {
        id: ElementId,
        label: Label,
        token: Token,
        state: f64,
        capacity: f64,
        action_src: Option<String>,
        condition_src: Option<String>,
        input_edge: Option<ElementId>,
        output_edge: Option<ElementId>,
    }

    #[derive(Serialize, Deserialize)]
    struct WireRouter {
        id: ElementId,
        label: Label,
        weights: BTreeMap<ElementId, f64>,
        input_edge: Option<ElementId>,
        condition_src: Option<String>,
    }

    #[derive(Serialize, Deserialize)]
    struct WireTransformer {
        id: ElementId,
        label: Label,
        token: Token,
        inputs: std::collections::BTreeSet<ElementId>,
        output_edge: Option<ElementId>,
        required_input_per_unit: BTreeMap<Token, f64>,
        buffer: BTreeMap<Token, f64>,
        condition_src: Option<String>,
    }

    #[derive(Serialize, Deserialize)]
    struct WireExchanger {
        id: ElementId,
        label: Label,
        token_a: Option<Token>,
        token_b: Option<Token>,
        amount_a: f64,
        amount_b: f64,
        condition_src: Option<String>,
        pipes: Vec<Pipe>,
    }

    #[derive(Serialize, Deserialize)]
    struct WireEdge {
        id: ElementId,
        label: Label,
        from: ElementId,
        to: ElementId,
        rate: f64,
        condition_src: Option<String>,
        swap_input_index: Option<u32>,
    }

    /// The set of `next_auto_id`/`next_auto_label` tags is fixed by the four
    /// node kinds plus `"edge"`; anything else means the JSON was hand-edited
    /// or produced by a different version of this format.
    fn static_tag(tag: &str) -> GraphResult<&'static str> {
        match tag {
            "pool" => Ok("pool"),
            "gate" => Ok("gate"),
            "converter" => Ok("converter"),
            "swap" => Ok("swap"),
            "edge" => Ok("edge"),
            other => Err(GraphError::JsonError(format!(
                "unknown auto-counter tag: {other}"
            ))),
        }
    }

    fn compile_condition(
        evaluator: &Arc<dyn Evaluator>,
        src: Option<String>,
    ) -> GraphResult<(Option<Arc<dyn crate::eval::BooleanFn>>, Option<String>)> {
        match src {
            Some(src) => {
                let compiled = evaluator
                    .compile_boolean(&src)
                    .map_err(|e| GraphError::ExpressionCompileFailed(e.0))?;
                Ok((Some(compiled), Some(src)))
            }
            None => Ok((None, None)),
        }
    }

    impl WireGraph {
        pub(super) fn from_model(model: &GraphModel) -> Self {
            let elements = model
                .items
                .values()
                .map(|item| match item {
                    Item::Node(Element::Reservoir(r)) => WireItem::Reservoir(WireReservoir {
                        id: r.id.clone(),
                        label: r.label.clone(),
                        token: r.token.clone(),
                        state: r.state,
                        capacity: r.capacity,
                        action_src: r.action_src.clone(),
                        condition_src: r.condition_src.clone(),
                        input_edge: r.input_edge.clone(),
                        output_edge: r.output_edge.clone(),
                    }),
                    Item::Node(Element::Router(r)) => WireItem::Router(WireRouter {
                        id: r.id.clone(),
                        label: r.label.clone(),
                        weights: r.weights.clone(),
                        input_edge: r.input_edge.clone(),
                        condition_src: r.condition_src.clone(),
                    }),
                    Item::Node(Element::Transformer(t)) => WireItem::Transformer(WireTransformer {
                        id: t.id.clone(),
                        label: t.label.clone(),
                        token: t.token.clone(),
                        inputs: t.inputs.clone(),
                        output_edge: t.output_edge.clone(),
                        required_input_per_unit: t.required_input_per_unit.clone(),
                        buffer: t.buffer.clone(),
                        condition_src: t.condition_src.clone(),
                    }),
                    Item::Node(Element::Exchanger(e)) => WireItem::Exchanger(WireExchanger {
                        id: e.id.clone(),
                        label: e.label.clone(),
                        token_a: e.token_a.clone(),
                        token_b: e.token_b.clone(),
                        amount_a: e.amount_a,
                        amount_b: e.amount_b,
                        condition_src: e.condition_src.clone(),
                        pipes: e.pipes.clone(),
                    }),
                    Item::Edge(e) => WireItem::Edge(WireEdge {
                        id: e.id.clone(),
                        label: e.label.clone(),
                        from: e.from.clone(),
                        to: e.to.clone(),
                        rate: e.rate,
                        condition_src: e.condition_src.clone(),
                        swap_input_index: e.swap_input_index,
                    }),
                })
                .collect();
            Self {
                auto_counters: model
                    .auto_counters
                    .iter()
                    .map(|(tag, count)| ((*tag).to_owned(), *count))
                    .collect(),
                tick_seq: model.tick_seq,
                elements,
            }
        }

        pub(super) fn into_model(self, evaluator: Arc<dyn Evaluator>) -> GraphResult<GraphModel> {
            let mut auto_counters = BTreeMap::new();
            for (tag, count) in self.auto_counters {
                auto_counters.insert(static_tag(&tag)?, count);
            }
            let mut items = BTreeMap::new();
            let mut labels = BTreeMap::new();
            for item in self.elements {
                let (id, label, item) = match item {
                    WireItem::Reservoir(w) => {
                        let mut r = Reservoir::new(w.id.clone(), w.label.clone(), w.token);
                        r.state = w.state;
                        r.capacity = w.capacity;
                        r.input_edge = w.input_edge;
                        r.output_edge = w.output_edge;
                        if let Some(src) = w.action_src {
                            r.action = Some(
                                evaluator
                                    .compile_numeric(&src)
                                    .map_err(|e| GraphError::ExpressionCompileFailed(e.0))?,
                            );
                            r.action_src = Some(src);
                        }
                        let (condition, condition_src) =
                            compile_condition(&evaluator, w.condition_src)?;
                        r.condition = condition;
                        r.condition_src = condition_src;
                        (w.id, w.label, Item::Node(Element::Reservoir(r)))
                    }
                    WireItem::Router(w) => {
                        let mut r = Router::new(w.id.clone(), w.label.clone());
                        r.weights = w.weights;
                        r.input_edge = w.input_edge;
                        let (condition, condition_src) =
                            compile_condition(&evaluator, w.condition_src)?;
                        r.condition = condition;
                        r.condition_src = condition_src;
                        (w.id, w.label, Item::Node(Element::Router(r)))
                    }
                    WireItem::Transformer(w) => {
                        let mut t = Transformer::new(w.id.clone(), w.label.clone(), w.token);
                        t.inputs = w.inputs;
                        t.output_edge = w.output_edge;
                        t.required_input_per_unit = w.required_input_per_unit;
                        t.buffer = w.buffer;
                        let (condition, condition_src) =
                            compile_condition(&evaluator, w.condition_src)?;
                        t.condition = condition;
                        t.condition_src = condition_src;
                        (w.id, w.label, Item::Node(Element::Transformer(t)))
                    }
                    WireItem::Exchanger(w) => {
                        let mut e = Exchanger::new(w.id.clone(), w.label.clone());
                        e.token_a = w.token_a;
                        e.token_b = w.token_b;
                        e.amount_a = w.amount_a;
                        e.amount_b = w.amount_b;
                        e.pipes = w.pipes;
                        let (condition, condition_src) =
                            compile_condition(&evaluator, w.condition_src)?;
                        e.condition = condition;
                        e.condition_src = condition_src;
                        (w.id, w.label, Item::Node(Element::Exchanger(e)))
                    }
                    WireItem::Edge(w) => {
                        let (condition, condition_src) =
                            compile_condition(&evaluator, w.condition_src)?;
                        let edge = Edge {
                            id: w.id.clone(),
                            label: w.label.clone(),
                            from: w.from,
                            to: w.to,
                            rate: w.rate,
                            condition,
                            condition_src,
                            swap_input_index: w.swap_input_index,
                        };
                        (w.id, w.label, Item::Edge(edge))
                    }
                };
                items.insert(id.clone(), item);
                labels.insert(label, id);
            }
            Ok(GraphModel {
                items,
                labels,
                auto_counters,
                evaluator,
                tick_seq: self.tick_seq,
            })
        }
    }
}

/// Borrowed view over a node or an edge, returned by [`GraphModel::get_element`].
#[derive(Debug, Clone, Copy)]
pub enum ElementRef<'a> {
    /// A node element.
    Node(&'a Element),
    /// An edge.
    Edge(&'a Edge),
}

/// [`Scope`] implementation backed by live [`GraphModel`] reads plus a local
/// write cache (spec §4.1 `variableScope`).
pub struct GraphScope<'a> {
    graph: &'a GraphModel,
    cache: HashMap<String, f64>,
}

impl Scope for GraphScope<'_> {
    fn get(&self, name: &str) -> Option<f64> {
        if let Some(v) = self.cache.get(name) {
            return Some(*v);
        }
        let id = self.graph.get_element_by_label(name)?;
        match self.graph.get_element(id)? {
            ElementRef::Node(Element::Reservoir(r)) => Some(r.state),
            ElementRef::Edge(e) => Some(e.rate),
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: f64) {
        self.cache.insert(name.to_owned(), value);
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .graph
            .items
            .values()
            .filter(|item| {
                matches!(item, Item::Node(Element::Reservoir(_))) || matches!(item, Item::Edge(_))
            })
            .map(|item| item.label().as_str().to_owned())
            .collect();
        for k in self.cache.keys() {
            if !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        keys
    }
}

// SPDX-License-Identifier: Apache-2.0
//! Deterministic, discrete-tick resource-flow graph simulation core.
//!
//! A graph of [`node::Element`]s (Reservoir, Router, Transformer, Exchanger)
//! connected by rate-limited [`edge::Edge`]s evolves one tick at a time
//! through [`executor::run_tick`]. [`graph::GraphModel`] is the entity store
//! and the only type that mutates graph structure; [`compiler::compile`]
//! slices its active topology into independently-executable parallel groups
//! each tick, and [`checker::check_graph`] surfaces structural problems
//! (unconfigured exchangers, dependency cycles) without mutating anything.
//!
//! Guard and action formulas are an external collaborator: this crate only
//! defines the [`eval::Evaluator`] interface they're compiled through, and
//! ships [`eval::NoopEvaluator`] as a harmless stand-in (see `eval`).

pub mod checker;
pub mod compiler;
pub mod edge;
pub mod error;
pub mod eval;
pub mod executor;
pub mod graph;
pub mod ident;
pub mod kind;
pub mod node;
pub mod rng;
pub mod scope;

pub use checker::{check_graph, CheckResult};
pub use compiler::{compile, CompiledGraph, GroupKind, ParallelGroup, Subgroup};
pub use edge::Edge;
pub use error::{GraphError, GraphResult};
pub use executor::{run_tick, Packet};
pub use graph::{ElementRef, GraphModel, GraphScope};
pub use ident::{ElementId, Ident, Label, Token};
pub use kind::{ElementKind, NodeKind};
pub use node::{Element, Exchanger, Pipe, Reservoir, Router, Transformer};
pub use rng::weighted_select;
pub use scope::{CachingScope, Scope};

// SPDX-License-Identifier: Apache-2.0
//! Node kind variants and the tagged-union `Element` wrapper dispatching
//! shared operations (`id`, `label`, `kind`) by tag (spec §9 "variants over
//! inheritance").
pub mod exchanger;
pub mod reservoir;
pub mod router;
pub mod transformer;

pub use exchanger::{Exchanger, Pipe};
pub use reservoir::Reservoir;
pub use router::Router;
pub use transformer::Transformer;

use crate::ident::{ElementId, Label};
use crate::kind::NodeKind;

/// A node element: one of the four typed kinds the graph model stores.
#[derive(Clone)]
pub enum Element {
    /// See [`Reservoir`].
    Reservoir(Reservoir),
    /// See [`Router`].
    Router(Router),
    /// See [`Transformer`].
    Transformer(Transformer),
    /// See [`Exchanger`].
    Exchanger(Exchanger),
}

impl Element {
    /// Returns this element's stable id.
    #[must_use]
    pub fn id(&self) -> &ElementId {
        match self {
            Self::Reservoir(r) => &r.id,
            Self::Router(r) => &r.id,
            Self::Transformer(t) => &t.id,
            Self::Exchanger(e) => &e.id,
        }
    }

    /// Returns this element's current display label.
    #[must_use]
    pub fn label(&self) -> &Label {
        match self {
            Self::Reservoir(r) => &r.label,
            Self::Router(r) => &r.label,
            Self::Transformer(t) => &t.label,
            Self::Exchanger(e) => &e.label,
        }
    }

    /// Sets this element's display label without validating it (callers must
    /// validate via [`crate::ident::Ident::parse`] first).
    pub fn set_label(&mut self, label: Label) {
        match self {
            Self::Reservoir(r) => r.label = label,
            Self::Router(r) => r.label = label,
            Self::Transformer(t) => t.label = label,
            Self::Exchanger(e) => e.label = label,
        }
    }

    /// Returns this element's kind tag.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Reservoir(_) => NodeKind::Reservoir,
            Self::Router(_) => NodeKind::Router,
            Self::Transformer(_) => NodeKind::Transformer,
            Self::Exchanger(_) => NodeKind::Exchanger,
        }
    }

    /// Returns a reference to the inner [`Reservoir`], if this is one.
    #[must_use]
    pub fn as_reservoir(&self) -> Option<&Reservoir> {
        match self {
            Self::Reservoir(r) => Some(r),
            _ => None,
        }
    }

    /// Returns a mutable reference to the inner [`Reservoir`], if this is one.
    pub fn as_reservoir_mut(&mut self) -> Option<&mut Reservoir> {
        match self {
            Self::Reservoir(r) => Some(r),
            _ => None,
        }
    }

    /// Returns a reference to the inner [`Router`], if this is one.
    #[must_use]
    pub fn as_router(&self) -> Option<&Router> {
        match self {
            Self::Router(r) => Some(r),
            _ => None,
        }
    }

    /// Returns a mutable reference to the inner [`Router`], if this is one.
    pub fn as_router_mut(&mut self) -> Option<&mut Router> {
        match self {
            Self::Router(r) => Some(r),
            _ => None,
        }
    }

    /// Returns a reference to the inner [`Transformer`], if this is one.
    #[must_use]
    pub fn as_transformer(&self) -> Option<&Transformer> {
        match self {
            Self::Transformer(t) => Some(t),
            _ => None,
        }
    }

    /// Returns a mutable reference to the inner [`Transformer`], if this is one.
    pub fn as_transformer_mut(&mut self) -> Option<&mut Transformer> {
        match self {
            Self::Transformer(t) => Some(t),
            _ => None,
        }
    }

    /// Returns a reference to the inner [`Exchanger`], if this is one.
    #[must_use]
    pub fn as_exchanger(&self) -> Option<&Exchanger> {
        match self {
            Self::Exchanger(e) => Some(e),
            _ => None,
        }
    }

    /// Returns a mutable reference to the inner [`Exchanger`], if this is one.
    pub fn as_exchanger_mut(&mut self) -> Option<&mut Exchanger> {
        match self {
            Self::Exchanger(e) => Some(e),
            _ => None,
        }
    }

    /// Returns this element's single input edge, if any (Reservoir/Router).
    /// Transformers have many inputs and Exchangers have per-pipe inputs, so
    /// this only applies to the single-input kinds.
    #[must_use]
    pub fn single_input_edge(&self) -> Option<&ElementId> {
        match self {
            Self::Reservoir(r) => r.input_edge.as_ref(),
            Self::Router(r) => r.input_edge.as_ref(),
            Self::Transformer(_) | Self::Exchanger(_) => None,
        }
    }

    /// Returns this element's single output edge, if any
    /// (Reservoir/Transformer). Routers select per-tick and Exchangers have
    /// per-pipe outputs, so this only applies to the single-output kinds.
    #[must_use]
    pub fn single_output_edge(&self) -> Option<&ElementId> {
        match self {
            Self::Reservoir(r) => r.output_edge.as_ref(),
            Self::Transformer(t) => t.output_edge.as_ref(),
            Self::Router(_) | Self::Exchanger(_) => None,
        }
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Element::{:?}({:?})", self.kind(), self.id())
    }
}

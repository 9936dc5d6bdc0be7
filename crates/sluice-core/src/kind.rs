// SPDX-License-Identifier: Apache-2.0
//! Element classification enums.

/// Classification of the four node kinds a caller may add via `addNode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// A quantity container ("Pool" in the glossary).
    Reservoir,
    /// Weighted random routing node ("Gate").
    Router,
    /// Multi-input recipe node with a buffer ("Converter").
    Transformer,
    /// Constant-product pair exchanger ("Swap").
    Exchanger,
}

impl NodeKind {
    /// Short kind tag used for auto-generated ids/labels (`pool`, `gate`, ...).
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Reservoir => "pool",
            Self::Router => "gate",
            Self::Transformer => "converter",
            Self::Exchanger => "swap",
        }
    }
}

/// Classification over every element kind, including edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementKind {
    /// See [`NodeKind::Reservoir`].
    Reservoir,
    /// See [`NodeKind::Router`].
    Router,
    /// See [`NodeKind::Transformer`].
    Transformer,
    /// See [`NodeKind::Exchanger`].
    Exchanger,
    /// A directed, rate-limited edge.
    Edge,
}

impl From<NodeKind> for ElementKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Reservoir => Self::Reservoir,
            NodeKind::Router => Self::Router,
            NodeKind::Transformer => Self::Transformer,
            NodeKind::Exchanger => Self::Exchanger,
        }
    }
}

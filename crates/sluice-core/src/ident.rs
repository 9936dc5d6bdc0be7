// SPDX-License-Identifier: Apache-2.0
//! Identifier and lexical-validation utilities.
use std::fmt;
use std::sync::Arc;

use blake3::Hasher;

/// Stable, globally unique identifier for any element (node or edge).
///
/// Assigned by the caller, or auto-generated via [`ElementId::auto`] when the
/// caller omits one. Auto-generated ids are derived from a domain-separated
/// BLAKE3 hash of the kind tag and a monotonic counter, hex-encoded to a short,
/// human-scannable string — the same construction `warp-core::ident` uses for
/// its content-addressed node/edge/type ids.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementId(Arc<str>);

impl ElementId {
    /// Wraps an arbitrary caller-supplied string as an id.
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    /// Returns the string form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives a short, stable id from `kind` and a monotonic `counter`.
    #[must_use]
    pub fn auto(kind: &str, counter: u64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"sluice-id:");
        hasher.update(kind.as_bytes());
        hasher.update(b":");
        hasher.update(&counter.to_le_bytes());
        let digest = hasher.finalize();
        Self(format!("{kind}_{}", hex::encode(&digest.as_bytes()[..8])).into())
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lexically-validated variable name: `^[A-Za-z_$][A-Za-z0-9_$]*$`.
///
/// Shared representation for both element [`Label`]s and
/// [`Token`]s (the spec gives both the identical lexical form).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ident(Arc<str>);

impl Ident {
    /// Validates `raw` against the label/token lexer and wraps it.
    ///
    /// Returns `None` when `raw` does not match
    /// `[A-Za-z_$][A-Za-z0-9_$]*`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_identifier(raw).then(|| Self(Arc::from(raw)))
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element display label. See [`Ident`].
pub type Label = Ident;
/// Quantity token name. See [`Ident`].
pub type Token = Ident;

/// Exactly the lexer from spec §6: `^[A-Za-z_$][A-Za-z0-9_$]*$`.
#[must_use]
pub fn is_valid_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Derives the default token for a node labeled `label`: `"<label>_token"`.
#[must_use]
pub fn default_token_for_label(label: &str) -> Ident {
    // `label` is already a validated Ident, and `_token` only appends
    // ASCII alnum/underscore characters, so the result is always valid.
    #[allow(clippy::unwrap_used)]
    Ident::parse(&format!("{label}_token")).unwrap()
}

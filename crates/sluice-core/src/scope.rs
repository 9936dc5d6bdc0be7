// SPDX-License-Identifier: Apache-2.0
//! Variable scope consulted by the expression evaluator.
//!
//! A [`Scope`] reads through to live graph state for labels the caller has
//! not overridden, and caches writes locally without ever mutating the
//! underlying graph. This lets `advance`/`maximumConvertable`/`swap` expose a
//! read-mostly view of the graph to guard/action expressions while keeping
//! evaluation side-effect free from the graph's point of view.
use std::collections::HashMap;

/// Variable context consulted by a [`crate::eval::NumericFn`]/[`crate::eval::BooleanFn`].
pub trait Scope {
    /// Reads the current value bound to `name`, if any.
    fn get(&self, name: &str) -> Option<f64>;

    /// Binds `name` to `value` in this scope's local write cache.
    fn set(&mut self, name: &str, value: f64);

    /// Returns `true` if `name` is bound, either by the write cache or by
    /// read-through to the underlying source.
    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns every currently bound name (write cache ∪ read-through keys).
    fn keys(&self) -> Vec<String>;
}

/// A [`Scope`] backed by a read-through source plus a local write cache.
///
/// The write cache shadows the source: once a name is `set`, subsequent
/// `get`s for that name return the cached value until the scope is dropped.
/// The source itself — e.g. a reservoir's `state` or an edge's `rate` — is
/// never mutated by evaluation.
pub struct CachingScope<'a> {
    source: &'a dyn Fn(&str) -> Option<f64>,
    source_keys: &'a [String],
    cache: HashMap<String, f64>,
}

impl<'a> CachingScope<'a> {
    /// Builds a scope over `source` (read-through) with `source_keys` naming
    /// every key `source` can answer (used for [`Scope::keys`]).
    #[must_use]
    pub fn new(source: &'a dyn Fn(&str) -> Option<f64>, source_keys: &'a [String]) -> Self {
        Self {
            source,
            source_keys,
            cache: HashMap::new(),
        }
    }
}

impl Scope for CachingScope<'_> {
    fn get(&self, name: &str) -> Option<f64> {
        self.cache.get(name).copied().or_else(|| (self.source)(name))
    }

    fn set(&mut self, name: &str, value: f64) {
        self.cache.insert(name.to_owned(), value);
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.source_keys.to_vec();
        for k in self.cache.keys() {
            if !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        keys
    }
}

//! Endpoint registry and name resolution.
//!
//! One map from endpoint name to [`Endpoint`]. Reads vastly outnumber
//! writes, so the map is never mutated in place: a registration copies the
//! current map, applies the change and swaps the new map in. A lookup loads
//! whichever map is current and never waits on a writer.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::endpoint::Endpoint;

/// The endpoint registry.
pub struct Router {
    endpoints: ArcSwap<HashMap<String, Endpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self { endpoints: ArcSwap::from_pointee(HashMap::new()) }
    }

    /// Registers endpoints by name. A later registration under an existing
    /// name replaces the earlier one.
    pub fn add_endpoints(&self, eps: impl IntoIterator<Item = Endpoint>) {
        let eps: Vec<Endpoint> = eps.into_iter().collect();
        if eps.is_empty() {
            return;
        }
        self.endpoints.rcu(|current| {
            let mut next = HashMap::clone(current);
            for ep in &eps {
                next.insert(ep.name().to_owned(), ep.clone());
            }
            next
        });
    }

    /// Removes endpoints by name. Unknown names are ignored.
    pub fn remove_endpoints<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        self.endpoints.rcu(|current| {
            let mut next = HashMap::clone(current);
            for name in &names {
                next.remove(name.as_ref());
            }
            next
        });
    }

    /// Resolves `name` to an endpoint.
    ///
    /// Exact match first. Failing that, a name with a leading `/` is retried
    /// once without it, so `"/users.get"` reaches an endpoint registered as
    /// `"users.get"`.
    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        let endpoints = self.endpoints.load();
        endpoints
            .get(name)
            .or_else(|| name.strip_prefix('/').and_then(|legacy| endpoints.get(legacy)))
            .cloned()
    }

    /// A snapshot of every registered endpoint, sorted by name.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let snapshot: Arc<HashMap<String, Endpoint>> = self.endpoints.load_full();
        let mut eps: Vec<Endpoint> = snapshot.values().cloned().collect();
        eps.sort_by(|a, b| a.name().cmp(b.name()));
        eps
    }

    pub fn len(&self) -> usize {
        self.endpoints.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

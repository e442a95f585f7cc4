//! Item-root index.
//!
//! Per (subdomain, item), the messages currently believed to be unsuperseded
//! writers of that item. This is a liveness optimisation used to pick
//! `supersedes` lists for new writes; it is maintained from causal precedence
//! only and is never ground truth for pruning.

use citadel_tangle::MsgId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Local (subdomain, item) → roots mapping.
#[derive(Debug, Default)]
pub struct ItemRoots {
    roots: HashMap<String, BTreeMap<String, BTreeSet<MsgId>>>,
}

impl ItemRoots {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current roots of one item.
    pub fn get(&self, subdomain: &str, item: &str) -> Option<&BTreeSet<MsgId>> {
        self.roots.get(subdomain)?.get(item)
    }

    /// Snapshot of every item with roots in a subdomain.
    pub fn get_all(&self, subdomain: &str) -> BTreeMap<String, Vec<MsgId>> {
        self.roots
            .get(subdomain)
            .map(|items| {
                items
                    .iter()
                    .map(|(item, ids)| (item.clone(), ids.iter().copied().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterate every root id in a subdomain (an id may repeat across items).
    pub fn ids<'a>(&'a self, subdomain: &str) -> impl Iterator<Item = &'a MsgId> + 'a {
        self.roots
            .get(subdomain)
            .into_iter()
            .flat_map(|items| items.values().flatten())
    }

    /// Add a root for an item.
    pub fn add(&mut self, subdomain: &str, item: &str, id: MsgId) {
        self.roots
            .entry(subdomain.to_string())
            .or_default()
            .entry(item.to_string())
            .or_default()
            .insert(id);
    }

    /// Remove a root for an item. Items left without roots are dropped.
    ///
    /// Returns false if the item had no roots at all.
    pub fn del(&mut self, subdomain: &str, item: &str, id: &MsgId) -> bool {
        let Some(items) = self.roots.get_mut(subdomain) else {
            return false;
        };
        let Some(ids) = items.get_mut(item) else {
            return false;
        };
        ids.remove(id);
        if ids.is_empty() {
            items.remove(item);
        }
        if items.is_empty() {
            self.roots.remove(subdomain);
        }
        true
    }
}

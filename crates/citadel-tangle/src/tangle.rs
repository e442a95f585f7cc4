//! In-memory tangle handle.
//!
//! A [`Tangle`] is a snapshot of the causal DAG rooted at one moot. It can be
//! grown incrementally with [`Tangle::add`] as messages arrive in any order;
//! depths come from the messages' own tangle links, so a message can be
//! placed before its predecessors are known.

use crate::id::MsgId;
use crate::msg::Msg;
use std::collections::{HashMap, HashSet, VecDeque};

/// Causal DAG of the messages sharing one moot.
#[derive(Debug, Clone)]
pub struct Tangle {
    /// Moot id.
    root: MsgId,
    /// Depth of every known message.
    depths: HashMap<MsgId, u32>,
    /// Direct predecessors of every known message.
    prev: HashMap<MsgId, Vec<MsgId>>,
    /// Largest known depth.
    max_depth: u32,
}

impl Tangle {
    /// Create an empty tangle rooted at `root`.
    pub fn new(root: MsgId) -> Self {
        Self {
            root,
            depths: HashMap::new(),
            prev: HashMap::new(),
            max_depth: 0,
        }
    }

    /// Add a message. Returns true if it was newly inserted.
    ///
    /// The root id only accepts a moot; every other id must carry links
    /// pointing at this root.
    pub fn add(&mut self, id: MsgId, msg: &Msg) -> bool {
        if self.depths.contains_key(&id) {
            return false;
        }
        if id == self.root {
            if msg.metadata.tangle.is_some() {
                return false;
            }
            self.depths.insert(id, 0);
            self.prev.insert(id, Vec::new());
            return true;
        }
        let Some(links) = &msg.metadata.tangle else {
            return false;
        };
        if links.root != self.root {
            return false;
        }
        self.depths.insert(id, links.depth);
        self.prev.insert(id, links.prev.clone());
        self.max_depth = self.max_depth.max(links.depth);
        true
    }

    /// Moot id.
    pub fn root(&self) -> MsgId {
        self.root
    }

    /// Number of known messages (including the moot, once seen).
    pub fn size(&self) -> usize {
        self.depths.len()
    }

    /// Check if no message is known.
    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    /// Check if a message is known.
    pub fn has(&self, id: &MsgId) -> bool {
        self.depths.contains_key(id)
    }

    /// Depth of a known message.
    pub fn depth(&self, id: &MsgId) -> Option<u32> {
        self.depths.get(id).copied()
    }

    /// Largest depth of any known message.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Deterministic topological order: ascending depth, ties broken by id.
    ///
    /// Every predecessor has a strictly smaller depth, so this is a valid
    /// topological order, and it depends only on the message set.
    pub fn topo_sort(&self) -> Vec<MsgId> {
        let mut ids: Vec<(u32, MsgId)> = self.depths.iter().map(|(id, d)| (*d, *id)).collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Whether `a` is a strict causal ancestor of `b`.
    ///
    /// `a` does not need to be known: it is enough that some known message
    /// reachable from `b` lists it as a predecessor.
    pub fn precedes(&self, a: &MsgId, b: &MsgId) -> bool {
        if a == b || !self.has(b) {
            return false;
        }
        if let (Some(da), Some(db)) = (self.depth(a), self.depth(b)) {
            if da >= db {
                return false;
            }
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*b]);
        while let Some(current) = queue.pop_front() {
            let Some(prev) = self.prev.get(&current) else {
                continue;
            };
            for p in prev {
                if p == a {
                    return true;
                }
                if visited.insert(*p) {
                    queue.push_back(*p);
                }
            }
        }
        false
    }

    /// Messages that no known message lists as a predecessor, sorted.
    pub fn tips(&self) -> Vec<MsgId> {
        let referenced: HashSet<&MsgId> = self.prev.values().flatten().collect();
        let mut tips: Vec<MsgId> = self
            .depths
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect();
        tips.sort_unstable();
        tips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::AccountId;
    use crate::msg::{moot_id, TangleLinks};
    use serde_json::json;

    fn account() -> AccountId {
        AccountId::new("alice")
    }

    fn child(root: MsgId, prev: Vec<MsgId>, depth: u32, author: &str) -> (MsgId, Msg) {
        let links = TangleLinks { root, prev, depth };
        let msg = Msg::linked(account(), "d", author, links, json!({ "n": depth }));
        (msg.id(), msg)
    }

    #[test]
    fn add_is_idempotent() {
        let moot = Msg::moot(account(), "d");
        let root = moot.id();
        let mut tangle = Tangle::new(root);
        assert!(tangle.add(root, &moot));
        assert!(!tangle.add(root, &moot));
        assert_eq!(tangle.size(), 1);
    }

    #[test]
    fn rejects_foreign_messages() {
        let root = moot_id(&account(), "d");
        let other = moot_id(&account(), "other");
        let mut tangle = Tangle::new(root);
        let (id, msg) = child(other, vec![other], 1, "laptop");
        assert!(!tangle.add(id, &msg));
        assert!(tangle.is_empty());
    }

    #[test]
    fn linear_chain_depths_and_order() {
        let moot = Msg::moot(account(), "d");
        let root = moot.id();
        let mut tangle = Tangle::new(root);
        tangle.add(root, &moot);
        let (a, ma) = child(root, vec![root], 1, "laptop");
        let (b, mb) = child(root, vec![a], 2, "laptop");
        tangle.add(b, &mb);
        tangle.add(a, &ma);

        assert_eq!(tangle.topo_sort(), vec![root, a, b]);
        assert_eq!(tangle.max_depth(), 2);
        assert_eq!(tangle.depth(&b), Some(2));
        assert_eq!(tangle.tips(), vec![b]);
    }

    #[test]
    fn precedes_follows_prev_links() {
        let moot = Msg::moot(account(), "d");
        let root = moot.id();
        let mut tangle = Tangle::new(root);
        tangle.add(root, &moot);
        let (a, ma) = child(root, vec![root], 1, "laptop");
        let (b, mb) = child(root, vec![root], 1, "phone");
        let (c, mc) = child(root, vec![a, b], 2, "laptop");
        for (id, msg) in [(a, &ma), (b, &mb), (c, &mc)] {
            tangle.add(id, msg);
        }

        assert!(tangle.precedes(&root, &c));
        assert!(tangle.precedes(&a, &c));
        assert!(tangle.precedes(&b, &c));
        assert!(!tangle.precedes(&a, &b));
        assert!(!tangle.precedes(&b, &a));
        assert!(!tangle.precedes(&c, &a));
        assert!(!tangle.precedes(&a, &a));
        assert_eq!(tangle.tips(), vec![c]);
    }

    #[test]
    fn precedes_unknown_ancestor_through_known_child() {
        let root = moot_id(&account(), "d");
        let mut tangle = Tangle::new(root);
        let (a, _) = child(root, vec![root], 1, "laptop");
        let (b, mb) = child(root, vec![a], 2, "laptop");
        tangle.add(b, &mb);
        assert!(tangle.precedes(&a, &b));
    }

    #[test]
    fn concurrent_siblings_tie_break_by_id() {
        let moot = Msg::moot(account(), "d");
        let root = moot.id();
        let mut tangle = Tangle::new(root);
        tangle.add(root, &moot);
        let (a, ma) = child(root, vec![root], 1, "laptop");
        let (b, mb) = child(root, vec![root], 1, "phone");
        tangle.add(b, &mb);
        tangle.add(a, &ma);
        let order = tangle.topo_sort();
        assert_eq!(order[0], root);
        assert_eq!(order[1], a.min(b));
        assert_eq!(order[2], a.max(b));
    }
}

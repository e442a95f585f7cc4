//! Pruning advisor.
//!
//! Decides which messages are safe to replace with ghosts. The frontier is
//! recomputed from the declared `supersedes` edges alone: a message is live
//! until some later message names it. The item-root index is deliberately
//! not consulted here; its predictions at authoring time are irrelevant.
//!
//! ```text
//! depth:  0     ...     min_ghost      ...      min_required  ...  max
//!         moot  [ kept ][ ghostable (ghost_span levels) ][ live frontier ]
//! ```

use crate::error::{Error, Result};
use crate::msg::{to_subdomain, SetMsg};
use citadel_tangle::{AccountId, MsgId, Tangle, TangleStore};
use std::collections::BTreeSet;

/// Resolve a Set tangle, checking its root is a Set moot of `owner`.
fn resolve<S: TangleStore + ?Sized>(store: &S, owner: &AccountId, tangle_id: &MsgId) -> Result<Tangle> {
    let unknown = |reason| Error::UnknownTangle { id: *tangle_id, reason };
    let tangle = store
        .get_tangle(tangle_id)
        .filter(|tangle| !tangle.is_empty())
        .ok_or_else(|| unknown("is locally unknown"))?;
    let root = store.get(&tangle.root()).ok_or_else(|| unknown("has no local moot"))?;
    let domain = root.metadata.domain.as_str();
    if to_subdomain(domain).is_none() {
        return Err(unknown("is not a Set moot"));
    }
    if !store.is_moot(&root, owner, domain) {
        return Err(unknown("is not a moot of the loaded account"));
    }
    Ok(tangle)
}

/// Messages of a tangle not superseded by any later message.
fn walk_frontier<S: TangleStore + ?Sized>(store: &S, owner: &AccountId, tangle: &Tangle) -> BTreeSet<MsgId> {
    let mut frontier = BTreeSet::new();
    for id in tangle.topo_sort() {
        let Some(msg) = store.get(&id) else {
            continue;
        };
        let Some(SetMsg::Update { update, .. }) = SetMsg::classify(store, &msg, owner) else {
            continue;
        };
        for superseded in &update.supersedes {
            frontier.remove(superseded);
        }
        frontier.insert(id);
    }
    frontier
}

/// The authoritative frontier of a Set tangle.
pub fn frontier<S: TangleStore + ?Sized>(store: &S, owner: &AccountId, tangle_id: &MsgId) -> Result<BTreeSet<MsgId>> {
    let tangle = resolve(store, owner, tangle_id)?;
    Ok(walk_frontier(store, owner, &tangle))
}

fn required_depth_of<S: TangleStore + ?Sized>(store: &S, owner: &AccountId, tangle: &Tangle) -> u32 {
    walk_frontier(store, owner, tangle)
        .iter()
        .filter_map(|id| tangle.depth(id))
        .min()
        .unwrap_or(0)
}

/// Minimum depth over the frontier. Messages at or above it must be kept.
///
/// A tangle holding only its moot has nothing live above depth 0.
pub fn min_required_depth<S: TangleStore + ?Sized>(store: &S, owner: &AccountId, tangle_id: &MsgId) -> Result<u32> {
    let tangle = resolve(store, owner, tangle_id)?;
    Ok(required_depth_of(store, owner, &tangle))
}

/// Lowest depth still inside the retained margin.
pub fn min_ghost_depth<S: TangleStore + ?Sized>(
    store: &S,
    owner: &AccountId,
    tangle_id: &MsgId,
    ghost_span: u32,
) -> Result<u32> {
    Ok(min_required_depth(store, owner, tangle_id)?.saturating_sub(ghost_span))
}

/// Whether `msg_id` may be replaced by a ghost.
///
/// True only for messages strictly below the live frontier but within
/// `ghost_span` levels of it. The moot is never ghostable; messages outside
/// the tangle are not either.
pub fn is_ghostable<S: TangleStore + ?Sized>(
    store: &S,
    owner: &AccountId,
    msg_id: &MsgId,
    tangle_id: &MsgId,
    ghost_span: u32,
) -> Result<bool> {
    if msg_id == tangle_id {
        return Ok(false);
    }
    if store.get(msg_id).is_none() {
        return Err(Error::UnknownMessage(*msg_id));
    }
    let tangle = resolve(store, owner, tangle_id)?;
    let Some(depth) = tangle.depth(msg_id) else {
        return Ok(false);
    };
    let required = required_depth_of(store, owner, &tangle);
    let min_ghost = required.saturating_sub(ghost_span);
    Ok(min_ghost <= depth && depth < required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{to_domain, SetUpdate};
    use citadel_tangle::{moot_id, MemoryStore};

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn append(store: &MemoryStore, add: &[&str], supersedes: Vec<MsgId>) -> MsgId {
        let update = SetUpdate {
            add: add.iter().map(|s| s.to_string()).collect(),
            del: Vec::new(),
            supersedes,
        };
        let rec = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(store.append(&alice(), &to_domain("follows"), update.to_value()))
            .unwrap();
        rec.id
    }

    #[test]
    fn frontier_follows_supersedes_only() {
        let store = MemoryStore::new("laptop");
        let a = append(&store, &["a"], vec![]);
        let b = append(&store, &["b"], vec![]);
        let c = append(&store, &["a"], vec![a]);
        let root = moot_id(&alice(), &to_domain("follows"));

        assert_eq!(frontier(&store, &alice(), &root).unwrap(), BTreeSet::from([b, c]));
        assert_eq!(min_required_depth(&store, &alice(), &root).unwrap(), 2);
    }

    #[test]
    fn required_depth_grows_without_supersedes() {
        let store = MemoryStore::new("laptop");
        let root = moot_id(&alice(), &to_domain("follows"));
        let a = append(&store, &["a"], vec![]);
        assert_eq!(min_required_depth(&store, &alice(), &root).unwrap(), 1);
        append(&store, &["b"], vec![]);
        assert_eq!(min_required_depth(&store, &alice(), &root).unwrap(), 1);
        append(&store, &["a", "b"], vec![a]);
        assert_eq!(min_required_depth(&store, &alice(), &root).unwrap(), 2);
    }

    #[test]
    fn ghost_window() {
        let store = MemoryStore::new("laptop");
        let mut ids = Vec::new();
        for n in 0..6 {
            let item = format!("item{n}");
            let supersedes = ids.last().copied().into_iter().collect();
            ids.push(append(&store, &[item.as_str()], supersedes));
        }
        let root = moot_id(&alice(), &to_domain("follows"));
        // Frontier is the last message at depth 6.
        assert_eq!(min_required_depth(&store, &alice(), &root).unwrap(), 6);
        assert_eq!(min_ghost_depth(&store, &alice(), &root, 2).unwrap(), 4);

        let ghostable: Vec<bool> = ids
            .iter()
            .map(|id| is_ghostable(&store, &alice(), id, &root, 2).unwrap())
            .collect();
        assert_eq!(ghostable, vec![false, false, false, true, true, false]);
        assert!(!is_ghostable(&store, &alice(), &root, &root, 2).unwrap());
    }

    #[test]
    fn min_ghost_depth_saturates() {
        let store = MemoryStore::new("laptop");
        append(&store, &["a"], vec![]);
        let root = moot_id(&alice(), &to_domain("follows"));
        assert_eq!(min_ghost_depth(&store, &alice(), &root, 32).unwrap(), 0);
    }

    #[test]
    fn unknown_tangle_and_message() {
        let store = MemoryStore::new("laptop");
        let root = moot_id(&alice(), &to_domain("follows"));
        assert!(matches!(
            min_required_depth(&store, &alice(), &root),
            Err(Error::UnknownTangle { .. })
        ));

        let a = append(&store, &["a"], vec![]);
        let missing = MsgId::new([9; 32]);
        assert!(matches!(
            is_ghostable(&store, &alice(), &missing, &root, 4),
            Err(Error::UnknownMessage(id)) if id == missing
        ));
        assert!(matches!(
            min_required_depth(&store, &alice(), &a),
            Err(Error::UnknownTangle { .. })
        ));
    }

    #[test]
    fn rejects_foreign_and_non_set_tangles() {
        let store = MemoryStore::new("laptop");
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(store.append(&alice(), "dict_v1__profile", serde_json::json!({})))
            .unwrap();
        let dict_root = moot_id(&alice(), "dict_v1__profile");
        assert!(matches!(
            min_required_depth(&store, &alice(), &dict_root),
            Err(Error::UnknownTangle { reason: "is not a Set moot", .. })
        ));

        append(&store, &["a"], vec![]);
        let root = moot_id(&alice(), &to_domain("follows"));
        assert!(matches!(
            min_required_depth(&store, &AccountId::new("bob"), &root),
            Err(Error::UnknownTangle { .. })
        ));
    }
}

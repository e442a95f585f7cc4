//! Set materialisation by deterministic replay.

use crate::msg::{to_domain, SetMsg, SetUpdate};
use citadel_tangle::{AccountId, TangleStore};
use std::collections::BTreeSet;

/// Current value of `owner`'s `subdomain` Set.
///
/// Replays every well-formed update of the tangle in the store's fixed
/// topological order. Unknown or empty tangles yield the empty set.
pub fn read_set<S: TangleStore + ?Sized>(store: &S, owner: &AccountId, subdomain: &str) -> BTreeSet<String> {
    let root = store.moot_id(owner, &to_domain(subdomain));
    let Some(tangle) = store.get_tangle(&root) else {
        return BTreeSet::new();
    };
    let updates: Vec<SetUpdate> = tangle
        .topo_sort()
        .into_iter()
        .filter_map(|id| store.get(&id))
        .filter_map(|msg| match SetMsg::classify(store, &msg, owner) {
            Some(SetMsg::Update { subdomain: s, update }) if s == subdomain => Some(update),
            _ => None,
        })
        .collect();
    replay(&updates)
}

/// Fold updates left to right: each applies its `add` items, then its `del`
/// items. For a given item the last writer in sequence wins.
pub fn replay<'a>(updates: impl IntoIterator<Item = &'a SetUpdate>) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for update in updates {
        for value in &update.add {
            set.insert(value.clone());
        }
        for value in &update.del {
            set.remove(value);
        }
    }
    set
}

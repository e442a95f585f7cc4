//! Message learner.
//!
//! Ingests the owner's messages in any order, keeping one tangle handle per
//! subdomain and the [`ItemRoots`] index up to date. Ingestion is idempotent:
//! a message already present in its tangle handle is ignored.

use crate::error::{Error, Result};
use crate::item_roots::ItemRoots;
use crate::msg::{to_domain, to_subdomain, SetMsg, SetUpdate};
use citadel_tangle::{moot_id, AccountId, Msg, MsgId, Tangle, TangleStore};
use std::collections::HashMap;
use tracing::debug;

/// Derived local state for one owner.
#[derive(Debug)]
pub struct Learner {
    owner: AccountId,
    tangles: HashMap<String, Tangle>,
    item_roots: ItemRoots,
}

impl Learner {
    /// Create empty state for `owner`.
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            tangles: HashMap::new(),
            item_roots: ItemRoots::new(),
        }
    }

    /// The owner whose messages are learned.
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// The item-root index.
    pub fn item_roots(&self) -> &ItemRoots {
        &self.item_roots
    }

    /// Mutable access for the write path's fast-path cleanup.
    pub fn item_roots_mut(&mut self) -> &mut ItemRoots {
        &mut self.item_roots
    }

    /// Tangle handle of a subdomain, if any message of it was learned.
    pub fn tangle(&self, subdomain: &str) -> Option<&Tangle> {
        self.tangles.get(subdomain)
    }

    /// Learn one message. Returns true if local state changed.
    ///
    /// Messages of other owners or domain families are ignored.
    pub fn ingest<S: TangleStore + ?Sized>(&mut self, store: &S, id: MsgId, msg: &Msg) -> Result<bool> {
        match SetMsg::classify(store, msg, &self.owner) {
            None => Ok(self.keep_links(id, msg)),
            Some(SetMsg::Moot { subdomain }) => {
                let added = self.tangle_mut(&subdomain).add(id, msg);
                if added {
                    debug!("Learned Set moot {} for \"{}\"", id, subdomain);
                }
                Ok(added)
            }
            Some(SetMsg::Update { subdomain, update }) => self.learn_update(&subdomain, id, msg, &update),
        }
    }

    /// Malformed updates in an owned Set tangle still carry causal links.
    fn keep_links(&mut self, id: MsgId, msg: &Msg) -> bool {
        if msg.metadata.account != self.owner || msg.metadata.tangle.is_none() {
            return false;
        }
        let Some(subdomain) = to_subdomain(&msg.metadata.domain) else {
            return false;
        };
        let added = self.tangle_mut(subdomain).add(id, msg);
        if added {
            debug!("Kept links of malformed Set message {}", id);
        }
        false
    }

    fn tangle_mut(&mut self, subdomain: &str) -> &mut Tangle {
        let owner = &self.owner;
        self.tangles
            .entry(subdomain.to_string())
            .or_insert_with(|| Tangle::new(moot_id(owner, &to_domain(subdomain))))
    }

    fn learn_update(&mut self, subdomain: &str, id: MsgId, msg: &Msg, update: &SetUpdate) -> Result<bool> {
        let owner = &self.owner;
        let tangle = self
            .tangles
            .entry(subdomain.to_string())
            .or_insert_with(|| Tangle::new(moot_id(owner, &to_domain(subdomain))));
        if tangle.has(&id) {
            return Ok(false);
        }
        if !tangle.add(id, msg) {
            return Err(Error::Ingest {
                id,
                reason: format!("not linked into the \"{subdomain}\" tangle {}", tangle.root()),
            });
        }

        for item in update.touched() {
            let current: Vec<MsgId> = self
                .item_roots
                .get(subdomain, item)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            if current.is_empty() {
                self.item_roots.add(subdomain, item, id);
                continue;
            }
            for root in current {
                if tangle.precedes(&root, &id) {
                    self.item_roots.del(subdomain, item, &root);
                }
                self.item_roots.add(subdomain, item, id);
            }
        }

        debug!(
            "Learned Set update {} for \"{}\" (+{} -{} supersedes {})",
            id,
            subdomain,
            update.add.len(),
            update.del.len(),
            update.supersedes.len()
        );
        Ok(true)
    }
}

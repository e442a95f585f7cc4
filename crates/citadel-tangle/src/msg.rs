//! Log messages and content addressing.
//!
//! Every message belongs to exactly one tangle, identified by the id of its
//! moot: the zero-payload root message for an (account, domain) pair. A moot
//! carries no author and no tangle links, so its id is a pure function of the
//! account and domain and any replica can compute it without having seen it.

use crate::id::{AccountId, MsgId};
use serde::{Deserialize, Serialize};

/// Causal links of a non-moot message inside its tangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TangleLinks {
    /// Id of the tangle's moot.
    pub root: MsgId,
    /// Direct predecessors (the tangle tips seen by the author).
    pub prev: Vec<MsgId>,
    /// Longest path length from the moot.
    pub depth: u32,
}

/// Message metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Owner of the tangle.
    pub account: AccountId,
    /// Application domain of the tangle.
    pub domain: String,
    /// Writing device. `None` for moots.
    #[serde(default)]
    pub author: Option<String>,
    /// Tangle links. `None` for moots.
    #[serde(default)]
    pub tangle: Option<TangleLinks>,
}

/// An immutable message in an account's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    /// Message metadata.
    pub metadata: Metadata,
    /// Application payload. `None` for moots.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Msg {
    /// Build the moot for an (account, domain) pair.
    pub fn moot(account: AccountId, domain: impl Into<String>) -> Self {
        Self {
            metadata: Metadata {
                account,
                domain: domain.into(),
                author: None,
                tangle: None,
            },
            data: None,
        }
    }

    /// Build a message linked into an existing tangle.
    pub fn linked(
        account: AccountId,
        domain: impl Into<String>,
        author: impl Into<String>,
        links: TangleLinks,
        data: serde_json::Value,
    ) -> Self {
        Self {
            metadata: Metadata {
                account,
                domain: domain.into(),
                author: Some(author.into()),
                tangle: Some(links),
            },
            data: Some(data),
        }
    }

    /// Content address of this message.
    pub fn id(&self) -> MsgId {
        let mut hasher = blake3::Hasher::new();
        put(&mut hasher, self.metadata.account.as_str().as_bytes());
        put(&mut hasher, self.metadata.domain.as_bytes());
        match &self.metadata.author {
            Some(author) => {
                hasher.update(&[1]);
                put(&mut hasher, author.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        match &self.metadata.tangle {
            Some(links) => {
                hasher.update(&[1]);
                hasher.update(links.root.bytes());
                hasher.update(&(links.prev.len() as u64).to_be_bytes());
                for prev in &links.prev {
                    hasher.update(prev.bytes());
                }
                hasher.update(&links.depth.to_be_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        match &self.data {
            Some(data) => {
                hasher.update(&[1]);
                put(&mut hasher, data.to_string().as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        MsgId::from(hasher.finalize())
    }

    /// Moot predicate: a payload-free, link-free message for exactly this
    /// account and domain.
    pub fn is_moot(&self, account: &AccountId, domain: &str) -> bool {
        self.data.is_none()
            && self.metadata.tangle.is_none()
            && self.metadata.author.is_none()
            && &self.metadata.account == account
            && self.metadata.domain == domain
    }

    /// Depth of this message in its tangle (moots are at depth 0).
    pub fn depth(&self) -> u32 {
        self.metadata.tangle.as_ref().map_or(0, |links| links.depth)
    }
}

/// Deterministic moot id for an (account, domain) pair.
pub fn moot_id(account: &AccountId, domain: &str) -> MsgId {
    Msg::moot(account.clone(), domain).id()
}

/// A message together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Content address.
    pub id: MsgId,
    /// The message.
    pub msg: Msg,
}

impl Record {
    /// Wrap a message, computing its id.
    pub fn new(msg: Msg) -> Self {
        Self { id: msg.id(), msg }
    }
}

/// Length-prefixed write so adjacent fields cannot alias.
fn put(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    #[test]
    fn moot_id_is_deterministic() {
        assert_eq!(moot_id(&alice(), "set_v1__follows"), moot_id(&alice(), "set_v1__follows"));
        assert_ne!(moot_id(&alice(), "set_v1__follows"), moot_id(&alice(), "set_v1__blocks"));
        assert_ne!(
            moot_id(&alice(), "set_v1__follows"),
            moot_id(&AccountId::new("bob"), "set_v1__follows")
        );
    }

    #[test]
    fn moot_predicate() {
        let moot = Msg::moot(alice(), "set_v1__follows");
        assert!(moot.is_moot(&alice(), "set_v1__follows"));
        assert!(!moot.is_moot(&alice(), "set_v1__blocks"));
        assert!(!moot.is_moot(&AccountId::new("bob"), "set_v1__follows"));
    }

    #[test]
    fn linked_msg_is_not_moot() {
        let root = moot_id(&alice(), "d");
        let links = TangleLinks { root, prev: vec![root], depth: 1 };
        let msg = Msg::linked(alice(), "d", "laptop", links, json!({}));
        assert!(!msg.is_moot(&alice(), "d"));
        assert_eq!(msg.depth(), 1);
    }

    #[test]
    fn moot_id_hashes_field_encoding() {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&5u64.to_be_bytes());
        hasher.update(b"alice");
        hasher.update(&1u64.to_be_bytes());
        hasher.update(b"d");
        hasher.update(&[0, 0, 0]);
        assert_eq!(moot_id(&alice(), "d"), MsgId::from(hasher.finalize()));
    }

    #[test]
    fn author_changes_id() {
        let root = moot_id(&alice(), "d");
        let links = TangleLinks { root, prev: vec![root], depth: 1 };
        let a = Msg::linked(alice(), "d", "laptop", links.clone(), json!({"x": 1}));
        let b = Msg::linked(alice(), "d", "phone", links, json!({"x": 1}));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn json_roundtrip_preserves_id() {
        let root = moot_id(&alice(), "d");
        let links = TangleLinks { root, prev: vec![root], depth: 1 };
        let msg = Msg::linked(alice(), "d", "laptop", links, json!({"add": ["a"]}));
        let json = serde_json::to_string(&msg).unwrap();
        let back: Msg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), msg.id());
    }
}

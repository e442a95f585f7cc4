//! Tangle store interface and the in-memory implementation.

use crate::error::{Result, StoreError};
use crate::id::{AccountId, MsgId};
use crate::msg::{moot_id, Msg, Record, TangleLinks};
use crate::tangle::Tangle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Capacity of the insertion notification channel.
const NOTIFY_CAPACITY: usize = 1024;

/// Append-only, content-addressed message log organised into tangles.
#[async_trait]
pub trait TangleStore: Send + Sync {
    /// Append a new message with `data` to the (account, domain) tangle,
    /// creating the tangle's moot first if it does not exist yet.
    async fn append(
        &self,
        account: &AccountId,
        domain: &str,
        data: serde_json::Value,
    ) -> Result<Record>;

    /// Get a message by id.
    fn get(&self, id: &MsgId) -> Option<Msg>;

    /// Snapshot of the tangle rooted at `root`, if any message of it is known.
    fn get_tangle(&self, root: &MsgId) -> Option<Tangle>;

    /// All known messages, in insertion order.
    fn records(&self) -> Vec<Record>;

    /// Subscribe to future insertions. Dropping the receiver cancels.
    fn subscribe(&self) -> broadcast::Receiver<Record>;

    /// Deterministic moot id for an (account, domain) pair.
    fn moot_id(&self, account: &AccountId, domain: &str) -> MsgId {
        moot_id(account, domain)
    }

    /// Moot predicate.
    fn is_moot(&self, msg: &Msg, account: &AccountId, domain: &str) -> bool {
        msg.is_moot(account, domain)
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Record>,
    index: HashMap<MsgId, usize>,
    tangles: HashMap<MsgId, Tangle>,
}

impl Inner {
    /// Insert a record. Returns it back if it was new.
    fn insert(&mut self, id: MsgId, msg: Msg) -> Option<Record> {
        if self.index.contains_key(&id) {
            return None;
        }
        let root = msg.metadata.tangle.as_ref().map_or(id, |links| links.root);
        self.tangles
            .entry(root)
            .or_insert_with(|| Tangle::new(root))
            .add(id, &msg);
        let record = Record { id, msg };
        self.index.insert(id, self.records.len());
        self.records.push(record.clone());
        Some(record)
    }
}

/// In-memory [`TangleStore`] for one writing device.
///
/// Appends link to the current tips of the tangle. Messages authored by other
/// devices are brought in with [`MemoryStore::insert`].
#[derive(Debug)]
pub struct MemoryStore {
    author: String,
    inner: Mutex<Inner>,
    notify: broadcast::Sender<Record>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store writing as `author`.
    pub fn new(author: impl Into<String>) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            author: author.into(),
            inner: Mutex::new(Inner::default()),
            notify,
            read_only: AtomicBool::new(false),
        }
    }

    /// Writing device name.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Make appends fail (or succeed again).
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Insert a message replicated from elsewhere.
    ///
    /// Idempotent: subscribers are only notified the first time.
    pub fn insert(&self, msg: Msg) -> Result<MsgId> {
        let id = msg.id();
        match (&msg.metadata.tangle, &msg.data) {
            (None, Some(_)) => return Err(StoreError::MissingTangle(id)),
            (Some(links), _) => {
                let expected = moot_id(&msg.metadata.account, &msg.metadata.domain);
                if links.root != expected {
                    return Err(StoreError::ForeignTangle {
                        id,
                        root: links.root,
                        expected,
                    });
                }
            }
            (None, None) => {}
        }
        let inserted = self.lock().insert(id, msg);
        if let Some(record) = inserted {
            trace!("Inserted replicated message {}", id);
            self.publish(record);
        }
        Ok(id)
    }

    fn publish(&self, record: Record) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.notify.send(record);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TangleStore for MemoryStore {
    async fn append(
        &self,
        account: &AccountId,
        domain: &str,
        data: serde_json::Value,
    ) -> Result<Record> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly);
        }

        let mut inserted = Vec::with_capacity(2);
        let record = {
            let mut inner = self.lock();
            let root = moot_id(account, domain);
            if !inner.index.contains_key(&root) {
                let moot = Msg::moot(account.clone(), domain);
                inserted.extend(inner.insert(root, moot));
                debug!("Created moot {} for domain {}", root, domain);
            }

            let tangle = inner
                .tangles
                .get(&root)
                .cloned()
                .unwrap_or_else(|| Tangle::new(root));
            let prev = tangle.tips();
            let depth = prev
                .iter()
                .filter_map(|id| tangle.depth(id))
                .max()
                .map_or(1, |d| d + 1);
            let links = TangleLinks { root, prev, depth };
            let msg = Msg::linked(account.clone(), domain, self.author.clone(), links, data);
            let record = Record::new(msg);
            inserted.extend(inner.insert(record.id, record.msg.clone()));
            record
        };

        for rec in inserted {
            self.publish(rec);
        }
        trace!("Appended {} at depth {}", record.id, record.msg.depth());
        Ok(record)
    }

    fn get(&self, id: &MsgId) -> Option<Msg> {
        let inner = self.lock();
        inner.index.get(id).map(|&i| inner.records[i].msg.clone())
    }

    fn get_tangle(&self, root: &MsgId) -> Option<Tangle> {
        self.lock()
            .tangles
            .get(root)
            .filter(|tangle| !tangle.is_empty())
            .cloned()
    }

    fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Record> {
        self.notify.subscribe()
    }
}

//! The replicated Set engine.
//!
//! One engine serves one owning account. Local state (tangle handles and the
//! item-root index) is built by a one-time bootstrap scan of the store and
//! then kept current by a live subscription task. Writes go through a
//! per-subdomain queue so each one sees the result of the previous one.

use crate::config::{validate_ghost_span, SetConfig};
use crate::error::{Error, Result, WriteOp};
use crate::event::{SetEvent, SetEventKind};
use crate::ghost;
use crate::item_roots::ItemRoots;
use crate::learner::Learner;
use crate::materialize::read_set;
use crate::msg::{to_domain, SetUpdate};
use citadel_tangle::{AccountId, MsgId, Record, TangleStore};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the mutation event channel.
const EVENT_CAPACITY: usize = 256;

/// Single-item mutation requested by `add`/`del`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Add,
    Del,
}

impl Edit {
    fn op(self) -> WriteOp {
        match self {
            Edit::Add => WriteOp::Add,
            Edit::Del => WriteOp::Del,
        }
    }
}

/// Handle of the live ingestion task; aborts it when dropped.
#[derive(Debug, Default)]
struct LiveIngestion(OnceLock<JoinHandle<()>>);

impl LiveIngestion {
    fn start(&self, handle: JoinHandle<()>) {
        if let Err(duplicate) = self.0.set(handle) {
            duplicate.abort();
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.0.get() {
            handle.abort();
        }
    }
}

impl Drop for LiveIngestion {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Replicated Set engine for one account.
pub struct SetEngine<S> {
    store: Arc<S>,
    owner: AccountId,
    ghost_span: AtomicU32,
    state: Arc<RwLock<Learner>>,
    load_started: AtomicBool,
    loaded: OnceCell<()>,
    live: LiveIngestion,
    write_queues: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    events: broadcast::Sender<SetEvent>,
}

impl<S: TangleStore + 'static> SetEngine<S> {
    /// Create an engine for `owner`. Nothing is read until [`load`](Self::load).
    pub fn new(store: Arc<S>, owner: AccountId, config: SetConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            store,
            state: Arc::new(RwLock::new(Learner::new(owner.clone()))),
            owner,
            ghost_span: AtomicU32::new(config.ghost_span),
            load_started: AtomicBool::new(false),
            loaded: OnceCell::new(),
            live: LiveIngestion::default(),
            write_queues: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// The owning account.
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Load local state for `account`.
    ///
    /// Concurrent and repeated calls for the owner share one bootstrap. Any
    /// other account is an ownership error.
    pub async fn load(&self, account: &AccountId) -> Result<()> {
        if account != &self.owner {
            return Err(Error::Ownership {
                loaded: self.owner.clone(),
                requested: account.clone(),
            });
        }
        self.load_started.store(true, Ordering::SeqCst);
        self.loaded.get_or_init(|| self.bootstrap()).await;
        Ok(())
    }

    /// Whether the bootstrap has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Cancel live ingestion. Local state stops following the store.
    pub fn close(&self) {
        self.live.cancel();
        debug!("Live ingestion for {} cancelled", self.owner);
    }

    /// Subscribe to `add`/`del` notifications.
    pub fn watch(&self) -> broadcast::Receiver<SetEvent> {
        self.events.subscribe()
    }

    /// Namespaced domain of a subdomain.
    pub fn domain(&self, subdomain: &str) -> String {
        to_domain(subdomain)
    }

    /// Tangle id (moot id) of the owner's subdomain.
    pub fn feed_id(&self, subdomain: &str) -> MsgId {
        self.store.moot_id(&self.owner, &to_domain(subdomain))
    }

    // --- Queries ---

    /// Whether `value` is in the Set. Reads another account's Set if given.
    pub fn has(&self, subdomain: &str, value: &str, account: Option<&AccountId>) -> Result<bool> {
        Ok(self.values(subdomain, account)?.contains(value))
    }

    /// Current items of the Set. Reads another account's Set if given.
    pub fn values(&self, subdomain: &str, account: Option<&AccountId>) -> Result<BTreeSet<String>> {
        self.require_loaded()?;
        Ok(read_set(&*self.store, account.unwrap_or(&self.owner), subdomain))
    }

    /// Snapshot of the item-root index for a subdomain.
    pub async fn item_roots(&self, subdomain: &str) -> Result<BTreeMap<String, Vec<MsgId>>> {
        self.require_loaded()?;
        Ok(self.state.read().await.item_roots().get_all(subdomain))
    }

    /// Estimated depth a squeeze would reclaim: tangle max depth minus the
    /// shallowest current item root. Zero when nothing is known.
    pub async fn squeeze_potential(&self, subdomain: &str) -> Result<u32> {
        self.require_loaded()?;
        let state = self.state.read().await;
        Ok(self.potential(subdomain, state.item_roots()))
    }

    // --- Writes ---

    /// Add `value`. Returns false if it was already present.
    pub async fn add(&self, subdomain: &str, value: &str) -> Result<bool> {
        self.write(subdomain, value, Edit::Add).await
    }

    /// Delete `value`. Returns false if it was not present.
    pub async fn del(&self, subdomain: &str, value: &str) -> Result<bool> {
        self.write(subdomain, value, Edit::Del).await
    }

    /// Append a checkpoint superseding every current item root.
    ///
    /// Returns false when the squeeze potential is below 1.
    pub async fn squeeze(&self, subdomain: &str) -> Result<bool> {
        self.ensure_loaded().await?;
        let queue = self.write_queue(subdomain).await;
        let _turn = queue.lock().await;

        let current = read_set(&*self.store, &self.owner, subdomain);
        let (supersedes, tombstoned) = {
            let state = self.state.read().await;
            let potential = self.potential(subdomain, state.item_roots());
            if potential < 1 {
                debug!("Squeeze of \"{}\" skipped, potential {}", subdomain, potential);
                return Ok(false);
            }
            let mut supersedes = BTreeSet::new();
            let mut tombstoned = Vec::new();
            for (item, ids) in state.item_roots().get_all(subdomain) {
                for id in ids {
                    supersedes.insert(id);
                    if !current.contains(&item) {
                        tombstoned.push((id, item.clone()));
                    }
                }
            }
            (supersedes, tombstoned)
        };
        let update = SetUpdate {
            add: current.into_iter().collect(),
            del: Vec::new(),
            supersedes: supersedes.into_iter().collect(),
        };

        let record = self.append(subdomain, WriteOp::Squeeze, &update).await?;
        {
            let mut state = self.state.write().await;
            learn(&mut state, &*self.store, &record);
            // Learning only touches items in `add`; tombstones are cleared here.
            drop_swept(&mut state, subdomain, &tombstoned);
        }
        info!(
            "Squeezed Set \"{}\" into {} ({} items, {} roots superseded)",
            subdomain,
            record.id,
            update.add.len(),
            update.supersedes.len()
        );
        Ok(true)
    }

    // --- Ghosting ---

    /// Retained depth margin below the live frontier.
    pub fn ghost_span(&self) -> u32 {
        self.ghost_span.load(Ordering::SeqCst)
    }

    /// Change the retained margin. Must be at least 1.
    pub fn set_ghost_span(&self, span: u32) -> Result<()> {
        validate_ghost_span(span)?;
        self.ghost_span.store(span, Ordering::SeqCst);
        Ok(())
    }

    /// Minimum depth over the `supersedes`-derived frontier of a tangle.
    pub fn min_required_depth(&self, tangle_id: &MsgId) -> Result<u32> {
        ghost::min_required_depth(&*self.store, &self.owner, tangle_id)
    }

    /// Lowest depth inside the retained margin.
    pub fn min_ghost_depth(&self, tangle_id: &MsgId) -> Result<u32> {
        ghost::min_ghost_depth(&*self.store, &self.owner, tangle_id, self.ghost_span())
    }

    /// Whether a message may be replaced by a ghost.
    pub fn is_ghostable(&self, msg_id: &MsgId, tangle_id: &MsgId) -> Result<bool> {
        ghost::is_ghostable(&*self.store, &self.owner, msg_id, tangle_id, self.ghost_span())
    }

    // --- Internals ---

    fn require_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(Error::NotLoaded)
        }
    }

    /// Wait for an in-flight load; fail if none was ever started.
    async fn ensure_loaded(&self) -> Result<()> {
        if !self.load_started.load(Ordering::SeqCst) {
            return Err(Error::NotLoaded);
        }
        self.loaded.get_or_init(|| self.bootstrap()).await;
        Ok(())
    }

    async fn bootstrap(&self) {
        // Subscribe before scanning so nothing slips between the two; anything
        // seen twice is ignored by the learner.
        let live = self.store.subscribe();

        let records = self.store.records();
        {
            let mut state = self.state.write().await;
            for rec in &records {
                if let Err(e) = state.ingest(&*self.store, rec.id, &rec.msg) {
                    warn!("Skipping message during load: {}", e);
                }
            }
        }
        info!("Set loaded for {} ({} records scanned)", self.owner, records.len());

        let handle = tokio::spawn(ingest_live(Arc::clone(&self.store), Arc::clone(&self.state), live));
        self.live.start(handle);
    }

    async fn write_queue(&self, subdomain: &str) -> Arc<Mutex<()>> {
        let mut queues = self.write_queues.lock().await;
        Arc::clone(queues.entry(subdomain.to_string()).or_default())
    }

    fn potential(&self, subdomain: &str, roots: &ItemRoots) -> u32 {
        let root = self.feed_id(subdomain);
        let Some(tangle) = self.store.get_tangle(&root) else {
            return 0;
        };
        roots
            .ids(subdomain)
            .filter_map(|id| tangle.depth(id))
            .min()
            .map_or(0, |min| tangle.max_depth().saturating_sub(min))
    }

    async fn write(&self, subdomain: &str, value: &str, edit: Edit) -> Result<bool> {
        self.ensure_loaded().await?;
        let queue = self.write_queue(subdomain).await;
        let _turn = queue.lock().await;

        let current = read_set(&*self.store, &self.owner, subdomain);
        let present = current.contains(value);
        if (edit == Edit::Add) == present {
            debug!("Set \"{}\" unchanged by {:?} of \"{}\"", subdomain, edit, value);
            return Ok(false);
        }

        let (supersedes, swept) = {
            let state = self.state.read().await;
            sweep(state.item_roots(), subdomain, value, &current)
        };
        let update = match edit {
            Edit::Add => SetUpdate {
                add: vec![value.to_string()],
                del: Vec::new(),
                supersedes,
            },
            Edit::Del => SetUpdate {
                add: Vec::new(),
                del: vec![value.to_string()],
                supersedes,
            },
        };

        let record = self.append(subdomain, edit.op(), &update).await?;
        {
            let mut state = self.state.write().await;
            learn(&mut state, &*self.store, &record);
            // Deletes leave swept roots for ingestion to settle.
            if edit == Edit::Add {
                drop_swept(&mut state, subdomain, &swept);
            }
        }
        info!(
            "Appended {} to Set \"{}\": {:?} \"{}\" superseding {}",
            record.id,
            subdomain,
            edit,
            value,
            update.supersedes.len()
        );

        let event = match edit {
            Edit::Add => SetEventKind::Add,
            Edit::Del => SetEventKind::Del,
        };
        // No watchers is fine.
        let _ = self.events.send(SetEvent {
            event,
            subdomain: subdomain.to_string(),
            value: value.to_string(),
        });
        Ok(true)
    }

    async fn append(&self, subdomain: &str, op: WriteOp, update: &SetUpdate) -> Result<Record> {
        self.store
            .append(&self.owner, &to_domain(subdomain), update.to_value())
            .await
            .map_err(|source| Error::Write {
                subdomain: subdomain.to_string(),
                op,
                source,
            })
    }

}

/// Roots a new write to `value` supersedes: those of `value` itself and of
/// every tombstoned item. Also returns the (root, item) pairs swept.
fn sweep(
    roots: &ItemRoots,
    subdomain: &str,
    value: &str,
    current: &BTreeSet<String>,
) -> (Vec<MsgId>, Vec<(MsgId, String)>) {
    let mut supersedes = BTreeSet::new();
    let mut swept = Vec::new();
    for (item, ids) in roots.get_all(subdomain) {
        if item == value || !current.contains(&item) {
            for id in ids {
                supersedes.insert(id);
                swept.push((id, item.clone()));
            }
        }
    }
    (supersedes.into_iter().collect(), swept)
}

/// Remove roots a just-learned write has superseded.
fn drop_swept(state: &mut Learner, subdomain: &str, swept: &[(MsgId, String)]) {
    for (id, item) in swept {
        state.item_roots_mut().del(subdomain, item, id);
    }
}

fn learn<S: TangleStore + ?Sized>(state: &mut Learner, store: &S, record: &Record) {
    if let Err(e) = state.ingest(store, record.id, &record.msg) {
        error!("Failed to learn message: {}", e);
    }
}

/// Feed store insertions into the learner until cancelled.
async fn ingest_live<S: TangleStore + ?Sized>(
    store: Arc<S>,
    state: Arc<RwLock<Learner>>,
    mut live: broadcast::Receiver<Record>,
) {
    loop {
        match live.recv().await {
            Ok(record) => {
                let mut state = state.write().await;
                learn(&mut state, &*store, &record);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Live ingestion lagged by {} messages, rescanning store", skipped);
                let records = store.records();
                let mut state = state.write().await;
                for record in &records {
                    learn(&mut state, &*store, record);
                }
            }
            Err(RecvError::Closed) => {
                debug!("Store notifications closed, live ingestion stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citadel_tangle::MemoryStore;

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn engine() -> SetEngine<MemoryStore> {
        SetEngine::new(Arc::new(MemoryStore::new("laptop")), alice(), SetConfig::default()).unwrap()
    }

    #[test]
    fn rejects_zero_ghost_span() {
        let store = Arc::new(MemoryStore::new("laptop"));
        let result = SetEngine::new(store, alice(), SetConfig::default().with_ghost_span(0));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn set_ghost_span_validates() {
        let engine = engine();
        assert_eq!(engine.ghost_span(), 32);
        assert!(matches!(engine.set_ghost_span(0), Err(Error::Config(_))));
        assert_eq!(engine.ghost_span(), 32);
        engine.set_ghost_span(4).unwrap();
        assert_eq!(engine.ghost_span(), 4);
    }

    #[tokio::test]
    async fn operations_before_load_fail() {
        let engine = engine();
        assert!(matches!(engine.add("follows", "x").await, Err(Error::NotLoaded)));
        assert!(matches!(engine.values("follows", None), Err(Error::NotLoaded)));
        assert!(matches!(engine.squeeze("follows").await, Err(Error::NotLoaded)));
    }

    #[tokio::test]
    async fn load_other_account_is_ownership_error() {
        let engine = engine();
        engine.load(&alice()).await.unwrap();
        engine.load(&alice()).await.unwrap();
        let err = engine.load(&AccountId::new("bob")).await.unwrap_err();
        assert!(matches!(err, Error::Ownership { .. }));
        assert!(err.to_string().contains("\"bob\""));
    }

    #[tokio::test]
    async fn failed_writes_report_their_own_op() {
        let store = Arc::new(MemoryStore::new("laptop"));
        let engine = SetEngine::new(Arc::clone(&store), alice(), SetConfig::default()).unwrap();
        engine.load(&alice()).await.unwrap();
        engine.add("follows", "x").await.unwrap();
        engine.add("follows", "y").await.unwrap();
        store.set_read_only(true);

        let del = engine.del("follows", "x").await.unwrap_err();
        assert!(matches!(del, Error::Write { op: WriteOp::Del, .. }));
        let add = engine.add("follows", "z").await.unwrap_err();
        assert!(matches!(add, Error::Write { op: WriteOp::Add, .. }));
        let squeeze = engine.squeeze("follows").await.unwrap_err();
        assert!(matches!(squeeze, Error::Write { op: WriteOp::Squeeze, .. }));
        assert_eq!(Edit::Add.op(), WriteOp::Add);
        assert_eq!(Edit::Del.op(), WriteOp::Del);
    }

    #[test]
    fn sweep_collects_target_and_tombstones() {
        let mut roots = ItemRoots::new();
        let (a, b, c) = (MsgId::new([1; 32]), MsgId::new([2; 32]), MsgId::new([3; 32]));
        roots.add("follows", "live", a);
        roots.add("follows", "gone", b);
        roots.add("follows", "target", c);
        let current = BTreeSet::from(["live".to_string()]);

        let (supersedes, swept) = sweep(&roots, "follows", "target", &current);
        assert_eq!(supersedes, vec![b, c]);
        assert_eq!(swept.len(), 2);
        assert!(swept.contains(&(b, "gone".to_string())));
        assert!(swept.contains(&(c, "target".to_string())));
    }

    #[test]
    fn sweep_deduplicates_shared_roots() {
        let mut roots = ItemRoots::new();
        let checkpoint = MsgId::new([8; 32]);
        roots.add("follows", "x", checkpoint);
        roots.add("follows", "y", checkpoint);
        let (supersedes, swept) = sweep(&roots, "follows", "z", &BTreeSet::new());
        assert_eq!(supersedes, vec![checkpoint]);
        assert_eq!(swept.len(), 2);
    }
}

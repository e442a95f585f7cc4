//! Citadel CRDT - replicated Set over account tangles
//!
//! A Set instance (a *subdomain*, e.g. `"follows"`) is a tangle of update
//! messages `{ add, del, supersedes }` in its owner's log. Any number of the
//! owner's devices write concurrently; replicas converge on the same value
//! without coordination.
//!
//! # Architecture
//!
//! - **Learner** (`learner`): ingests the owner's messages in any order and
//!   maintains per-subdomain tangle handles plus the [`ItemRoots`] index.
//! - **Materialiser** ([`materialize`]): replays a tangle in its fixed
//!   topological order to get the current value. Pure and deterministic.
//! - **Write path** ([`SetEngine::add`], [`SetEngine::del`]): every write
//!   supersedes the roots of its own item and of every tombstoned item, so
//!   the live frontier stays narrow without a separate GC pass.
//! - **Pruning advisor** ([`ghost`]): recomputes the frontier from declared
//!   `supersedes` edges and decides which old messages may become ghosts.
//! - **Squeeze** ([`SetEngine::squeeze`]): one checkpoint message that
//!   supersedes every current root.
//!
//! # Two kinds of bookkeeping
//!
//! The item-root index is built from causal precedence and only ever
//! influences what new writes *declare*. Pruning decisions read only what
//! messages *declared*. A stale index can make `supersedes` lists longer or
//! delay pruning; it cannot change the Set's value.
//!
//! # Example
//!
//! ```no_run
//! use citadel_crdt::{SetConfig, SetEngine};
//! use citadel_tangle::{AccountId, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> citadel_crdt::Result<()> {
//! let alice = AccountId::new("alice");
//! let store = Arc::new(MemoryStore::new("laptop"));
//! let set = SetEngine::new(store, alice.clone(), SetConfig::default())?;
//! set.load(&alice).await?;
//!
//! set.add("follows", "bob").await?;
//! assert!(set.has("follows", "bob", None)?);
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod event;
mod item_roots;
mod learner;
mod msg;

pub mod ghost;
pub mod materialize;

pub use config::{SetConfig, DEFAULT_GHOST_SPAN};
pub use engine::SetEngine;
pub use error::{Error, Result, WriteOp};
pub use event::{SetEvent, SetEventKind};
pub use item_roots::ItemRoots;
pub use learner::Learner;
pub use materialize::read_set;
pub use msg::{to_domain, to_subdomain, SetMsg, SetUpdate, DOMAIN_PREFIX};

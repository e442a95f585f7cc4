//! Citadel Tangle - content-addressed causal message log
//!
//! Replicated types in Citadel are built on per-account logs of immutable,
//! content-addressed messages. Messages sharing an (account, domain) pair
//! form a *tangle*: a causal DAG rooted at a deterministic *moot* message.
//!
//! # Design
//!
//! - Message ids are Blake3 hashes of the message content, so identical
//!   messages from different replicas collapse to one.
//! - Each non-moot message links to the tangle tips its author had seen
//!   (`prev`) and records its depth (longest path from the moot).
//! - Topological order is ascending depth with ties broken by id, which
//!   makes it a pure function of the message set.
//!
//! The [`TangleStore`] trait is the seam replicated types are written
//! against; [`MemoryStore`] is the in-process implementation.

mod error;
mod id;
mod msg;
mod store;
mod tangle;

pub use error::{Result, StoreError};
pub use id::{AccountId, MsgId};
pub use msg::{moot_id, Metadata, Msg, Record, TangleLinks};
pub use store::{MemoryStore, TangleStore};
pub use tangle::Tangle;

//! Error types for citadel-crdt.

use citadel_tangle::{AccountId, MsgId, StoreError};
use thiserror::Error;

/// Result type for Set operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which write produced a [`Error::Write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Add,
    Del,
    Squeeze,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOp::Add => f.write_str("adding to"),
            WriteOp::Del => f.write_str("deleting from"),
            WriteOp::Squeeze => f.write_str("squeezing"),
        }
    }
}

/// Errors that can occur in Set operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation targets an account other than the loaded one.
    #[error("cannot load Set for account \"{requested}\" because Set for account \"{loaded}\" is already loaded")]
    Ownership {
        loaded: AccountId,
        requested: AccountId,
    },

    /// Operation issued before `load` completed.
    #[error("Set is not loaded")]
    NotLoaded,

    /// Tangle id is unknown or its root is not a Set moot.
    #[error("tangle {id} {reason}")]
    UnknownTangle { id: MsgId, reason: &'static str },

    /// Message id is not in the local store.
    #[error("message {0} does not exist in the store")]
    UnknownMessage(MsgId),

    /// The store rejected an append.
    #[error("failed to create msg when {op} Set \"{subdomain}\"")]
    Write {
        subdomain: String,
        op: WriteOp,
        #[source]
        source: StoreError,
    },

    /// A live message could not be learned.
    #[error("cannot learn message {id}: {reason}")]
    Ingest { id: MsgId, reason: String },
}

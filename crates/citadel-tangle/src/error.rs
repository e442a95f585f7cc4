//! Error types for citadel-tangle.

use crate::id::MsgId;
use thiserror::Error;

/// Result type for tangle store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in tangle store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is not accepting writes.
    #[error("store is read-only")]
    ReadOnly,

    /// A message with a payload carries no tangle links.
    #[error("message {0} has a payload but no tangle links")]
    MissingTangle(MsgId),

    /// A message's tangle root does not match its (account, domain) moot.
    #[error("message {id} links to tangle {root}, expected {expected}")]
    ForeignTangle {
        id: MsgId,
        root: MsgId,
        expected: MsgId,
    },
}

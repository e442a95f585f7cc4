//! Mutation notifications.

use serde::Serialize;

/// Kind of a Set mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SetEventKind {
    Add,
    Del,
}

/// Emitted after every successful `add`/`del` write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetEvent {
    pub event: SetEventKind,
    pub subdomain: String,
    pub value: String,
}

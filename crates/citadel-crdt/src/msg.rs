//! Set message shapes.
//!
//! Raw tangle messages are classified once, at the boundary, into
//! [`SetMsg`]. Anything that is not a well-formed Set moot or update for the
//! expected owner is rejected here and never reaches the index or replay.

use citadel_tangle::{AccountId, Msg, MsgId, TangleStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain prefix namespacing Set tangles.
pub const DOMAIN_PREFIX: &str = "set_v1__";

/// Namespaced domain of a subdomain.
pub fn to_domain(subdomain: &str) -> String {
    format!("{DOMAIN_PREFIX}{subdomain}")
}

/// Subdomain of a Set domain, if it is one.
pub fn to_subdomain(domain: &str) -> Option<&str> {
    domain.strip_prefix(DOMAIN_PREFIX)
}

/// Payload of a Set update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUpdate {
    /// Items added, applied first.
    pub add: Vec<String>,
    /// Items deleted, applied after `add`.
    pub del: Vec<String>,
    /// Messages this update formally supersedes.
    pub supersedes: Vec<MsgId>,
}

impl SetUpdate {
    /// Parse a payload. `None` unless all three arrays are present and typed.
    pub fn from_value(data: &Value) -> Option<Self> {
        Self::deserialize(data).ok()
    }

    /// Encode as a payload.
    pub fn to_value(&self) -> Value {
        let strings = |items: &[String]| Value::Array(items.iter().cloned().map(Value::String).collect());
        let mut map = Map::new();
        map.insert("add".to_string(), strings(&self.add));
        map.insert("del".to_string(), strings(&self.del));
        map.insert(
            "supersedes".to_string(),
            Value::Array(self.supersedes.iter().map(|id| Value::String(id.to_hex())).collect()),
        );
        Value::Object(map)
    }

    /// Items this update writes (`add` then `del`).
    pub fn touched(&self) -> impl Iterator<Item = &String> {
        self.add.iter().chain(self.del.iter())
    }
}

/// A validated Set message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetMsg {
    /// Root of a subdomain tangle.
    Moot { subdomain: String },
    /// An add/del write.
    Update { subdomain: String, update: SetUpdate },
}

impl SetMsg {
    /// Classify `msg` as a Set message owned by `owner`.
    pub fn classify<S: TangleStore + ?Sized>(store: &S, msg: &Msg, owner: &AccountId) -> Option<Self> {
        if &msg.metadata.account != owner {
            return None;
        }
        let domain = msg.metadata.domain.as_str();
        let subdomain = to_subdomain(domain)?.to_string();
        if store.is_moot(msg, owner, domain) {
            return Some(SetMsg::Moot { subdomain });
        }
        msg.metadata.tangle.as_ref()?;
        let update = SetUpdate::from_value(msg.data.as_ref()?)?;
        Some(SetMsg::Update { subdomain, update })
    }

    /// Subdomain this message belongs to.
    pub fn subdomain(&self) -> &str {
        match self {
            SetMsg::Moot { subdomain } | SetMsg::Update { subdomain, .. } => subdomain,
        }
    }
}

//! Set engine configuration.

use crate::error::{Error, Result};
use serde::Deserialize;

/// Default retained depth margin below the live frontier.
pub const DEFAULT_GHOST_SPAN: u32 = 32;

const GHOST_SPAN_VAR: &str = "CITADEL_SET_GHOST_SPAN";

/// Configuration for a [`SetEngine`](crate::SetEngine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetConfig {
    /// Depth levels kept below the live frontier before a message becomes
    /// ghost-eligible. Must be at least 1.
    pub ghost_span: u32,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            ghost_span: DEFAULT_GHOST_SPAN,
        }
    }
}

impl SetConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// Reads `CITADEL_SET_GHOST_SPAN`; unparsable values are an error rather
    /// than silently falling back.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ghost_span = match lookup(GHOST_SPAN_VAR) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{GHOST_SPAN_VAR} is not an integer: {raw:?}")))?,
            None => DEFAULT_GHOST_SPAN,
        };
        let config = Self { ghost_span };
        config.validate()?;
        Ok(config)
    }

    /// Set the ghost span.
    pub fn with_ghost_span(mut self, ghost_span: u32) -> Self {
        self.ghost_span = ghost_span;
        self
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        validate_ghost_span(self.ghost_span)
    }
}

pub(crate) fn validate_ghost_span(span: u32) -> Result<()> {
    if span < 1 {
        return Err(Error::Config("ghostSpan must be >= 1".to_string()));
    }
    Ok(())
}

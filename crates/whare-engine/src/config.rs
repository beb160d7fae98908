//! Engine configuration
//!
//! Every field has a default, so an empty TOML file is a valid config:
//!
//! ```toml
//! poll_interval_secs = 30
//! offer_window_days = 7
//! id_prefix = "#"
//! event_capacity = 64
//! fallback_catalog = "catalog.json"
//! ```

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use whare_offers::DEFAULT_RESPONSE_WINDOW_DAYS;
use whare_registry::{builtin_catalog, parse_catalog, Property, DEFAULT_ID_PREFIX};

/// Longest accepted response window
pub const MAX_OFFER_WINDOW_DAYS: u32 = 365;

/// Longest accepted refresh interval (one day)
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Largest accepted event buffer
pub const MAX_EVENT_CAPACITY: usize = 65_536;

/// Registry engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between scheduled refreshes
    pub poll_interval_secs: u64,
    /// Days an applicant has to respond to an offer
    pub offer_window_days: u32,
    /// Presentation prefix for property ids
    pub id_prefix: String,
    /// Buffered view events per subscriber
    pub event_capacity: usize,
    /// JSON catalog replacing the built-in fallback
    pub fallback_catalog: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            offer_window_days: u32::try_from(DEFAULT_RESPONSE_WINDOW_DAYS).unwrap_or(7),
            id_prefix: DEFAULT_ID_PREFIX.to_owned(),
            event_capacity: 64,
            fallback_catalog: None,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With refresh interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// With offer response window
    #[inline]
    #[must_use]
    pub fn with_offer_window_days(mut self, days: u32) -> Self {
        self.offer_window_days = days;
        self
    }

    /// With id prefix
    #[inline]
    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// With event buffer size
    #[inline]
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// With fallback catalog file
    #[inline]
    #[must_use]
    pub fn with_fallback_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_catalog = Some(path.into());
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `EngineError::Config` on malformed TOML or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `EngineError::Config` if the file cannot be read or is invalid
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    /// - `EngineError::Config` naming the first invalid field
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(1..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_secs) {
            return Err(EngineError::config(format!(
                "poll_interval_secs must be between 1 and {MAX_POLL_INTERVAL_SECS}"
            )));
        }
        if !(1..=MAX_OFFER_WINDOW_DAYS).contains(&self.offer_window_days) {
            return Err(EngineError::config(format!(
                "offer_window_days must be between 1 and {MAX_OFFER_WINDOW_DAYS}"
            )));
        }
        if !(1..=MAX_EVENT_CAPACITY).contains(&self.event_capacity) {
            return Err(EngineError::config(format!(
                "event_capacity must be between 1 and {MAX_EVENT_CAPACITY}"
            )));
        }
        Ok(())
    }

    /// Refresh interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Offer response window
    #[inline]
    #[must_use]
    pub fn offer_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.offer_window_days))
    }

    /// Fallback catalog: the configured file, or the built-in one
    ///
    /// # Errors
    /// - `EngineError::Config` if the file cannot be read
    /// - `EngineError::Registry` if it holds an invalid record
    pub fn load_fallback(&self) -> Result<Vec<Property>, EngineError> {
        let Some(path) = &self.fallback_catalog else {
            return Ok(builtin_catalog());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("{}: {e}", path.display())))?;
        Ok(parse_catalog(&text)?)
    }
}

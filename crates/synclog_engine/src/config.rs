//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use regex::Regex;
use std::str::FromStr;
use std::time::Duration;

/// Default name of the store holding queued requests.
pub const DEFAULT_SYNC_LOG_STORE: &str = "syncLog";

/// Default name of the store holding undo/redo ledger rows.
pub const DEFAULT_UNDO_REDO_STORE: &str = "syncLogUndoRedo";

/// Default time to wait for a preflight reply.
pub const DEFAULT_PREFLIGHT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Store names used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Store holding queued requests.
    pub sync_log_store: String,
    /// Store holding undo/redo ledger rows.
    pub undo_redo_store: String,
}

impl EngineConfig {
    /// Creates a configuration with the default store names.
    pub fn new() -> Self {
        Self {
            sync_log_store: DEFAULT_SYNC_LOG_STORE.to_string(),
            undo_redo_store: DEFAULT_UNDO_REDO_STORE.to_string(),
        }
    }

    /// Sets the sync log store name.
    pub fn with_sync_log_store(mut self, name: impl Into<String>) -> Self {
        self.sync_log_store = name.into();
        self
    }

    /// Sets the undo/redo store name.
    pub fn with_undo_redo_store(mut self, name: impl Into<String>) -> Self {
        self.undo_redo_store = name.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Which URLs get a connectivity check before replay.
#[derive(Debug, Clone, Default)]
pub enum PreflightPolicy {
    /// No preflights are sent.
    #[default]
    Disabled,
    /// URLs matching the pattern are checked.
    Matching(Regex),
}

impl PreflightPolicy {
    /// Parses a policy: `"disabled"` turns preflights off, anything else is a
    /// URL regex.
    pub fn parse(pattern: &str) -> SyncResult<Self> {
        if pattern == "disabled" {
            Ok(Self::Disabled)
        } else {
            Ok(Self::Matching(Regex::new(pattern)?))
        }
    }

    /// Returns true if `url` should be checked.
    pub fn matches(&self, url: &str) -> bool {
        match self {
            PreflightPolicy::Disabled => false,
            PreflightPolicy::Matching(pattern) => pattern.is_match(url),
        }
    }

    /// Returns true unless the policy is [`PreflightPolicy::Disabled`].
    pub fn is_enabled(&self) -> bool {
        !matches!(self, PreflightPolicy::Disabled)
    }
}

impl FromStr for PreflightPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Options for a single `sync()` call.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Connectivity check policy.
    pub preflight: PreflightPolicy,
    /// Time to wait for a preflight reply.
    pub preflight_timeout: Duration,
}

impl SyncOptions {
    /// Creates options with preflights disabled.
    pub fn new() -> Self {
        Self {
            preflight: PreflightPolicy::Disabled,
            preflight_timeout: DEFAULT_PREFLIGHT_TIMEOUT,
        }
    }

    /// Sets the preflight policy.
    pub fn with_preflight(mut self, policy: PreflightPolicy) -> Self {
        self.preflight = policy;
        self
    }

    /// Parses and sets the preflight policy.
    pub fn with_preflight_pattern(self, pattern: &str) -> SyncResult<Self> {
        Ok(self.with_preflight(PreflightPolicy::parse(pattern)?))
    }

    /// Sets the preflight timeout.
    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = timeout;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_sync_log_store("queue")
            .with_undo_redo_store("queueLedger");
        assert_eq!(config.sync_log_store, "queue");
        assert_eq!(config.undo_redo_store, "queueLedger");

        let default = EngineConfig::default();
        assert_eq!(default.sync_log_store, DEFAULT_SYNC_LOG_STORE);
        assert_eq!(default.undo_redo_store, DEFAULT_UNDO_REDO_STORE);
    }

    #[test]
    fn preflight_policy_parse() {
        assert!(!PreflightPolicy::parse("disabled").unwrap().is_enabled());

        let policy: PreflightPolicy = "^https://api\\.example\\.com/".parse().unwrap();
        assert!(policy.matches("https://api.example.com/orders"));
        assert!(!policy.matches("https://cdn.example.com/app.js"));

        assert!(matches!(
            PreflightPolicy::parse("(unclosed"),
            Err(SyncError::InvalidPattern(_))
        ));
    }

    #[test]
    fn disabled_policy_matches_nothing() {
        assert!(!PreflightPolicy::Disabled.matches("https://api.example.com/"));
    }

    #[test]
    fn sync_options_defaults() {
        let options = SyncOptions::default();
        assert!(!options.preflight.is_enabled());
        assert_eq!(options.preflight_timeout, Duration::from_millis(60_000));

        let options = SyncOptions::new()
            .with_preflight_pattern(".*")
            .unwrap()
            .with_preflight_timeout(Duration::from_millis(250));
        assert!(options.preflight.is_enabled());
        assert_eq!(options.preflight_timeout, Duration::from_millis(250));
    }
}

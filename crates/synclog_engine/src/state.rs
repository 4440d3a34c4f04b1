//! Sync engine state machine.

use crate::error::{SyncError, SyncResult};
use crate::preflight::PreflightChecker;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No sync is running.
    #[default]
    Idle,
    /// A sync session is replaying the log.
    Syncing,
    /// No sync is running and the last one failed.
    Failed,
}

impl SyncState {
    /// Returns true if a sync session is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if a new sync can start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Failed)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync calls that finished without error.
    pub cycles_completed: u64,
    /// Sync calls that failed.
    pub cycles_failed: u64,
    /// Requests replayed successfully.
    pub requests_replayed: u64,
    /// Requests removed by a skip action.
    pub requests_skipped: u64,
    /// Error of the last failed sync, cleared by a successful one.
    pub last_error: Option<String>,
    /// When the last sync finished.
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// Ids replayed and removed, in replay order.
    pub replayed: Vec<String>,
    /// Ids removed by a skip action.
    pub skipped: Vec<String>,
    /// Id of the entry at which a listener stopped the session.
    pub stopped_at: Option<String>,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Returns true if a listener stopped the session early.
    pub fn was_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }
}

/// One running sync session.
///
/// Holds the engine in [`SyncState::Syncing`] until dropped. Dropping the
/// session cancels any pending preflight timer and releases the state, even if
/// the sync future itself was dropped midway.
pub(crate) struct SyncSession<'a> {
    state: &'a RwLock<SyncState>,
    pub(crate) checker: PreflightChecker,
    outcome: SyncState,
}

impl<'a> SyncSession<'a> {
    /// Starts a session, failing if one is already running.
    pub(crate) fn begin(state: &'a RwLock<SyncState>) -> SyncResult<Self> {
        let mut current = state.write();
        if !current.can_start_sync() {
            return Err(SyncError::SyncInProgress);
        }
        *current = SyncState::Syncing;
        Ok(Self {
            state,
            checker: PreflightChecker::new(),
            outcome: SyncState::Idle,
        })
    }

    /// Marks the session as failed; the engine ends in [`SyncState::Failed`].
    pub(crate) fn fail(&mut self) {
        self.outcome = SyncState::Failed;
    }
}

impl Drop for SyncSession<'_> {
    fn drop(&mut self) {
        self.checker.cancel();
        *self.state.write() = self.outcome;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Failed.can_start_sync());
        assert!(!SyncState::Syncing.can_start_sync());

        assert!(SyncState::Syncing.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Failed.is_active());
    }

    #[test]
    fn session_is_exclusive() {
        let state = RwLock::new(SyncState::Idle);
        let session = SyncSession::begin(&state).unwrap();
        assert_eq!(*state.read(), SyncState::Syncing);

        assert!(matches!(
            SyncSession::begin(&state),
            Err(SyncError::SyncInProgress)
        ));

        drop(session);
        assert_eq!(*state.read(), SyncState::Idle);
    }

    #[test]
    fn failed_session_leaves_failed_state() {
        let state = RwLock::new(SyncState::Idle);
        {
            let mut session = SyncSession::begin(&state).unwrap();
            session.fail();
        }
        assert_eq!(*state.read(), SyncState::Failed);

        let session = SyncSession::begin(&state).unwrap();
        drop(session);
        assert_eq!(*state.read(), SyncState::Idle);
    }

    #[test]
    fn cycle_result_stop_flag() {
        let mut result = SyncCycleResult::default();
        assert!(!result.was_stopped());
        result.stopped_at = Some("1".into());
        assert!(result.was_stopped());
    }
}

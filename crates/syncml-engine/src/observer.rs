//! Observer callbacks replacing signal/slot plumbing: one object, typed
//! methods, injected into the session.

use crate::types::{ModificationType, ModifiedDatabase, SyncState};

/// Receives progress and terminal notifications from a session. All
/// methods default to no-ops so implementors pick what they care about.
pub trait SyncObserver: Send {
    /// Fired on every state transition.
    fn sync_state_changed(&mut self, _state: SyncState) {}

    /// Fired exactly once when the session reaches a terminal state.
    fn sync_finished(&mut self, _remote_device: &str, _state: SyncState, _description: &str) {}

    /// Fired for each item processed against a local or remote database.
    fn item_processed(
        &mut self,
        _modification: ModificationType,
        _database: ModifiedDatabase,
        _database_uri: &str,
        _mime_type: &str,
    ) {
    }

    /// Fired when a storage is acquired for the session.
    fn storage_acquired(&mut self, _mime_type: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl SyncObserver for NullObserver {}

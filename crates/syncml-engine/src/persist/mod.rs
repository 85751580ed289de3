//! Persistence contracts: nonce table and per-target sync state
//! (anchors, UID mappings, pending changes).

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::conflict::LocalChanges;
use crate::error::SyncError;
use crate::target::UidMapping;
use syncml_wire::SyncDirection;

/// MD5 nonces exchanged during authentication, keyed by (issuer, target)
/// device pair.
pub trait NonceStore: Send {
    fn upsert_nonce(&mut self, issuer: &str, target: &str, nonce: &[u8]) -> Result<(), SyncError>;

    fn get_nonce(&self, issuer: &str, target: &str) -> Result<Option<Vec<u8>>, SyncError>;

    fn clear_nonce(&mut self, issuer: &str, target: &str) -> Result<(), SyncError>;
}

/// Generate a fresh random nonce.
pub fn generate_nonce() -> Result<Vec<u8>, SyncError> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| SyncError::Internal(format!("nonce generation failed: {e}")))?;
    Ok(nonce.to_vec())
}

/// Persisted state of one sync target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLogRecord {
    pub local_last_anchor: String,
    pub remote_last_anchor: String,
    pub mappings: Vec<UidMapping>,
    /// Changes sent but not yet acknowledged by the remote side.
    pub pending: LocalChanges,
}

/// Anchors, mappings and change-log snapshots, keyed by
/// (remote device, source database, direction).
pub trait SyncStateStore: Send {
    fn load_changelog(
        &self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
    ) -> Result<Option<ChangeLogRecord>, SyncError>;

    /// Transactional replacement of one target's persisted state.
    fn save_changelog(
        &mut self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
        record: &ChangeLogRecord,
    ) -> Result<(), SyncError>;
}

/// Everything a session persists, behind one handle.
pub trait SessionStore: NonceStore + SyncStateStore {}

impl<T: NonceStore + SyncStateStore> SessionStore for T {}

pub(crate) fn direction_tag(direction: SyncDirection) -> &'static str {
    match direction {
        SyncDirection::TwoWay => "two-way",
        SyncDirection::FromClient => "from-client",
        SyncDirection::FromServer => "from-server",
    }
}

//! In-memory persistence, for tests and one-shot sessions.

use std::collections::HashMap;

use crate::error::SyncError;
use crate::persist::{direction_tag, ChangeLogRecord, NonceStore, SyncStateStore};
use syncml_wire::SyncDirection;

#[derive(Debug, Default)]
pub struct MemoryStore {
    nonces: HashMap<(String, String), Vec<u8>>,
    changelogs: HashMap<(String, String, &'static str), ChangeLogRecord>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl NonceStore for MemoryStore {
    fn upsert_nonce(&mut self, issuer: &str, target: &str, nonce: &[u8]) -> Result<(), SyncError> {
        self.nonces.insert((issuer.to_string(), target.to_string()), nonce.to_vec());
        Ok(())
    }

    fn get_nonce(&self, issuer: &str, target: &str) -> Result<Option<Vec<u8>>, SyncError> {
        Ok(self.nonces.get(&(issuer.to_string(), target.to_string())).cloned())
    }

    fn clear_nonce(&mut self, issuer: &str, target: &str) -> Result<(), SyncError> {
        self.nonces.remove(&(issuer.to_string(), target.to_string()));
        Ok(())
    }
}

impl SyncStateStore for MemoryStore {
    fn load_changelog(
        &self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
    ) -> Result<Option<ChangeLogRecord>, SyncError> {
        Ok(self
            .changelogs
            .get(&(remote_device.to_string(), source_db.to_string(), direction_tag(direction)))
            .cloned())
    }

    fn save_changelog(
        &mut self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
        record: &ChangeLogRecord,
    ) -> Result<(), SyncError> {
        self.changelogs.insert(
            (remote_device.to_string(), source_db.to_string(), direction_tag(direction)),
            record.clone(),
        );
        Ok(())
    }
}

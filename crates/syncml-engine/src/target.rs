//! Per-datastore session state: sync mode, anchors, local changes and the
//! UID mapping table.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::conflict::LocalChanges;
use crate::error::SyncError;
use crate::item::SyncItemKey;
use crate::persist::ChangeLogRecord;
use crate::storage::plugin::StoragePlugin;
use crate::types::Role;
use syncml_wire::{SyncDirection, SyncMode, SyncType};

/// Pair of remote and local identifiers for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidMapping {
    pub remote_uid: String,
    pub local_uid: String,
}

/// Mapping table: a backing vector with forward (remote) and reverse
/// (local) indexes. Insertions are append-only within a session until the
/// table is persisted.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<UidMapping>,
    by_remote: HashMap<String, usize>,
    by_local: HashMap<String, usize>,
}

impl MappingTable {
    pub fn insert(&mut self, mapping: UidMapping) {
        if let Some(&index) = self.by_remote.get(&mapping.remote_uid) {
            self.by_local.remove(&self.entries[index].local_uid);
            self.by_local.insert(mapping.local_uid.clone(), index);
            self.entries[index] = mapping;
        } else {
            let index = self.entries.len();
            self.by_remote.insert(mapping.remote_uid.clone(), index);
            self.by_local.insert(mapping.local_uid.clone(), index);
            self.entries.push(mapping);
        }
    }

    pub fn local_uid(&self, remote_uid: &str) -> Option<&str> {
        self.by_remote.get(remote_uid).map(|&i| self.entries[i].local_uid.as_str())
    }

    pub fn remote_uid(&self, local_uid: &str) -> Option<&str> {
        self.by_local.get(local_uid).map(|&i| self.entries[i].remote_uid.as_str())
    }

    pub fn remove_by_local(&mut self, local_uid: &str) {
        if self.by_local.contains_key(local_uid) {
            self.entries.retain(|m| m.local_uid != local_uid);
            self.reindex();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_remote.clear();
        self.by_local.clear();
    }

    pub fn entries(&self) -> &[UidMapping] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reindex(&mut self) {
        self.by_remote.clear();
        self.by_local.clear();
        for (index, mapping) in self.entries.iter().enumerate() {
            self.by_remote.insert(mapping.remote_uid.clone(), index);
            self.by_local.insert(mapping.local_uid.clone(), index);
        }
    }
}

/// One datastore bound into the session.
#[derive(Debug)]
pub struct SyncTarget {
    /// Index of the acquired storage in the session's storage list.
    pub storage: usize,
    source_db: String,
    target_db: String,
    sync_mode: SyncMode,
    reverted: bool,

    local_last_anchor: String,
    local_next_anchor: String,
    remote_last_anchor: String,
    remote_next_anchor: String,

    local_changes: Option<LocalChanges>,
    mappings: MappingTable,
    /// State loaded from the change log at target creation.
    changelog: ChangeLogRecord,
}

impl SyncTarget {
    pub fn new(
        storage: usize,
        source_db: &str,
        sync_mode: SyncMode,
        local_next_anchor: &str,
        changelog: Option<ChangeLogRecord>,
    ) -> SyncTarget {
        let changelog = changelog.unwrap_or_default();
        SyncTarget {
            storage,
            source_db: source_db.to_string(),
            target_db: String::new(),
            sync_mode,
            reverted: false,
            local_last_anchor: changelog.local_last_anchor.clone(),
            local_next_anchor: local_next_anchor.to_string(),
            remote_last_anchor: changelog.remote_last_anchor.clone(),
            remote_next_anchor: String::new(),
            local_changes: None,
            mappings: MappingTable::default(),
            changelog,
        }
    }

    pub fn source_db(&self) -> &str {
        &self.source_db
    }

    pub fn target_db(&self) -> &str {
        &self.target_db
    }

    pub fn set_target_db(&mut self, target_db: &str) {
        self.target_db = target_db.to_string();
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn set_sync_mode(&mut self, sync_mode: SyncMode) {
        self.sync_mode = sync_mode;
    }

    /// Downgrade to slow sync mid-session, remembering that it happened.
    pub fn revert_sync_mode(&mut self) {
        debug!(source_db = %self.source_db, "reverting target to slow sync");
        self.sync_mode.to_slow_sync();
        self.reverted = true;
    }

    pub fn reverted(&self) -> bool {
        self.reverted
    }

    pub fn local_last_anchor(&self) -> &str {
        &self.local_last_anchor
    }

    pub fn local_next_anchor(&self) -> &str {
        &self.local_next_anchor
    }

    pub fn remote_last_anchor(&self) -> &str {
        &self.remote_last_anchor
    }

    pub fn remote_next_anchor(&self) -> &str {
        &self.remote_next_anchor
    }

    pub fn set_remote_next_anchor(&mut self, anchor: &str) {
        self.remote_next_anchor = anchor.to_string();
    }

    /// Load the persisted mapping table, done when entering fast sync.
    pub fn load_uid_mappings(&mut self) {
        self.mappings.clear();
        for mapping in &self.changelog.mappings {
            self.mappings.insert(mapping.clone());
        }
        debug!(count = self.mappings.len(), source_db = %self.source_db, "loaded UID mappings");
    }

    /// Drop every mapping; slow sync invalidates them all.
    pub fn clear_uid_mappings(&mut self) {
        self.mappings.clear();
    }

    pub fn add_uid_mapping(&mut self, mapping: UidMapping) {
        self.mappings.insert(mapping);
    }

    pub fn remove_uid_mapping(&mut self, local_uid: &str) {
        self.mappings.remove_by_local(local_uid);
    }

    pub fn map_to_local_uid(&self, remote_uid: &str) -> Option<&str> {
        self.mappings.local_uid(remote_uid)
    }

    pub fn map_to_remote_uid(&self, local_uid: &str) -> Option<&str> {
        self.mappings.remote_uid(local_uid)
    }

    pub fn uid_mappings(&self) -> &[UidMapping] {
        self.mappings.entries()
    }

    /// Compute the local change sets from the change-log backlog and the
    /// backend delta. Slow sync sends the full store as additions.
    pub fn discover_local_changes(
        &mut self,
        role: Role,
        plugin: &mut dyn StoragePlugin,
    ) -> Result<(), SyncError> {
        if self.local_changes.is_some() {
            return Ok(());
        }

        let outbound = match (role, self.sync_mode.direction) {
            (Role::Client, SyncDirection::FromServer) => false,
            (Role::Server, SyncDirection::FromClient) => false,
            _ => true,
        };

        if !outbound {
            self.local_changes = Some(LocalChanges::default());
            return Ok(());
        }

        let mut changes = LocalChanges::default();

        if self.sync_mode.sync_type == SyncType::Slow {
            let keys = plugin
                .get_all()
                .map_err(|s| SyncError::Storage(format!("get_all failed: {s:?}")))?;
            changes.added = keys;
        } else {
            let (new, replaced, deleted) = plugin
                .get_modifications(&self.local_last_anchor)
                .map_err(|s| SyncError::Storage(format!("get_modifications failed: {s:?}")))?;
            changes.added = new;
            changes.modified = replaced;
            changes.removed = deleted;

            // Fold in the change-log backlog of unacknowledged changes.
            for key in &self.changelog.pending.added {
                if !changes.added.contains(key) {
                    changes.added.push(key.clone());
                }
            }
            for key in &self.changelog.pending.modified {
                if !changes.modified.contains(key) && !changes.added.contains(key) {
                    changes.modified.push(key.clone());
                }
            }
            for key in &self.changelog.pending.removed {
                if !changes.removed.contains(key) {
                    changes.removed.push(key.clone());
                }
            }

            // The sets must stay pairwise disjoint; a deletion supersedes
            // earlier additions and modifications.
            let removed = changes.removed.clone();
            changes.added.retain(|k| !removed.contains(k));
            changes.modified.retain(|k| !removed.contains(k));
        }

        debug!(
            source_db = %self.source_db,
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "discovered local changes"
        );

        self.local_changes = Some(changes);
        Ok(())
    }

    pub fn local_changes(&self) -> Option<&LocalChanges> {
        self.local_changes.as_ref()
    }

    pub fn local_changes_mut(&mut self) -> Option<&mut LocalChanges> {
        self.local_changes.as_mut()
    }

    /// Detach the change manifest so a resolver can mutate it while the
    /// target itself is borrowed elsewhere.
    pub fn take_local_changes(&mut self) -> LocalChanges {
        self.local_changes.take().unwrap_or_default()
    }

    pub fn restore_local_changes(&mut self, changes: LocalChanges) {
        self.local_changes = Some(changes);
    }

    /// Remove an acknowledged key from every pending change set.
    pub fn acknowledge_change(&mut self, key: &SyncItemKey) {
        if let Some(changes) = self.local_changes.as_mut() {
            changes.added.retain(|k| k != key);
            changes.modified.retain(|k| k != key);
            changes.removed.retain(|k| k != key);
        }
    }

    /// Snapshot for the session save: committed anchors become the next
    /// anchors negotiated during the session, mappings and the remaining
    /// backlog are carried over.
    pub fn save_record(&self) -> ChangeLogRecord {
        if self.remote_next_anchor.is_empty() {
            warn!(source_db = %self.source_db, "saving session without a remote next anchor");
        }
        ChangeLogRecord {
            local_last_anchor: self.local_next_anchor.clone(),
            remote_last_anchor: self.remote_next_anchor.clone(),
            mappings: self.mappings.entries().to_vec(),
            pending: self.local_changes.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn fast_mode() -> SyncMode {
        SyncMode::default()
    }

    fn slow_mode() -> SyncMode {
        let mut mode = SyncMode::default();
        mode.to_slow_sync();
        mode
    }

    #[test]
    fn mapping_table_forward_and_reverse() {
        let mut table = MappingTable::default();
        table.insert(UidMapping { remote_uid: "r1".into(), local_uid: "l1".into() });
        table.insert(UidMapping { remote_uid: "r2".into(), local_uid: "l2".into() });

        assert_eq!(table.local_uid("r1"), Some("l1"));
        assert_eq!(table.remote_uid("l2"), Some("r2"));
        assert_eq!(table.local_uid("r3"), None);
    }

    #[test]
    fn mapping_insert_is_keyed_by_remote_uid() {
        let mut table = MappingTable::default();
        table.insert(UidMapping { remote_uid: "r1".into(), local_uid: "l1".into() });
        table.insert(UidMapping { remote_uid: "r1".into(), local_uid: "l9".into() });

        assert_eq!(table.len(), 1);
        assert_eq!(table.local_uid("r1"), Some("l9"));
        assert_eq!(table.remote_uid("l1"), None);
    }

    #[test]
    fn mapping_remove_by_local() {
        let mut table = MappingTable::default();
        table.insert(UidMapping { remote_uid: "r1".into(), local_uid: "l1".into() });
        table.insert(UidMapping { remote_uid: "r2".into(), local_uid: "l2".into() });
        table.remove_by_local("l1");

        assert_eq!(table.local_uid("r1"), None);
        assert_eq!(table.local_uid("r2"), Some("l2"));
    }

    #[test]
    fn slow_sync_sends_everything_as_added() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.seed("k1", b"a");
        storage.seed("k2", b"b");

        let mut target = SyncTarget::new(0, "./contacts", slow_mode(), "200", None);
        target.discover_local_changes(Role::Client, &mut storage).unwrap();

        let changes = target.local_changes().unwrap();
        assert_eq!(changes.added.len(), 2);
        assert!(changes.modified.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn fast_sync_merges_changelog_backlog() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.set_modifications(&["n1"], &["m1"], &["d1"]);

        let changelog = ChangeLogRecord {
            pending: LocalChanges {
                added: vec!["n1".into(), "n2".into()],
                modified: vec!["m2".into()],
                removed: vec!["d1".into()],
            },
            ..Default::default()
        };

        let mut target = SyncTarget::new(0, "./contacts", fast_mode(), "200", Some(changelog));
        target.discover_local_changes(Role::Client, &mut storage).unwrap();

        let changes = target.local_changes().unwrap();
        assert_eq!(changes.added, vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(changes.modified, vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(changes.removed, vec!["d1".to_string()]);
    }

    #[test]
    fn deletion_supersedes_other_changes() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.set_modifications(&["k"], &["k"], &["k"]);

        let mut target = SyncTarget::new(0, "./contacts", fast_mode(), "200", None);
        target.discover_local_changes(Role::Client, &mut storage).unwrap();

        let changes = target.local_changes().unwrap();
        assert!(changes.added.is_empty());
        assert!(changes.modified.is_empty());
        assert_eq!(changes.removed, vec!["k".to_string()]);
    }

    #[test]
    fn from_server_direction_yields_no_client_changes() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.seed("k1", b"a");

        let mut mode = fast_mode();
        mode.direction = SyncDirection::FromServer;
        let mut target = SyncTarget::new(0, "./contacts", mode, "200", None);
        target.discover_local_changes(Role::Client, &mut storage).unwrap();
        assert!(target.local_changes().unwrap().is_empty());
    }

    #[test]
    fn revert_marks_target_and_downgrades_mode() {
        let mut target = SyncTarget::new(0, "./contacts", fast_mode(), "200", None);
        assert!(!target.reverted());
        target.revert_sync_mode();
        assert!(target.reverted());
        assert_eq!(target.sync_mode().sync_type, SyncType::Slow);
    }

    #[test]
    fn save_record_promotes_next_anchors() {
        let changelog = ChangeLogRecord {
            local_last_anchor: "90".into(),
            remote_last_anchor: "95".into(),
            ..Default::default()
        };
        let mut target = SyncTarget::new(0, "./contacts", fast_mode(), "200", Some(changelog));
        target.set_remote_next_anchor("201");
        target.add_uid_mapping(UidMapping { remote_uid: "r1".into(), local_uid: "l1".into() });

        let record = target.save_record();
        assert_eq!(record.local_last_anchor, "200");
        assert_eq!(record.remote_last_anchor, "201");
        assert_eq!(record.mappings.len(), 1);
    }

    #[test]
    fn mappings_loaded_on_fast_cleared_on_slow() {
        let changelog = ChangeLogRecord {
            mappings: vec![UidMapping { remote_uid: "r1".into(), local_uid: "l1".into() }],
            ..Default::default()
        };
        let mut target = SyncTarget::new(0, "./contacts", fast_mode(), "200", Some(changelog));
        target.load_uid_mappings();
        assert_eq!(target.map_to_local_uid("r1"), Some("l1"));

        target.clear_uid_mappings();
        assert_eq!(target.map_to_local_uid("r1"), None);
    }
}

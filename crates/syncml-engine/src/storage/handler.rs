//! Staging and committing of inbound item changes.
//!
//! Adds, replaces and deletes are queued per command item, committed in
//! three batches against the backend, and classified into commit results
//! the command handler translates to response status codes. At most one
//! large object may be in assembly per direction at a time.

use std::collections::BTreeMap;

use tracing::{debug, error, warn};

use crate::conflict::{ConflictResolver, RevertPolicy};
use crate::item::{SyncItem, SyncItemKey};
use crate::observer::SyncObserver;
use crate::storage::plugin::{StoragePlugin, StorageStatus};
use crate::types::{ModificationType, ModifiedDatabase};

/// Addressing tuple correlating an item inside a multi-item command with
/// its commit result and status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ItemId {
    pub cmd_id: u32,
    pub item_index: usize,
}

impl ItemId {
    pub fn new(cmd_id: u32, item_index: usize) -> ItemId {
        ItemId { cmd_id, item_index }
    }
}

/// Classified backend outcome for one committed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Staged for addition; kept when the batch entry never reached the
    /// backend (conflict resolved in local favor).
    InitAdd,
    InitReplace,
    InitDelete,
    Added,
    Replaced,
    Deleted,
    Duplicate,
    NotDeleted,
    UnsupportedFormat,
    ItemTooBig,
    NotEnoughSpace,
    GeneralError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitConflict {
    #[default]
    None,
    LocalWin,
    RemoteWin,
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub status: CommitStatus,
    pub conflict: CommitConflict,
    pub item_key: SyncItemKey,
}

#[derive(Default)]
pub struct StorageHandler {
    add_list: BTreeMap<ItemId, Box<dyn SyncItem>>,
    replace_list: BTreeMap<ItemId, Box<dyn SyncItem>>,
    delete_list: BTreeMap<ItemId, SyncItemKey>,
    large_object: Option<Box<dyn SyncItem>>,
    large_object_size: i64,
    large_object_key: SyncItemKey,
}

/// Metadata resolved for a staged item.
#[derive(Debug, Clone, Default)]
pub struct ItemMeta {
    pub parent_key: SyncItemKey,
    pub mime_type: String,
    pub format: String,
    pub version: String,
}

impl StorageHandler {
    pub fn new() -> StorageHandler {
        StorageHandler::default()
    }

    fn apply_meta(item: &mut dyn SyncItem, meta: &ItemMeta) {
        item.set_parent_key(meta.parent_key.clone());
        item.set_mime_type(meta.mime_type.clone());
        item.set_format(meta.format.clone());
        item.set_version(meta.version.clone());
    }

    /// Stage an item for addition.
    pub fn add_item(
        &mut self,
        id: ItemId,
        plugin: &mut dyn StoragePlugin,
        local_key: &SyncItemKey,
        meta: &ItemMeta,
        data: &str,
    ) -> bool {
        debug!(cmd_id = id.cmd_id, index = id.item_index, "processing item for add");

        if self.large_object.is_some() {
            error!("already processing large object, aborting");
            return false;
        }

        let Some(mut item) = plugin.new_item() else {
            error!("could not create new item");
            return false;
        };

        item.set_key(local_key.clone());
        Self::apply_meta(item.as_mut(), meta);

        if item.write(0, data.as_bytes()).is_err() {
            error!("could not write to item");
            return false;
        }

        self.add_list.insert(id, item);
        true
    }

    /// Stage an item for replacement. An empty or unknown local key is
    /// transparently promoted to an addition, as allowed by the protocol.
    pub fn replace_item(
        &mut self,
        id: ItemId,
        plugin: &mut dyn StoragePlugin,
        local_key: &SyncItemKey,
        meta: &ItemMeta,
        data: &str,
    ) -> bool {
        debug!(cmd_id = id.cmd_id, index = id.item_index, "processing item for replace");

        if self.large_object.is_some() {
            error!("already processing large object, aborting");
            return false;
        }

        let existing = if local_key.is_empty() { None } else { plugin.get_item(local_key) };

        let Some(mut item) = existing else {
            debug!("could not find item, processing as add");
            return self.add_item(id, plugin, local_key, meta, data);
        };

        Self::apply_meta(item.as_mut(), meta);

        if item.resize(0).is_err() || item.write(0, data.as_bytes()).is_err() {
            error!("could not write to item");
            return false;
        }

        self.replace_list.insert(id, item);
        true
    }

    /// Stage a deletion.
    pub fn delete_item(&mut self, id: ItemId, local_key: &SyncItemKey) -> bool {
        debug!(cmd_id = id.cmd_id, index = id.item_index, "processing item for delete");

        if self.large_object.is_some() {
            error!("already processing large object, aborting");
            return false;
        }

        self.delete_list.insert(id, local_key.clone());
        true
    }

    /// Open a large-object assembly buffer for an addition.
    pub fn start_large_object_add(
        &mut self,
        plugin: &mut dyn StoragePlugin,
        remote_key: &SyncItemKey,
        meta: &ItemMeta,
        size: i64,
    ) -> bool {
        if self.large_object.is_some() {
            error!("already processing large object, aborting");
            return false;
        }

        let Some(mut item) = plugin.new_item() else {
            error!("could not create new item for large object");
            return false;
        };

        item.set_key(SyncItemKey::new());
        Self::apply_meta(item.as_mut(), meta);

        self.large_object = Some(item);
        self.large_object_size = size;
        self.large_object_key = remote_key.clone();
        debug!("large object created for addition");
        true
    }

    /// Open a large-object assembly buffer for a replacement. Falls back
    /// to the addition path when the local key is unknown.
    pub fn start_large_object_replace(
        &mut self,
        plugin: &mut dyn StoragePlugin,
        local_key: &SyncItemKey,
        meta: &ItemMeta,
        size: i64,
    ) -> bool {
        if self.large_object.is_some() {
            error!("already processing large object, aborting");
            return false;
        }

        let existing = if local_key.is_empty() { None } else { plugin.get_item(local_key) };

        let Some(mut item) = existing else {
            debug!("could not find item, processing large object as add");
            return self.start_large_object_add(plugin, local_key, meta, size);
        };

        Self::apply_meta(item.as_mut(), meta);
        if item.resize(0).is_err() {
            warn!("large object created for replace could not be truncated");
        }

        self.large_object = Some(item);
        self.large_object_size = size;
        self.large_object_key = local_key.clone();
        debug!("large object created for replace");
        true
    }

    pub fn building_large_object(&self) -> bool {
        self.large_object.is_some()
    }

    /// Expected total size announced on the first chunk; zero if none.
    pub fn large_object_size(&self) -> i64 {
        self.large_object_size
    }

    /// Verify continuity of the in-flight large object. On mismatch the
    /// buffer is discarded.
    pub fn matches_large_object(&mut self, key: &SyncItemKey) -> bool {
        if *key == self.large_object_key {
            true
        } else {
            self.discard_large_object();
            false
        }
    }

    /// Append a chunk to the in-flight large object. On write failure the
    /// buffer is discarded.
    pub fn append_large_object_data(&mut self, data: &[u8]) -> bool {
        let Some(item) = self.large_object.as_mut() else {
            error!("not building large object, aborting");
            return false;
        };

        let offset = item.size();
        if item.write(offset, data).is_ok() {
            true
        } else {
            error!("could not write to large object");
            self.discard_large_object();
            false
        }
    }

    /// Move the assembled large object into the matching staging queue.
    pub fn finish_large_object(&mut self, id: ItemId) -> bool {
        let Some(mut item) = self.large_object.take() else {
            error!("not building large object, aborting");
            return false;
        };

        let queue_as_add = item.key().is_empty();
        item.set_key(std::mem::take(&mut self.large_object_key));
        self.large_object_size = 0;

        if queue_as_add {
            debug!("queuing large object for addition");
            self.add_list.insert(id, item);
        } else {
            debug!("queuing large object for replace");
            self.replace_list.insert(id, item);
        }

        true
    }

    fn discard_large_object(&mut self) {
        self.large_object = None;
        self.large_object_size = 0;
        self.large_object_key.clear();
    }

    /// Run conflict resolution over staged items. Local wins drop the
    /// entry from the batch; remote wins revert the local change.
    fn resolve_item_conflicts(
        resolver: Option<&mut ConflictResolver<'_>>,
        list: &mut BTreeMap<ItemId, Box<dyn SyncItem>>,
        status: CommitStatus,
    ) -> BTreeMap<ItemId, CommitResult> {
        let mut results = BTreeMap::new();

        let Some(resolver) = resolver else {
            for (id, item) in list.iter() {
                results.insert(
                    *id,
                    CommitResult {
                        status,
                        conflict: CommitConflict::None,
                        item_key: item.key().clone(),
                    },
                );
            }
            return results;
        };

        let ids: Vec<ItemId> = list.keys().copied().collect();
        for id in ids {
            let key = list[&id].key().clone();
            debug!(cmd_id = id.cmd_id, index = id.item_index, "checking item for conflict");

            let conflict = if resolver.is_conflict(&key, false) {
                if resolver.local_side_wins() {
                    debug!("conflict resolved, local side wins");
                    list.remove(&id);
                    CommitConflict::LocalWin
                } else {
                    debug!("conflict resolved, remote side wins");
                    resolver.revert_local_change(&key, RevertPolicy::RemoveLocal);
                    CommitConflict::RemoteWin
                }
            } else {
                CommitConflict::None
            };

            results.insert(id, CommitResult { status, conflict, item_key: key });
        }

        results
    }

    fn resolve_delete_conflicts(
        resolver: Option<&mut ConflictResolver<'_>>,
        list: &mut BTreeMap<ItemId, SyncItemKey>,
    ) -> BTreeMap<ItemId, CommitResult> {
        let mut results = BTreeMap::new();

        let Some(resolver) = resolver else {
            for (id, key) in list.iter() {
                results.insert(
                    *id,
                    CommitResult {
                        status: CommitStatus::InitDelete,
                        conflict: CommitConflict::None,
                        item_key: key.clone(),
                    },
                );
            }
            return results;
        };

        let ids: Vec<ItemId> = list.keys().copied().collect();
        for id in ids {
            let key = list[&id].clone();

            let conflict = if resolver.is_conflict(&key, false) {
                if resolver.local_side_wins() {
                    debug!("delete conflict resolved, local side wins");
                    resolver.revert_local_change(&key, RevertPolicy::ModifyToAdd);
                    list.remove(&id);
                    CommitConflict::LocalWin
                } else {
                    debug!("delete conflict resolved, remote side wins");
                    resolver.revert_local_change(&key, RevertPolicy::RemoveLocal);
                    CommitConflict::RemoteWin
                }
            } else {
                CommitConflict::None
            };

            results.insert(
                id,
                CommitResult { status: CommitStatus::InitDelete, conflict, item_key: key },
            );
        }

        results
    }

    fn general_status(status: StorageStatus) -> CommitStatus {
        match status {
            StorageStatus::ObjectTooBig => CommitStatus::ItemTooBig,
            StorageStatus::StorageFull => CommitStatus::NotEnoughSpace,
            StorageStatus::InvalidFormat => CommitStatus::UnsupportedFormat,
            _ => CommitStatus::GeneralError,
        }
    }

    /// Commit the staged additions.
    pub fn commit_added_items(
        &mut self,
        plugin: &mut dyn StoragePlugin,
        resolver: Option<&mut ConflictResolver<'_>>,
        observer: &mut dyn SyncObserver,
    ) -> BTreeMap<ItemId, CommitResult> {
        let mut results =
            Self::resolve_item_conflicts(resolver, &mut self.add_list, CommitStatus::InitAdd);

        let ids: Vec<ItemId> = self.add_list.keys().copied().collect();
        let mut items: Vec<Box<dyn SyncItem>> =
            std::mem::take(&mut self.add_list).into_values().collect();

        debug!(count = items.len(), "committing added items");
        let statuses = plugin.add_items(&mut items);

        for ((id, item), status) in ids.iter().zip(items.iter()).zip(statuses) {
            let result = results.get_mut(id).expect("staged id has a result");
            result.item_key = item.key().clone();

            let (commit, modification) = match status {
                StorageStatus::Ok => (CommitStatus::Added, ModificationType::Added),
                StorageStatus::Duplicate => (CommitStatus::Duplicate, ModificationType::Added),
                other => (Self::general_status(other), ModificationType::Error),
            };
            result.status = commit;
            observer.item_processed(
                modification,
                ModifiedDatabase::Local,
                plugin.source_uri(),
                item.mime_type(),
            );
        }

        results
    }

    /// Commit the staged replacements.
    pub fn commit_replaced_items(
        &mut self,
        plugin: &mut dyn StoragePlugin,
        resolver: Option<&mut ConflictResolver<'_>>,
        observer: &mut dyn SyncObserver,
    ) -> BTreeMap<ItemId, CommitResult> {
        let mut results = Self::resolve_item_conflicts(
            resolver,
            &mut self.replace_list,
            CommitStatus::InitReplace,
        );

        let ids: Vec<ItemId> = self.replace_list.keys().copied().collect();
        let mut items: Vec<Box<dyn SyncItem>> =
            std::mem::take(&mut self.replace_list).into_values().collect();

        debug!(count = items.len(), "committing replaced items");
        let statuses = plugin.replace_items(&mut items);

        for ((id, item), status) in ids.iter().zip(items.iter()).zip(statuses) {
            let result = results.get_mut(id).expect("staged id has a result");

            let (commit, modification) = match status {
                StorageStatus::Ok => (CommitStatus::Replaced, ModificationType::Modified),
                StorageStatus::Duplicate => (CommitStatus::Duplicate, ModificationType::Modified),
                other => (Self::general_status(other), ModificationType::Error),
            };
            result.status = commit;
            observer.item_processed(
                modification,
                ModifiedDatabase::Local,
                plugin.source_uri(),
                item.mime_type(),
            );
        }

        results
    }

    /// Commit the staged deletions.
    pub fn commit_deleted_items(
        &mut self,
        plugin: &mut dyn StoragePlugin,
        resolver: Option<&mut ConflictResolver<'_>>,
        observer: &mut dyn SyncObserver,
    ) -> BTreeMap<ItemId, CommitResult> {
        let mut results = Self::resolve_delete_conflicts(resolver, &mut self.delete_list);

        let ids: Vec<ItemId> = self.delete_list.keys().copied().collect();
        let keys: Vec<SyncItemKey> = std::mem::take(&mut self.delete_list).into_values().collect();

        debug!(count = keys.len(), "committing deleted items");
        let statuses = plugin.delete_items(&keys);
        let mime_type = plugin.preferred_format().mime_type.clone();

        for (id, status) in ids.iter().zip(statuses) {
            let result = results.get_mut(id).expect("staged id has a result");

            let (commit, modification) = match status {
                StorageStatus::Ok => (CommitStatus::Deleted, ModificationType::Deleted),
                StorageStatus::NotFound => (CommitStatus::NotDeleted, ModificationType::Deleted),
                other => (Self::general_status(other), ModificationType::Error),
            };
            result.status = commit;
            observer.item_processed(
                modification,
                ModifiedDatabase::Local,
                plugin.source_uri(),
                &mime_type,
            );
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::LocalChanges;
    use crate::observer::NullObserver;
    use crate::storage::memory::MemoryStorage;
    use crate::types::ConflictPolicy;

    fn meta() -> ItemMeta {
        ItemMeta { mime_type: "text/x-vcard".into(), ..Default::default() }
    }

    #[test]
    fn add_then_commit_assigns_key() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(4, 0);

        assert!(handler.add_item(id, &mut storage, &String::new(), &meta(), "BEGIN:VCARD"));
        let results = handler.commit_added_items(&mut storage, None, &mut NullObserver);

        let result = &results[&id];
        assert_eq!(result.status, CommitStatus::Added);
        assert_eq!(result.conflict, CommitConflict::None);
        assert!(!result.item_key.is_empty());
        assert!(storage.contains(&result.item_key));
    }

    #[test]
    fn replace_of_unknown_key_promotes_to_add() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(4, 0);

        assert!(handler.replace_item(id, &mut storage, &"missing".to_string(), &meta(), "data"));
        let results = handler.commit_added_items(&mut storage, None, &mut NullObserver);
        assert_eq!(results[&id].status, CommitStatus::Added);
    }

    #[test]
    fn replace_existing_key_goes_to_replace_queue() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.seed("L1", b"old");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(5, 0);

        assert!(handler.replace_item(id, &mut storage, &"L1".to_string(), &meta(), "new"));
        let results = handler.commit_replaced_items(&mut storage, None, &mut NullObserver);
        assert_eq!(results[&id].status, CommitStatus::Replaced);
        assert_eq!(storage.item_data("L1").unwrap(), b"new");
    }

    #[test]
    fn delete_missing_item_is_not_deleted() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(6, 0);

        assert!(handler.delete_item(id, &"ghost".to_string()));
        let results = handler.commit_deleted_items(&mut storage, None, &mut NullObserver);
        assert_eq!(results[&id].status, CommitStatus::NotDeleted);
    }

    #[test]
    fn large_object_assembly() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(7, 0);

        assert!(handler.start_large_object_add(
            &mut storage,
            &"rk1".to_string(),
            &meta(),
            5000
        ));
        assert!(handler.building_large_object());
        assert!(handler.append_large_object_data(&vec![b'a'; 3500]));
        assert!(handler.matches_large_object(&"rk1".to_string()));
        assert!(handler.append_large_object_data(&vec![b'b'; 1500]));
        assert!(handler.finish_large_object(id));
        assert!(!handler.building_large_object());

        let results = handler.commit_added_items(&mut storage, None, &mut NullObserver);
        let result = &results[&id];
        assert_eq!(result.status, CommitStatus::Added);
        assert_eq!(storage.item_data(&result.item_key).unwrap().len(), 5000);
    }

    #[test]
    fn large_object_key_mismatch_discards_buffer() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        let mut handler = StorageHandler::new();

        assert!(handler.start_large_object_add(&mut storage, &"rk1".to_string(), &meta(), 100));
        assert!(!handler.matches_large_object(&"other".to_string()));
        assert!(!handler.building_large_object());
    }

    #[test]
    fn only_one_large_object_in_flight() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        let mut handler = StorageHandler::new();

        assert!(handler.start_large_object_add(&mut storage, &"rk1".to_string(), &meta(), 100));
        assert!(!handler.start_large_object_add(&mut storage, &"rk2".to_string(), &meta(), 100));
        assert!(!handler.add_item(
            ItemId::new(1, 0),
            &mut storage,
            &String::new(),
            &meta(),
            "x"
        ));
        assert!(!handler.delete_item(ItemId::new(1, 1), &"k".to_string()));
    }

    #[test]
    fn local_win_conflict_drops_replace_from_batch() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.seed("L1", b"local");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(8, 0);
        assert!(handler.replace_item(id, &mut storage, &"L1".to_string(), &meta(), "remote"));

        let mut local_changes = LocalChanges { modified: vec!["L1".into()], ..Default::default() };
        let mut resolver = ConflictResolver::new(&mut local_changes, ConflictPolicy::PreferLocal);
        let results =
            handler.commit_replaced_items(&mut storage, Some(&mut resolver), &mut NullObserver);

        let result = &results[&id];
        assert_eq!(result.conflict, CommitConflict::LocalWin);
        assert_eq!(result.status, CommitStatus::InitReplace);
        // Local data untouched, local change kept for upload.
        assert_eq!(storage.item_data("L1").unwrap(), b"local");
        assert_eq!(local_changes.modified, vec!["L1".to_string()]);
    }

    #[test]
    fn remote_win_conflict_commits_and_reverts_local_change() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.seed("L1", b"local");
        let mut handler = StorageHandler::new();
        let id = ItemId::new(9, 0);
        assert!(handler.replace_item(id, &mut storage, &"L1".to_string(), &meta(), "remote"));

        let mut local_changes = LocalChanges { modified: vec!["L1".into()], ..Default::default() };
        let mut resolver = ConflictResolver::new(&mut local_changes, ConflictPolicy::PreferRemote);
        let results =
            handler.commit_replaced_items(&mut storage, Some(&mut resolver), &mut NullObserver);

        let result = &results[&id];
        assert_eq!(result.conflict, CommitConflict::RemoteWin);
        assert_eq!(result.status, CommitStatus::Replaced);
        assert_eq!(storage.item_data("L1").unwrap(), b"remote");
        assert!(local_changes.is_empty());
    }

    #[test]
    fn storage_full_classifies_as_not_enough_space() {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        storage.fail_next(StorageStatus::StorageFull);
        let mut handler = StorageHandler::new();
        let id = ItemId::new(10, 0);
        assert!(handler.add_item(id, &mut storage, &String::new(), &meta(), "x"));

        let results = handler.commit_added_items(&mut storage, None, &mut NullObserver);
        assert_eq!(results[&id].status, CommitStatus::NotEnoughSpace);
    }
}

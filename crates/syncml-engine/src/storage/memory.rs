//! In-memory storage plugin, the reference backend for tests and
//! embedders without a persistent store.

use std::collections::BTreeMap;

use crate::item::{MemoryItem, SyncItem, SyncItemKey};
use crate::storage::plugin::{ContentFormat, StoragePlugin, StorageStatus};
use syncml_wire::ProtocolVersion;

#[derive(Debug)]
pub struct MemoryStorage {
    source_uri: String,
    formats: Vec<ContentFormat>,
    max_obj_size: i64,
    items: BTreeMap<SyncItemKey, MemoryItem>,
    next_key: u64,
    /// Keys changed since the last anchor, maintained by the test/embedder.
    new_since: Vec<SyncItemKey>,
    replaced_since: Vec<SyncItemKey>,
    deleted_since: Vec<SyncItemKey>,
    /// Force a failure status on the next mutating call.
    fail_next: Option<StorageStatus>,
}

impl MemoryStorage {
    pub fn new(source_uri: &str, mime_type: &str) -> MemoryStorage {
        MemoryStorage {
            source_uri: source_uri.to_string(),
            formats: vec![ContentFormat { mime_type: mime_type.to_string(), version: "2.1".into() }],
            max_obj_size: 10 * 1024 * 1024,
            items: BTreeMap::new(),
            next_key: 0,
            new_since: Vec::new(),
            replaced_since: Vec::new(),
            deleted_since: Vec::new(),
            fail_next: None,
        }
    }

    /// Seed an item with a fixed key, bypassing change tracking.
    pub fn seed(&mut self, key: &str, data: &[u8]) {
        let mime = self.formats[0].mime_type.clone();
        self.items.insert(key.to_string(), MemoryItem::with_data(key, &mime, data));
    }

    pub fn item_data(&self, key: &str) -> Option<&[u8]> {
        self.items.get(key).map(|item| item.data())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mark pending deltas reported by `get_modifications`.
    pub fn set_modifications(&mut self, new: &[&str], replaced: &[&str], deleted: &[&str]) {
        self.new_since = new.iter().map(|k| k.to_string()).collect();
        self.replaced_since = replaced.iter().map(|k| k.to_string()).collect();
        self.deleted_since = deleted.iter().map(|k| k.to_string()).collect();
    }

    pub fn fail_next(&mut self, status: StorageStatus) {
        self.fail_next = Some(status);
    }

    fn allocate_key(&mut self) -> SyncItemKey {
        loop {
            self.next_key += 1;
            let key = format!("local-{}", self.next_key);
            if !self.items.contains_key(&key) {
                return key;
            }
        }
    }

    fn take_failure(&mut self) -> Option<StorageStatus> {
        self.fail_next.take()
    }
}

impl StoragePlugin for MemoryStorage {
    fn source_uri(&self) -> &str {
        &self.source_uri
    }

    fn max_obj_size(&self) -> i64 {
        self.max_obj_size
    }

    fn supported_formats(&self) -> &[ContentFormat] {
        &self.formats
    }

    fn preferred_format(&self) -> &ContentFormat {
        &self.formats[0]
    }

    fn ct_caps_xml(&self, _version: ProtocolVersion) -> String {
        format!("<CTCap><CTType>{}</CTType></CTCap>", self.formats[0].mime_type)
    }

    fn get_all(&mut self) -> Result<Vec<SyncItemKey>, StorageStatus> {
        Ok(self.items.keys().cloned().collect())
    }

    fn get_modifications(
        &mut self,
        _since: &str,
    ) -> Result<(Vec<SyncItemKey>, Vec<SyncItemKey>, Vec<SyncItemKey>), StorageStatus> {
        Ok((self.new_since.clone(), self.replaced_since.clone(), self.deleted_since.clone()))
    }

    fn new_item(&mut self) -> Option<Box<dyn SyncItem>> {
        let mut item = MemoryItem::new();
        item.set_mime_type(self.formats[0].mime_type.clone());
        Some(Box::new(item))
    }

    fn get_item(&mut self, key: &SyncItemKey) -> Option<Box<dyn SyncItem>> {
        self.items.get(key).map(|item| Box::new(item.clone()) as Box<dyn SyncItem>)
    }

    fn get_items(&mut self, keys: &[SyncItemKey]) -> Vec<Option<Box<dyn SyncItem>>> {
        keys.iter().map(|key| self.get_item(key)).collect()
    }

    fn add_items(&mut self, items: &mut [Box<dyn SyncItem>]) -> Vec<StorageStatus> {
        let failure = self.take_failure();
        let mut statuses = Vec::with_capacity(items.len());

        for item in items {
            if let Some(status) = failure {
                statuses.push(status);
                continue;
            }
            if item.size() > self.max_obj_size {
                statuses.push(StorageStatus::ObjectTooBig);
                continue;
            }
            let key = self.allocate_key();
            item.set_key(key.clone());
            let data = item.read(0, item.size()).unwrap_or_default();
            let mut stored = MemoryItem::with_data(&key, item.mime_type(), &data);
            stored.set_parent_key(item.parent_key().clone());
            self.items.insert(key, stored);
            statuses.push(StorageStatus::Ok);
        }

        statuses
    }

    fn replace_items(&mut self, items: &mut [Box<dyn SyncItem>]) -> Vec<StorageStatus> {
        let failure = self.take_failure();
        let mut statuses = Vec::with_capacity(items.len());

        for item in items {
            if let Some(status) = failure {
                statuses.push(status);
                continue;
            }
            let key = item.key().clone();
            if key.is_empty() || !self.items.contains_key(&key) {
                statuses.push(StorageStatus::NotFound);
                continue;
            }
            let data = item.read(0, item.size()).unwrap_or_default();
            let mut stored = MemoryItem::with_data(&key, item.mime_type(), &data);
            stored.set_parent_key(item.parent_key().clone());
            self.items.insert(key, stored);
            statuses.push(StorageStatus::Ok);
        }

        statuses
    }

    fn delete_items(&mut self, keys: &[SyncItemKey]) -> Vec<StorageStatus> {
        let failure = self.take_failure();
        keys.iter()
            .map(|key| {
                if let Some(status) = failure {
                    return status;
                }
                if self.items.remove(key).is_some() {
                    StorageStatus::Ok
                } else {
                    StorageStatus::NotFound
                }
            })
            .collect()
    }
}

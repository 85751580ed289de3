//! Storage backend contract.

use crate::item::{SyncItem, SyncItemKey};
use syncml_wire::ProtocolVersion;

/// Outcome of one backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Ok,
    NotFound,
    Duplicate,
    Error,
    ObjectTooBig,
    StorageFull,
    InvalidFormat,
}

/// A content format the storage accepts or produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFormat {
    pub mime_type: String,
    pub version: String,
}

/// Provides items for the synchronization process.
///
/// Identified by its source URI; the server matches the URI a client
/// wishes to sync against, so URIs must be unique inside one device.
pub trait StoragePlugin: Send {
    fn source_uri(&self) -> &str;

    /// Largest item the storage accepts, in bytes.
    fn max_obj_size(&self) -> i64;

    /// All supported formats, preferred one included.
    fn supported_formats(&self) -> &[ContentFormat];

    fn preferred_format(&self) -> &ContentFormat;

    /// CTCap XML for the device information document, version specific.
    fn ct_caps_xml(&self, version: ProtocolVersion) -> String;

    /// Keys of every stored item.
    fn get_all(&mut self) -> Result<Vec<SyncItemKey>, StorageStatus>;

    /// Keys changed since `since` (an opaque anchor, typically a unix
    /// timestamp): `(new, replaced, deleted)`.
    fn get_modifications(
        &mut self,
        since: &str,
    ) -> Result<(Vec<SyncItemKey>, Vec<SyncItemKey>, Vec<SyncItemKey>), StorageStatus>;

    /// A fresh temporary item with no key and no data.
    fn new_item(&mut self) -> Option<Box<dyn SyncItem>>;

    fn get_item(&mut self, key: &SyncItemKey) -> Option<Box<dyn SyncItem>>;

    /// Batch fetch, positionally aligned with the requested keys.
    fn get_items(&mut self, keys: &[SyncItemKey]) -> Vec<Option<Box<dyn SyncItem>>>;

    /// Add items without keys; on `Ok` the backend assigns the key into
    /// the item.
    fn add_items(&mut self, items: &mut [Box<dyn SyncItem>]) -> Vec<StorageStatus>;

    fn replace_items(&mut self, items: &mut [Box<dyn SyncItem>]) -> Vec<StorageStatus>;

    fn delete_items(&mut self, keys: &[SyncItemKey]) -> Vec<StorageStatus>;
}

/// Hands out storage plugins for a session, by URI or by MIME type.
pub trait StorageProvider: Send {
    fn acquire_by_uri(&mut self, uri: &str) -> Option<Box<dyn StoragePlugin>>;

    fn acquire_by_mime(&mut self, mime_type: &str) -> Option<Box<dyn StoragePlugin>>;

    /// Called for every acquired storage on session teardown.
    fn release(&mut self, plugin: Box<dyn StoragePlugin>);
}

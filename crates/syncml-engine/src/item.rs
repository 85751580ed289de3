//! Synchronizable items.

use crate::error::SyncError;

/// Stable identifier of an item within its storage. Empty for temporary
/// items that have not been committed yet.
pub type SyncItemKey = String;

/// One synchronizable item. Content is accessed as a random-access byte
/// stream so large objects can be assembled and read in chunks.
pub trait SyncItem: Send {
    fn key(&self) -> &SyncItemKey;
    fn set_key(&mut self, key: SyncItemKey);

    fn parent_key(&self) -> &SyncItemKey;
    fn set_parent_key(&mut self, key: SyncItemKey);

    /// MIME type, e.g. `text/x-vcard`.
    fn mime_type(&self) -> &str;
    fn set_mime_type(&mut self, mime_type: String);

    /// Encoding label, e.g. `bin` or `b64`.
    fn format(&self) -> &str;
    fn set_format(&mut self, format: String);

    fn version(&self) -> &str;
    fn set_version(&mut self, version: String);

    fn size(&self) -> i64;
    fn read(&self, offset: i64, length: i64) -> Result<Vec<u8>, SyncError>;
    fn write(&mut self, offset: i64, data: &[u8]) -> Result<(), SyncError>;
    fn resize(&mut self, length: i64) -> Result<(), SyncError>;
}

/// Plain in-memory item, the default concrete `SyncItem`.
#[derive(Debug, Clone, Default)]
pub struct MemoryItem {
    key: SyncItemKey,
    parent_key: SyncItemKey,
    mime_type: String,
    format: String,
    version: String,
    data: Vec<u8>,
}

impl MemoryItem {
    pub fn new() -> MemoryItem {
        MemoryItem::default()
    }

    pub fn with_data(key: &str, mime_type: &str, data: &[u8]) -> MemoryItem {
        MemoryItem {
            key: key.to_string(),
            mime_type: mime_type.to_string(),
            data: data.to_vec(),
            ..Default::default()
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl SyncItem for MemoryItem {
    fn key(&self) -> &SyncItemKey {
        &self.key
    }

    fn set_key(&mut self, key: SyncItemKey) {
        self.key = key;
    }

    fn parent_key(&self) -> &SyncItemKey {
        &self.parent_key
    }

    fn set_parent_key(&mut self, key: SyncItemKey) {
        self.parent_key = key;
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn set_mime_type(&mut self, mime_type: String) {
        self.mime_type = mime_type;
    }

    fn format(&self) -> &str {
        &self.format
    }

    fn set_format(&mut self, format: String) {
        self.format = format;
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn set_version(&mut self, version: String) {
        self.version = version;
    }

    fn size(&self) -> i64 {
        self.data.len() as i64
    }

    fn read(&self, offset: i64, length: i64) -> Result<Vec<u8>, SyncError> {
        let start = offset.max(0) as usize;
        if start > self.data.len() {
            return Err(SyncError::Storage(format!(
                "read offset {start} past end of item ({} bytes)",
                self.data.len()
            )));
        }
        let end = (start + length.max(0) as usize).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }

    fn write(&mut self, offset: i64, data: &[u8]) -> Result<(), SyncError> {
        let start = offset.max(0) as usize;
        if start > self.data.len() {
            return Err(SyncError::Storage(format!(
                "write offset {start} past end of item ({} bytes)",
                self.data.len()
            )));
        }
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, length: i64) -> Result<(), SyncError> {
        self.data.resize(length.max(0) as usize, 0);
        Ok(())
    }
}

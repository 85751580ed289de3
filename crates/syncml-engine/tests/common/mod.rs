//! Shared fixtures: storages and persistence handles that stay
//! inspectable after the session released them, plus a loopback driver
//! that runs a client and a server session against each other.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use syncml_engine::config::{DatastoreRoute, SyncConfig};
use syncml_engine::devinf::DeviceInfo;
use syncml_engine::error::SyncError;
use syncml_engine::item::{SyncItem, SyncItemKey};
use syncml_engine::observer::SyncObserver;
use syncml_engine::persist::{ChangeLogRecord, MemoryStore, NonceStore, SyncStateStore};
use syncml_engine::session::{SessionHandler, SessionStep};
use syncml_engine::storage::{ContentFormat, MemoryStorage, StoragePlugin, StorageProvider, StorageStatus};
use syncml_engine::types::{ModificationType, ModifiedDatabase, Role, SyncState};
use syncml_engine::SyncDirection;
use syncml_wire::ProtocolVersion;

pub const VCARD: &str = "text/x-vcard";

/// Storage plugin sharing its backing store with the test.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<MemoryStorage>>,
    source_uri: String,
    formats: Vec<ContentFormat>,
}

impl SharedStorage {
    pub fn new(source_uri: &str, mime_type: &str) -> SharedStorage {
        let inner = MemoryStorage::new(source_uri, mime_type);
        let formats = inner.supported_formats().to_vec();
        SharedStorage {
            inner: Arc::new(Mutex::new(inner)),
            source_uri: source_uri.to_string(),
            formats,
        }
    }

    pub fn seed(&self, key: &str, data: &[u8]) {
        self.inner.lock().unwrap().seed(key, data);
    }

    pub fn set_modifications(&self, new: &[&str], replaced: &[&str], deleted: &[&str]) {
        self.inner.lock().unwrap().set_modifications(new, replaced, deleted);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains(key)
    }

    pub fn item_data(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().item_data(key).map(|d| d.to_vec())
    }

    pub fn all_data(&self) -> Vec<Vec<u8>> {
        let mut storage = self.inner.lock().unwrap();
        let keys = storage.get_all().unwrap();
        keys.iter().filter_map(|k| storage.item_data(k).map(|d| d.to_vec())).collect()
    }
}

impl StoragePlugin for SharedStorage {
    fn source_uri(&self) -> &str {
        &self.source_uri
    }

    fn max_obj_size(&self) -> i64 {
        self.inner.lock().unwrap().max_obj_size()
    }

    fn supported_formats(&self) -> &[ContentFormat] {
        &self.formats
    }

    fn preferred_format(&self) -> &ContentFormat {
        &self.formats[0]
    }

    fn ct_caps_xml(&self, version: ProtocolVersion) -> String {
        self.inner.lock().unwrap().ct_caps_xml(version)
    }

    fn get_all(&mut self) -> Result<Vec<SyncItemKey>, StorageStatus> {
        self.inner.lock().unwrap().get_all()
    }

    fn get_modifications(
        &mut self,
        since: &str,
    ) -> Result<(Vec<SyncItemKey>, Vec<SyncItemKey>, Vec<SyncItemKey>), StorageStatus> {
        self.inner.lock().unwrap().get_modifications(since)
    }

    fn new_item(&mut self) -> Option<Box<dyn SyncItem>> {
        self.inner.lock().unwrap().new_item()
    }

    fn get_item(&mut self, key: &SyncItemKey) -> Option<Box<dyn SyncItem>> {
        self.inner.lock().unwrap().get_item(key)
    }

    fn get_items(&mut self, keys: &[SyncItemKey]) -> Vec<Option<Box<dyn SyncItem>>> {
        self.inner.lock().unwrap().get_items(keys)
    }

    fn add_items(&mut self, items: &mut [Box<dyn SyncItem>]) -> Vec<StorageStatus> {
        self.inner.lock().unwrap().add_items(items)
    }

    fn replace_items(&mut self, items: &mut [Box<dyn SyncItem>]) -> Vec<StorageStatus> {
        self.inner.lock().unwrap().replace_items(items)
    }

    fn delete_items(&mut self, keys: &[SyncItemKey]) -> Vec<StorageStatus> {
        self.inner.lock().unwrap().delete_items(keys)
    }
}

/// Provider handing out clones of shared storages, by URI or MIME.
pub struct SharedProvider {
    storages: Vec<SharedStorage>,
}

impl SharedProvider {
    pub fn new(storages: Vec<SharedStorage>) -> SharedProvider {
        SharedProvider { storages }
    }
}

impl StorageProvider for SharedProvider {
    fn acquire_by_uri(&mut self, uri: &str) -> Option<Box<dyn StoragePlugin>> {
        self.storages
            .iter()
            .find(|s| s.source_uri == uri)
            .map(|s| Box::new(s.clone()) as Box<dyn StoragePlugin>)
    }

    fn acquire_by_mime(&mut self, mime_type: &str) -> Option<Box<dyn StoragePlugin>> {
        self.storages
            .iter()
            .find(|s| s.formats[0].mime_type == mime_type)
            .map(|s| Box::new(s.clone()) as Box<dyn StoragePlugin>)
    }

    fn release(&mut self, _plugin: Box<dyn StoragePlugin>) {}
}

/// Persistence handle shared between the session and the test.
#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub fn new() -> SharedStore {
        SharedStore::default()
    }

    pub fn seed_changelog(
        &self,
        remote_device: &str,
        source_db: &str,
        record: ChangeLogRecord,
    ) {
        self.0
            .lock()
            .unwrap()
            .save_changelog(remote_device, source_db, SyncDirection::TwoWay, &record)
            .unwrap();
    }

    pub fn changelog(&self, remote_device: &str, source_db: &str) -> Option<ChangeLogRecord> {
        self.0
            .lock()
            .unwrap()
            .load_changelog(remote_device, source_db, SyncDirection::TwoWay)
            .unwrap()
    }

    pub fn nonce(&self, issuer: &str, target: &str) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get_nonce(issuer, target).unwrap()
    }
}

impl NonceStore for SharedStore {
    fn upsert_nonce(&mut self, issuer: &str, target: &str, nonce: &[u8]) -> Result<(), SyncError> {
        self.0.lock().unwrap().upsert_nonce(issuer, target, nonce)
    }

    fn get_nonce(&self, issuer: &str, target: &str) -> Result<Option<Vec<u8>>, SyncError> {
        self.0.lock().unwrap().get_nonce(issuer, target)
    }

    fn clear_nonce(&mut self, issuer: &str, target: &str) -> Result<(), SyncError> {
        self.0.lock().unwrap().clear_nonce(issuer, target)
    }
}

impl SyncStateStore for SharedStore {
    fn load_changelog(
        &self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
    ) -> Result<Option<ChangeLogRecord>, SyncError> {
        self.0.lock().unwrap().load_changelog(remote_device, source_db, direction)
    }

    fn save_changelog(
        &mut self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
        record: &ChangeLogRecord,
    ) -> Result<(), SyncError> {
        self.0.lock().unwrap().save_changelog(remote_device, source_db, direction, record)
    }
}

/// Observer recording callbacks behind a shared handle.
#[derive(Clone, Default)]
pub struct SharedObserver {
    pub states: Arc<Mutex<Vec<SyncState>>>,
    pub finished: Arc<Mutex<Vec<(String, SyncState, String)>>>,
    pub items: Arc<Mutex<Vec<(ModificationType, ModifiedDatabase, String)>>>,
}

impl SyncObserver for SharedObserver {
    fn sync_state_changed(&mut self, state: SyncState) {
        self.states.lock().unwrap().push(state);
    }

    fn sync_finished(&mut self, remote_device: &str, state: SyncState, description: &str) {
        self.finished.lock().unwrap().push((
            remote_device.to_string(),
            state,
            description.to_string(),
        ));
    }

    fn item_processed(
        &mut self,
        modification: ModificationType,
        database: ModifiedDatabase,
        database_uri: &str,
        _mime_type: &str,
    ) {
        self.items.lock().unwrap().push((modification, database, database_uri.to_string()));
    }
}

pub fn client_config(uri: &str) -> SyncConfig {
    SyncConfig {
        local_device: "IMEI:000000".into(),
        remote_device: "PC Suite".into(),
        datastores: vec![DatastoreRoute { source_db: uri.into(), target_db: uri.into() }],
        ..Default::default()
    }
}

pub fn server_config(uri: &str) -> SyncConfig {
    SyncConfig {
        local_device: "PC Suite".into(),
        remote_device: "IMEI:000000".into(),
        datastores: vec![DatastoreRoute { source_db: uri.into(), target_db: uri.into() }],
        ..Default::default()
    }
}

pub fn device_info(id: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: id.into(),
        manufacturer: "syncml-rs".into(),
        model: "test".into(),
        device_type: "workstation".into(),
        ..Default::default()
    }
}

pub fn make_session(
    config: SyncConfig,
    role: Role,
    storages: Vec<SharedStorage>,
    store: SharedStore,
    observer: SharedObserver,
    clock: i64,
) -> SessionHandler {
    let device_id = if role == Role::Client { "IMEI:000000" } else { "PC Suite" };
    SessionHandler::new(
        config,
        role,
        device_info(device_id),
        Box::new(SharedProvider::new(storages)),
        Box::new(store),
        Box::new(observer),
    )
    .with_clock(Box::new(move || clock))
}

/// Run a client and a server session against each other, returning the
/// full transcript (direction, bytes) of every message exchanged.
pub fn loopback(
    client: &mut SessionHandler,
    server: &mut SessionHandler,
) -> Vec<(Role, Vec<u8>)> {
    client.start_client().expect("client start");
    server.serve();

    let mut transcript = Vec::new();
    let mut message = client.generate_message().expect("client first message");
    transcript.push((Role::Client, message.clone()));

    for _ in 0..32 {
        let server_step = server.handle_message(&message).expect("server handles message");

        if server_step != SessionStep::Respond {
            break;
        }
        let response = server.generate_message().expect("server response");
        transcript.push((Role::Server, response.clone()));

        let client_step = client.handle_message(&response).expect("client handles response");
        if client_step != SessionStep::Respond || client.is_finished() {
            break;
        }

        message = client.generate_message().expect("client next message");
        transcript.push((Role::Client, message.clone()));
    }

    transcript
}

/// Parse a transcript message back into fragments for assertions.
pub fn parse(bytes: &[u8]) -> syncml_wire::ParsedMessage {
    syncml_wire::parse_message(bytes).expect("transcript message parses")
}

//! Outbound packages: producers of protocol content that may span several
//! wire messages, drained by the response generator.

use tracing::{debug, warn};

use crate::auth::{encode_basic_auth, encode_md5_auth_b64};
use crate::conflict::LocalChanges;
use crate::devinf::{device_info_document, DevInfShape, DeviceInfo};
use crate::error::SyncError;
use crate::item::SyncItemKey;
use crate::storage::plugin::StoragePlugin;
use crate::target::{SyncTarget, UidMapping};
use crate::types::{AuthType, ModificationType, Role};
use syncml_wire::build;
use syncml_wire::consts::{
    SYNCML_FORMAT_AUTH_BASIC, SYNCML_FORMAT_AUTH_MD5, SYNCML_FORMAT_ENCODING_B64,
};
use syncml_wire::{AlertCode, CommandType, Message, ProtocolVersion};

/// Reference to an item written into an outbound message, kept until the
/// remote acknowledges it with a Status.
#[derive(Debug, Clone)]
pub struct ItemReference {
    pub msg_id: u32,
    pub cmd_id: u32,
    pub key: SyncItemKey,
    pub modification: ModificationType,
    pub local_db: String,
    pub remote_db: String,
    pub mime_type: String,
}

/// Reference to a Map command written into an outbound message.
#[derive(Debug, Clone)]
pub struct MapReference {
    pub msg_id: u32,
    pub cmd_id: u32,
    pub local_db: String,
    pub remote_db: String,
}

/// Session state packages may consult while writing.
pub struct PackageContext<'a> {
    pub targets: &'a mut Vec<SyncTarget>,
    pub storages: &'a mut Vec<Box<dyn StoragePlugin>>,
    pub role: Role,
    pub version: ProtocolVersion,
    pub device_info: &'a DeviceInfo,
    pub item_refs: &'a mut Vec<ItemReference>,
    pub map_refs: &'a mut Vec<MapReference>,
}

impl PackageContext<'_> {
    fn target_index(&self, source_db: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.source_db() == source_db)
    }
}

/// Offset bookkeeping for a large object being sent in chunks.
#[derive(Debug, Clone, Default)]
struct OutboundLargeObject {
    key: SyncItemKey,
    size: i64,
    offset: i64,
}

/// A unit of outbound protocol content. `write` is called once per message
/// until it reports completion.
pub enum Package {
    Alert(AlertPackage),
    Authentication(AuthenticationPackage),
    DevInf(DevInfPackage),
    LocalChanges(LocalChangesPackage),
    LocalMappings(LocalMappingsPackage),
    Final,
}

impl Package {
    /// Serialize into `message` within `remaining` estimated bytes, which
    /// is decreased by what was written. Returns true when the package is
    /// exhausted and may be dropped from the queue.
    pub fn write(
        &mut self,
        message: &mut Message,
        remaining: &mut i64,
        ctx: &mut PackageContext<'_>,
    ) -> Result<bool, SyncError> {
        match self {
            Package::Alert(package) => package.write(message, remaining),
            Package::Authentication(package) => package.write(message, remaining),
            Package::DevInf(package) => package.write(message, remaining, ctx),
            Package::LocalChanges(package) => package.write(message, remaining, ctx),
            Package::LocalMappings(package) => package.write(message, remaining, ctx),
            Package::Final => {
                let element = build::final_element();
                *remaining -= element.size_estimate() as i64;
                message.add_to_body(element);
                Ok(true)
            }
        }
    }
}

/// One Alert element, with optional databases and anchors.
#[derive(Debug, Clone)]
pub struct AlertPackage {
    pub code: AlertCode,
    pub source_db: Option<String>,
    pub target_db: Option<String>,
    pub last_anchor: Option<String>,
    pub next_anchor: Option<String>,
    /// Set for DS 1.1 server-alerted Alerts that identify the local
    /// database by MIME type.
    pub mime_type: Option<String>,
}

impl AlertPackage {
    pub fn code_only(code: AlertCode) -> AlertPackage {
        AlertPackage {
            code,
            source_db: None,
            target_db: None,
            last_anchor: None,
            next_anchor: None,
            mime_type: None,
        }
    }

    pub fn databases(code: AlertCode, source_db: &str, target_db: &str) -> AlertPackage {
        AlertPackage {
            code,
            source_db: Some(source_db.to_string()),
            target_db: Some(target_db.to_string()),
            last_anchor: None,
            next_anchor: None,
            mime_type: None,
        }
    }

    pub fn sync_mode(
        code: AlertCode,
        source_db: &str,
        target_db: &str,
        last_anchor: &str,
        next_anchor: &str,
    ) -> AlertPackage {
        AlertPackage {
            code,
            source_db: Some(source_db.to_string()),
            target_db: Some(target_db.to_string()),
            last_anchor: Some(last_anchor.to_string()),
            next_anchor: Some(next_anchor.to_string()),
            mime_type: None,
        }
    }

    pub fn server_alerted(code: AlertCode, source_db: &str, mime_type: &str) -> AlertPackage {
        AlertPackage {
            code,
            source_db: Some(source_db.to_string()),
            target_db: None,
            last_anchor: None,
            next_anchor: None,
            mime_type: Some(mime_type.to_string()),
        }
    }

    fn write(&mut self, message: &mut Message, remaining: &mut i64) -> Result<bool, SyncError> {
        let cmd_id = message.next_cmd_id();
        let element = if let Some(mime_type) = &self.mime_type {
            build::server_alert(cmd_id, self.code, self.source_db.as_deref().unwrap_or(""), mime_type)
        } else {
            build::alert(
                cmd_id,
                self.code,
                self.source_db.as_deref(),
                self.target_db.as_deref(),
                self.last_anchor.as_deref(),
                self.next_anchor.as_deref(),
            )
        };
        *remaining -= element.size_estimate() as i64;
        message.add_to_body(element);
        Ok(true)
    }
}

/// Credentials in the message header.
#[derive(Debug, Clone)]
pub struct AuthenticationPackage {
    pub auth_type: AuthType,
    pub username: String,
    pub password: String,
    pub nonce: Option<Vec<u8>>,
}

impl AuthenticationPackage {
    fn write(&mut self, message: &mut Message, remaining: &mut i64) -> Result<bool, SyncError> {
        let element = match self.auth_type {
            AuthType::Basic => build::cred(
                SYNCML_FORMAT_AUTH_BASIC,
                SYNCML_FORMAT_ENCODING_B64,
                &encode_basic_auth(&self.username, &self.password),
            ),
            AuthType::Md5 => {
                let nonce = self.nonce.clone().unwrap_or_default();
                build::cred(
                    SYNCML_FORMAT_AUTH_MD5,
                    SYNCML_FORMAT_ENCODING_B64,
                    &encode_md5_auth_b64(&self.username, &self.password, &nonce),
                )
            }
            AuthType::None => {
                return Err(SyncError::Internal(
                    "authentication package queued without an auth type".into(),
                ))
            }
        };

        *remaining -= element.size_estimate() as i64;
        message.add_to_header(element);
        Ok(true)
    }
}

/// Device information exchange in one of its three shapes.
#[derive(Debug, Clone)]
pub struct DevInfPackage {
    pub shape: DevInfShape,
}

impl DevInfPackage {
    fn write(
        &mut self,
        message: &mut Message,
        remaining: &mut i64,
        ctx: &mut PackageContext<'_>,
    ) -> Result<bool, SyncError> {
        let document =
            device_info_document(ctx.device_info, ctx.storages, ctx.version, ctx.role);

        match self.shape {
            DevInfShape::PutGet => {
                let put = build::devinf_put(message.next_cmd_id(), document, ctx.version);
                *remaining -= put.size_estimate() as i64;
                message.add_to_body(put);

                let get = build::devinf_get(message.next_cmd_id(), ctx.version);
                *remaining -= get.size_estimate() as i64;
                message.add_to_body(get);
            }
            DevInfShape::Results { msg_ref, cmd_ref } => {
                let results = build::devinf_results(
                    message.next_cmd_id(),
                    msg_ref,
                    cmd_ref,
                    document,
                    ctx.version,
                );
                *remaining -= results.size_estimate() as i64;
                message.add_to_body(results);
            }
            DevInfShape::ResultsGet { msg_ref, cmd_ref } => {
                let results = build::devinf_results(
                    message.next_cmd_id(),
                    msg_ref,
                    cmd_ref,
                    document,
                    ctx.version,
                );
                *remaining -= results.size_estimate() as i64;
                message.add_to_body(results);

                let get = build::devinf_get(message.next_cmd_id(), ctx.version);
                *remaining -= get.size_estimate() as i64;
                message.add_to_body(get);
            }
        }

        Ok(true)
    }
}

/// Local modifications of one target, written as `<Sync>` wrappers with up
/// to `max_changes_per_message` item commands per message. Items above the
/// large-object threshold are chunked across messages with `MoreData`.
pub struct LocalChangesPackage {
    source_db: String,
    target_db: String,
    changes: LocalChanges,
    number_of_changes: usize,
    large_object_threshold: i64,
    role: Role,
    max_changes_per_message: usize,
    large_object: OutboundLargeObject,
}

impl LocalChangesPackage {
    pub fn new(
        target: &SyncTarget,
        changes: LocalChanges,
        large_object_threshold: i64,
        role: Role,
        max_changes_per_message: usize,
    ) -> LocalChangesPackage {
        let number_of_changes = changes.len();
        LocalChangesPackage {
            source_db: target.source_db().to_string(),
            target_db: target.target_db().to_string(),
            changes,
            number_of_changes,
            large_object_threshold,
            role,
            max_changes_per_message,
            large_object: OutboundLargeObject::default(),
        }
    }

    pub fn source_db(&self) -> &str {
        &self.source_db
    }

    fn write(
        &mut self,
        message: &mut Message,
        remaining: &mut i64,
        ctx: &mut PackageContext<'_>,
    ) -> Result<bool, SyncError> {
        let sync_cmd_id = message.next_cmd_id();
        let mut sync = build::sync(
            sync_cmd_id,
            &self.target_db,
            &self.source_db,
            Some(self.number_of_changes),
        );
        *remaining -= sync.size_estimate() as i64;

        let mut budget = self.max_changes_per_message;

        if self.number_of_changes > 0 {
            self.process_changes(message, &mut sync, remaining, &mut budget, ctx)?;
        }

        message.add_to_body(sync);

        debug!(
            total = self.number_of_changes,
            written = self.max_changes_per_message - budget,
            "wrote local changes"
        );

        Ok(self.changes.is_empty())
    }

    fn process_changes(
        &mut self,
        message: &mut Message,
        sync: &mut syncml_wire::Element,
        remaining: &mut i64,
        budget: &mut usize,
        ctx: &mut PackageContext<'_>,
    ) -> Result<(), SyncError> {
        for modification in
            [ModificationType::Added, ModificationType::Modified, ModificationType::Deleted]
        {
            loop {
                let key = {
                    let list = self.change_list(modification);
                    if list.is_empty() || *budget == 0 || *remaining <= 0 {
                        break;
                    }
                    list[0].clone()
                };

                let cmd_id = message.next_cmd_id();
                let (element, processed, mime_type) =
                    self.write_item(cmd_id, &key, modification, *remaining, ctx)?;
                *remaining -= element.size_estimate() as i64;
                sync.add_child(element);

                if processed {
                    ctx.item_refs.push(ItemReference {
                        msg_id: message.msg_id(),
                        cmd_id,
                        key: key.clone(),
                        modification,
                        local_db: self.source_db.clone(),
                        remote_db: self.target_db.clone(),
                        mime_type,
                    });
                    self.change_list(modification).remove(0);
                    *budget -= 1;
                } else {
                    // Chunk written; the item stays at the head and the
                    // rest of the package waits for the next message.
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn change_list(&mut self, modification: ModificationType) -> &mut Vec<SyncItemKey> {
        match modification {
            ModificationType::Added => &mut self.changes.added,
            ModificationType::Modified => &mut self.changes.modified,
            _ => &mut self.changes.removed,
        }
    }

    fn command_type(modification: ModificationType) -> CommandType {
        match modification {
            ModificationType::Added => CommandType::Add,
            ModificationType::Modified => CommandType::Replace,
            _ => CommandType::Delete,
        }
    }

    /// Build one item command. Returns the element, whether the item was
    /// fully written, and its MIME type.
    fn write_item(
        &mut self,
        cmd_id: u32,
        key: &SyncItemKey,
        modification: ModificationType,
        size_budget: i64,
        ctx: &mut PackageContext<'_>,
    ) -> Result<(syncml_wire::Element, bool, String), SyncError> {
        let target_index = ctx
            .target_index(&self.source_db)
            .ok_or_else(|| SyncError::Internal(format!("no target for {}", self.source_db)))?;

        // Item addressing: an Add always carries our key as Source. For
        // Replace/Delete a server addresses the remote's own key via
        // Target, a client its local key via Source.
        let mut source: Option<String> = None;
        let mut target: Option<String> = None;

        if modification == ModificationType::Added || self.role == Role::Client {
            source = Some(key.clone());
        } else {
            let mapped = ctx.targets[target_index].map_to_remote_uid(key).map(str::to_string);
            match mapped {
                Some(remote) => target = Some(remote),
                None => debug!(key = %key, "no mapping to remote uid for local key"),
            }
        }

        if modification == ModificationType::Deleted {
            // Delete commands carry no item data.
            let command = build::item_command(Self::command_type(modification), cmd_id, None);
            let spec = build::ItemSpec {
                source: source.as_deref(),
                target: target.as_deref(),
                ..Default::default()
            };
            let command = command.child(build::item(&spec));
            return Ok((command, true, String::new()));
        }

        let storage_index = ctx.targets[target_index].storage;
        let item = ctx.storages[storage_index].get_item(key);

        let Some(item) = item else {
            warn!(key = %key, "could not retrieve item data");
            let command = build::item_command(Self::command_type(modification), cmd_id, None);
            return Ok((command, true, String::new()));
        };

        let mime_type = item.mime_type().to_string();
        let size = item.size();

        // Parent addressing mirrors item addressing.
        let mut source_parent: Option<String> = None;
        let mut target_parent: Option<String> = None;
        if !item.parent_key().is_empty() {
            let parent = item.parent_key().clone();
            if self.role == Role::Server {
                match ctx.targets[target_index].map_to_remote_uid(&parent) {
                    Some(remote) => target_parent = Some(remote.to_string()),
                    None => source_parent = Some(parent),
                }
            } else {
                source_parent = Some(parent);
            }
        }

        let mut processed = false;
        let mut more_data = false;
        let mut announce_size = None;
        let data;

        if size > self.large_object_threshold {
            if self.large_object.key != *key {
                self.large_object =
                    OutboundLargeObject { key: key.clone(), size, offset: 0 };
            }

            let data_left = self.large_object.size - self.large_object.offset;
            let chunk = size_budget.max(0);

            if chunk < data_left {
                data = item.read(self.large_object.offset, chunk)?;
                announce_size = Some(size);
                more_data = true;
                self.large_object.offset += chunk;
            } else {
                data = item.read(self.large_object.offset, data_left)?;
                self.large_object.offset += data_left;
                processed = true;
            }
        } else {
            data = item.read(0, size)?;
            processed = true;
        }

        let data = String::from_utf8_lossy(&data).into_owned();
        let spec = build::ItemSpec {
            source: source.as_deref(),
            target: target.as_deref(),
            source_parent: source_parent.as_deref(),
            target_parent: target_parent.as_deref(),
            size: announce_size,
            data: Some(&data),
            more_data,
        };

        let command = build::item_command(Self::command_type(modification), cmd_id, Some(&mime_type))
            .child(build::item(&spec));

        Ok((command, processed, mime_type))
    }
}

/// UID mappings for one target, written as `<Map>` with at least one
/// `<MapItem>` per message.
#[derive(Debug, Clone)]
pub struct LocalMappingsPackage {
    source_db: String,
    target_db: String,
    mappings: Vec<UidMapping>,
}

impl LocalMappingsPackage {
    pub fn new(source_db: &str, target_db: &str, mappings: Vec<UidMapping>) -> Self {
        LocalMappingsPackage {
            source_db: source_db.to_string(),
            target_db: target_db.to_string(),
            mappings,
        }
    }

    fn write(
        &mut self,
        message: &mut Message,
        remaining: &mut i64,
        ctx: &mut PackageContext<'_>,
    ) -> Result<bool, SyncError> {
        if !self.mappings.is_empty() {
            let cmd_id = message.next_cmd_id();
            let mut map = build::map(cmd_id, &self.target_db, &self.source_db);
            *remaining -= map.size_estimate() as i64;

            // At least one map item goes out per message. The remote's
            // own id travels as Target, our local id as Source.
            loop {
                let mapping = self.mappings.remove(0);
                let item = build::map_item(&mapping.remote_uid, &mapping.local_uid);
                *remaining -= item.size_estimate() as i64;
                map.add_child(item);
                if *remaining <= 0 || self.mappings.is_empty() {
                    break;
                }
            }

            ctx.map_refs.push(MapReference {
                msg_id: message.msg_id(),
                cmd_id,
                local_db: self.source_db.clone(),
                remote_db: self.target_db.clone(),
            });

            message.add_to_body(map);
        }

        Ok(self.mappings.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use syncml_wire::consts as c;
    use syncml_wire::{HeaderParams, SyncMode};

    fn message() -> Message {
        let header = HeaderParams {
            ver_dtd: "1.2".into(),
            session_id: "1".into(),
            msg_id: 1,
            ..Default::default()
        };
        Message::new(&header, ProtocolVersion::Ds12)
    }

    fn context_fixture(
        seeded: &[(&str, &[u8])],
    ) -> (Vec<SyncTarget>, Vec<Box<dyn StoragePlugin>>, DeviceInfo) {
        let mut storage = MemoryStorage::new("./contacts", "text/x-vcard");
        for (key, data) in seeded {
            storage.seed(key, data);
        }
        let mut target = SyncTarget::new(0, "./contacts", SyncMode::default(), "200", None);
        target.set_target_db("./remote/contacts");
        (vec![target], vec![Box::new(storage)], DeviceInfo::default())
    }

    #[test]
    fn alert_package_writes_one_alert() {
        let mut message = message();
        let mut remaining = 10_000i64;
        let mut package =
            AlertPackage::sync_mode(201, "./contacts", "./remote/contacts", "100", "200");
        assert!(package.write(&mut message, &mut remaining).unwrap());
        assert!(remaining < 10_000);

        let element = message.to_element();
        let body = element.find(c::E_SYNCBODY).unwrap();
        let alert = body.find(c::E_ALERT).unwrap();
        assert_eq!(alert.find(c::E_DATA).unwrap().value, "201");
    }

    #[test]
    fn local_changes_package_writes_sync_with_commands() {
        let (mut targets, mut storages, device_info) =
            context_fixture(&[("k1", b"vcard-1"), ("k2", b"vcard-2")]);
        let mut item_refs = Vec::new();
        let mut map_refs = Vec::new();
        let mut ctx = PackageContext {
            targets: &mut targets,
            storages: &mut storages,
            role: Role::Client,
            version: ProtocolVersion::Ds12,
            device_info: &device_info,
            item_refs: &mut item_refs,
            map_refs: &mut map_refs,
        };

        let changes = LocalChanges {
            added: vec!["k1".into()],
            modified: vec!["k2".into()],
            removed: vec!["gone".into()],
        };
        let mut package = Package::LocalChanges(LocalChangesPackage::new(
            &ctx.targets[0],
            changes,
            100_000,
            Role::Client,
            22,
        ));

        let mut message = message();
        let mut remaining = 100_000i64;
        let done = package.write(&mut message, &mut remaining, &mut ctx).unwrap();
        assert!(done);
        assert_eq!(item_refs.len(), 3);

        let element = message.to_element();
        let sync = element.find(c::E_SYNCBODY).unwrap().find(c::E_SYNC).unwrap();
        assert_eq!(sync.find(c::E_NUMBEROFCHANGES).unwrap().value, "3");
        assert!(sync.find(c::E_ADD).is_some());
        assert!(sync.find(c::E_REPLACE).is_some());
        let delete = sync.find(c::E_DELETE).unwrap();
        // Delete carries no data.
        assert!(delete.find(c::E_ITEM).unwrap().find(c::E_DATA).is_none());
    }

    #[test]
    fn local_changes_honors_max_changes_per_message() {
        let (mut targets, mut storages, device_info) =
            context_fixture(&[("k1", b"a"), ("k2", b"b"), ("k3", b"c")]);
        let mut item_refs = Vec::new();
        let mut map_refs = Vec::new();
        let mut ctx = PackageContext {
            targets: &mut targets,
            storages: &mut storages,
            role: Role::Client,
            version: ProtocolVersion::Ds12,
            device_info: &device_info,
            item_refs: &mut item_refs,
            map_refs: &mut map_refs,
        };

        let changes = LocalChanges {
            added: vec!["k1".into(), "k2".into(), "k3".into()],
            ..Default::default()
        };
        let mut package = Package::LocalChanges(LocalChangesPackage::new(
            &ctx.targets[0],
            changes,
            100_000,
            Role::Client,
            2,
        ));

        let mut message1 = message();
        let mut remaining = 100_000i64;
        assert!(!package.write(&mut message1, &mut remaining, &mut ctx).unwrap());

        let mut message2 = message();
        let mut remaining = 100_000i64;
        assert!(package.write(&mut message2, &mut remaining, &mut ctx).unwrap());
        assert_eq!(item_refs.len(), 3);
    }

    #[test]
    fn large_item_is_chunked_with_more_data() {
        let big = vec![b'x'; 5000];
        let (mut targets, mut storages, device_info) = context_fixture(&[("big", &big)]);
        let mut item_refs = Vec::new();
        let mut map_refs = Vec::new();
        let mut ctx = PackageContext {
            targets: &mut targets,
            storages: &mut storages,
            role: Role::Client,
            version: ProtocolVersion::Ds12,
            device_info: &device_info,
            item_refs: &mut item_refs,
            map_refs: &mut map_refs,
        };

        let changes = LocalChanges { added: vec!["big".into()], ..Default::default() };
        let mut package = Package::LocalChanges(LocalChangesPackage::new(
            &ctx.targets[0],
            changes,
            1000,
            Role::Client,
            22,
        ));

        // First message: budget allows only part of the item.
        let mut message1 = message();
        let mut remaining = 2000i64;
        assert!(!package.write(&mut message1, &mut remaining, &mut ctx).unwrap());
        let element = message1.to_element();
        let add = element.find(c::E_SYNCBODY).unwrap().find(c::E_SYNC).unwrap().find(c::E_ADD).unwrap();
        let item = add.find(c::E_ITEM).unwrap();
        assert!(item.find(c::E_MOREDATA).is_some());
        assert_eq!(item.find(c::E_META).unwrap().find(c::E_SIZE).unwrap().value, "5000");
        assert!(ctx.item_refs.is_empty(), "chunked item not acknowledged yet");

        // Second message: the rest fits.
        let mut message2 = message();
        let mut remaining = 100_000i64;
        assert!(package.write(&mut message2, &mut remaining, &mut ctx).unwrap());
        let element = message2.to_element();
        let add = element.find(c::E_SYNCBODY).unwrap().find(c::E_SYNC).unwrap().find(c::E_ADD).unwrap();
        assert!(add.find(c::E_ITEM).unwrap().find(c::E_MOREDATA).is_none());
        assert_eq!(item_refs.len(), 1);
    }

    #[test]
    fn server_addresses_deletes_by_remote_uid() {
        let (mut targets, mut storages, device_info) = context_fixture(&[]);
        targets[0].add_uid_mapping(UidMapping { remote_uid: "R9".into(), local_uid: "L9".into() });
        let mut item_refs = Vec::new();
        let mut map_refs = Vec::new();
        let mut ctx = PackageContext {
            targets: &mut targets,
            storages: &mut storages,
            role: Role::Server,
            version: ProtocolVersion::Ds12,
            device_info: &device_info,
            item_refs: &mut item_refs,
            map_refs: &mut map_refs,
        };

        let changes = LocalChanges { removed: vec!["L9".into()], ..Default::default() };
        let mut package = Package::LocalChanges(LocalChangesPackage::new(
            &ctx.targets[0],
            changes,
            100_000,
            Role::Server,
            22,
        ));

        let mut message = message();
        let mut remaining = 100_000i64;
        assert!(package.write(&mut message, &mut remaining, &mut ctx).unwrap());

        let element = message.to_element();
        let delete =
            element.find(c::E_SYNCBODY).unwrap().find(c::E_SYNC).unwrap().find(c::E_DELETE).unwrap();
        let item = delete.find(c::E_ITEM).unwrap();
        assert_eq!(item.find(c::E_TARGET).unwrap().find(c::E_LOCURI).unwrap().value, "R9");
    }

    #[test]
    fn mappings_package_writes_map_items() {
        let (mut targets, mut storages, device_info) = context_fixture(&[]);
        let mut item_refs = Vec::new();
        let mut map_refs = Vec::new();
        let mut ctx = PackageContext {
            targets: &mut targets,
            storages: &mut storages,
            role: Role::Client,
            version: ProtocolVersion::Ds12,
            device_info: &device_info,
            item_refs: &mut item_refs,
            map_refs: &mut map_refs,
        };

        let mappings = vec![
            UidMapping { remote_uid: "r1".into(), local_uid: "l1".into() },
            UidMapping { remote_uid: "r2".into(), local_uid: "l2".into() },
        ];
        let mut package = Package::LocalMappings(LocalMappingsPackage::new(
            "./contacts",
            "./remote/contacts",
            mappings,
        ));

        let mut message = message();
        let mut remaining = 100_000i64;
        assert!(package.write(&mut message, &mut remaining, &mut ctx).unwrap());
        assert_eq!(map_refs.len(), 1);

        let element = message.to_element();
        let map = element.find(c::E_SYNCBODY).unwrap().find(c::E_MAP).unwrap();
        let items: Vec<_> = map.children.iter().filter(|child| child.name == c::E_MAPITEM).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].find(c::E_TARGET).unwrap().find(c::E_LOCURI).unwrap().value, "r1");
        assert_eq!(items[0].find(c::E_SOURCE).unwrap().find(c::E_LOCURI).unwrap().value, "l1");
    }

    #[test]
    fn devinf_package_put_get() {
        let (mut targets, mut storages, device_info) = context_fixture(&[]);
        let mut item_refs = Vec::new();
        let mut map_refs = Vec::new();
        let mut ctx = PackageContext {
            targets: &mut targets,
            storages: &mut storages,
            role: Role::Client,
            version: ProtocolVersion::Ds12,
            device_info: &device_info,
            item_refs: &mut item_refs,
            map_refs: &mut map_refs,
        };

        let mut package = Package::DevInf(DevInfPackage { shape: DevInfShape::PutGet });
        let mut message = message();
        let mut remaining = 100_000i64;
        assert!(package.write(&mut message, &mut remaining, &mut ctx).unwrap());

        let element = message.to_element();
        let body = element.find(c::E_SYNCBODY).unwrap();
        assert!(body.find(c::E_PUT).is_some());
        assert!(body.find(c::E_GET).is_some());
    }
}

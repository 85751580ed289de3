//! Inbound command processing: Sync batches, Map application and Status
//! classification.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::conflict::ConflictResolver;
use crate::observer::SyncObserver;
use crate::packages::{AlertPackage, LocalMappingsPackage, Package};
use crate::response::ResponseGenerator;
use crate::storage::handler::{CommitConflict, CommitResult, CommitStatus, ItemId, ItemMeta, StorageHandler};
use crate::storage::plugin::StoragePlugin;
use crate::target::{SyncTarget, UidMapping};
use crate::types::Role;
use syncml_wire::codes::{self, status_class, StatusClass};
use syncml_wire::consts::{E_ADD, E_DELETE, E_REPLACE};
use syncml_wire::{CommandParams, CommandType, ItemParams, MapParams, StatusCode, StatusParams, SyncParams};

/// Acknowledgement of an item we previously sent, extracted from an
/// inbound Status so pending references can be cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAck {
    pub msg_ref: u32,
    pub cmd_ref: u32,
    pub source_ref: String,
}

/// Session-level effect requested by an inbound status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEffect {
    None,
    /// Abort the session with the offending code.
    Abort(StatusCode),
}

pub struct CommandHandler {
    role: Role,
}

impl CommandHandler {
    pub fn new(role: Role) -> CommandHandler {
        CommandHandler { role }
    }

    /// Apply an inbound Map to the target's mapping table. Applying the
    /// same element twice is equivalent to applying it once.
    pub fn handle_map(&self, map: &MapParams, target: &mut SyncTarget) -> StatusCode {
        for item in &map.map_items {
            target.add_uid_mapping(UidMapping {
                remote_uid: item.source.clone(),
                local_uid: item.target.clone(),
            });
        }
        codes::SUCCESS
    }

    /// Classify an inbound non-header status and derive its session
    /// effect plus an item acknowledgement when it answers a data command.
    pub fn handle_status(&self, status: &StatusParams) -> (StatusEffect, Option<ItemAck>) {
        let effect = match status_class(status.data) {
            StatusClass::Informational | StatusClass::Successful => StatusEffect::None,
            StatusClass::Redirection => {
                // Redirects are not followed mid-session.
                debug!(code = status.data, "redirection status not implemented");
                StatusEffect::None
            }
            StatusClass::OriginatorException => {
                if status.data == codes::ALREADY_EXISTS {
                    // Informational during slow sync, no abort.
                    StatusEffect::None
                } else {
                    StatusEffect::Abort(status.data)
                }
            }
            StatusClass::RecipientException => {
                if status.data == codes::REFRESH_REQUIRED {
                    // The matching Alert reverts the target to slow sync.
                    StatusEffect::None
                } else {
                    StatusEffect::Abort(status.data)
                }
            }
            StatusClass::Unknown => {
                debug!(code = status.data, "unknown status code");
                StatusEffect::None
            }
        };

        let ack = if status.cmd == E_ADD || status.cmd == E_REPLACE || status.cmd == E_DELETE {
            Some(ItemAck {
                msg_ref: status.msg_ref,
                cmd_ref: status.cmd_ref,
                source_ref: status.source_ref.clone(),
            })
        } else {
            None
        };

        (effect, ack)
    }

    /// Process one inbound Sync element: stage, commit, report.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_sync(
        &self,
        sync: &SyncParams,
        target: &mut SyncTarget,
        plugin: &mut dyn StoragePlugin,
        storage_handler: &mut StorageHandler,
        generator: &mut ResponseGenerator,
        resolver: Option<&mut ConflictResolver<'_>>,
        fast_maps_send: bool,
        observer: &mut dyn SyncObserver,
    ) {
        if !sync.no_resp {
            generator.add_status_for_sync(sync, codes::SUCCESS);
        }

        let mut responses: BTreeMap<ItemId, StatusCode> = BTreeMap::new();
        self.compose_batches(sync, target, plugin, storage_handler, generator, &mut responses);

        let mut new_mappings: Vec<UidMapping> = Vec::new();
        self.commit_batches(
            sync,
            target,
            plugin,
            storage_handler,
            resolver,
            observer,
            &mut responses,
            &mut new_mappings,
        );

        self.process_results(sync, &responses, generator);

        self.manage_new_mappings(target, new_mappings, generator, fast_maps_send);
    }

    /// Reject a whole Sync and all of its commands with one code.
    pub fn reject_sync(
        &self,
        sync: &SyncParams,
        generator: &mut ResponseGenerator,
        code: StatusCode,
    ) {
        if !sync.no_resp {
            generator.add_status_for_sync(sync, code);
        }
        for command in &sync.commands {
            self.reject_command(command, generator, code);
        }
    }

    pub fn reject_command(
        &self,
        command: &CommandParams,
        generator: &mut ResponseGenerator,
        code: StatusCode,
    ) {
        if !command.no_resp {
            generator.add_status_for_command(command, code);
        }
        for sub in &command.sub_commands {
            self.reject_command(sub, generator, code);
        }
    }

    fn item_meta(&self, command: &CommandParams, item: &ItemParams, parent_key: String) -> ItemMeta {
        let mime_type = if item.meta.mime_type.is_empty() {
            command.meta.mime_type.clone()
        } else {
            item.meta.mime_type.clone()
        };
        let format = if item.meta.format.is_empty() {
            command.meta.format.clone()
        } else {
            item.meta.format.clone()
        };
        ItemMeta { parent_key, mime_type, format, version: item.meta.version.clone() }
    }

    /// Parent resolution. A client may receive SourceParent (the parent's
    /// id on the remote side, mapped locally) or TargetParent (our own
    /// id); a server only ever receives SourceParent.
    fn resolve_parent(&self, item: &ItemParams, target: &SyncTarget) -> String {
        match self.role {
            Role::Client => {
                if !item.source_parent.is_empty() {
                    target.map_to_local_uid(&item.source_parent).unwrap_or_default().to_string()
                } else {
                    item.target_parent.clone()
                }
            }
            Role::Server => {
                if !item.source_parent.is_empty() {
                    target.map_to_local_uid(&item.source_parent).unwrap_or_default().to_string()
                } else {
                    String::new()
                }
            }
        }
    }

    /// Local key resolution for Replace and Delete: a client is addressed
    /// by its own keys in Target, a server maps the remote's Source key.
    fn resolve_local_key(&self, item: &ItemParams, target: &SyncTarget) -> String {
        match self.role {
            Role::Client => item.target.clone(),
            Role::Server => {
                target.map_to_local_uid(&item.source).unwrap_or_default().to_string()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_chunked(
        &self,
        id: ItemId,
        item: &ItemParams,
        key: &str,
        meta: &ItemMeta,
        is_add: bool,
        target: &SyncTarget,
        plugin: &mut dyn StoragePlugin,
        storage_handler: &mut StorageHandler,
        generator: &mut ResponseGenerator,
        responses: &mut BTreeMap<ItemId, StatusCode>,
    ) {
        if item.more_data {
            if !storage_handler.building_large_object() {
                // First chunk; the size announcement is required but its
                // absence is survivable.
                if item.meta.size == 0 {
                    warn!(
                        cmd_id = id.cmd_id,
                        index = id.item_index,
                        "no size found for large object"
                    );
                }
                let started = if is_add {
                    storage_handler.start_large_object_add(
                        plugin,
                        &key.to_string(),
                        meta,
                        item.meta.size,
                    )
                } else {
                    storage_handler.start_large_object_replace(
                        plugin,
                        &key.to_string(),
                        meta,
                        item.meta.size,
                    )
                };
                if !started {
                    responses.insert(id, codes::COMMAND_FAILED);
                }
            }

            if storage_handler.building_large_object() {
                if storage_handler.append_large_object_data(item.data.as_bytes()) {
                    generator.add_package(Package::Alert(AlertPackage::databases(
                        codes::ALERT_NEXT_MESSAGE,
                        target.source_db(),
                        target.target_db(),
                    )));
                    responses.insert(id, codes::CHUNKED_ITEM_ACCEPTED);
                } else {
                    responses.insert(id, codes::COMMAND_FAILED);
                }
            }
        } else {
            // Final chunk of an in-flight large object.
            if !storage_handler.matches_large_object(&key.to_string()) {
                generator.add_package(Package::Alert(AlertPackage::databases(
                    codes::ALERT_NO_END_OF_DATA,
                    target.source_db(),
                    target.target_db(),
                )));
                responses.insert(id, codes::COMMAND_NOT_ALLOWED);
            } else if storage_handler.append_large_object_data(item.data.as_bytes()) {
                if !storage_handler.finish_large_object(id) {
                    responses.insert(id, codes::COMMAND_FAILED);
                }
            } else {
                responses.insert(id, codes::COMMAND_FAILED);
            }
        }
    }

    fn compose_batches(
        &self,
        sync: &SyncParams,
        target: &mut SyncTarget,
        plugin: &mut dyn StoragePlugin,
        storage_handler: &mut StorageHandler,
        generator: &mut ResponseGenerator,
        responses: &mut BTreeMap<ItemId, StatusCode>,
    ) {
        for command in &sync.commands {
            for (index, item) in command.items.iter().enumerate() {
                let id = ItemId::new(command.cmd_id, index);

                match command.command {
                    CommandType::Add => {
                        let remote_key = item.source.clone();
                        let parent = self.resolve_parent(item, target);
                        let meta = self.item_meta(command, item, parent);
                        debug!(key = %remote_key, "processing add");

                        if item.more_data || storage_handler.building_large_object() {
                            self.stage_chunked(
                                id,
                                item,
                                &remote_key,
                                &meta,
                                true,
                                target,
                                plugin,
                                storage_handler,
                                generator,
                                responses,
                            );
                        } else if !storage_handler.add_item(
                            id,
                            plugin,
                            &String::new(),
                            &meta,
                            &item.data,
                        ) {
                            responses.insert(id, codes::COMMAND_FAILED);
                        }
                    }
                    CommandType::Replace => {
                        let local_key = self.resolve_local_key(item, target);
                        let parent = self.resolve_parent(item, target);
                        let meta = self.item_meta(command, item, parent);
                        debug!(key = %local_key, "processing replace");

                        if item.more_data || storage_handler.building_large_object() {
                            self.stage_chunked(
                                id,
                                item,
                                &local_key,
                                &meta,
                                false,
                                target,
                                plugin,
                                storage_handler,
                                generator,
                                responses,
                            );
                        } else if !storage_handler.replace_item(
                            id,
                            plugin,
                            &local_key,
                            &meta,
                            &item.data,
                        ) {
                            responses.insert(id, codes::COMMAND_FAILED);
                        }
                    }
                    CommandType::Delete => {
                        let local_key = self.resolve_local_key(item, target);
                        debug!(key = %local_key, "processing delete");

                        if !storage_handler.delete_item(id, &local_key) {
                            responses.insert(id, codes::COMMAND_FAILED);
                        }
                    }
                    _ => {
                        responses.insert(id, codes::NOT_IMPLEMENTED);
                    }
                }
            }
        }
    }

    fn conflict_code(&self, conflict: CommitConflict) -> Option<StatusCode> {
        match (conflict, self.role) {
            (CommitConflict::LocalWin, Role::Client) => Some(codes::RESOLVED_CLIENT_WINNING),
            (CommitConflict::LocalWin, Role::Server) => Some(codes::RESOLVED_WITH_SERVER_DATA),
            (CommitConflict::RemoteWin, Role::Client) => Some(codes::RESOLVED_WITH_SERVER_DATA),
            (CommitConflict::RemoteWin, Role::Server) => Some(codes::RESOLVED_CLIENT_WINNING),
            (CommitConflict::None, _) => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_batches(
        &self,
        sync: &SyncParams,
        target: &mut SyncTarget,
        plugin: &mut dyn StoragePlugin,
        storage_handler: &mut StorageHandler,
        resolver: Option<&mut ConflictResolver<'_>>,
        observer: &mut dyn SyncObserver,
        responses: &mut BTreeMap<ItemId, StatusCode>,
        new_mappings: &mut Vec<UidMapping>,
    ) {
        // Only the server resolves conflicts; a client defers to the
        // server's own policy.
        let mut resolver = if self.role == Role::Server { resolver } else { None };

        let mut results: BTreeMap<ItemId, CommitResult> = BTreeMap::new();
        results.extend(storage_handler.commit_added_items(
            plugin,
            resolver.as_mut().map(|r| &mut **r),
            observer,
        ));
        results.extend(storage_handler.commit_replaced_items(
            plugin,
            resolver.as_mut().map(|r| &mut **r),
            observer,
        ));
        results.extend(storage_handler.commit_deleted_items(
            plugin,
            resolver.as_mut().map(|r| &mut **r),
            observer,
        ));

        for command in &sync.commands {
            for (index, item) in command.items.iter().enumerate() {
                let id = ItemId::new(command.cmd_id, index);

                if responses.contains_key(&id) {
                    continue;
                }

                let Some(result) = results.get(&id) else {
                    responses.insert(id, codes::COMMAND_FAILED);
                    continue;
                };

                let code = match result.status {
                    CommitStatus::Added | CommitStatus::InitAdd => {
                        let code =
                            self.conflict_code(result.conflict).unwrap_or(codes::ITEM_ADDED);
                        new_mappings.push(UidMapping {
                            remote_uid: item.source.clone(),
                            local_uid: result.item_key.clone(),
                        });
                        code
                    }
                    CommitStatus::Replaced | CommitStatus::InitReplace => {
                        self.conflict_code(result.conflict).unwrap_or(codes::SUCCESS)
                    }
                    CommitStatus::Deleted | CommitStatus::InitDelete => {
                        // A committed delete drops the mapping, also on
                        // the remote-win conflict arm.
                        if result.conflict != CommitConflict::LocalWin {
                            target.remove_uid_mapping(&result.item_key);
                        }
                        self.conflict_code(result.conflict).unwrap_or(codes::SUCCESS)
                    }
                    CommitStatus::Duplicate => codes::ALREADY_EXISTS,
                    CommitStatus::NotDeleted => {
                        target.remove_uid_mapping(&result.item_key);
                        codes::ITEM_NOT_DELETED
                    }
                    CommitStatus::UnsupportedFormat => codes::UNSUPPORTED_FORMAT,
                    CommitStatus::ItemTooBig => codes::REQUEST_SIZE_TOO_BIG,
                    CommitStatus::NotEnoughSpace => codes::DEVICE_FULL,
                    CommitStatus::GeneralError => codes::COMMAND_FAILED,
                };

                responses.insert(id, code);
            }
        }
    }

    fn process_results(
        &self,
        sync: &SyncParams,
        responses: &BTreeMap<ItemId, StatusCode>,
        generator: &mut ResponseGenerator,
    ) {
        for command in &sync.commands {
            if command.no_resp {
                continue;
            }

            // One status per (command, response code) bucket, item
            // indices ascending within the bucket.
            let mut buckets: BTreeMap<StatusCode, Vec<usize>> = BTreeMap::new();
            for index in 0..command.items.len() {
                let id = ItemId::new(command.cmd_id, index);
                let code = responses.get(&id).copied().unwrap_or(codes::COMMAND_FAILED);
                buckets.entry(code).or_default().push(index);
            }

            for (code, indexes) in buckets {
                generator.add_status_for_command_items(command, code, &indexes);
            }
        }
    }

    fn manage_new_mappings(
        &self,
        target: &mut SyncTarget,
        new_mappings: Vec<UidMapping>,
        generator: &mut ResponseGenerator,
        fast_maps_send: bool,
    ) {
        for mapping in &new_mappings {
            target.add_uid_mapping(mapping.clone());
        }

        if self.role == Role::Client && fast_maps_send && !new_mappings.is_empty() {
            generator.add_package(Package::LocalMappings(LocalMappingsPackage::new(
                target.source_db(),
                target.target_db(),
                new_mappings,
            )));
        }
    }
}

//! Server-role behavior of the session state machine.

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::packages::{AlertPackage, Package};
use crate::types::SyncState;
use syncml_wire::codes;
use syncml_wire::{
    san, CommandParams, HeaderParams, ProtocolVersion, SanData, SanInitiator, SanSyncInfo,
    SanUiMode, StatusCode, SyncDirection, SyncMode, SyncType,
};

use super::{ServerAlertedStart, SessionHandler, SessionStep};

impl SessionHandler {
    /// Prepare to serve an inbound client request. The actual processing
    /// happens through `handle_message`.
    pub fn serve(&mut self) {
        debug!("preparing to serve sync request");
        self.prepare();
    }

    /// Start a server-alerted session: DS 1.2 produces a SAN message for
    /// out-of-band delivery, DS 1.1 queues an alert package.
    pub fn start_server_alerted(&mut self) -> Result<ServerAlertedStart, SyncError> {
        debug!("initiating server-alerted sync");
        self.prepare();

        let session_id = self.generate_session_id();
        self.setup_local_session(&session_id);
        self.setup_server_storages();

        if self.storages.len() != self.config.datastores.len() {
            self.abort_sync(SyncState::DatabaseFailure, "Could not create all sync targets");
            return Err(SyncError::Database("could not create all sync targets".into()));
        }

        match self.protocol_version {
            ProtocolVersion::Ds11 => {
                self.compose_server_alerted_package_11();
                self.set_sync_state(SyncState::Prepared);
                Ok(ServerAlertedStart::Respond)
            }
            ProtocolVersion::Ds12 => {
                let message = self.generate_san_message()?;
                self.set_sync_state(SyncState::Prepared);
                Ok(ServerAlertedStart::San(message))
            }
            ProtocolVersion::Unknown => {
                self.abort_sync(SyncState::InternalError, "Unknown protocol version");
                Err(SyncError::Internal("unknown protocol version".into()))
            }
        }
    }

    fn setup_server_storages(&mut self) {
        let routes = self.config.datastores.clone();
        for route in &routes {
            let _ = self.storage_index_by_uri(&route.source_db);
        }
    }

    fn compose_server_alerted_package_11(&mut self) {
        self.compose_authentication();

        let alerts: Vec<AlertPackage> = self
            .storages
            .iter()
            .map(|storage| {
                AlertPackage::server_alerted(
                    self.config.sync_mode.to_alert_code(),
                    storage.source_uri(),
                    &storage.preferred_format().mime_type,
                )
            })
            .collect();
        for alert in alerts {
            self.response_generator.add_package(Package::Alert(alert));
        }

        self.response_generator.add_package(Package::Final);
    }

    fn generate_san_message(&mut self) -> Result<Vec<u8>, SyncError> {
        let sync_info: Vec<SanSyncInfo> = self
            .storages
            .iter()
            .map(|storage| SanSyncInfo {
                sync_type: self.config.sync_mode.to_alert_code(),
                content_type: storage.preferred_format().mime_type.clone(),
                server_uri: storage.source_uri().to_string(),
            })
            .collect();

        let data = SanData {
            version: ProtocolVersion::Ds12,
            ui_mode: SanUiMode::Background,
            initiator: SanInitiator::Server,
            session_id: 0,
            server_identifier: self.local_device.clone(),
            sync_info,
        };

        san::generate(&data, &self.config.password, "").map_err(|error| {
            self.abort_sync(SyncState::InternalError, "Error while generating 1.2 SAN package");
            SyncError::from(error)
        })
    }

    pub(super) fn server_message_received(&mut self, header: &HeaderParams) {
        if self.state == SyncState::Prepared {
            self.setup_session_from_header(header);
        }
    }

    pub(super) fn server_sync_alert_received(
        &mut self,
        mode: SyncMode,
        alert: &mut CommandParams,
    ) -> StatusCode {
        match self.state {
            SyncState::Prepared | SyncState::RemoteInit => {
                let status = self.setup_target_by_client(mode, alert);
                self.set_sync_state(SyncState::RemoteInit);
                status
            }
            SyncState::LocalInit => {
                // Client acknowledges our alert, reverting to slow sync.
                self.server_acknowledge_target(alert)
            }
            _ => codes::COMMAND_NOT_ALLOWED,
        }
    }

    /// Bind a target for a sync alert sent by the client.
    fn setup_target_by_client(&mut self, mode: SyncMode, alert: &mut CommandParams) -> StatusCode {
        let Some(item) = alert.items.first().cloned() else {
            warn!(cmd_id = alert.cmd_id, "received alert without any items");
            return codes::INCOMPLETE_COMMAND;
        };
        let anchors = alert.anchors();

        // We need the remote source database (our target), a way to find
        // our own database (URI or MIME), and the next anchor.
        if item.source.is_empty()
            || anchors.next.is_empty()
            || (item.target.is_empty() && item.meta.mime_type.is_empty())
        {
            return codes::INCOMPLETE_COMMAND;
        }

        let storage = if !item.target.is_empty() {
            self.storage_index_by_uri(&item.target)
        } else {
            self.storage_index_by_mime(&item.meta.mime_type)
        };
        let Some(storage) = storage else {
            return codes::NOT_FOUND;
        };

        let index = self.create_sync_target(storage, mode);
        let target = &mut self.targets[index];
        target.set_sync_mode(mode);
        target.set_remote_next_anchor(&anchors.next);
        target.set_target_db(&item.source);

        let mut status = codes::SUCCESS;

        // A fast sync needs the stored anchor to match what the client
        // supplies; otherwise both sides must fall back to slow sync.
        let mismatch = mode.sync_type == SyncType::Fast
            && (anchors.last.is_empty() || target.remote_last_anchor() != anchors.last);
        if mismatch {
            debug!(
                supplied = %anchors.last,
                stored = %target.remote_last_anchor(),
                "anchor mismatch, reverting to slow sync"
            );
            status = codes::REFRESH_REQUIRED;
            target.revert_sync_mode();
        }

        if target.sync_mode().sync_type == SyncType::Fast {
            target.load_uid_mappings();
        } else {
            target.clear_uid_mappings();
        }

        status
    }

    fn server_acknowledge_target(&mut self, alert: &CommandParams) -> StatusCode {
        let Some(item) = alert.items.first() else {
            return codes::INCOMPLETE_COMMAND;
        };
        if item.target.is_empty() {
            return codes::INCOMPLETE_COMMAND;
        }

        let Some(index) = self.target_index_by_source(&item.target) else {
            return codes::NOT_FOUND;
        };

        let target = &mut self.targets[index];
        target.set_remote_next_anchor(&alert.anchors().next);
        target.revert_sync_mode();
        target.clear_uid_mappings();

        codes::SUCCESS
    }

    pub(super) fn server_sync_received(&mut self) -> bool {
        match self.state {
            SyncState::RemoteInit => {
                // A Sync this early means the client is syncing without an
                // init phase. That only works if no target had to revert;
                // otherwise the client's modifications must be ignored.
                let reverts = self.targets.iter().any(|target| target.reverted());
                if reverts {
                    false
                } else {
                    self.sync_without_init_phase = true;
                    self.set_sync_state(SyncState::ReceivingItems);
                    true
                }
            }
            SyncState::LocalInit => {
                self.set_sync_state(SyncState::ReceivingItems);
                true
            }
            SyncState::ReceivingItems => true,
            _ => false,
        }
    }

    pub(super) fn server_map_received(&mut self) -> bool {
        match self.state {
            SyncState::SendingItems => {
                self.set_sync_state(SyncState::ReceivingMappings);
                true
            }
            SyncState::ReceivingMappings => true,
            _ => false,
        }
    }

    pub(super) fn server_final_received(&mut self) {
        match self.state {
            SyncState::RemoteInit => {
                self.compose_server_initialization_package();
                self.set_sync_state(SyncState::LocalInit);
            }
            SyncState::ReceivingItems => {
                // Send our modifications unless every target is
                // client-to-server only.
                let send_modifications = self
                    .targets
                    .iter()
                    .any(|target| target.sync_mode().direction != SyncDirection::FromClient);

                if send_modifications {
                    self.compose_server_modifications_package();
                    self.set_sync_state(SyncState::SendingItems);
                } else {
                    self.compose_map_acknowledgement_package();
                    self.set_sync_state(SyncState::Finalizing);
                }
            }
            SyncState::SendingItems | SyncState::ReceivingMappings => {
                self.compose_map_acknowledgement_package();
                self.set_sync_state(SyncState::Finalizing);
            }
            _ => {
                self.abort_sync(SyncState::InternalError, "Internal state machine error");
            }
        }
    }

    pub(super) fn server_message_parsed(&mut self) -> SessionStep {
        match self.state {
            SyncState::Prepared
            | SyncState::RemoteInit
            | SyncState::LocalInit
            | SyncState::ReceivingItems
            | SyncState::SendingItems
            | SyncState::ReceivingMappings
            | SyncState::Finalizing => SessionStep::Respond,
            _ => SessionStep::Finished,
        }
    }

    pub(super) fn server_resend_package(&mut self) {
        match self.state {
            SyncState::LocalInit => self.compose_server_initialization_package(),
            SyncState::SendingItems => self.compose_server_modifications_package(),
            SyncState::Finalizing => self.compose_map_acknowledgement_package(),
            _ => {
                self.abort_sync(SyncState::InternalError, "Internal state machine error");
            }
        }
    }

    fn compose_server_initialization_package(&mut self) {
        self.compose_server_initialization();
        self.response_generator.add_package(Package::Final);
    }

    fn compose_server_initialization(&mut self) {
        // Alerts inform the client about the databases we will sync,
        // reflecting any slow-sync reversions decided during init.
        let alerts: Vec<AlertPackage> = self
            .targets
            .iter()
            .map(|target| {
                AlertPackage::sync_mode(
                    target.sync_mode().to_alert_code(),
                    target.source_db(),
                    target.target_db(),
                    target.local_last_anchor(),
                    target.local_next_anchor(),
                )
            })
            .collect();
        for alert in alerts {
            self.response_generator.add_package(Package::Alert(alert));
        }
    }

    fn compose_server_modifications_package(&mut self) {
        // When syncing without an init phase the initialization rides
        // along with the modifications.
        if self.sync_without_init_phase {
            self.compose_server_initialization();
        }

        self.discover_all_local_changes();
        self.compose_local_changes();
        self.response_generator.add_package(Package::Final);
    }

    fn compose_map_acknowledgement_package(&mut self) {
        self.response_generator.add_package(Package::Final);
    }
}

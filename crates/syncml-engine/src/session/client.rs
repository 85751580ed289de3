//! Client-role behavior of the session state machine.

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::packages::{AlertPackage, DevInfPackage, LocalMappingsPackage, Package};
use crate::types::{Role, SyncState};
use syncml_wire::codes;
use syncml_wire::consts::SYNCML_URI_PREFIX;
use syncml_wire::{san, CommandParams, HeaderParams, StatusCode, SyncMode, SyncType};

use super::{SessionHandler, SessionStep};

impl SessionHandler {
    /// Start a client-initiated sync: set up targets from the configured
    /// datastores and queue the initialization package.
    pub fn start_client(&mut self) -> Result<(), SyncError> {
        debug!("initiating client sync");
        self.prepare();

        let session_id = self.generate_session_id();
        self.setup_local_session(&session_id);
        self.setup_sync_targets()?;

        self.compose_client_initialization_package();

        if self.sync_without_init_phase {
            self.set_sync_state(SyncState::SendingItems);
        } else {
            self.set_sync_state(SyncState::LocalInit);
        }

        Ok(())
    }

    /// Start a session from a received Server-Alerted Notification.
    pub fn handle_san(&mut self, data: &[u8]) -> Result<(), SyncError> {
        debug!(bytes = data.len(), "handling server-alerted notification");
        self.prepare();

        let san_data = match san::parse(data) {
            Ok(san_data) => san_data,
            Err(error) => {
                self.abort_sync(SyncState::InvalidSyncMlMessage, &error.to_string());
                return Ok(());
            }
        };

        if !san::check_digest(data, &san_data.server_identifier, &self.config.password, "") {
            // Digest failures are survivable when the nonce is managed
            // out of band, but worth flagging.
            warn!(server = %san_data.server_identifier, "SAN digest did not verify");
        }

        let session_id = if san_data.session_id == 0 {
            self.generate_session_id()
        } else {
            san_data.session_id.to_string()
        };

        self.protocol_version = san_data.version;
        self.setup_local_session(&session_id);
        self.remote_device = san_data.server_identifier.clone();

        for info in &san_data.sync_info {
            let mut sync_mode = SyncMode::from_alert_code(info.sync_type).unwrap_or_default();
            sync_mode.to_client_initiated();

            let mut server_uri = info.server_uri.clone();
            if !server_uri.contains(SYNCML_URI_PREFIX) {
                server_uri.insert_str(0, SYNCML_URI_PREFIX);
            }

            let mime_type = if info.content_type.is_empty() {
                self.config.san_mime_for(&server_uri).unwrap_or_default().to_string()
            } else {
                info.content_type.clone()
            };

            if mime_type.is_empty() {
                warn!(server_uri = %server_uri, "could not find MIME for server URI");
                continue;
            }

            let Some(storage) = self.storage_index_by_mime(&mime_type) else {
                warn!(mime_type = %mime_type, "no storage for MIME type");
                continue;
            };

            let index = self.create_sync_target(storage, sync_mode);
            self.targets[index].set_target_db(&server_uri);
            self.force_slow_sync_if_needed(index);
        }

        if self.targets.len() != san_data.sync_info.len() {
            self.abort_sync(SyncState::DatabaseFailure, "Could not create all sync targets");
            return Ok(());
        }

        self.compose_client_initialization_package();

        if self.sync_without_init_phase {
            self.set_sync_state(SyncState::SendingItems);
        } else {
            self.set_sync_state(SyncState::LocalInit);
        }

        Ok(())
    }

    fn setup_sync_targets(&mut self) -> Result<(), SyncError> {
        let routes = self.config.datastores.clone();
        for route in &routes {
            let Some(storage) = self.storage_index_by_uri(&route.source_db) else {
                continue;
            };
            let index = self.create_sync_target(storage, self.config.sync_mode);
            self.targets[index].set_target_db(&route.target_db);
            self.force_slow_sync_if_needed(index);
        }

        if self.targets.len() != routes.len() {
            self.abort_sync(SyncState::DatabaseFailure, "Could not create all sync targets");
            return Err(SyncError::Database("could not create all sync targets".into()));
        }

        Ok(())
    }

    /// Slow sync when it is the configured mode or there is no anchor
    /// from an earlier session to resume from.
    fn force_slow_sync_if_needed(&mut self, index: usize) {
        let target = &mut self.targets[index];
        if self.config.sync_mode.sync_type == SyncType::Slow
            || target.remote_last_anchor().is_empty()
        {
            debug!(
                source_db = %target.source_db(),
                "no remote last anchor or slow sync forced, using slow sync"
            );
            let mut mode = target.sync_mode();
            mode.to_slow_sync();
            target.set_sync_mode(mode);
        }
    }

    fn compose_client_initialization_package(&mut self) {
        self.compose_client_initialization();

        if self.sync_without_init_phase {
            self.discover_all_local_changes();
            self.compose_local_changes();
        }

        self.response_generator.add_package(Package::Final);
    }

    fn compose_client_initialization(&mut self) {
        self.compose_authentication();

        if let Some(shape) = self.devinf_handler.compose_local_exchange() {
            self.response_generator.add_package(Package::DevInf(DevInfPackage { shape }));
        }

        // Alerts inform the server about the databases we wish to sync.
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

    fn compose_client_modifications_package(&mut self) {
        self.discover_all_local_changes();
        self.compose_local_changes();
        self.response_generator.add_package(Package::Final);
    }

    fn compose_data_update_status_package(&mut self) {
        // Mappings go here unless they were already fast-sent with the
        // item acknowledgements.
        if !self.config.properties.fast_maps_send {
            let packages: Vec<LocalMappingsPackage> = self
                .targets
                .iter()
                .filter(|target| !target.uid_mappings().is_empty())
                .map(|target| {
                    LocalMappingsPackage::new(
                        target.source_db(),
                        target.target_db(),
                        target.uid_mappings().to_vec(),
                    )
                })
                .collect();
            for package in packages {
                self.response_generator.add_package(Package::LocalMappings(package));
            }
        }

        self.response_generator.add_package(Package::Final);
    }

    fn compose_result_alert(&mut self) {
        let package =
            AlertPackage::databases(codes::ALERT_RESULT, &self.local_device, &self.remote_device);
        self.response_generator.add_package(Package::Alert(package));
    }

    pub(super) fn client_message_received(&mut self, header: &HeaderParams) {
        match self.state {
            SyncState::Prepared => {
                // Server is initiating the session over plain SyncML.
                self.setup_session_from_header(header);
            }
            SyncState::LocalInit => {
                // We might not have known the remote device id when the
                // init message was built; adopt what the server reports.
                self.remote_device = header.source_device.clone();
                let mut params = self.response_generator.header_params().clone();
                params.target_device = header.source_device.clone();
                self.response_generator.set_header_params(params);
            }
            _ => {}
        }
    }

    pub(super) fn client_sync_alert_received(
        &mut self,
        mode: SyncMode,
        alert: &mut CommandParams,
    ) -> StatusCode {
        match self.state {
            SyncState::Prepared => self.setup_target_by_server(mode, alert),
            SyncState::LocalInit | SyncState::RemoteInit => {
                let status = self.acknowledge_target(mode, alert);
                self.set_sync_state(SyncState::RemoteInit);
                status
            }
            SyncState::SendingItems if self.sync_without_init_phase => {
                let status = self.acknowledge_target(mode, alert);
                self.set_sync_state(SyncState::RemoteInit);
                status
            }
            _ => codes::COMMAND_NOT_ALLOWED,
        }
    }

    /// Server-initiated session: bind a target for the advertised store.
    fn setup_target_by_server(&mut self, mode: SyncMode, alert: &mut CommandParams) -> StatusCode {
        let Some(item) = alert.items.first().cloned() else {
            warn!(cmd_id = alert.cmd_id, "received alert without any items");
            return codes::INCOMPLETE_COMMAND;
        };

        if item.source.is_empty() || item.meta.mime_type.is_empty() {
            warn!(cmd_id = alert.cmd_id, "received alert that did not pass validation");
            return codes::INCOMPLETE_COMMAND;
        }

        let mut mode = mode;
        mode.to_client_initiated();

        let Some(storage) = self.storage_index_by_mime(&item.meta.mime_type) else {
            debug!(mime_type = %item.meta.mime_type, "no matching storage for MIME");
            return codes::NOT_FOUND;
        };

        let index = self.create_sync_target(storage, mode);
        let target = &mut self.targets[index];
        target.set_target_db(&item.source);

        if target.sync_mode().sync_type == SyncType::Fast {
            target.load_uid_mappings();
        } else {
            debug!("slow sync in client mode, clearing all mappings");
            target.clear_uid_mappings();
        }

        // Set our database as the item target so the returned status
        // carries a proper TargetRef.
        let source_db = target.source_db().to_string();
        if let Some(item) = alert.items.first_mut() {
            item.target = source_db;
        }

        codes::SUCCESS
    }

    /// The server acknowledged (or overrode) the sync mode for a target.
    fn acknowledge_target(&mut self, mode: SyncMode, alert: &CommandParams) -> StatusCode {
        let Some(item) = alert.items.first() else {
            warn!(cmd_id = alert.cmd_id, "received alert without any items");
            return codes::INCOMPLETE_COMMAND;
        };

        let anchors = alert.anchors();
        if item.target.is_empty() || anchors.next.is_empty() {
            warn!(cmd_id = alert.cmd_id, "received alert that did not pass validation");
            return codes::INCOMPLETE_COMMAND;
        }

        let Some(index) = self.target_index_by_source(&item.target) else {
            return codes::NOT_FOUND;
        };

        let target = &mut self.targets[index];
        target.set_remote_next_anchor(&anchors.next);

        // Per OMA DS the client SHOULD follow the mode given by the
        // server even when it differs from what we proposed. Reverting to
        // slow also invalidates every mapping.
        if mode.sync_type != SyncType::Fast {
            debug!(
                source_db = %target.source_db(),
                "server requested reversion to slow sync, complying and clearing mappings"
            );
            target.revert_sync_mode();
            target.clear_uid_mappings();
        }

        target.set_sync_mode(mode);

        codes::SUCCESS
    }

    pub(super) fn client_sync_received(&mut self) -> bool {
        match self.state {
            SyncState::SendingItems | SyncState::ReceivingItems => {
                self.set_sync_state(SyncState::ReceivingItems);
                true
            }
            SyncState::RemoteInit if self.sync_without_init_phase => {
                self.set_sync_state(SyncState::ReceivingItems);
                true
            }
            _ => false,
        }
    }

    pub(super) fn client_final_received(&mut self) {
        match self.state {
            SyncState::Prepared => {
                self.compose_client_initialization_package();
                self.set_sync_state(SyncState::LocalInit);
            }
            SyncState::RemoteInit => {
                self.compose_client_modifications_package();
                self.set_sync_state(SyncState::SendingItems);
            }
            SyncState::ReceivingItems => {
                self.compose_data_update_status_package();
                self.set_sync_state(SyncState::SendingMappings);
            }
            SyncState::SendingItems | SyncState::SendingMappings => {
                self.set_sync_state(SyncState::Finalizing);
            }
            _ => {
                self.abort_sync(SyncState::InternalError, "Internal state machine error");
            }
        }
    }

    pub(super) fn client_message_parsed(&mut self) -> SessionStep {
        // A busy remote (101 for our header) is asked for results.
        if self.remote_reported_busy {
            self.compose_result_alert();
            self.remote_reported_busy = false;
        }

        match self.state {
            SyncState::Prepared
            | SyncState::LocalInit
            | SyncState::RemoteInit
            | SyncState::SendingItems
            | SyncState::ReceivingItems => SessionStep::Respond,
            SyncState::SendingMappings => {
                if self.should_send_data_update_status() {
                    SessionStep::Respond
                } else {
                    debug!("omitting update status package");
                    self.finish_sync();
                    SessionStep::Finished
                }
            }
            SyncState::Finalizing => {
                self.finish_sync();
                SessionStep::Finished
            }
            _ => SessionStep::Finished,
        }
    }

    /// With `omit-data-update-status` enabled, an all-trivial final
    /// message (one SyncHdr status, nothing but the Final package) is
    /// skipped entirely.
    fn should_send_data_update_status(&self) -> bool {
        if !self.config.properties.omit_data_update_status {
            return true;
        }

        let statuses = self.response_generator.statuses();
        let trivial = statuses.len() == 1
            && statuses[0].cmd == syncml_wire::consts::E_SYNCHDR
            && self.response_generator.package_queue_len() <= 1;
        !trivial
    }

    pub(super) fn client_resend_package(&mut self) {
        match self.state {
            SyncState::LocalInit => {
                self.devinf_handler.reset();
                self.compose_client_initialization_package();
            }
            SyncState::SendingItems => {
                self.compose_client_modifications_package();
            }
            SyncState::SendingMappings => {
                self.compose_data_update_status_package();
            }
            _ => {
                self.abort_sync(SyncState::InternalError, "Internal state machine error");
            }
        }
    }

    /// Role guard used by the agent.
    pub fn role(&self) -> Role {
        self.role
    }
}

//! The session state machine: consumes inbound fragments, mutates targets
//! and handlers, queues outbound packages and decides the next state.
//!
//! One `SessionHandler` drives a complete sync in either role. All work
//! happens in a single task; the transport boundary is the only place the
//! surrounding agent suspends.

mod client;
mod server;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, error, warn};

use crate::auth::{decode_basic_auth, encode_md5_auth_b64};
use crate::command::{CommandHandler, StatusEffect};
use crate::config::SyncConfig;
use crate::conflict::ConflictResolver;
use crate::devinf::{DevInfHandler, DeviceInfo};
use crate::error::SyncError;
use crate::observer::SyncObserver;
use crate::packages::{AlertPackage, ItemReference, MapReference, Package, PackageContext};
use crate::persist::{generate_nonce, SessionStore};
use crate::response::ResponseGenerator;
use crate::storage::handler::StorageHandler;
use crate::storage::plugin::{StoragePlugin, StorageProvider};
use crate::target::SyncTarget;
use crate::transport::Encoding;
use crate::types::{AuthType, ModifiedDatabase, Role, SyncState};
use syncml_wire::codes;
use syncml_wire::consts::{
    SYNCML_CONTTYPE_DEVINF_XML, SYNCML_FORMAT_AUTH_BASIC, SYNCML_FORMAT_AUTH_MD5,
    SYNCML_FORMAT_ENCODING_B64,
};
use syncml_wire::{
    parse_message, wbxml, ChalParams, CommandParams, Fragment, HeaderParams, MapParams,
    ProtocolVersion, PutParams, ResultsParams, StatusCode, StatusParams, SyncMode, SyncParams,
};

/// What the driving agent should do after an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// Generate and send the next message, then receive again.
    Respond,
    /// The session is complete; nothing further to send.
    Finished,
}

/// How a server-alerted session starts.
pub enum ServerAlertedStart {
    /// DS 1.2: deliver these SAN bytes out of band.
    San(Vec<u8>),
    /// DS 1.1: an alert package was queued; send the next message.
    Respond,
}

pub struct SessionHandler {
    role: Role,
    config: SyncConfig,
    state: SyncState,

    command_handler: CommandHandler,
    devinf_handler: DevInfHandler,
    storage_handler: StorageHandler,
    response_generator: ResponseGenerator,

    provider: Box<dyn StorageProvider>,
    store: Box<dyn SessionStore>,
    observer: Box<dyn SyncObserver>,

    targets: Vec<SyncTarget>,
    storages: Vec<Box<dyn StoragePlugin>>,
    item_refs: Vec<ItemReference>,
    map_refs: Vec<MapReference>,

    session_id: String,
    local_device: String,
    remote_device: String,
    protocol_version: ProtocolVersion,
    encoding: Encoding,

    auth_type: AuthType,
    session_authenticated: bool,
    authentication_pending: bool,

    local_max_msg_size: i64,
    remote_max_msg_size: i64,
    local_next_anchor: String,

    sync_without_init_phase: bool,
    remote_reported_busy: bool,

    parsing: bool,
    sync_finished: bool,
    session_closed: bool,
    error_description: String,
    redirect_uri: Option<String>,

    now: Box<dyn Fn() -> i64 + Send>,
}

impl SessionHandler {
    pub fn new(
        config: SyncConfig,
        role: Role,
        device_info: DeviceInfo,
        provider: Box<dyn StorageProvider>,
        store: Box<dyn SessionStore>,
        observer: Box<dyn SyncObserver>,
    ) -> SessionHandler {
        SessionHandler {
            role,
            command_handler: CommandHandler::new(role),
            devinf_handler: DevInfHandler::new(device_info),
            storage_handler: StorageHandler::new(),
            response_generator: ResponseGenerator::new(),
            provider,
            store,
            observer,
            targets: Vec::new(),
            storages: Vec::new(),
            item_refs: Vec::new(),
            map_refs: Vec::new(),
            session_id: String::new(),
            local_device: String::new(),
            remote_device: String::new(),
            protocol_version: config.protocol_version,
            encoding: Encoding::Xml,
            auth_type: config.auth_type,
            session_authenticated: false,
            authentication_pending: false,
            local_max_msg_size: 65535,
            remote_max_msg_size: 65535,
            local_next_anchor: String::new(),
            sync_without_init_phase: false,
            remote_reported_busy: false,
            parsing: false,
            sync_finished: false,
            session_closed: false,
            error_description: String::new(),
            redirect_uri: None,
            state: SyncState::NotPrepared,
            config,
            now: Box::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Replace the time source, for deterministic anchors and session ids.
    pub fn with_clock(mut self, now: Box<dyn Fn() -> i64 + Send>) -> SessionHandler {
        self.now = now;
        self
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Transport capacities; the tx cap seeds the remote maximum until the
    /// remote announces its own.
    pub fn set_transport_caps(&mut self, max_tx: i64, max_rx: i64) {
        self.remote_max_msg_size = max_tx;
        self.local_max_msg_size = max_rx;
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.sync_finished && !self.parsing
    }

    pub fn error_description(&self) -> &str {
        &self.error_description
    }

    pub fn remote_device(&self) -> &str {
        &self.remote_device
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// RespURI redirect received in the last message, if any; the agent
    /// applies it to the transport.
    pub fn take_redirect_uri(&mut self) -> Option<String> {
        self.redirect_uri.take()
    }

    /// Retry budget for the first outbound HTTP request.
    pub fn http_resend_attempts(&self) -> u32 {
        self.config.properties.http_number_of_resend_attempts
    }

    /// Whether the session layer has authenticated the remote (or no
    /// authentication is required).
    pub fn authenticated(&self) -> bool {
        self.session_authenticated
    }

    /// Move the session into `Prepared` and stamp the local next anchor.
    pub fn prepare(&mut self) {
        self.local_next_anchor = (self.now)().to_string();
        self.item_refs.clear();
        self.map_refs.clear();
        self.set_sync_state(SyncState::Prepared);
    }

    pub(crate) fn set_sync_state(&mut self, state: SyncState) {
        if self.state != state {
            self.state = state;
            debug!(?state, "sync state changed");
            self.observer.sync_state_changed(state);
        }
    }

    /// Abort the session. Teardown is deferred while a message is being
    /// processed so queued statuses still go out; aborting twice is a
    /// no-op.
    pub fn abort_sync(&mut self, state: SyncState, description: &str) {
        if self.session_closed || self.sync_finished {
            return;
        }

        debug!(?state, description, "aborting sync");
        self.state = state;
        self.sync_finished = true;
        self.error_description = description.to_string();

        if !self.parsing {
            self.exit_sync();
        }
    }

    fn finish_sync(&mut self) {
        debug!("finishing sync");
        if let Err(error) = self.save_session() {
            error!(%error, "failed to save session");
            self.state = SyncState::DatabaseFailure;
            self.error_description = error.to_string();
        } else {
            self.state = SyncState::SyncFinished;
        }
        self.sync_finished = true;
    }

    fn exit_sync(&mut self) {
        if self.session_closed {
            debug!("session already closed");
            return;
        }
        self.session_closed = true;

        debug!(remote = %self.remote_device, "tearing down session");
        self.release_storages_and_targets();
        let remote = self.remote_device.clone();
        let description = self.error_description.clone();
        self.observer.sync_finished(&remote, self.state, &description);
    }

    fn release_storages_and_targets(&mut self) {
        for storage in self.storages.drain(..) {
            self.provider.release(storage);
        }
        self.targets.clear();
    }

    fn save_session(&mut self) -> Result<(), SyncError> {
        debug!("saving sync session");
        for target in &self.targets {
            self.store.save_changelog(
                &self.remote_device,
                target.source_db(),
                target.sync_mode().direction,
                &target.save_record(),
            )?;
        }
        Ok(())
    }

    /// Session id derived from the clock; for compatibility only the four
    /// rightmost digits are used.
    pub(crate) fn generate_session_id(&self) -> String {
        let stamp = (self.now)().to_string();
        let tail = stamp.len().saturating_sub(4);
        stamp[tail..].to_string()
    }

    pub(crate) fn local_next_anchor(&self) -> String {
        self.local_next_anchor.clone()
    }

    // ------------------------------------------------------------------
    // Session setup
    // ------------------------------------------------------------------

    /// Local-initiated session setup: identities and header params from
    /// configuration.
    pub(crate) fn setup_local_session(&mut self, session_id: &str) {
        self.session_id = session_id.to_string();

        self.local_device = if self.config.local_device.is_empty() {
            self.devinf_handler.local_device_info().device_id.clone()
        } else {
            self.config.local_device.clone()
        };
        self.remote_device = self.config.remote_device.clone();

        self.auth_type = self.config.auth_type;
        self.session_authenticated = self.auth_type == AuthType::None;
        self.sync_without_init_phase = self.config.extensions.sync_without_init_phase;

        let mut header = HeaderParams {
            session_id: self.session_id.clone(),
            source_device: self.local_device.clone(),
            target_device: self.remote_device.clone(),
            ..Default::default()
        };
        header.meta.max_msg_size = self.local_max_msg_size;
        header.meta.emi = self.config.extensions.emi_tags.clone();
        self.response_generator.set_header_params(header);
    }

    /// Remote-initiated session setup from the first inbound header.
    pub(crate) fn setup_session_from_header(&mut self, header: &HeaderParams) {
        self.session_id = header.session_id.clone();

        // An unknown target device id means the remote does not know us
        // yet; identify ourselves in the response.
        let local_device = if header.target_device == syncml_wire::consts::SYNCML_UNKNOWN_DEVICE {
            if self.config.local_device.is_empty() {
                self.devinf_handler.local_device_info().device_id.clone()
            } else {
                self.config.local_device.clone()
            }
        } else {
            header.target_device.clone()
        };

        self.local_device = local_device;
        self.remote_device = header.source_device.clone();
        self.auth_type = self.config.auth_type;
        self.session_authenticated = self.auth_type == AuthType::None;
        self.sync_without_init_phase = self.config.extensions.sync_without_init_phase;

        let version = ProtocolVersion::from_ver_dtd(&header.ver_dtd);
        if version != ProtocolVersion::Unknown {
            debug!(?version, "negotiated protocol version");
            self.protocol_version = version;
        }

        let mut local_header = HeaderParams {
            session_id: self.session_id.clone(),
            source_device: self.local_device.clone(),
            target_device: self.remote_device.clone(),
            ..Default::default()
        };
        local_header.meta.max_msg_size = self.local_max_msg_size;
        self.response_generator.set_header_params(local_header);
    }

    // ------------------------------------------------------------------
    // Storage and target plumbing
    // ------------------------------------------------------------------

    pub(crate) fn storage_index_by_uri(&mut self, uri: &str) -> Option<usize> {
        if let Some(index) = self.storages.iter().position(|s| s.source_uri() == uri) {
            return Some(index);
        }
        let plugin = self.provider.acquire_by_uri(uri)?;
        let mime_type = plugin.preferred_format().mime_type.clone();
        self.storages.push(plugin);
        self.observer.storage_acquired(&mime_type);
        Some(self.storages.len() - 1)
    }

    pub(crate) fn storage_index_by_mime(&mut self, mime_type: &str) -> Option<usize> {
        if let Some(index) =
            self.storages.iter().position(|s| s.preferred_format().mime_type == mime_type)
        {
            return Some(index);
        }
        let plugin = self.provider.acquire_by_mime(mime_type)?;
        self.storages.push(plugin);
        self.observer.storage_acquired(mime_type);
        Some(self.storages.len() - 1)
    }

    /// Create (or find) the target bound to a storage, loading its change
    /// log.
    pub(crate) fn create_sync_target(&mut self, storage: usize, sync_mode: SyncMode) -> usize {
        let source_uri = self.storages[storage].source_uri().to_string();

        if let Some(index) = self.target_index_by_source(&source_uri) {
            return index;
        }

        let changelog = match self.store.load_changelog(
            &self.remote_device,
            &source_uri,
            sync_mode.direction,
        ) {
            Ok(record) => record,
            Err(error) => {
                warn!(%error, "could not load change log information");
                None
            }
        };

        let anchor = self.local_next_anchor();
        self.targets.push(SyncTarget::new(storage, &source_uri, sync_mode, &anchor, changelog));
        self.targets.len() - 1
    }

    pub(crate) fn target_index_by_source(&self, source_db: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.source_db().eq_ignore_ascii_case(source_db))
    }

    // ------------------------------------------------------------------
    // Inbound message processing
    // ------------------------------------------------------------------

    /// Process one inbound SyncML payload, XML or WbXML.
    pub fn handle_message(&mut self, data: &[u8]) -> Result<SessionStep, SyncError> {
        let xml;
        let payload = if data.first().is_some_and(|b| *b == 0x02 || *b == 0x03) {
            match wbxml::decode_to_xml(data) {
                Ok(decoded) => {
                    xml = decoded;
                    &xml[..]
                }
                Err(error) => {
                    self.abort_sync(
                        SyncState::InvalidSyncMlMessage,
                        &format!("WbXML decoding failed: {error}"),
                    );
                    return Ok(SessionStep::Finished);
                }
            }
        } else {
            data
        };

        let parsed = match parse_message(payload) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.abort_sync(SyncState::InvalidSyncMlMessage, &format!("Parser error: {error}"));
                return Ok(SessionStep::Finished);
            }
        };

        debug!(fragments = parsed.fragments.len(), "beginning to process received message");
        self.parsing = true;

        for fragment in parsed.fragments {
            if self.sync_finished {
                break;
            }
            match fragment {
                Fragment::Header(header) => self.handle_header_element(header),
                Fragment::Status(status) => self.handle_status_element(status),
                Fragment::Sync(sync) => self.handle_sync_element(sync),
                Fragment::Map(map) => self.handle_map_element(map),
                Fragment::Put(put) => self.handle_put_element(put),
                Fragment::Results(results) => self.handle_results_element(results),
                Fragment::Command(command) => self.handle_command_element(command),
            }
        }

        if parsed.final_seen && !self.sync_finished && self.session_authenticated {
            self.final_received();
        }

        debug!("received message processed");
        self.handle_end_of_message()
    }

    fn handle_end_of_message(&mut self) -> Result<SessionStep, SyncError> {
        let step = if self.sync_finished { SessionStep::Finished } else { self.message_parsed() };
        self.parsing = false;
        if self.sync_finished {
            self.exit_sync();
            return Ok(SessionStep::Finished);
        }
        Ok(step)
    }

    fn handle_header_element(&mut self, header: HeaderParams) {
        if !header.resp_uri.is_empty() {
            self.redirect_uri = Some(header.resp_uri.clone());
        }

        self.response_generator.set_remote_msg_id(header.msg_id);
        if header.meta.max_msg_size > 0 {
            self.remote_max_msg_size = header.meta.max_msg_size;
        }
        self.response_generator.set_ignore_statuses(header.no_resp);

        self.message_received(&header);

        if !header.cred.data.is_empty() {
            self.authentication_information_received(&header);
        } else if !self.authentication_pending && !self.session_authenticated {
            // Expecting authentication; challenge the remote.
            let chal = match self.compose_challenge() {
                Ok(chal) => chal,
                Err(error) => {
                    self.abort_sync(SyncState::InternalError, &error.to_string());
                    return;
                }
            };
            self.response_generator.add_status_for_header_with_chal(
                &header,
                chal,
                codes::MISSING_CRED,
            );
        } else {
            self.response_generator.add_status_for_header(&header, codes::SUCCESS);
        }
    }

    fn compose_challenge(&mut self) -> Result<ChalParams, SyncError> {
        let mut chal = ChalParams::default();
        chal.meta.format = SYNCML_FORMAT_ENCODING_B64.to_string();

        match self.auth_type {
            AuthType::Basic => {
                chal.meta.mime_type = SYNCML_FORMAT_AUTH_BASIC.to_string();
            }
            AuthType::Md5 => {
                chal.meta.mime_type = SYNCML_FORMAT_AUTH_MD5.to_string();
                let nonce = generate_nonce()?;
                chal.meta.next_nonce = BASE64.encode(&nonce);
                self.store.upsert_nonce(&self.local_device, &self.remote_device, &nonce)?;
            }
            AuthType::None => {}
        }

        Ok(chal)
    }

    fn authentication_information_received(&mut self, header: &HeaderParams) {
        match self.auth_type {
            AuthType::None => {
                // Not requiring authentication; accept whatever came.
                self.session_authenticated = true;
                self.response_generator.add_status_for_header(header, codes::AUTH_ACCEPTED);
            }
            AuthType::Basic => self.verify_basic_credentials(header),
            AuthType::Md5 => self.verify_md5_credentials(header),
        }
    }

    fn verify_basic_credentials(&mut self, header: &HeaderParams) {
        let cred = &header.cred;
        if cred.meta.mime_type != SYNCML_FORMAT_AUTH_BASIC
            || cred.meta.format != SYNCML_FORMAT_ENCODING_B64
        {
            let mut chal = ChalParams::default();
            chal.meta.mime_type = SYNCML_FORMAT_AUTH_BASIC.to_string();
            chal.meta.format = SYNCML_FORMAT_ENCODING_B64.to_string();
            self.response_generator.add_status_for_header_with_chal(
                header,
                chal,
                codes::MISSING_CRED,
            );
            return;
        }

        match decode_basic_auth(&cred.data) {
            Some((username, password))
                if username == self.config.username && password == self.config.password =>
            {
                self.session_authenticated = true;
                self.response_generator.add_status_for_header(header, codes::AUTH_ACCEPTED);
            }
            Some(_) => {
                self.response_generator.add_status_for_header(header, codes::INVALID_CRED);
            }
            None => {
                self.response_generator.add_status_for_header(header, codes::PROCESSING_ERROR);
            }
        }
    }

    fn verify_md5_credentials(&mut self, header: &HeaderParams) {
        let cred = &header.cred;
        if cred.meta.mime_type != SYNCML_FORMAT_AUTH_MD5
            || cred.meta.format != SYNCML_FORMAT_ENCODING_B64
        {
            // Expecting MD5; challenge with a fresh nonce.
            let mut chal = ChalParams::default();
            chal.meta.mime_type = SYNCML_FORMAT_AUTH_MD5.to_string();
            chal.meta.format = SYNCML_FORMAT_ENCODING_B64.to_string();
            match generate_nonce() {
                Ok(nonce) => {
                    chal.meta.next_nonce = BASE64.encode(&nonce);
                    if let Err(error) =
                        self.store.upsert_nonce(&self.local_device, &self.remote_device, &nonce)
                    {
                        self.abort_sync(SyncState::DatabaseFailure, &error.to_string());
                        return;
                    }
                }
                Err(error) => {
                    self.abort_sync(SyncState::InternalError, &error.to_string());
                    return;
                }
            }
            self.response_generator.add_status_for_header_with_chal(
                header,
                chal,
                codes::MISSING_CRED,
            );
            return;
        }

        let nonce = self
            .store
            .get_nonce(&self.local_device, &self.remote_device)
            .unwrap_or_default()
            .unwrap_or_default();
        let expected = encode_md5_auth_b64(&self.config.username, &self.config.password, &nonce);

        if expected == cred.data.trim() {
            self.session_authenticated = true;
            let _ = self.store.clear_nonce(&self.local_device, &self.remote_device);
            self.response_generator.add_status_for_header(header, codes::AUTH_ACCEPTED);
        } else {
            self.response_generator.add_status_for_header(header, codes::INVALID_CRED);
        }
    }

    fn handle_status_element(&mut self, status: StatusParams) {
        if status.cmd_ref == 0 {
            self.handle_header_status(&status);
            return;
        }

        // Only session-layer authentication is supported; a challenge on
        // any other status is fatal.
        if status.chal.is_some() {
            self.abort_sync(
                SyncState::AuthenticationFailure,
                "Database-layer authentication is not supported",
            );
            return;
        }

        if status.cmd == syncml_wire::consts::E_ALERT {
            // A refresh-required answer to our alert reverts the target
            // to slow sync; its mappings are no longer valid.
            if status.data == codes::REFRESH_REQUIRED {
                if let Some(index) = self.target_index_by_source(&status.source_ref) {
                    self.targets[index].revert_sync_mode();
                    self.targets[index].clear_uid_mappings();
                }
            }
            return;
        }

        let (effect, ack) = self.command_handler.handle_status(&status);

        if let Some(ack) = ack {
            self.process_item_status(ack.msg_ref, ack.cmd_ref, &ack.source_ref);
        }
        self.process_map_status(status.msg_ref, status.cmd_ref);

        if let StatusEffect::Abort(code) = effect {
            self.abort_sync(SyncState::Aborted, &format!("Remote reported error {code}"));
        }
    }

    fn handle_header_status(&mut self, status: &StatusParams) {
        let remote = self.remote_device.clone();
        let local = self.local_device.clone();

        match status.data {
            codes::AUTH_ACCEPTED => {
                self.authentication_pending = false;
                self.session_authenticated = true;

                if self.auth_type == AuthType::Md5 {
                    let _ = self.store.clear_nonce(&remote, &local);
                }

                // A successful authentication may still carry the nonce
                // for the next session.
                if let Some(chal) = &status.chal {
                    if chal.meta.mime_type == SYNCML_FORMAT_AUTH_MD5 {
                        if let Ok(nonce) = BASE64.decode(chal.meta.next_nonce.trim()) {
                            let _ = self.store.upsert_nonce(&remote, &local, &nonce);
                        }
                    }
                }
            }
            codes::MISSING_CRED => match &status.chal {
                Some(chal) if !chal.meta.mime_type.is_empty() => {
                    self.handle_challenge(chal.clone())
                }
                _ => {
                    if self.auth_type == AuthType::Md5 {
                        let _ = self.store.clear_nonce(&remote, &local);
                    }
                    self.abort_sync(SyncState::AuthenticationFailure, "Authentication required");
                }
            },
            codes::INVALID_CRED => {
                let challenged =
                    status.chal.as_ref().is_some_and(|chal| !chal.meta.mime_type.is_empty());
                if self.authentication_pending || !challenged {
                    if self.auth_type == AuthType::Md5 {
                        let _ = self.store.clear_nonce(&remote, &local);
                    }
                    self.abort_sync(SyncState::AuthenticationFailure, "Authentication failed");
                } else if let Some(chal) = &status.chal {
                    self.handle_challenge(chal.clone());
                }
            }
            codes::SUCCESS => {}
            codes::IN_PROGRESS => {
                // Remote is busy; ask for results next message.
                self.remote_reported_busy = true;
            }
            _ => {
                self.abort_sync(
                    SyncState::InternalError,
                    "Unknown status code received for SyncHdr",
                );
            }
        }
    }

    /// React to an authentication challenge from the remote.
    fn handle_challenge(&mut self, chal: ChalParams) {
        self.session_authenticated = false;

        if chal.meta.format != SYNCML_FORMAT_ENCODING_B64 {
            self.abort_sync(
                SyncState::AuthenticationFailure,
                "Unsupported encoding encountered in authentication challenge",
            );
            return;
        }

        let remote = self.remote_device.clone();
        let local = self.local_device.clone();

        if chal.meta.mime_type == SYNCML_FORMAT_AUTH_BASIC {
            if self.authentication_pending && self.auth_type == AuthType::Basic {
                // Re-challenged on the type we already attempted.
                self.abort_sync(SyncState::AuthenticationFailure, "Authentication failed");
            } else {
                self.auth_type = AuthType::Basic;
                self.resend_package();
            }
        } else if chal.meta.mime_type == SYNCML_FORMAT_AUTH_MD5 {
            let supplied = BASE64.decode(chal.meta.next_nonce.trim()).unwrap_or_default();

            if self.authentication_pending && self.auth_type == AuthType::Md5 {
                // Re-challenge after an MD5 attempt: only survivable if we
                // had no nonce for the first attempt.
                let had_nonce = self
                    .store
                    .get_nonce(&remote, &local)
                    .unwrap_or_default()
                    .is_some_and(|nonce| !nonce.is_empty());

                if had_nonce {
                    self.abort_sync(
                        SyncState::AuthenticationFailure,
                        "Challenged for MD5 authentication again while holding a nonce",
                    );
                } else {
                    let _ = self.store.upsert_nonce(&remote, &local, &supplied);
                    self.resend_package();
                }
            } else {
                self.auth_type = AuthType::Md5;
                let _ = self.store.upsert_nonce(&remote, &local, &supplied);
                self.resend_package();
            }
        } else {
            self.abort_sync(
                SyncState::AuthenticationFailure,
                "Unsupported authentication type encountered",
            );
        }
    }

    fn handle_sync_element(&mut self, sync: SyncParams) {
        if !self.session_authenticated {
            self.command_handler.reject_sync(
                &sync,
                &mut self.response_generator,
                codes::INVALID_CRED,
            );
            return;
        }

        if !self.sync_received() {
            self.command_handler.reject_sync(
                &sync,
                &mut self.response_generator,
                codes::COMMAND_NOT_ALLOWED,
            );
            return;
        }

        let Some(index) = self.target_index_by_source(&sync.target_database) else {
            self.command_handler.reject_sync(
                &sync,
                &mut self.response_generator,
                codes::NOT_FOUND,
            );
            return;
        };

        let target = &mut self.targets[index];
        let plugin = self.storages[target.storage].as_mut();

        if target.discover_local_changes(self.role, plugin).is_err() {
            error!(source_db = %target.source_db(), "failed to discover local changes");
            self.command_handler.reject_sync(
                &sync,
                &mut self.response_generator,
                codes::COMMAND_FAILED,
            );
            return;
        }

        // The resolver works on the change manifest detached from the
        // target, so the handler can mutate the target's mappings freely.
        let mut changes = target.take_local_changes();
        let mut resolver =
            ConflictResolver::new(&mut changes, self.config.properties.conflict_resolution_policy);

        self.command_handler.handle_sync(
            &sync,
            target,
            plugin,
            &mut self.storage_handler,
            &mut self.response_generator,
            Some(&mut resolver),
            self.config.properties.fast_maps_send,
            self.observer.as_mut(),
        );

        self.targets[index].restore_local_changes(changes);
    }

    fn handle_map_element(&mut self, map: MapParams) {
        let status = if !self.session_authenticated {
            codes::INVALID_CRED
        } else if !self.map_received() {
            codes::COMMAND_NOT_ALLOWED
        } else if let Some(index) = self.target_index_by_source(&map.target_database) {
            self.command_handler.handle_map(&map, &mut self.targets[index])
        } else {
            codes::NOT_FOUND
        };

        // Maps do not carry NoResp.
        self.response_generator.add_status_for_map(&map, status);
    }

    fn handle_put_element(&mut self, put: PutParams) {
        let status = if !self.session_authenticated {
            codes::INVALID_CRED
        } else if put.meta.mime_type == SYNCML_CONTTYPE_DEVINF_XML {
            self.devinf_handler.handle_put(&put, self.protocol_version)
        } else {
            codes::NOT_IMPLEMENTED
        };

        if !put.no_resp {
            self.response_generator.add_status_for_put(&put, status);
        }
    }

    fn handle_results_element(&mut self, results: ResultsParams) {
        let status = if !self.session_authenticated {
            codes::INVALID_CRED
        } else if results.meta.mime_type == SYNCML_CONTTYPE_DEVINF_XML {
            self.devinf_handler.handle_results(&results, self.protocol_version)
        } else {
            codes::NOT_IMPLEMENTED
        };

        // NoResp cannot be specified with Results.
        self.response_generator.add_status_for_results(&results, status);
    }

    fn handle_command_element(&mut self, mut command: CommandParams) {
        match command.command {
            syncml_wire::CommandType::Alert => self.handle_alert_element(&mut command),
            syncml_wire::CommandType::Get => self.handle_get_element(&command),
            _ => {
                // Add/Replace/Delete outside Sync, Exec, Copy and friends.
                self.command_handler.reject_command(
                    &command,
                    &mut self.response_generator,
                    codes::NOT_IMPLEMENTED,
                );
            }
        }
    }

    fn handle_alert_element(&mut self, alert: &mut CommandParams) {
        let status = if self.session_authenticated {
            match alert.alert_code().and_then(SyncMode::from_alert_code) {
                Some(mode) => self.sync_alert_received(mode, alert),
                None => self.handle_informative_alert(alert),
            }
        } else {
            codes::INVALID_CRED
        };

        if !alert.no_resp {
            self.response_generator.add_status_for_alert(alert, status);
        }
    }

    fn handle_informative_alert(&mut self, alert: &CommandParams) -> StatusCode {
        match alert.alert_code() {
            Some(codes::ALERT_NEXT_MESSAGE) => codes::SUCCESS,
            Some(codes::ALERT_DISPLAY) | Some(codes::ALERT_RESULT) => codes::NOT_IMPLEMENTED,
            _ => codes::NOT_IMPLEMENTED,
        }
    }

    fn handle_get_element(&mut self, get: &CommandParams) {
        let status = if !self.session_authenticated {
            codes::INVALID_CRED
        } else if get.meta.mime_type == SYNCML_CONTTYPE_DEVINF_XML {
            let target =
                get.items.first().map(|item| item.target.clone()).unwrap_or_default();
            let (status, shape) = self.devinf_handler.handle_get(
                &target,
                self.response_generator.remote_msg_id(),
                get.cmd_id,
                self.protocol_version,
            );
            if let Some(shape) = shape {
                self.response_generator
                    .add_package(Package::DevInf(crate::packages::DevInfPackage { shape }));
            }
            status
        } else {
            codes::NOT_IMPLEMENTED
        };

        if !get.no_resp {
            self.response_generator.add_status_for_command(get, status);
        }
    }

    /// Clear the pending reference matching an acknowledged item and tell
    /// the observer about the remote-side modification.
    fn process_item_status(&mut self, msg_ref: u32, cmd_ref: u32, key: &str) {
        let Some(position) = self.item_refs.iter().position(|reference| {
            reference.msg_id == msg_ref && reference.cmd_id == cmd_ref && reference.key == key
        }) else {
            return;
        };

        let reference = self.item_refs.remove(position);
        if let Some(index) = self.target_index_by_source(&reference.local_db) {
            self.targets[index].acknowledge_change(&reference.key);
        }
        self.observer.item_processed(
            reference.modification,
            ModifiedDatabase::Remote,
            &reference.local_db,
            &reference.mime_type,
        );
    }

    fn process_map_status(&mut self, msg_ref: u32, cmd_ref: u32) {
        self.map_refs
            .retain(|reference| !(reference.msg_id == msg_ref && reference.cmd_id == cmd_ref));
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Build and encode the next outbound message.
    pub fn generate_message(&mut self) -> Result<Vec<u8>, SyncError> {
        debug!("sending next message");

        // With nothing but statuses to send, ask the remote to continue
        // with a 222 alert per target.
        if self.response_generator.package_queue_empty() {
            let alerts: Vec<AlertPackage> = self
                .targets
                .iter()
                .map(|target| {
                    AlertPackage::databases(
                        codes::ALERT_NEXT_MESSAGE,
                        target.source_db(),
                        target.target_db(),
                    )
                })
                .collect();
            for alert in alerts {
                self.response_generator.add_package(Package::Alert(alert));
            }
        }

        let max_size = self
            .config
            .properties
            .max_message_size
            .map_or(self.remote_max_msg_size, |cap| cap.min(self.remote_max_msg_size));

        let mut ctx = PackageContext {
            targets: &mut self.targets,
            storages: &mut self.storages,
            role: self.role,
            version: self.protocol_version,
            device_info: self.devinf_handler.local_device_info(),
            item_refs: &mut self.item_refs,
            map_refs: &mut self.map_refs,
        };

        let message = self.response_generator.generate_next_message(
            max_size,
            self.protocol_version,
            &mut ctx,
        )?;

        let encoded = match self.encoding {
            Encoding::Xml => message.encode_xml()?,
            Encoding::Wbxml => message.encode_wbxml()?,
        };

        // The server finishes once everything queued has been flushed.
        if self.role == Role::Server
            && self.state == SyncState::Finalizing
            && self.response_generator.package_queue_empty()
        {
            self.finish_sync();
            self.exit_sync();
        }

        Ok(encoded)
    }

    pub(crate) fn compose_local_changes(&mut self) {
        for target in &self.targets {
            let Some(changes) = target.local_changes() else {
                warn!(source_db = %target.source_db(), "no local changes discovered for target");
                continue;
            };
            let package = crate::packages::LocalChangesPackage::new(
                target,
                changes.clone(),
                self.remote_max_msg_size,
                self.role,
                self.config.properties.max_changes_per_message,
            );
            self.response_generator.add_package(Package::LocalChanges(package));
        }
    }

    pub(crate) fn compose_authentication(&mut self) {
        match self.auth_type {
            AuthType::Basic => {
                self.response_generator.add_package(Package::Authentication(
                    crate::packages::AuthenticationPackage {
                        auth_type: AuthType::Basic,
                        username: self.config.username.clone(),
                        password: self.config.password.clone(),
                        nonce: None,
                    },
                ));
                self.authentication_pending = true;
            }
            AuthType::Md5 => {
                // Without a nonce the attempt would fail anyway; wait for
                // the challenge that will deliver one.
                let nonce = self
                    .store
                    .get_nonce(&self.remote_device, &self.local_device)
                    .unwrap_or_default();
                if let Some(nonce) = nonce.filter(|nonce| !nonce.is_empty()) {
                    self.response_generator.add_package(Package::Authentication(
                        crate::packages::AuthenticationPackage {
                            auth_type: AuthType::Md5,
                            username: self.config.username.clone(),
                            password: self.config.password.clone(),
                            nonce: Some(nonce),
                        },
                    ));
                }
                self.authentication_pending = true;
            }
            AuthType::None => {}
        }
    }

    pub(crate) fn discover_all_local_changes(&mut self) {
        for target in &mut self.targets {
            let plugin = self.storages[target.storage].as_mut();
            if let Err(error) = target.discover_local_changes(self.role, plugin) {
                warn!(source_db = %target.source_db(), %error, "error discovering changes");
            }
        }
    }

    // ------------------------------------------------------------------
    // Role dispatch
    // ------------------------------------------------------------------

    fn message_received(&mut self, header: &HeaderParams) {
        match self.role {
            Role::Client => self.client_message_received(header),
            Role::Server => self.server_message_received(header),
        }
    }

    fn sync_alert_received(&mut self, mode: SyncMode, alert: &mut CommandParams) -> StatusCode {
        match self.role {
            Role::Client => self.client_sync_alert_received(mode, alert),
            Role::Server => self.server_sync_alert_received(mode, alert),
        }
    }

    fn sync_received(&mut self) -> bool {
        match self.role {
            Role::Client => self.client_sync_received(),
            Role::Server => self.server_sync_received(),
        }
    }

    fn map_received(&mut self) -> bool {
        match self.role {
            Role::Client => false, // A client never receives Map.
            Role::Server => self.server_map_received(),
        }
    }

    fn final_received(&mut self) {
        match self.role {
            Role::Client => self.client_final_received(),
            Role::Server => self.server_final_received(),
        }
    }

    fn message_parsed(&mut self) -> SessionStep {
        match self.role {
            Role::Client => self.client_message_parsed(),
            Role::Server => self.server_message_parsed(),
        }
    }

    fn resend_package(&mut self) {
        match self.role {
            Role::Client => self.client_resend_package(),
            Role::Server => self.server_resend_package(),
        }
    }
}

//! Session and agent configuration.

use serde::{Deserialize, Serialize};

use crate::types::{AuthType, ConflictPolicy};
use syncml_wire::{ProtocolVersion, SyncMode};

/// Tunable agent properties, all optional with protocol defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentProperties {
    /// Cap on outbound message size in bytes; the transport's tx cap is
    /// used when unset.
    pub max_message_size: Option<i64>,
    /// Bound on item commands per outbound Sync element.
    pub max_changes_per_message: usize,
    pub conflict_resolution_policy: ConflictPolicy,
    /// Send UID mappings alongside item status acks instead of waiting for
    /// the map phase.
    pub fast_maps_send: bool,
    /// Allow skipping an all-trivial final status message.
    pub omit_data_update_status: bool,
    /// Retries for the first outbound HTTP request only.
    pub http_number_of_resend_attempts: u32,
    pub http_proxy_host: Option<String>,
    pub http_proxy_port: Option<u16>,
    pub bt_obex_mtu: Option<u32>,
    pub usb_obex_mtu: Option<u32>,
}

impl Default for AgentProperties {
    fn default() -> Self {
        AgentProperties {
            max_message_size: None,
            max_changes_per_message: 22,
            conflict_resolution_policy: ConflictPolicy::default(),
            fast_maps_send: false,
            omit_data_update_status: false,
            http_number_of_resend_attempts: 3,
            http_proxy_host: None,
            http_proxy_port: None,
            bt_obex_mtu: None,
            usb_obex_mtu: None,
        }
    }
}

/// Extension toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Extensions {
    /// Emit EMI tags in the header meta.
    pub emi_tags: Vec<String>,
    /// Negotiate sync without a separate initialization phase.
    pub sync_without_init_phase: bool,
    /// Server-URI substring → MIME type fallbacks for SAN routing.
    pub san_mappings: Vec<(String, String)>,
}

/// One datastore to synchronize: local source URI and the remote target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreRoute {
    pub source_db: String,
    pub target_db: String,
}

/// Full configuration of a sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local device id; falls back to the device info id when empty.
    pub local_device: String,
    pub remote_device: String,
    pub username: String,
    pub password: String,
    pub auth_type: AuthType,
    #[serde(skip)]
    pub protocol_version: ProtocolVersion,
    #[serde(skip)]
    pub sync_mode: SyncMode,
    pub datastores: Vec<DatastoreRoute>,
    pub properties: AgentProperties,
    pub extensions: Extensions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            local_device: String::new(),
            remote_device: String::new(),
            username: String::new(),
            password: String::new(),
            auth_type: AuthType::None,
            protocol_version: ProtocolVersion::Ds12,
            sync_mode: SyncMode::default(),
            datastores: Vec::new(),
            properties: AgentProperties::default(),
            extensions: Extensions::default(),
        }
    }
}

impl SyncConfig {
    /// Remote target database configured for a local source URI.
    pub fn target_for(&self, source_db: &str) -> Option<&str> {
        self.datastores
            .iter()
            .find(|route| route.source_db == source_db)
            .map(|route| route.target_db.as_str())
    }

    /// SAN fallback: map a server URI to a MIME type via the configured
    /// substring table.
    pub fn san_mime_for(&self, server_uri: &str) -> Option<&str> {
        let uri = server_uri.to_ascii_lowercase();
        self.extensions
            .san_mappings
            .iter()
            .find(|(needle, _)| uri.contains(&needle.to_ascii_lowercase()))
            .map(|(_, mime)| mime.as_str())
    }
}

//! Device information exchange: local capabilities out, remote
//! capabilities in, at most once per session.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::plugin::StoragePlugin;
use crate::types::Role;
use syncml_wire::consts::*;
use syncml_wire::{xml, Element, ProtocolVersion, PutParams, ResultsParams, StatusCode};

/// Static description of the local device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub device_id: String,
    pub manufacturer: String,
    pub model: String,
    pub oem: String,
    pub firmware_version: String,
    pub software_version: String,
    pub hardware_version: String,
    pub device_type: String,
}

/// Capabilities received from the remote device, kept as the raw document
/// plus the fields the engine actually reads.
#[derive(Debug, Clone, Default)]
pub struct RemoteDeviceInfo {
    pub device_id: String,
    pub manufacturer: String,
    pub supports_large_objects: bool,
    pub supports_number_of_changes: bool,
    pub document: Option<Element>,
}

impl RemoteDeviceInfo {
    fn from_document(document: &Element) -> RemoteDeviceInfo {
        let text = |name: &str| {
            document.find(name).map(|e| e.value.clone()).unwrap_or_default()
        };
        RemoteDeviceInfo {
            device_id: text(E_DEVID),
            manufacturer: text(E_MAN),
            supports_large_objects: document.find(E_SUPPORTLARGEOBJS).is_some(),
            supports_number_of_changes: document.find(E_SUPPORTNUMBEROFCHANGES).is_some(),
            document: Some(document.clone()),
        }
    }
}

/// Build the local DevInf document for the given datastores.
pub fn device_info_document(
    info: &DeviceInfo,
    storages: &[Box<dyn StoragePlugin>],
    version: ProtocolVersion,
    role: Role,
) -> Element {
    let mut devinf = Element::new(E_DEVINF)
        .attr(XML_NAMESPACE, XML_NAMESPACE_DEVINF)
        .child(Element::with_value(E_VERDTD, version.ver_dtd()))
        .child(Element::with_value(E_MAN, info.manufacturer.as_str()))
        .child(Element::with_value(E_MOD, info.model.as_str()));

    if !info.oem.is_empty() {
        devinf.add_child(Element::with_value(E_OEM, info.oem.as_str()));
    }
    if !info.firmware_version.is_empty() {
        devinf.add_child(Element::with_value(E_FWV, info.firmware_version.as_str()));
    }
    if !info.software_version.is_empty() {
        devinf.add_child(Element::with_value(E_SWV, info.software_version.as_str()));
    }
    if !info.hardware_version.is_empty() {
        devinf.add_child(Element::with_value(E_HWV, info.hardware_version.as_str()));
    }

    devinf.add_child(Element::with_value(E_DEVID, info.device_id.as_str()));
    devinf.add_child(Element::with_value(E_DEVTYP, info.device_type.as_str()));
    devinf.add_child(Element::new(E_UTC));
    devinf.add_child(Element::new(E_SUPPORTLARGEOBJS));
    devinf.add_child(Element::new(E_SUPPORTNUMBEROFCHANGES));

    for storage in storages {
        let mut datastore = Element::new(E_DATASTORE)
            .child(Element::with_value(E_SOURCEREF, storage.source_uri()))
            .child(Element::with_value(E_MAXGUIDSIZE, "64"));

        let preferred = storage.preferred_format();
        datastore.add_child(
            Element::new(E_RX_PREF)
                .child(Element::with_value(E_CTTYPE, preferred.mime_type.as_str()))
                .child(Element::with_value(E_VERCT, preferred.version.as_str())),
        );
        datastore.add_child(
            Element::new(E_TX_PREF)
                .child(Element::with_value(E_CTTYPE, preferred.mime_type.as_str()))
                .child(Element::with_value(E_VERCT, preferred.version.as_str())),
        );
        for format in storage.supported_formats().iter().filter(|f| *f != preferred) {
            datastore.add_child(
                Element::new(E_RX)
                    .child(Element::with_value(E_CTTYPE, format.mime_type.as_str()))
                    .child(Element::with_value(E_VERCT, format.version.as_str())),
            );
            datastore.add_child(
                Element::new(E_TX)
                    .child(Element::with_value(E_CTTYPE, format.mime_type.as_str()))
                    .child(Element::with_value(E_VERCT, format.version.as_str())),
            );
        }

        // CTCap XML is provided by the plugin; parse and inline it.
        let caps = storage.ct_caps_xml(version);
        if !caps.is_empty() {
            if let Ok(ct_cap) = xml::decode(caps.as_bytes()) {
                datastore.add_child(ct_cap);
            }
        }

        let mut sync_cap = Element::new(E_SYNCCAP);
        // Two-way, slow, one-way and refresh modes plus server alerted.
        for sync_type in [1, 2, 3, 4, 5, 6, 7] {
            sync_cap.add_child(Element::with_value(E_SYNCTYPE, sync_type.to_string()));
        }
        datastore.add_child(sync_cap);

        // Server role announces support for hierarchical sync in 1.2.
        if role == Role::Server && version == ProtocolVersion::Ds12 {
            datastore.add_child(Element::new("SupportHierarchicalSync"));
        }

        devinf.add_child(datastore);
    }

    devinf
}

/// Which exchange shape the DevInf package writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevInfShape {
    /// Local-initiated: Put our capabilities, Get theirs.
    PutGet,
    /// Answer a remote Get.
    Results { msg_ref: u32, cmd_ref: u32 },
    /// Answer a remote Get and request theirs in the same message.
    ResultsGet { msg_ref: u32, cmd_ref: u32 },
}

/// Drives the one-shot device information exchange.
#[derive(Debug, Default)]
pub struct DevInfHandler {
    info: DeviceInfo,
    remote: RemoteDeviceInfo,
    local_sent: bool,
    remote_received: bool,
}

impl DevInfHandler {
    pub fn new(info: DeviceInfo) -> DevInfHandler {
        DevInfHandler { info, ..Default::default() }
    }

    pub fn local_device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn remote_device_info(&self) -> &RemoteDeviceInfo {
        &self.remote
    }

    pub fn remote_received(&self) -> bool {
        self.remote_received
    }

    /// Forget that local capabilities were sent; used when a package must
    /// be rebuilt after an authentication challenge.
    pub fn reset(&mut self) {
        self.local_sent = false;
    }

    /// Shape for a local-initiated exchange, or `None` if capabilities
    /// were already sent this session.
    pub fn compose_local_exchange(&mut self) -> Option<DevInfShape> {
        if self.local_sent {
            return None;
        }
        self.local_sent = true;
        Some(DevInfShape::PutGet)
    }

    /// Handle a remote Get for our capabilities. Returns the status code
    /// and, when valid, the package shape to enqueue.
    pub fn handle_get(
        &mut self,
        target: &str,
        msg_ref: u32,
        cmd_ref: u32,
        version: ProtocolVersion,
    ) -> (StatusCode, Option<DevInfShape>) {
        if target != version.devinf_uri() {
            return (syncml_wire::codes::COMMAND_FAILED, None);
        }

        let shape = if self.remote_received {
            DevInfShape::Results { msg_ref, cmd_ref }
        } else {
            DevInfShape::ResultsGet { msg_ref, cmd_ref }
        };
        self.local_sent = true;
        (syncml_wire::codes::SUCCESS, Some(shape))
    }

    /// Record remote capabilities delivered in a Put.
    pub fn handle_put(&mut self, put: &PutParams, version: ProtocolVersion) -> StatusCode {
        if put.devinf.source != version.devinf_uri() {
            return syncml_wire::codes::COMMAND_FAILED;
        }
        let Some(document) = &put.devinf.devinf else {
            return syncml_wire::codes::COMMAND_FAILED;
        };
        self.record_remote(document);
        syncml_wire::codes::SUCCESS
    }

    /// Record remote capabilities delivered in a Results.
    pub fn handle_results(
        &mut self,
        results: &ResultsParams,
        version: ProtocolVersion,
    ) -> StatusCode {
        let reference = if results.target_ref.is_empty() {
            results.devinf.source.as_str()
        } else {
            results.target_ref.as_str()
        };
        if reference != version.devinf_uri() {
            return syncml_wire::codes::COMMAND_FAILED;
        }
        let Some(document) = &results.devinf.devinf else {
            return syncml_wire::codes::COMMAND_FAILED;
        };
        self.record_remote(document);
        syncml_wire::codes::SUCCESS
    }

    fn record_remote(&mut self, document: &Element) {
        self.remote = RemoteDeviceInfo::from_document(document);
        self.remote_received = true;
        debug!(device_id = %self.remote.device_id, "recorded remote device info");
    }
}

//! Protocol constants: element names, namespaces, version strings and
//! content types shared by the codecs and the engine.

/// SyncML protocol version negotiated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    Ds11,
    #[default]
    Ds12,
    Unknown,
}

impl ProtocolVersion {
    /// DTD version string carried in `<VerDTD>`.
    pub fn ver_dtd(&self) -> &'static str {
        match self {
            ProtocolVersion::Ds11 => SYNCML_DTD_VERSION_1_1,
            ProtocolVersion::Ds12 | ProtocolVersion::Unknown => SYNCML_DTD_VERSION_1_2,
        }
    }

    /// Protocol string carried in `<VerProto>`.
    pub fn ver_proto(&self) -> &'static str {
        match self {
            ProtocolVersion::Ds11 => DS_VERPROTO_1_1,
            ProtocolVersion::Ds12 | ProtocolVersion::Unknown => DS_VERPROTO_1_2,
        }
    }

    /// Version-specific device information URI.
    pub fn devinf_uri(&self) -> &'static str {
        match self {
            ProtocolVersion::Ds11 => SYNCML_DEVINF_PATH_11,
            ProtocolVersion::Ds12 | ProtocolVersion::Unknown => SYNCML_DEVINF_PATH_12,
        }
    }

    pub fn from_ver_dtd(ver_dtd: &str) -> ProtocolVersion {
        match ver_dtd {
            SYNCML_DTD_VERSION_1_1 => ProtocolVersion::Ds11,
            SYNCML_DTD_VERSION_1_2 => ProtocolVersion::Ds12,
            _ => ProtocolVersion::Unknown,
        }
    }
}

pub const SYNCML_DTD_VERSION_1_1: &str = "1.1";
pub const SYNCML_DTD_VERSION_1_2: &str = "1.2";
pub const DS_VERPROTO_1_1: &str = "SyncML/1.1";
pub const DS_VERPROTO_1_2: &str = "SyncML/1.2";

pub const SYNCML_DEVINF_PATH_11: &str = "./devinf11";
pub const SYNCML_DEVINF_PATH_12: &str = "./devinf12";

pub const SYNCML_CONTTYPE_XML: &str = "application/vnd.syncml+xml";
pub const SYNCML_CONTTYPE_WBXML: &str = "application/vnd.syncml+wbxml";
pub const SYNCML_CONTTYPE_SAN: &str = "application/vnd.syncml.notification";
pub const SYNCML_CONTTYPE_DEVINF_XML: &str = "application/vnd.syncml-devinf+xml";

pub const SYNCML_FORMAT_AUTH_BASIC: &str = "syncml:auth-basic";
pub const SYNCML_FORMAT_AUTH_MD5: &str = "syncml:auth-md5";
pub const SYNCML_FORMAT_ENCODING_B64: &str = "b64";

/// Device id a remote party sends when it does not know its peer yet.
pub const SYNCML_UNKNOWN_DEVICE: &str = "/";

/// Prefix expected on datastore URIs delivered via SAN.
pub const SYNCML_URI_PREFIX: &str = "./";

// xmlns attribute and the namespace values recognized by the codecs.
pub const XML_NAMESPACE: &str = "xmlns";
pub const XML_NAMESPACE_SYNCML11: &str = "SYNCML:SYNCML1.1";
pub const XML_NAMESPACE_SYNCML12: &str = "SYNCML:SYNCML1.2";
pub const XML_NAMESPACE_METINF: &str = "syncml:metinf";
pub const XML_NAMESPACE_DEVINF: &str = "syncml:devinf";

// SyncML element names.
pub const E_SYNCML: &str = "SyncML";
pub const E_SYNCHDR: &str = "SyncHdr";
pub const E_SYNCBODY: &str = "SyncBody";
pub const E_VERDTD: &str = "VerDTD";
pub const E_VERPROTO: &str = "VerProto";
pub const E_SESSIONID: &str = "SessionID";
pub const E_MSGID: &str = "MsgID";
pub const E_MSGREF: &str = "MsgRef";
pub const E_CMDID: &str = "CmdID";
pub const E_CMDREF: &str = "CmdRef";
pub const E_CMD: &str = "Cmd";
pub const E_TARGET: &str = "Target";
pub const E_SOURCE: &str = "Source";
pub const E_TARGETREF: &str = "TargetRef";
pub const E_SOURCEREF: &str = "SourceRef";
pub const E_TARGETPARENT: &str = "TargetParent";
pub const E_SOURCEPARENT: &str = "SourceParent";
pub const E_LOCURI: &str = "LocURI";
pub const E_LOCNAME: &str = "LocName";
pub const E_RESPURI: &str = "RespURI";
pub const E_NORESP: &str = "NoResp";
pub const E_STATUS: &str = "Status";
pub const E_ALERT: &str = "Alert";
pub const E_SYNC: &str = "Sync";
pub const E_ADD: &str = "Add";
pub const E_REPLACE: &str = "Replace";
pub const E_DELETE: &str = "Delete";
pub const E_GET: &str = "Get";
pub const E_PUT: &str = "Put";
pub const E_COPY: &str = "Copy";
pub const E_MOVE: &str = "Move";
pub const E_EXEC: &str = "Exec";
pub const E_ATOMIC: &str = "Atomic";
pub const E_SEQUENCE: &str = "Sequence";
pub const E_RESULTS: &str = "Results";
pub const E_MAP: &str = "Map";
pub const E_MAPITEM: &str = "MapItem";
pub const E_ITEM: &str = "Item";
pub const E_DATA: &str = "Data";
pub const E_META: &str = "Meta";
pub const E_CRED: &str = "Cred";
pub const E_CHAL: &str = "Chal";
pub const E_FINAL: &str = "Final";
pub const E_MOREDATA: &str = "MoreData";
pub const E_NUMBEROFCHANGES: &str = "NumberOfChanges";
pub const E_CORRELATOR: &str = "Correlator";

// Meta information element names (MetInf namespace).
pub const E_ANCHOR: &str = "Anchor";
pub const E_LAST: &str = "Last";
pub const E_NEXT: &str = "Next";
pub const E_EMI: &str = "EMI";
pub const E_FORMAT: &str = "Format";
pub const E_MARK: &str = "Mark";
pub const E_MAXMSGSIZE: &str = "MaxMsgSize";
pub const E_MAXOBJSIZE: &str = "MaxObjSize";
pub const E_NEXTNONCE: &str = "NextNonce";
pub const E_SIZE: &str = "Size";
pub const E_TYPE: &str = "Type";
pub const E_VERSION: &str = "Version";

// Device information element names (DevInf namespace).
pub const E_DEVINF: &str = "DevInf";
pub const E_MAN: &str = "Man";
pub const E_MOD: &str = "Mod";
pub const E_OEM: &str = "OEM";
pub const E_FWV: &str = "FwV";
pub const E_SWV: &str = "SwV";
pub const E_HWV: &str = "HwV";
pub const E_DEVID: &str = "DevID";
pub const E_DEVTYP: &str = "DevTyp";
pub const E_UTC: &str = "UTC";
pub const E_SUPPORTLARGEOBJS: &str = "SupportLargeObjs";
pub const E_SUPPORTNUMBEROFCHANGES: &str = "SupportNumberOfChanges";
pub const E_DATASTORE: &str = "DataStore";
pub const E_DISPLAYNAME: &str = "DisplayName";
pub const E_MAXGUIDSIZE: &str = "MaxGUIDSize";
pub const E_RX_PREF: &str = "Rx-Pref";
pub const E_RX: &str = "Rx";
pub const E_TX_PREF: &str = "Tx-Pref";
pub const E_TX: &str = "Tx";
pub const E_CTTYPE: &str = "CTType";
pub const E_VERCT: &str = "VerCT";
pub const E_SYNCCAP: &str = "SyncCap";
pub const E_SYNCTYPE: &str = "SyncType";
pub const E_CTCAP: &str = "CTCap";

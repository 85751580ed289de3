//! Typed protocol fragments produced by the parser.
//!
//! Each fragment is a transparent record carrying exactly the fields of the
//! corresponding protocol element. The class hierarchy of older engines is
//! collapsed into one `Fragment` sum type.

use crate::codes::StatusCode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorParams {
    pub last: String,
    pub next: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaParams {
    pub anchor: AnchorParams,
    pub emi: Vec<String>,
    pub format: String,
    pub max_msg_size: i64,
    pub max_obj_size: i64,
    pub next_nonce: String,
    pub size: i64,
    pub mime_type: String,
    pub version: String,
    pub mark: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemParams {
    pub source: String,
    pub target: String,
    pub source_parent: String,
    pub target_parent: String,
    pub meta: MetaParams,
    pub data: String,
    pub more_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredParams {
    pub meta: MetaParams,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChalParams {
    pub meta: MetaParams,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapItemParams {
    pub target: String,
    pub source: String,
}

/// Raw device information document carried by Put/Results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevInfItemParams {
    pub source: String,
    pub devinf: Option<crate::element::Element>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderParams {
    pub ver_dtd: String,
    pub ver_proto: String,
    pub session_id: String,
    pub msg_id: u32,
    pub target_device: String,
    pub source_device: String,
    pub resp_uri: String,
    pub no_resp: bool,
    pub cred: CredParams,
    pub meta: MetaParams,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusParams {
    pub cmd_id: u32,
    pub msg_ref: u32,
    pub cmd_ref: u32,
    pub cmd: String,
    pub target_ref: String,
    pub source_ref: String,
    pub data: StatusCode,
    pub chal: Option<ChalParams>,
    pub next_anchor: String,
    pub items: Vec<ItemParams>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutParams {
    pub cmd_id: u32,
    pub no_resp: bool,
    pub meta: MetaParams,
    pub devinf: DevInfItemParams,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsParams {
    pub cmd_id: u32,
    pub msg_ref: u32,
    pub cmd_ref: u32,
    pub target_ref: String,
    pub source_ref: String,
    pub meta: MetaParams,
    pub devinf: DevInfItemParams,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncParams {
    pub cmd_id: u32,
    pub no_resp: bool,
    pub meta: MetaParams,
    pub target_database: String,
    pub source_database: String,
    pub number_of_changes: i32,
    pub commands: Vec<CommandParams>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapParams {
    pub cmd_id: u32,
    pub target_database: String,
    pub source_database: String,
    pub meta: MetaParams,
    pub map_items: Vec<MapItemParams>,
}

/// Verb of a generic protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    #[default]
    Alert,
    Add,
    Replace,
    Delete,
    Get,
    Copy,
    Move,
    Exec,
    Atomic,
    Sequence,
}

impl CommandType {
    pub fn element_name(&self) -> &'static str {
        match self {
            CommandType::Alert => crate::consts::E_ALERT,
            CommandType::Add => crate::consts::E_ADD,
            CommandType::Replace => crate::consts::E_REPLACE,
            CommandType::Delete => crate::consts::E_DELETE,
            CommandType::Get => crate::consts::E_GET,
            CommandType::Copy => crate::consts::E_COPY,
            CommandType::Move => crate::consts::E_MOVE,
            CommandType::Exec => crate::consts::E_EXEC,
            CommandType::Atomic => crate::consts::E_ATOMIC,
            CommandType::Sequence => crate::consts::E_SEQUENCE,
        }
    }
}

/// Generic command: Alert, Add, Replace, Delete and the rarer verbs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandParams {
    pub command: CommandType,
    pub cmd_id: u32,
    pub no_resp: bool,
    pub data: String,
    pub correlator: String,
    pub meta: MetaParams,
    pub items: Vec<ItemParams>,
    pub sub_commands: Vec<CommandParams>,
}

impl CommandParams {
    pub fn new(command: CommandType) -> CommandParams {
        CommandParams { command, ..Default::default() }
    }

    /// Alert code carried in `Data`, for Alert commands.
    pub fn alert_code(&self) -> Option<crate::codes::AlertCode> {
        self.data.trim().parse().ok()
    }

    /// Anchor pair of the first item, the conventional location for sync
    /// mode alerts.
    pub fn anchors(&self) -> AnchorParams {
        self.items.first().map(|i| i.meta.anchor.clone()).unwrap_or_default()
    }
}

/// One protocol fragment in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Header(HeaderParams),
    Status(StatusParams),
    Sync(SyncParams),
    Map(MapParams),
    Put(PutParams),
    Results(ResultsParams),
    Command(CommandParams),
}

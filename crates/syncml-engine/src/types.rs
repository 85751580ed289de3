//! Engine-level enums shared across modules.

use serde::{Deserialize, Serialize};

/// Role the local device plays within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Client,
    Server,
}

/// Authentication scheme for the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Md5,
}

/// Conflict resolution policy, enforced only while acting as server; a
/// client defers to the server's own policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    PreferLocal,
    PreferRemote,
}

/// Overall synchronization state, surfaced to observers as a status code:
/// progress in the 2xx range, success 3xx, local errors 4xx, remote and
/// protocol errors 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SyncState {
    NotPrepared = 101,

    Prepared = 201,
    LocalInit = 202,
    RemoteInit = 203,
    SendingItems = 204,
    ReceivingItems = 205,
    SendingMappings = 206,
    ReceivingMappings = 207,
    Finalizing = 208,
    Suspending = 209,

    SyncFinished = 301,

    InternalError = 401,
    AuthenticationFailure = 402,
    DatabaseFailure = 403,

    Suspended = 501,
    Aborted = 502,
    ConnectionError = 503,
    InvalidSyncMlMessage = 504,
    UnsupportedSyncType = 505,
    UnsupportedStorageType = 506,
}

impl SyncState {
    /// True for terminal error states.
    pub fn is_error(&self) -> bool {
        (*self as u16) >= 400
    }

    /// True once the session can make no further progress.
    pub fn is_final(&self) -> bool {
        (*self as u16) >= 300
    }
}

/// Kind of modification applied to a database, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    Added,
    Modified,
    Deleted,
    Error,
}

/// Which side's database a modification landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiedDatabase {
    Local,
    Remote,
}

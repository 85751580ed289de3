//! Response status codes, alert codes and sync mode encoding.

/// Three-digit SyncML response status code.
///
/// Codes travel on the wire as decimal strings; the engine mostly cares
/// about a handful of well-known values plus the range classification.
pub type StatusCode = u16;

pub const IN_PROGRESS: StatusCode = 101;
pub const SUCCESS: StatusCode = 200;
pub const ITEM_ADDED: StatusCode = 201;
pub const ACCEPTED_FOR_PROCESSING: StatusCode = 202;
pub const AUTH_ACCEPTED: StatusCode = 212;
pub const CHUNKED_ITEM_ACCEPTED: StatusCode = 213;
pub const RESOLVED_WITH_SERVER_DATA: StatusCode = 208;
pub const RESOLVED_CLIENT_WINNING: StatusCode = 209;
pub const DELETE_WITHOUT_ARCHIVE: StatusCode = 210;
pub const ITEM_NOT_DELETED: StatusCode = 211;
pub const BAD_REQUEST: StatusCode = 400;
pub const INVALID_CRED: StatusCode = 401;
pub const NOT_FOUND: StatusCode = 404;
pub const COMMAND_NOT_ALLOWED: StatusCode = 405;
pub const MISSING_CRED: StatusCode = 407;
pub const REQUEST_TIMEOUT: StatusCode = 408;
pub const INCOMPLETE_COMMAND: StatusCode = 412;
pub const REQUEST_SIZE_TOO_BIG: StatusCode = 413;
pub const UNSUPPORTED_FORMAT: StatusCode = 415;
pub const REQUESTED_SIZE_TOO_BIG: StatusCode = 416;
pub const ALREADY_EXISTS: StatusCode = 418;
pub const DEVICE_FULL: StatusCode = 420;
pub const PROCESSING_ERROR: StatusCode = 506;
pub const COMMAND_FAILED: StatusCode = 500;
pub const NOT_IMPLEMENTED: StatusCode = 501;
pub const SERVER_FAILURE: StatusCode = 511;
pub const REFRESH_REQUIRED: StatusCode = 508;

/// Coarse classification of a status code by its hundreds range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Successful,
    Redirection,
    OriginatorException,
    RecipientException,
    Unknown,
}

/// Classify a status code by range.
///
/// The upper bound of each range is exclusive, so x99 codes fall through to
/// `Unknown`. Deployed peers depend on this exact behavior.
pub fn status_class(status: StatusCode) -> StatusClass {
    match status {
        100..=198 => StatusClass::Informational,
        200..=298 => StatusClass::Successful,
        300..=398 => StatusClass::Redirection,
        400..=498 => StatusClass::OriginatorException,
        500..=598 => StatusClass::RecipientException,
        _ => StatusClass::Unknown,
    }
}

/// Alert codes: sync modes 200-206, informational 221/222/224/225 and the
/// result alert.
pub type AlertCode = u16;

pub const ALERT_TWO_WAY: AlertCode = 200;
pub const ALERT_SLOW_SYNC: AlertCode = 201;
pub const ALERT_ONE_WAY_FROM_CLIENT: AlertCode = 202;
pub const ALERT_REFRESH_FROM_CLIENT: AlertCode = 203;
pub const ALERT_ONE_WAY_FROM_SERVER: AlertCode = 204;
pub const ALERT_REFRESH_FROM_SERVER: AlertCode = 205;
pub const ALERT_TWO_WAY_BY_SERVER: AlertCode = 206;
pub const ALERT_DISPLAY: AlertCode = 100;
pub const ALERT_NO_END_OF_DATA: AlertCode = 221;
pub const ALERT_NEXT_MESSAGE: AlertCode = 222;
pub const ALERT_SUSPEND: AlertCode = 224;
pub const ALERT_RESUME: AlertCode = 225;
pub const ALERT_RESULT: AlertCode = 1222;

/// Direction of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    #[default]
    TwoWay,
    FromClient,
    FromServer,
}

/// Side that initiated the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncInitiator {
    #[default]
    Client,
    Server,
}

/// Type of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncType {
    Slow,
    #[default]
    Fast,
    Refresh,
}

/// Combination of direction, type and initiator, convertible to and from
/// the sync alert codes of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncMode {
    pub direction: SyncDirection,
    pub initiator: SyncInitiator,
    pub sync_type: SyncType,
}

impl SyncMode {
    pub fn new(direction: SyncDirection, initiator: SyncInitiator, sync_type: SyncType) -> Self {
        SyncMode { direction, initiator, sync_type }
    }

    /// Decode a sync alert code. Returns `None` for non-mode alerts.
    pub fn from_alert_code(code: AlertCode) -> Option<SyncMode> {
        let mode = match code {
            ALERT_TWO_WAY => SyncMode::new(SyncDirection::TwoWay, SyncInitiator::Client, SyncType::Fast),
            ALERT_SLOW_SYNC => SyncMode::new(SyncDirection::TwoWay, SyncInitiator::Client, SyncType::Slow),
            ALERT_ONE_WAY_FROM_CLIENT => {
                SyncMode::new(SyncDirection::FromClient, SyncInitiator::Client, SyncType::Fast)
            }
            ALERT_REFRESH_FROM_CLIENT => {
                SyncMode::new(SyncDirection::FromClient, SyncInitiator::Client, SyncType::Refresh)
            }
            ALERT_ONE_WAY_FROM_SERVER => {
                SyncMode::new(SyncDirection::FromServer, SyncInitiator::Client, SyncType::Fast)
            }
            ALERT_REFRESH_FROM_SERVER => {
                SyncMode::new(SyncDirection::FromServer, SyncInitiator::Client, SyncType::Refresh)
            }
            ALERT_TWO_WAY_BY_SERVER => {
                SyncMode::new(SyncDirection::TwoWay, SyncInitiator::Server, SyncType::Fast)
            }
            _ => return None,
        };
        Some(mode)
    }

    /// Encode back to the matching sync alert code.
    pub fn to_alert_code(&self) -> AlertCode {
        match (self.direction, self.initiator, self.sync_type) {
            (SyncDirection::TwoWay, SyncInitiator::Server, _) => ALERT_TWO_WAY_BY_SERVER,
            (SyncDirection::TwoWay, _, SyncType::Slow) => ALERT_SLOW_SYNC,
            (SyncDirection::TwoWay, _, _) => ALERT_TWO_WAY,
            (SyncDirection::FromClient, _, SyncType::Refresh) => ALERT_REFRESH_FROM_CLIENT,
            (SyncDirection::FromClient, _, _) => ALERT_ONE_WAY_FROM_CLIENT,
            (SyncDirection::FromServer, _, SyncType::Refresh) => ALERT_REFRESH_FROM_SERVER,
            (SyncDirection::FromServer, _, _) => ALERT_ONE_WAY_FROM_SERVER,
        }
    }

    /// Force the mode into slow sync.
    pub fn to_slow_sync(&mut self) {
        self.sync_type = SyncType::Slow;
        self.direction = SyncDirection::TwoWay;
    }

    /// Mark the mode as client-initiated, as required when a SAN or a
    /// server alert is answered with a client-side session.
    pub fn to_client_initiated(&mut self) {
        self.initiator = SyncInitiator::Client;
    }
}

//! Transport contract: delivers encoded message bytes and signals
//! connection events. Implementations handle HTTP, OBEX or any other
//! message-oriented carrier.

use async_trait::async_trait;

use crate::error::SyncError;
use syncml_wire::consts::{SYNCML_CONTTYPE_SAN, SYNCML_CONTTYPE_WBXML, SYNCML_CONTTYPE_XML};

/// Wire encoding of SyncML messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Xml,
    Wbxml,
}

impl Encoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Xml => SYNCML_CONTTYPE_XML,
            Encoding::Wbxml => SYNCML_CONTTYPE_WBXML,
        }
    }
}

/// Content type of the SAN push message.
pub const SAN_CONTENT_TYPE: &str = SYNCML_CONTTYPE_SAN;

/// Connection-level events surfaced by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionOpened,
    ConnectionClosed,
    Timeout,
    AuthenticationNeeded,
    Failed,
    Aborted,
    InvalidContentType,
    InvalidContent,
}

/// One received payload. SyncML data arrives under its declared content
/// type; a SAN may also arrive mislabeled as WbXML, which the session
/// untangles by falling back from WbXML decoding to SAN parsing.
#[derive(Debug, Clone)]
pub enum TransportData {
    SyncMl(Vec<u8>),
    San(Vec<u8>),
    Event(TransportEvent, String),
}

#[async_trait]
pub trait Transport: Send {
    /// Apply a RespURI redirect for subsequent requests.
    fn set_remote_loc_uri(&mut self, uri: &str);

    /// Largest message the transport can send.
    fn max_tx_size(&self) -> i64;

    /// Largest message the transport can receive.
    fn max_rx_size(&self) -> i64;

    async fn send_syncml(&mut self, data: Vec<u8>, encoding: Encoding) -> Result<(), SyncError>;

    async fn send_san(&mut self, data: Vec<u8>) -> Result<(), SyncError>;

    /// Wait for the next inbound payload or connection event.
    async fn receive(&mut self) -> Result<TransportData, SyncError>;
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("XML write error: {0}")]
    XmlWrite(String),

    #[error("WbXML decode error: {0}")]
    WbxmlDecode(String),

    #[error("unknown namespace on element {0}")]
    UnknownNamespace(String),

    #[error("element {0} has no WbXML token in the active code space")]
    UnknownElement(String),

    #[error("SAN message invalid: {0}")]
    InvalidSan(String),
}

//! SyncML DS wire surface: element tree, XML and WbXML codecs, fragment
//! parser, protocol constants and the Server-Alerted Notification codec.

pub mod build;
pub mod codes;
pub mod consts;
pub mod element;
pub mod error;
pub mod fragments;
pub mod message;
pub mod parser;
pub mod san;
pub mod wbxml;
pub mod xml;

pub use codes::{AlertCode, StatusClass, StatusCode, SyncDirection, SyncInitiator, SyncMode, SyncType};
pub use consts::ProtocolVersion;
pub use element::Element;
pub use error::WireError;
pub use fragments::{
    AnchorParams, ChalParams, CommandParams, CommandType, CredParams, DevInfItemParams, Fragment,
    HeaderParams, ItemParams, MapItemParams, MapParams, MetaParams, PutParams, ResultsParams,
    StatusParams, SyncParams,
};
pub use message::Message;
pub use parser::{parse_message, ParsedMessage, ParserError};
pub use san::{SanData, SanInitiator, SanSyncInfo, SanUiMode};

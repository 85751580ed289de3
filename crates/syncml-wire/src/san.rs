//! Server-Alerted Notification (SAN) 1.1/1.2 binary codec.
//!
//! Layout: 16-byte MD5 digest, 8-byte header (version, UI mode, initiator,
//! session id, server identifier length), server identifier, then the sync
//! info records. Digest:
//! `MD5( B64(MD5(serverId ":" password)) ":" nonce ":" B64(MD5(body)) )`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest, Md5};
use tracing::warn;

use crate::consts::ProtocolVersion;
use crate::error::WireError;

const DIGEST_SIZE: usize = 16;
const HEADER_SIZE: usize = 8;

const SAN_VERSION_1_1: u16 = 0x0B;
const SAN_VERSION_1_2: u16 = 0x0C;

const MAX_SERVER_IDENTIFIER: usize = 255;
const SYNC_ALERT_BASE: u16 = 200;

// WSP content type assignments used by DS notifications.
const WSP_NOTES_ID: u32 = 0x03;
const WSP_NOTES_MIME: &str = "text/plain";
const WSP_CALENDAR_ID: u32 = 0x06;
const WSP_CALENDAR_MIME: &str = "text/x-vcalendar";
const WSP_CONTACTS_ID: u32 = 0x07;
const WSP_CONTACTS_MIME: &str = "text/x-vcard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanUiMode {
    #[default]
    NotSpecified,
    Background,
    Informative,
    UserInteraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanInitiator {
    User,
    #[default]
    Server,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanSyncInfo {
    /// Sync alert code, 200-210.
    pub sync_type: u16,
    pub content_type: String,
    pub server_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanData {
    pub version: ProtocolVersion,
    pub ui_mode: SanUiMode,
    pub initiator: SanInitiator,
    pub session_id: u16,
    pub server_identifier: String,
    pub sync_info: Vec<SanSyncInfo>,
}

fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn digest(server_identifier: &str, password: &str, nonce: &str, body: &[u8]) -> [u8; 16] {
    let mut first = Vec::new();
    first.extend_from_slice(server_identifier.as_bytes());
    first.push(b':');
    first.extend_from_slice(password.as_bytes());

    let mut second = BASE64.encode(md5(&first)).into_bytes();
    second.push(b':');
    second.extend_from_slice(nonce.as_bytes());
    second.push(b':');
    second.extend_from_slice(BASE64.encode(md5(body)).as_bytes());

    md5(&second)
}

fn mime_to_wsp(content_type: &str) -> u32 {
    match content_type {
        WSP_CONTACTS_MIME => WSP_CONTACTS_ID,
        WSP_CALENDAR_MIME => WSP_CALENDAR_ID,
        WSP_NOTES_MIME => WSP_NOTES_ID,
        "" => 0,
        other => {
            warn!(content_type = other, "unsupported WSP content type, omitting");
            0
        }
    }
}

fn wsp_to_mime(id: u32) -> String {
    match id {
        WSP_CONTACTS_ID => WSP_CONTACTS_MIME.to_string(),
        WSP_CALENDAR_ID => WSP_CALENDAR_MIME.to_string(),
        WSP_NOTES_ID => WSP_NOTES_MIME.to_string(),
        0 => String::new(),
        other => {
            warn!(wsp_id = other, "unsupported WSP content type id, omitting MIME");
            String::new()
        }
    }
}

/// Generate a SAN message, digest included.
pub fn generate(data: &SanData, password: &str, nonce: &str) -> Result<Vec<u8>, WireError> {
    let version = match data.version {
        ProtocolVersion::Ds11 => SAN_VERSION_1_1,
        ProtocolVersion::Ds12 => SAN_VERSION_1_2,
        ProtocolVersion::Unknown => {
            return Err(WireError::InvalidSan("unsupported protocol version".into()))
        }
    };

    if data.server_identifier.is_empty() {
        return Err(WireError::InvalidSan("empty server identifier".into()));
    }
    if data.server_identifier.len() > MAX_SERVER_IDENTIFIER {
        return Err(WireError::InvalidSan("server identifier longer than 255 bytes".into()));
    }
    if data.sync_info.is_empty() {
        return Err(WireError::InvalidSan("sync-all notifications are not supported".into()));
    }
    if data.sync_info.len() > 15 {
        return Err(WireError::InvalidSan("more than 15 sync info records".into()));
    }

    let mut body = vec![0u8; HEADER_SIZE];
    body[0] = (version >> 2) as u8;
    body[1] = ((version & 0x03) << 6) as u8;
    body[1] |= match data.ui_mode {
        SanUiMode::NotSpecified => 0x00,
        SanUiMode::Background => 0x10,
        SanUiMode::Informative => 0x20,
        SanUiMode::UserInteraction => 0x30,
    };
    body[1] |= match data.initiator {
        SanInitiator::User => 0x00,
        SanInitiator::Server => 0x08,
    };
    body[5] = (data.session_id >> 8) as u8;
    body[6] = (data.session_id & 0xFF) as u8;
    body[7] = data.server_identifier.len() as u8;
    body.extend_from_slice(data.server_identifier.as_bytes());

    body.push((data.sync_info.len() as u8) << 4);

    for info in &data.sync_info {
        if info.server_uri.len() > MAX_SERVER_IDENTIFIER {
            return Err(WireError::InvalidSan("server URI longer than 255 bytes".into()));
        }
        body.push(((info.sync_type - SYNC_ALERT_BASE) as u8) << 4);
        let content_type = mime_to_wsp(&info.content_type);
        body.push(((content_type >> 16) & 0xFF) as u8);
        body.push(((content_type >> 8) & 0xFF) as u8);
        body.push((content_type & 0xFF) as u8);
        body.push(info.server_uri.len() as u8);
        body.extend_from_slice(info.server_uri.as_bytes());
    }

    let mut message = digest(&data.server_identifier, password, nonce, &body).to_vec();
    message.extend_from_slice(&body);
    Ok(message)
}

/// Parse a SAN message. The digest is not verified here; call
/// [`check_digest`] once the credentials are known.
pub fn parse(message: &[u8]) -> Result<SanData, WireError> {
    if message.len() < DIGEST_SIZE + HEADER_SIZE {
        return Err(WireError::InvalidSan("message shorter than digest and header".into()));
    }

    let header = &message[DIGEST_SIZE..DIGEST_SIZE + HEADER_SIZE];

    let version = ((header[0] as u16) << 2) | ((header[1] as u16) >> 6);
    let version = match version {
        SAN_VERSION_1_1 => ProtocolVersion::Ds11,
        SAN_VERSION_1_2 => ProtocolVersion::Ds12,
        other => {
            return Err(WireError::InvalidSan(format!("unsupported SyncML version {other:#04x}")))
        }
    };

    let ui_mode = match (header[1] >> 4) & 0x03 {
        0 => SanUiMode::NotSpecified,
        1 => SanUiMode::Background,
        2 => SanUiMode::Informative,
        _ => SanUiMode::UserInteraction,
    };
    let initiator =
        if (header[1] >> 3) & 0x01 == 1 { SanInitiator::Server } else { SanInitiator::User };
    let session_id = ((header[5] as u16) << 8) | header[6] as u16;

    let identifier_length = header[7] as usize;
    let identifier_start = DIGEST_SIZE + HEADER_SIZE;
    let body_start = identifier_start + identifier_length;
    if message.len() < body_start {
        return Err(WireError::InvalidSan("truncated server identifier".into()));
    }
    let server_identifier =
        String::from_utf8_lossy(&message[identifier_start..body_start]).to_string();

    let body = &message[body_start..];
    if body.is_empty() {
        return Err(WireError::InvalidSan("missing notification body".into()));
    }

    let number_of_syncs = (body[0] >> 4) as usize;
    if number_of_syncs == 0 {
        return Err(WireError::InvalidSan("syncing of all data stores not supported".into()));
    }

    let mut sync_info = Vec::with_capacity(number_of_syncs);
    let mut pos = 1;

    for _ in 0..number_of_syncs {
        if body.len() - pos < 5 {
            return Err(WireError::InvalidSan("truncated sync info record".into()));
        }

        let sync_type = SYNC_ALERT_BASE + (body[pos] >> 4) as u16;
        pos += 1;

        let content_type =
            ((body[pos] as u32) << 16) | ((body[pos + 1] as u32) << 8) | body[pos + 2] as u32;
        pos += 3;

        let uri_length = body[pos] as usize;
        pos += 1;
        if body.len() < pos + uri_length {
            return Err(WireError::InvalidSan("truncated server URI".into()));
        }
        let server_uri = String::from_utf8_lossy(&body[pos..pos + uri_length]).to_string();
        pos += uri_length;

        sync_info.push(SanSyncInfo {
            sync_type,
            content_type: wsp_to_mime(content_type),
            server_uri,
        });
    }

    Ok(SanData { version, ui_mode, initiator, session_id, server_identifier, sync_info })
}

/// Verify the digest of a SAN message against known credentials.
pub fn check_digest(message: &[u8], server_identifier: &str, password: &str, nonce: &str) -> bool {
    if message.len() < DIGEST_SIZE {
        return false;
    }
    let expected = digest(server_identifier, password, nonce, &message[DIGEST_SIZE..]);
    message[..DIGEST_SIZE] == expected
}

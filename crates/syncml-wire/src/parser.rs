//! XML message → typed fragment stream.
//!
//! The parser consumes one complete SyncML message in XML form (WbXML input
//! is converted by the codec first) and yields fragments in document order,
//! plus whether the message closed the package with `<Final/>`.

use thiserror::Error;

use crate::consts::*;
use crate::element::Element;
use crate::fragments::*;
use crate::xml;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParserError {
    #[error("incomplete data")]
    IncompleteData,
    #[error("unexpected data: {0}")]
    UnexpectedData(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("unspecified parser error")]
    Unspecified,
}

/// Result of parsing one inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    pub fragments: Vec<Fragment>,
    /// True when the message carried `<Final/>`, closing the package.
    pub final_seen: bool,
}

/// Parse a complete XML message into fragments.
pub fn parse_message(data: &[u8]) -> Result<ParsedMessage, ParserError> {
    let root = xml::decode(data).map_err(|_| ParserError::IncompleteData)?;

    if root.name != E_SYNCML {
        return Err(ParserError::UnexpectedData(root.name));
    }

    let header = root.find(E_SYNCHDR).ok_or(ParserError::IncompleteData)?;
    let body = root.find(E_SYNCBODY).ok_or(ParserError::IncompleteData)?;

    let mut message = ParsedMessage::default();
    message.fragments.push(Fragment::Header(parse_header(header)?));

    for child in &body.children {
        match child.name.as_str() {
            E_STATUS => message.fragments.push(Fragment::Status(parse_status(child)?)),
            E_SYNC => message.fragments.push(Fragment::Sync(parse_sync(child)?)),
            E_MAP => message.fragments.push(Fragment::Map(parse_map(child)?)),
            E_PUT => message.fragments.push(Fragment::Put(parse_put(child)?)),
            E_RESULTS => message.fragments.push(Fragment::Results(parse_results(child)?)),
            E_ALERT => {
                message.fragments.push(Fragment::Command(parse_command(child, CommandType::Alert)?))
            }
            E_FINAL => message.final_seen = true,
            name => match command_type(name) {
                Some(command) => {
                    message.fragments.push(Fragment::Command(parse_command(child, command)?))
                }
                None => return Err(ParserError::UnexpectedData(child.name.clone())),
            },
        }
    }

    Ok(message)
}

fn command_type(name: &str) -> Option<CommandType> {
    match name {
        E_ADD => Some(CommandType::Add),
        E_REPLACE => Some(CommandType::Replace),
        E_DELETE => Some(CommandType::Delete),
        E_GET => Some(CommandType::Get),
        E_COPY => Some(CommandType::Copy),
        E_MOVE => Some(CommandType::Move),
        E_EXEC => Some(CommandType::Exec),
        E_ATOMIC => Some(CommandType::Atomic),
        E_SEQUENCE => Some(CommandType::Sequence),
        _ => None,
    }
}

fn child_text<'a>(element: &'a Element, name: &str) -> &'a str {
    element.find(name).map(|c| c.value.as_str()).unwrap_or("")
}

fn loc_uri<'a>(element: &'a Element, name: &str) -> &'a str {
    element.find(name).map(|c| child_text(c, E_LOCURI)).unwrap_or("")
}

fn number(element: &Element, name: &str) -> Result<u32, ParserError> {
    let text = child_text(element, name);
    if text.is_empty() {
        return Ok(0);
    }
    text.trim()
        .parse()
        .map_err(|_| ParserError::InvalidData(format!("{name}: {text}")))
}

fn signed_number(text: &str) -> i64 {
    text.trim().parse().unwrap_or(0)
}

fn parse_meta(element: &Element) -> MetaParams {
    let mut meta = MetaParams::default();

    for child in &element.children {
        match child.name.as_str() {
            E_TYPE => meta.mime_type = child.value.clone(),
            E_FORMAT => meta.format = child.value.clone(),
            E_SIZE => meta.size = signed_number(&child.value),
            E_MAXMSGSIZE => meta.max_msg_size = signed_number(&child.value),
            E_MAXOBJSIZE => meta.max_obj_size = signed_number(&child.value),
            E_NEXTNONCE => meta.next_nonce = child.value.clone(),
            E_VERSION => meta.version = child.value.clone(),
            E_MARK => meta.mark = child.value.clone(),
            E_EMI => meta.emi.push(child.value.clone()),
            E_ANCHOR => {
                meta.anchor.last = child_text(child, E_LAST).to_string();
                meta.anchor.next = child_text(child, E_NEXT).to_string();
            }
            _ => {}
        }
    }

    meta
}

fn meta_of(element: &Element) -> MetaParams {
    element.find(E_META).map(parse_meta).unwrap_or_default()
}

fn parse_item(element: &Element) -> ItemParams {
    ItemParams {
        source: loc_uri(element, E_SOURCE).to_string(),
        target: loc_uri(element, E_TARGET).to_string(),
        source_parent: loc_uri(element, E_SOURCEPARENT).to_string(),
        target_parent: loc_uri(element, E_TARGETPARENT).to_string(),
        meta: meta_of(element),
        data: child_text(element, E_DATA).to_string(),
        more_data: element.find(E_MOREDATA).is_some(),
    }
}

fn parse_header(element: &Element) -> Result<HeaderParams, ParserError> {
    let mut header = HeaderParams {
        ver_dtd: child_text(element, E_VERDTD).to_string(),
        ver_proto: child_text(element, E_VERPROTO).to_string(),
        session_id: child_text(element, E_SESSIONID).to_string(),
        msg_id: number(element, E_MSGID)?,
        target_device: loc_uri(element, E_TARGET).to_string(),
        source_device: loc_uri(element, E_SOURCE).to_string(),
        resp_uri: child_text(element, E_RESPURI).to_string(),
        no_resp: element.find(E_NORESP).is_some(),
        cred: CredParams::default(),
        meta: meta_of(element),
    };

    if let Some(cred) = element.find(E_CRED) {
        header.cred = CredParams {
            meta: meta_of(cred),
            data: child_text(cred, E_DATA).to_string(),
        };
    }

    if header.ver_dtd.is_empty() || header.session_id.is_empty() || header.msg_id == 0 {
        return Err(ParserError::IncompleteData);
    }

    Ok(header)
}

fn parse_status(element: &Element) -> Result<StatusParams, ParserError> {
    let data = child_text(element, E_DATA);
    let code = data
        .trim()
        .parse()
        .map_err(|_| ParserError::InvalidData(format!("status code: {data}")))?;

    let mut status = StatusParams {
        cmd_id: number(element, E_CMDID)?,
        msg_ref: number(element, E_MSGREF)?,
        cmd_ref: number(element, E_CMDREF)?,
        cmd: child_text(element, E_CMD).to_string(),
        target_ref: child_text(element, E_TARGETREF).to_string(),
        source_ref: child_text(element, E_SOURCEREF).to_string(),
        data: code,
        chal: None,
        next_anchor: String::new(),
        items: Vec::new(),
    };

    if let Some(chal) = element.find(E_CHAL) {
        status.chal = Some(ChalParams { meta: meta_of(chal) });
    }

    for item in element.children.iter().filter(|c| c.name == E_ITEM) {
        // A status item carrying only an anchor acknowledges the Next
        // anchor of an alert.
        if let Some(data) = item.find(E_DATA) {
            if let Some(anchor) = data.find(E_ANCHOR) {
                status.next_anchor = child_text(anchor, E_NEXT).to_string();
                continue;
            }
        }
        status.items.push(parse_item(item));
    }

    Ok(status)
}

fn parse_sync(element: &Element) -> Result<SyncParams, ParserError> {
    let mut sync = SyncParams {
        cmd_id: number(element, E_CMDID)?,
        no_resp: element.find(E_NORESP).is_some(),
        meta: meta_of(element),
        target_database: loc_uri(element, E_TARGET).to_string(),
        source_database: loc_uri(element, E_SOURCE).to_string(),
        number_of_changes: signed_number(child_text(element, E_NUMBEROFCHANGES)) as i32,
        commands: Vec::new(),
    };

    for child in &element.children {
        if let Some(command) = command_type(&child.name) {
            sync.commands.push(parse_command(child, command)?);
        }
    }

    Ok(sync)
}

fn parse_map(element: &Element) -> Result<MapParams, ParserError> {
    let mut map = MapParams {
        cmd_id: number(element, E_CMDID)?,
        target_database: loc_uri(element, E_TARGET).to_string(),
        source_database: loc_uri(element, E_SOURCE).to_string(),
        meta: meta_of(element),
        map_items: Vec::new(),
    };

    for item in element.children.iter().filter(|c| c.name == E_MAPITEM) {
        map.map_items.push(MapItemParams {
            target: loc_uri(item, E_TARGET).to_string(),
            source: loc_uri(item, E_SOURCE).to_string(),
        });
    }

    Ok(map)
}

fn devinf_item(element: &Element) -> DevInfItemParams {
    let mut params = DevInfItemParams::default();
    if let Some(item) = element.find(E_ITEM) {
        params.source = loc_uri(item, E_SOURCE).to_string();
        if let Some(data) = item.find(E_DATA) {
            params.devinf = data.find(E_DEVINF).cloned();
        }
    }
    params
}

fn parse_put(element: &Element) -> Result<PutParams, ParserError> {
    Ok(PutParams {
        cmd_id: number(element, E_CMDID)?,
        no_resp: element.find(E_NORESP).is_some(),
        meta: meta_of(element),
        devinf: devinf_item(element),
    })
}

fn parse_results(element: &Element) -> Result<ResultsParams, ParserError> {
    Ok(ResultsParams {
        cmd_id: number(element, E_CMDID)?,
        msg_ref: number(element, E_MSGREF)?,
        cmd_ref: number(element, E_CMDREF)?,
        target_ref: child_text(element, E_TARGETREF).to_string(),
        source_ref: child_text(element, E_SOURCEREF).to_string(),
        meta: meta_of(element),
        devinf: devinf_item(element),
    })
}

fn parse_command(element: &Element, command: CommandType) -> Result<CommandParams, ParserError> {
    let mut params = CommandParams {
        command,
        cmd_id: number(element, E_CMDID)?,
        no_resp: element.find(E_NORESP).is_some(),
        data: child_text(element, E_DATA).to_string(),
        correlator: child_text(element, E_CORRELATOR).to_string(),
        meta: meta_of(element),
        items: Vec::new(),
        sub_commands: Vec::new(),
    };

    for child in &element.children {
        if child.name == E_ITEM {
            params.items.push(parse_item(child));
        } else if let Some(sub) = command_type(&child.name) {
            params.sub_commands.push(parse_command(child, sub)?);
        }
    }

    Ok(params)
}

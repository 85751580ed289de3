//! Element builders for the protocol element shapes the engine emits.
//!
//! Meta children live in the MetInf namespace; per the codec convention the
//! `xmlns` attribute sits on the direct children of `Meta` (the code-space
//! transition points), not on anything nested below them.

use crate::codes::AlertCode;
use crate::consts::*;
use crate::element::Element;
use crate::fragments::{CommandType, HeaderParams, StatusParams};

fn metinf(element: Element) -> Element {
    element.attr(XML_NAMESPACE, XML_NAMESPACE_METINF)
}

fn loc(wrapper: &str, uri: &str) -> Element {
    Element::new(wrapper).child(Element::with_value(E_LOCURI, uri))
}

/// `<SyncHdr>` from header params. Version strings fall back to the
/// protocol version when the params leave them empty.
pub fn sync_hdr(params: &HeaderParams, version: ProtocolVersion) -> Element {
    let ver_dtd =
        if params.ver_dtd.is_empty() { version.ver_dtd() } else { params.ver_dtd.as_str() };
    let ver_proto =
        if params.ver_proto.is_empty() { version.ver_proto() } else { params.ver_proto.as_str() };

    let mut header = Element::new(E_SYNCHDR)
        .child(Element::with_value(E_VERDTD, ver_dtd))
        .child(Element::with_value(E_VERPROTO, ver_proto))
        .child(Element::with_value(E_SESSIONID, params.session_id.as_str()))
        .child(Element::with_value(E_MSGID, params.msg_id.to_string()))
        .child(loc(E_TARGET, &params.target_device))
        .child(loc(E_SOURCE, &params.source_device));

    if !params.resp_uri.is_empty() {
        header.add_child(Element::with_value(E_RESPURI, params.resp_uri.as_str()));
    }

    if params.meta.max_msg_size > 0 || params.meta.max_obj_size > 0 || !params.meta.emi.is_empty() {
        let mut meta = Element::new(E_META);
        if params.meta.max_msg_size > 0 {
            meta.add_child(metinf(Element::with_value(
                E_MAXMSGSIZE,
                params.meta.max_msg_size.to_string(),
            )));
        }
        if params.meta.max_obj_size > 0 {
            meta.add_child(metinf(Element::with_value(
                E_MAXOBJSIZE,
                params.meta.max_obj_size.to_string(),
            )));
        }
        for emi in &params.meta.emi {
            meta.add_child(metinf(Element::with_value(E_EMI, emi.as_str())));
        }
        header.add_child(meta);
    }

    header
}

/// `<Cred>` for the message header.
pub fn cred(auth_type: &str, format: &str, data: &str) -> Element {
    Element::new(E_CRED)
        .child(
            Element::new(E_META)
                .child(metinf(Element::with_value(E_TYPE, auth_type)))
                .child(metinf(Element::with_value(E_FORMAT, format))),
        )
        .child(Element::with_value(E_DATA, data))
}

/// `<Status>` with optional challenge, next-anchor item and item refs.
pub fn status(params: &StatusParams) -> Element {
    let mut status = Element::new(E_STATUS)
        .child(Element::with_value(E_CMDID, params.cmd_id.to_string()))
        .child(Element::with_value(E_MSGREF, params.msg_ref.to_string()))
        .child(Element::with_value(E_CMDREF, params.cmd_ref.to_string()))
        .child(Element::with_value(E_CMD, params.cmd.as_str()));

    if !params.target_ref.is_empty() {
        status.add_child(Element::with_value(E_TARGETREF, params.target_ref.as_str()));
    }
    if !params.source_ref.is_empty() {
        status.add_child(Element::with_value(E_SOURCEREF, params.source_ref.as_str()));
    }

    status.add_child(Element::with_cdata(E_DATA, params.data.to_string()));

    if !params.next_anchor.is_empty() {
        let anchor = metinf(Element::new(E_ANCHOR))
            .child(Element::with_value(E_NEXT, params.next_anchor.as_str()));
        status.add_child(
            Element::new(E_ITEM).child(Element::new(E_DATA).child(anchor)),
        );
    }

    for item in &params.items {
        let mut element = Element::new(E_ITEM);
        if !item.source.is_empty() {
            element.add_child(loc(E_SOURCE, &item.source));
        }
        if !item.target.is_empty() {
            element.add_child(loc(E_TARGET, &item.target));
        }
        if !item.data.is_empty() {
            element.add_child(Element::with_cdata(E_DATA, item.data.as_str()));
        }
        status.add_child(element);
    }

    if let Some(chal) = &params.chal {
        let mut meta = Element::new(E_META)
            .child(metinf(Element::with_value(E_TYPE, chal.meta.mime_type.as_str())))
            .child(metinf(Element::with_value(E_FORMAT, chal.meta.format.as_str())));
        if !chal.meta.next_nonce.is_empty() {
            meta.add_child(metinf(Element::with_value(E_NEXTNONCE, chal.meta.next_nonce.as_str())));
        }
        status.add_child(Element::new(E_CHAL).child(meta));
    }

    status
}

/// `<Alert>` with optional databases and anchors.
pub fn alert(
    cmd_id: u32,
    code: AlertCode,
    source_db: Option<&str>,
    target_db: Option<&str>,
    last_anchor: Option<&str>,
    next_anchor: Option<&str>,
) -> Element {
    let mut alert = Element::new(E_ALERT)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(Element::with_value(E_DATA, code.to_string()));

    if source_db.is_some() || target_db.is_some() {
        let mut item = Element::new(E_ITEM);
        if let Some(target) = target_db {
            item.add_child(loc(E_TARGET, target));
        }
        if let Some(source) = source_db {
            item.add_child(loc(E_SOURCE, source));
        }
        if let Some(next) = next_anchor {
            let mut anchor = metinf(Element::new(E_ANCHOR));
            if let Some(last) = last_anchor.filter(|l| !l.is_empty()) {
                anchor.add_child(Element::with_value(E_LAST, last));
            }
            anchor.add_child(Element::with_value(E_NEXT, next));
            item.add_child(Element::new(E_META).child(anchor));
        }
        alert.add_child(item);
    }

    alert
}

/// Server-alerted `<Alert>` identifying a local database by URI + MIME.
pub fn server_alert(cmd_id: u32, code: AlertCode, source_db: &str, mime_type: &str) -> Element {
    Element::new(E_ALERT)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(Element::with_value(E_DATA, code.to_string()))
        .child(
            Element::new(E_ITEM)
                .child(loc(E_SOURCE, source_db))
                .child(Element::new(E_META).child(metinf(Element::with_value(E_TYPE, mime_type)))),
        )
}

/// `<Sync>` wrapper; item commands are appended by the caller.
pub fn sync(cmd_id: u32, target_db: &str, source_db: &str, number_of_changes: Option<usize>) -> Element {
    let mut sync = Element::new(E_SYNC)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(loc(E_TARGET, target_db))
        .child(loc(E_SOURCE, source_db));
    if let Some(count) = number_of_changes {
        sync.add_child(Element::with_value(E_NUMBEROFCHANGES, count.to_string()));
    }
    sync
}

/// `<Add>`/`<Replace>`/`<Delete>` command wrapper with MIME metadata.
pub fn item_command(command: CommandType, cmd_id: u32, mime_type: Option<&str>) -> Element {
    let mut element = Element::new(command.element_name())
        .child(Element::with_value(E_CMDID, cmd_id.to_string()));
    if let Some(mime) = mime_type.filter(|m| !m.is_empty()) {
        element.add_child(Element::new(E_META).child(metinf(Element::with_value(E_TYPE, mime))));
    }
    element
}

/// `<Item>` for an outbound change.
#[derive(Debug, Default)]
pub struct ItemSpec<'a> {
    pub source: Option<&'a str>,
    pub target: Option<&'a str>,
    pub source_parent: Option<&'a str>,
    pub target_parent: Option<&'a str>,
    pub size: Option<i64>,
    pub data: Option<&'a str>,
    pub more_data: bool,
}

pub fn item(spec: &ItemSpec<'_>) -> Element {
    let mut item = Element::new(E_ITEM);

    if let Some(source) = spec.source {
        item.add_child(loc(E_SOURCE, source));
    }
    if let Some(target) = spec.target {
        item.add_child(loc(E_TARGET, target));
    }
    if let Some(parent) = spec.source_parent {
        item.add_child(loc(E_SOURCEPARENT, parent));
    }
    if let Some(parent) = spec.target_parent {
        item.add_child(loc(E_TARGETPARENT, parent));
    }
    if let Some(size) = spec.size {
        item.add_child(
            Element::new(E_META).child(metinf(Element::with_value(E_SIZE, size.to_string()))),
        );
    }
    if let Some(data) = spec.data {
        item.add_child(Element::with_cdata(E_DATA, data));
    }
    if spec.more_data {
        item.add_child(Element::new(E_MOREDATA));
    }

    item
}

/// `<Map>` wrapper; map items appended by the caller.
pub fn map(cmd_id: u32, target_db: &str, source_db: &str) -> Element {
    Element::new(E_MAP)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(loc(E_TARGET, target_db))
        .child(loc(E_SOURCE, source_db))
}

pub fn map_item(target: &str, source: &str) -> Element {
    Element::new(E_MAPITEM)
        .child(loc(E_TARGET, target))
        .child(loc(E_SOURCE, source))
}

/// `<Put>` carrying the local device information document.
pub fn devinf_put(cmd_id: u32, devinf_doc: Element, version: ProtocolVersion) -> Element {
    Element::new(E_PUT)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(
            Element::new(E_META)
                .child(metinf(Element::with_value(E_TYPE, SYNCML_CONTTYPE_DEVINF_XML))),
        )
        .child(
            Element::new(E_ITEM)
                .child(loc(E_SOURCE, version.devinf_uri()))
                .child(Element::new(E_DATA).child(devinf_doc)),
        )
}

/// `<Get>` requesting the remote device information document.
pub fn devinf_get(cmd_id: u32, version: ProtocolVersion) -> Element {
    Element::new(E_GET)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(
            Element::new(E_META)
                .child(metinf(Element::with_value(E_TYPE, SYNCML_CONTTYPE_DEVINF_XML))),
        )
        .child(Element::new(E_ITEM).child(loc(E_TARGET, version.devinf_uri())))
}

/// `<Results>` answering a remote device information Get.
pub fn devinf_results(
    cmd_id: u32,
    msg_ref: u32,
    cmd_ref: u32,
    devinf_doc: Element,
    version: ProtocolVersion,
) -> Element {
    Element::new(E_RESULTS)
        .child(Element::with_value(E_CMDID, cmd_id.to_string()))
        .child(Element::with_value(E_MSGREF, msg_ref.to_string()))
        .child(Element::with_value(E_CMDREF, cmd_ref.to_string()))
        .child(
            Element::new(E_META)
                .child(metinf(Element::with_value(E_TYPE, SYNCML_CONTTYPE_DEVINF_XML))),
        )
        .child(
            Element::new(E_ITEM)
                .child(loc(E_SOURCE, version.devinf_uri()))
                .child(Element::new(E_DATA).child(devinf_doc)),
        )
}

pub fn final_element() -> Element {
    Element::new(E_FINAL)
}

//! WBXML 1.2 codec for SyncML, MetInf and DevInf documents.
//!
//! Encoding follows the settings the protocol mandates for DS: WBXML
//! version 1.2, no string table, UTF-8 payload inline. CDATA values are
//! carried as OPAQUE data. A DevInf subtree inside a SyncML document is
//! encoded as a complete embedded WBXML document carried as OPAQUE content
//! of its parent element, and re-inflated on decode.
//!
//! The namespace convention is: an element carries an `xmlns` attribute
//! exactly where the code space changes (document root, MetInf children of
//! `Meta`, the embedded `DevInf` root). The decoder re-synthesizes `xmlns`
//! at the same points, which is what makes encode ∘ decode an identity on
//! element trees.

use crate::consts::{
    ProtocolVersion, XML_NAMESPACE, XML_NAMESPACE_DEVINF, XML_NAMESPACE_METINF,
    XML_NAMESPACE_SYNCML11, XML_NAMESPACE_SYNCML12,
};
use crate::element::Element;
use crate::error::WireError;
use crate::xml;

const WBXML_VERSION_1_2: u8 = 0x02;
const CHARSET_UTF8: u32 = 0x6A;

const TOKEN_SWITCH_PAGE: u8 = 0x00;
const TOKEN_END: u8 = 0x01;
const TOKEN_STR_I: u8 = 0x03;
const TOKEN_OPAQUE: u8 = 0xC3;
const TAG_CONTENT_MASK: u8 = 0x40;
const TAG_ATTRIBUTE_MASK: u8 = 0x80;
const TAG_TOKEN_MASK: u8 = 0x3F;

const PUBLICID_SYNCML_1_1: u32 = 0x0FD3;
const PUBLICID_DEVINF_1_1: u32 = 0x0FD4;
const PUBLICID_SYNCML_1_2: u32 = 0x1201;
const PUBLICID_DEVINF_1_2: u32 = 0x1203;

/// SyncML code page 0 tags shared by 1.1 and 1.2.
const SYNCML_TAGS: &[(u8, &str)] = &[
    (0x05, "Add"),
    (0x06, "Alert"),
    (0x07, "Archive"),
    (0x08, "Atomic"),
    (0x09, "Chal"),
    (0x0A, "Cmd"),
    (0x0B, "CmdID"),
    (0x0C, "CmdRef"),
    (0x0D, "Copy"),
    (0x0E, "Cred"),
    (0x0F, "Data"),
    (0x10, "Delete"),
    (0x11, "Exec"),
    (0x12, "Final"),
    (0x13, "Get"),
    (0x14, "Item"),
    (0x15, "Lang"),
    (0x16, "LocName"),
    (0x17, "LocURI"),
    (0x18, "Map"),
    (0x19, "MapItem"),
    (0x1A, "Meta"),
    (0x1B, "MsgID"),
    (0x1C, "MsgRef"),
    (0x1D, "NoResp"),
    (0x1E, "NoResults"),
    (0x1F, "Put"),
    (0x20, "Replace"),
    (0x21, "RespURI"),
    (0x22, "Results"),
    (0x23, "Search"),
    (0x24, "Sequence"),
    (0x25, "SessionID"),
    (0x26, "SftDel"),
    (0x27, "Source"),
    (0x28, "SourceRef"),
    (0x29, "Status"),
    (0x2A, "Sync"),
    (0x2B, "SyncBody"),
    (0x2C, "SyncHdr"),
    (0x2D, "SyncML"),
    (0x2E, "Target"),
    (0x2F, "TargetRef"),
    (0x31, "VerDTD"),
    (0x32, "VerProto"),
    (0x33, "NumberOfChanges"),
    (0x34, "MoreData"),
];

/// Tags added by SyncML 1.2.
const SYNCML_12_TAGS: &[(u8, &str)] = &[
    (0x35, "Field"),
    (0x36, "Filter"),
    (0x37, "Record"),
    (0x38, "FilterType"),
    (0x39, "SourceParent"),
    (0x3A, "TargetParent"),
    (0x3B, "Move"),
    (0x3C, "Correlator"),
];

/// MetInf code page 1 tags.
const METINF_TAGS: &[(u8, &str)] = &[
    (0x05, "Anchor"),
    (0x06, "EMI"),
    (0x07, "Format"),
    (0x08, "FreeID"),
    (0x09, "FreeMem"),
    (0x0A, "Last"),
    (0x0B, "Mark"),
    (0x0C, "MaxMsgSize"),
    (0x0D, "Mem"),
    (0x0E, "MetInf"),
    (0x0F, "Next"),
    (0x10, "NextNonce"),
    (0x11, "SharedMem"),
    (0x12, "Size"),
    (0x13, "Type"),
    (0x14, "Version"),
    (0x15, "MaxObjSize"),
    (0x16, "FieldLevel"),
];

/// DevInf document tags (code page 0 of the DevInf language).
const DEVINF_TAGS: &[(u8, &str)] = &[
    (0x05, "CTCap"),
    (0x06, "CTType"),
    (0x07, "DataStore"),
    (0x08, "DataType"),
    (0x09, "DevID"),
    (0x0A, "DevInf"),
    (0x0B, "DevTyp"),
    (0x0C, "DisplayName"),
    (0x0D, "DSMem"),
    (0x0E, "Ext"),
    (0x0F, "FwV"),
    (0x10, "HwV"),
    (0x11, "Man"),
    (0x12, "MaxGUIDSize"),
    (0x13, "MaxID"),
    (0x14, "MaxMem"),
    (0x15, "Mod"),
    (0x16, "OEM"),
    (0x17, "ParamName"),
    (0x18, "PropName"),
    (0x19, "Rx"),
    (0x1A, "Rx-Pref"),
    (0x1B, "SharedMem"),
    (0x1C, "MaxSize"),
    (0x1D, "SourceRef"),
    (0x1E, "SwV"),
    (0x1F, "SyncCap"),
    (0x20, "SyncType"),
    (0x21, "Tx"),
    (0x22, "Tx-Pref"),
    (0x23, "ValEnum"),
    (0x24, "VerCT"),
    (0x25, "VerDTD"),
    (0x26, "XNam"),
    (0x27, "XVal"),
    (0x28, "UTC"),
    (0x29, "SupportNumberOfChanges"),
    (0x2A, "SupportLargeObjs"),
];

const DEVINF_12_TAGS: &[(u8, &str)] = &[
    (0x2B, "Property"),
    (0x2C, "PropParam"),
    (0x2D, "MaxOccur"),
    (0x2E, "NoTruncate"),
    (0x30, "Filter-Rx"),
    (0x31, "FilterCap"),
    (0x32, "FilterKeyword"),
    (0x33, "FieldLevel"),
    (0x34, "SupportHierarchicalSync"),
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Language {
    SyncMl11,
    SyncMl12,
    DevInf11,
    DevInf12,
}

impl Language {
    fn public_id(&self) -> u32 {
        match self {
            Language::SyncMl11 => PUBLICID_SYNCML_1_1,
            Language::SyncMl12 => PUBLICID_SYNCML_1_2,
            Language::DevInf11 => PUBLICID_DEVINF_1_1,
            Language::DevInf12 => PUBLICID_DEVINF_1_2,
        }
    }

    fn from_public_id(id: u32) -> Option<Language> {
        match id {
            PUBLICID_SYNCML_1_1 => Some(Language::SyncMl11),
            PUBLICID_SYNCML_1_2 => Some(Language::SyncMl12),
            PUBLICID_DEVINF_1_1 => Some(Language::DevInf11),
            PUBLICID_DEVINF_1_2 => Some(Language::DevInf12),
            _ => None,
        }
    }

    /// Tag table for a code page of this language.
    fn page(&self, page: u8) -> &'static [&'static [(u8, &'static str)]] {
        // Returned as slices so 1.2 pages can chain base + extension tables.
        const SYNCML11_P0: &[&[(u8, &str)]] = &[SYNCML_TAGS];
        const SYNCML12_P0: &[&[(u8, &str)]] = &[SYNCML_TAGS, SYNCML_12_TAGS];
        const METINF_P1: &[&[(u8, &str)]] = &[METINF_TAGS];
        const DEVINF11_P0: &[&[(u8, &str)]] = &[DEVINF_TAGS];
        const DEVINF12_P0: &[&[(u8, &str)]] = &[DEVINF_TAGS, DEVINF_12_TAGS];
        const EMPTY: &[&[(u8, &str)]] = &[];

        match (self, page) {
            (Language::SyncMl11, 0) => SYNCML11_P0,
            (Language::SyncMl12, 0) => SYNCML12_P0,
            (Language::SyncMl11 | Language::SyncMl12, 1) => METINF_P1,
            (Language::DevInf11, 0) => DEVINF11_P0,
            (Language::DevInf12, 0) => DEVINF12_P0,
            _ => EMPTY,
        }
    }

    fn root_namespace(&self) -> &'static str {
        match self {
            Language::SyncMl11 => XML_NAMESPACE_SYNCML11,
            Language::SyncMl12 => XML_NAMESPACE_SYNCML12,
            Language::DevInf11 | Language::DevInf12 => XML_NAMESPACE_DEVINF,
        }
    }
}

fn tag_token(language: Language, page: u8, name: &str) -> Option<u8> {
    for table in language.page(page) {
        if let Some((token, _)) = table.iter().find(|(_, n)| *n == name) {
            return Some(*token);
        }
    }
    None
}

fn tag_name(language: Language, page: u8, token: u8) -> Option<&'static str> {
    for table in language.page(page) {
        if let Some((_, name)) = table.iter().find(|(t, _)| *t == token) {
            return Some(name);
        }
    }
    None
}

fn language_for(root: &Element, version: ProtocolVersion) -> Result<Language, WireError> {
    match root.namespace() {
        Some(XML_NAMESPACE_SYNCML11) => Ok(Language::SyncMl11),
        Some(XML_NAMESPACE_SYNCML12) => Ok(Language::SyncMl12),
        Some(XML_NAMESPACE_DEVINF) => match version {
            ProtocolVersion::Ds11 => Ok(Language::DevInf11),
            _ => Ok(Language::DevInf12),
        },
        _ => Err(WireError::UnknownNamespace(root.name.clone())),
    }
}

fn write_mb_u32(out: &mut Vec<u8>, mut value: u32) {
    let mut bytes = [0u8; 5];
    let mut index = 4;
    bytes[index] = (value & 0x7F) as u8;
    value >>= 7;
    while value > 0 {
        index -= 1;
        bytes[index] = 0x80 | (value & 0x7F) as u8;
        value >>= 7;
    }
    out.extend_from_slice(&bytes[index..]);
}

/// Encode an element tree into a WBXML document.
///
/// The root element's `xmlns` attribute selects the document language;
/// `version` disambiguates MetInf/DevInf between 1.1 and 1.2.
pub fn encode(root: &Element, version: ProtocolVersion) -> Result<Vec<u8>, WireError> {
    let language = language_for(root, version)?;

    let mut out = Vec::new();
    out.push(WBXML_VERSION_1_2);
    write_mb_u32(&mut out, language.public_id());
    write_mb_u32(&mut out, CHARSET_UTF8);
    // No string table.
    write_mb_u32(&mut out, 0);

    let mut current_page = 0u8;
    encode_element(root, language, version, 0, &mut current_page, &mut out)?;
    Ok(out)
}

fn element_page(element: &Element, language: Language, parent_page: u8) -> u8 {
    match (language, element.namespace()) {
        (Language::SyncMl11 | Language::SyncMl12, Some(XML_NAMESPACE_METINF)) => 1,
        (Language::SyncMl11 | Language::SyncMl12, Some(_)) => 0,
        _ => parent_page,
    }
}

/// `parent_page` is the semantic code page of the enclosing element;
/// `current_page` tracks the page selected by the last SWITCH_PAGE token.
/// A switch is emitted lazily, only right before a tag on a foreign page.
fn encode_element(
    element: &Element,
    language: Language,
    version: ProtocolVersion,
    parent_page: u8,
    current_page: &mut u8,
    out: &mut Vec<u8>,
) -> Result<(), WireError> {
    let own_page = element_page(element, language, parent_page);
    if own_page != *current_page {
        out.push(TOKEN_SWITCH_PAGE);
        out.push(own_page);
        *current_page = own_page;
    }

    let token = tag_token(language, own_page, &element.name)
        .ok_or_else(|| WireError::UnknownElement(element.name.clone()))?;

    let has_content = !element.value.is_empty() || !element.children.is_empty();
    if !has_content {
        out.push(token);
        return Ok(());
    }

    out.push(token | TAG_CONTENT_MASK);

    if !element.value.is_empty() {
        if element.cdata {
            out.push(TOKEN_OPAQUE);
            write_mb_u32(out, element.value.len() as u32);
            out.extend_from_slice(element.value.as_bytes());
        } else {
            out.push(TOKEN_STR_I);
            out.extend_from_slice(element.value.as_bytes());
            out.push(0);
        }
    }

    for child in &element.children {
        if child.namespace() == Some(XML_NAMESPACE_DEVINF)
            && matches!(language, Language::SyncMl11 | Language::SyncMl12)
        {
            // DevInf subtree travels as an embedded WBXML document.
            let sub = encode(child, version)?;
            out.push(TOKEN_OPAQUE);
            write_mb_u32(out, sub.len() as u32);
            out.extend_from_slice(&sub);
        } else {
            encode_element(child, language, version, own_page, current_page, out)?;
        }
    }

    out.push(TOKEN_END);
    Ok(())
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    language: Language,
    page: u8,
}

impl<'a> Decoder<'a> {
    fn byte(&mut self) -> Result<u8, WireError> {
        let b = self
            .data
            .get(self.pos)
            .copied()
            .ok_or_else(|| WireError::WbxmlDecode("unexpected end of document".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn mb_u32(&mut self) -> Result<u32, WireError> {
        let mut value: u32 = 0;
        for _ in 0..5 {
            let b = self.byte()?;
            value = (value << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::WbxmlDecode("multi-byte integer too long".into()))
    }

    fn inline_string(&mut self) -> Result<String, WireError> {
        let start = self.pos;
        while self.byte()? != 0 {}
        let bytes = &self.data[start..self.pos - 1];
        String::from_utf8(bytes.to_vec())
            .map_err(|_| WireError::WbxmlDecode("invalid UTF-8 in inline string".into()))
    }

    fn opaque(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.mb_u32()? as usize;
        let end = self.pos.checked_add(len).filter(|&e| e <= self.data.len())
            .ok_or_else(|| WireError::WbxmlDecode("opaque data overruns document".into()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Decode one element whose tag byte has been consumed. `own_page` is
    /// the page active when the tag was read; `parent_page` the semantic
    /// page of the enclosing element, used to re-synthesize `xmlns` at
    /// code-space transition points.
    fn element(&mut self, tag: u8, own_page: u8, parent_page: u8) -> Result<Element, WireError> {
        let token = tag & TAG_TOKEN_MASK;
        if tag & TAG_ATTRIBUTE_MASK != 0 {
            return Err(WireError::WbxmlDecode("attribute lists are not used by SyncML".into()));
        }

        let name = tag_name(self.language, own_page, token)
            .ok_or_else(|| WireError::WbxmlDecode(format!("unknown tag token {token:#04x}")))?;
        let mut element = Element::new(name);

        if own_page != parent_page {
            let ns = if own_page == 1 {
                XML_NAMESPACE_METINF
            } else {
                self.language.root_namespace()
            };
            element.set_attribute(XML_NAMESPACE, ns);
        }

        if tag & TAG_CONTENT_MASK == 0 {
            return Ok(element);
        }

        loop {
            let b = self.byte()?;
            match b {
                TOKEN_END => break,
                TOKEN_SWITCH_PAGE => {
                    self.page = self.byte()?;
                }
                TOKEN_STR_I => {
                    element.value.push_str(&self.inline_string()?);
                }
                TOKEN_OPAQUE => {
                    let bytes = self.opaque()?;
                    if let Some(sub) = try_decode_embedded_devinf(bytes) {
                        element.add_child(sub?);
                    } else {
                        element.value.push_str(&String::from_utf8_lossy(bytes));
                        element.cdata = true;
                    }
                }
                tag => {
                    let child = self.element(tag, self.page, own_page)?;
                    element.add_child(child);
                }
            }
        }

        Ok(element)
    }
}

fn try_decode_embedded_devinf(bytes: &[u8]) -> Option<Result<Element, WireError>> {
    if bytes.len() < 4 || bytes[0] != WBXML_VERSION_1_2 {
        return None;
    }
    let mut probe = Decoder { data: bytes, pos: 1, language: Language::DevInf12, page: 0 };
    match probe.mb_u32() {
        Ok(id) if matches!(Language::from_public_id(id), Some(Language::DevInf11 | Language::DevInf12)) => {
            Some(decode_tree(bytes))
        }
        _ => None,
    }
}

/// Decode a WBXML document into an element tree.
pub fn decode_tree(data: &[u8]) -> Result<Element, WireError> {
    let mut decoder = Decoder { data, pos: 0, language: Language::SyncMl12, page: 0 };

    let version = decoder.byte()?;
    if version != WBXML_VERSION_1_2 {
        return Err(WireError::WbxmlDecode(format!("unsupported WBXML version {version:#04x}")));
    }

    let public_id = decoder.mb_u32()?;
    decoder.language = Language::from_public_id(public_id)
        .ok_or_else(|| WireError::WbxmlDecode(format!("unknown public id {public_id:#06x}")))?;

    let charset = decoder.mb_u32()?;
    if charset != CHARSET_UTF8 {
        return Err(WireError::WbxmlDecode(format!("unsupported charset {charset:#04x}")));
    }

    // Skip the string table; DS encoders do not emit one but a remote
    // party might still include an empty or unused table.
    let strtbl_len = decoder.mb_u32()? as usize;
    decoder.pos = decoder
        .pos
        .checked_add(strtbl_len)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| WireError::WbxmlDecode("string table overruns document".into()))?;

    let mut first = decoder.byte()?;
    while first == TOKEN_SWITCH_PAGE {
        decoder.page = decoder.byte()?;
        first = decoder.byte()?;
    }

    let root_page = decoder.page;
    let mut root = decoder.element(first, root_page, root_page)?;
    root.set_attribute(XML_NAMESPACE, decoder.language.root_namespace());
    Ok(root)
}

/// Decode a WBXML document into its XML representation, the form consumed
/// by the fragment parser.
pub fn decode_to_xml(data: &[u8]) -> Result<Vec<u8>, WireError> {
    let tree = decode_tree(data)?;
    xml::encode(&tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts;

    fn sample_message() -> Element {
        Element::new("SyncML")
            .attr(XML_NAMESPACE, XML_NAMESPACE_SYNCML12)
            .child(
                Element::new("SyncHdr")
                    .child(Element::with_value("VerDTD", "1.2"))
                    .child(Element::with_value("VerProto", "SyncML/1.2"))
                    .child(Element::with_value("SessionID", "4711"))
                    .child(Element::with_value("MsgID", "1"))
                    .child(Element::new("Target").child(Element::with_value("LocURI", "IMEI:1234")))
                    .child(Element::new("Source").child(Element::with_value("LocURI", "PC Suite")))
                    .child(
                        Element::new("Meta").child(
                            Element::with_value("MaxMsgSize", "65535")
                                .attr(XML_NAMESPACE, XML_NAMESPACE_METINF),
                        ),
                    ),
            )
            .child(
                Element::new("SyncBody")
                    .child(
                        Element::new("Status")
                            .child(Element::with_value("CmdID", "1"))
                            .child(Element::with_value("MsgRef", "1"))
                            .child(Element::with_value("CmdRef", "0"))
                            .child(Element::with_value("Cmd", "SyncHdr"))
                            .child(Element::with_cdata("Data", "200")),
                    )
                    .child(Element::new("Final")),
            )
    }

    #[test]
    fn header_bytes() {
        let encoded = encode(&sample_message(), ProtocolVersion::Ds12).unwrap();
        assert_eq!(encoded[0], 0x02, "WBXML version 1.2");
        // public id 0x1201 as mb_u_int32: 0xA4 0x01
        assert_eq!(&encoded[1..3], &[0xA4, 0x01]);
        assert_eq!(encoded[3], 0x6A, "UTF-8 charset");
        assert_eq!(encoded[4], 0x00, "empty string table");
    }

    #[test]
    fn round_trip_is_identity() {
        let tree = sample_message();
        let encoded = encode(&tree, ProtocolVersion::Ds12).unwrap();
        let decoded = decode_tree(&encoded).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn round_trip_11() {
        let mut tree = sample_message();
        tree.set_attribute(XML_NAMESPACE, XML_NAMESPACE_SYNCML11);
        let encoded = encode(&tree, ProtocolVersion::Ds11).unwrap();
        assert_eq!(&encoded[1..3], &[0x9F, 0x53], "public id 0x0FD3");
        let decoded = decode_tree(&encoded).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn cdata_becomes_opaque() {
        let tree = Element::new("SyncML")
            .attr(XML_NAMESPACE, XML_NAMESPACE_SYNCML12)
            .child(Element::with_cdata("Data", "BEGIN:VCARD\r\nEND:VCARD"));
        let encoded = encode(&tree, ProtocolVersion::Ds12).unwrap();
        assert!(encoded.contains(&TOKEN_OPAQUE));
        let decoded = decode_tree(&encoded).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn embedded_devinf_round_trip() {
        let devinf = Element::new("DevInf")
            .attr(XML_NAMESPACE, XML_NAMESPACE_DEVINF)
            .child(Element::with_value("VerDTD", "1.2"))
            .child(Element::with_value("Man", "syncml-rs"))
            .child(Element::with_value("DevID", "IMEI:1234"))
            .child(Element::with_value("DevTyp", "workstation"));

        let tree = Element::new("SyncML")
            .attr(XML_NAMESPACE, XML_NAMESPACE_SYNCML12)
            .child(
                Element::new("Put")
                    .child(Element::with_value("CmdID", "2"))
                    .child(Element::new("Item").child(Element::new("Data").child(devinf))),
            );

        let encoded = encode(&tree, ProtocolVersion::Ds12).unwrap();
        let decoded = decode_tree(&encoded).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn unknown_element_is_rejected() {
        let tree = Element::new("SyncML")
            .attr(XML_NAMESPACE, XML_NAMESPACE_SYNCML12)
            .child(Element::new("NotAnElement"));
        assert!(matches!(
            encode(&tree, ProtocolVersion::Ds12),
            Err(WireError::UnknownElement(_))
        ));
    }

    #[test]
    fn source_parent_requires_12() {
        let tree = Element::new("SyncML")
            .attr(XML_NAMESPACE, XML_NAMESPACE_SYNCML11)
            .child(Element::with_value("SourceParent", "p1"));
        assert!(encode(&tree, ProtocolVersion::Ds11).is_err());
    }

    #[test]
    fn truncated_document_is_rejected() {
        let encoded = encode(&sample_message(), ProtocolVersion::Ds12).unwrap();
        assert!(decode_tree(&encoded[..encoded.len() - 3]).is_err());
        assert!(decode_tree(&[]).is_err());
    }

    #[test]
    fn decode_to_xml_parses_back() {
        let tree = sample_message();
        let encoded = encode(&tree, ProtocolVersion::Ds12).unwrap();
        let xml_bytes = decode_to_xml(&encoded).unwrap();
        let reparsed = crate::xml::decode(&xml_bytes).unwrap();
        assert_eq!(reparsed, tree);
    }

    #[test]
    fn metinf_switch_restores_page() {
        // Meta (page 0) -> MaxMsgSize (page 1) -> back to Status (page 0).
        let tree = Element::new("SyncML")
            .attr(XML_NAMESPACE, consts::XML_NAMESPACE_SYNCML12)
            .child(
                Element::new("SyncHdr").child(
                    Element::new("Meta").child(
                        Element::with_value("MaxMsgSize", "1024")
                            .attr(XML_NAMESPACE, XML_NAMESPACE_METINF),
                    ),
                ),
            )
            .child(Element::new("SyncBody").child(Element::new("Final")));
        let encoded = encode(&tree, ProtocolVersion::Ds12).unwrap();
        assert_eq!(decode_tree(&encoded).unwrap(), tree);
    }
}

//! Outbound message assembly.

use crate::build;
use crate::consts::{ProtocolVersion, E_SYNCBODY, E_SYNCML, XML_NAMESPACE};
use crate::element::Element;
use crate::error::WireError;
use crate::fragments::HeaderParams;
use crate::wbxml;
use crate::xml;

/// One outbound SyncML message under construction.
///
/// Owns the command id counter; every command element placed into the body
/// must allocate its id through [`Message::next_cmd_id`].
#[derive(Debug)]
pub struct Message {
    version: ProtocolVersion,
    msg_id: u32,
    header: Element,
    body: Vec<Element>,
    cmd_id: u32,
}

impl Message {
    pub fn new(header_params: &HeaderParams, version: ProtocolVersion) -> Message {
        Message {
            version,
            msg_id: header_params.msg_id,
            header: build::sync_hdr(header_params, version),
            body: Vec::new(),
            cmd_id: 0,
        }
    }

    pub fn msg_id(&self) -> u32 {
        self.msg_id
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Allocate the next command id, starting from 1.
    pub fn next_cmd_id(&mut self) -> u32 {
        self.cmd_id += 1;
        self.cmd_id
    }

    /// Append an element to the message header.
    pub fn add_to_header(&mut self, element: Element) {
        self.header.add_child(element);
    }

    /// Append an element to the message body.
    pub fn add_to_body(&mut self, element: Element) {
        self.body.push(element);
    }

    /// Estimated serialized size of the message so far.
    pub fn size_estimate(&self) -> usize {
        self.to_element().size_estimate()
    }

    pub fn to_element(&self) -> Element {
        let namespace = match self.version {
            ProtocolVersion::Ds11 => crate::consts::XML_NAMESPACE_SYNCML11,
            _ => crate::consts::XML_NAMESPACE_SYNCML12,
        };

        let mut body = Element::new(E_SYNCBODY);
        body.children = self.body.clone();

        Element::new(E_SYNCML)
            .attr(XML_NAMESPACE, namespace)
            .child(self.header.clone())
            .child(body)
    }

    pub fn encode_xml(&self) -> Result<Vec<u8>, WireError> {
        xml::encode(&self.to_element())
    }

    pub fn encode_wbxml(&self) -> Result<Vec<u8>, WireError> {
        wbxml::encode(&self.to_element(), self.version)
    }
}

//! Element tree ⇄ XML bytes, on top of quick-xml.

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::element::Element;
use crate::error::WireError;

/// Serialize an element tree into a compact XML document.
pub fn encode(root: &Element) -> Result<Vec<u8>, WireError> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), WireError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (name, value) in &element.attributes {
        start.push_attribute((name.as_str(), value.as_str()));
    }

    if element.value.is_empty() && element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| WireError::XmlWrite(e.to_string()))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| WireError::XmlWrite(e.to_string()))?;

    if !element.value.is_empty() {
        if element.cdata {
            writer
                .write_event(Event::CData(BytesCData::new(element.value.as_str())))
                .map_err(|e| WireError::XmlWrite(e.to_string()))?;
        } else {
            writer
                .write_event(Event::Text(BytesText::new(element.value.as_str())))
                .map_err(|e| WireError::XmlWrite(e.to_string()))?;
        }
    }

    for child in &element.children {
        write_element(writer, child)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| WireError::XmlWrite(e.to_string()))?;

    Ok(())
}

/// Parse an XML document into an element tree.
///
/// Used by the WbXML decoder tests and by embedders that want to inspect a
/// document without going through the fragment parser.
pub fn decode(data: &[u8]) -> Result<Element, WireError> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => {
                stack.push(element_from_start(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped =
                        text.unescape().map_err(|e| WireError::WbxmlDecode(e.to_string()))?;
                    top.value.push_str(&unescaped);
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(top) = stack.last_mut() {
                    top.value.push_str(&String::from_utf8_lossy(&cdata));
                    top.cdata = true;
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| WireError::WbxmlDecode("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(WireError::WbxmlDecode(e.to_string())),
        }
        buf.clear();
    }

    root.ok_or_else(|| WireError::WbxmlDecode("empty document".into()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, WireError> {
    let mut element = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| WireError::WbxmlDecode(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| WireError::WbxmlDecode(e.to_string()))?
            .to_string();
        element.set_attribute(&key, &value);
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), WireError> {
    if let Some(parent) = stack.last_mut() {
        parent.add_child(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(WireError::WbxmlDecode("multiple root elements".into()));
    }
    Ok(())
}

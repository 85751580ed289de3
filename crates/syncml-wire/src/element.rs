//! Tagged element tree used to assemble outbound messages.
//!
//! Elements carry a name, an optional text value (optionally CDATA), an
//! ordered child list and a flat attribute map. The only attribute the
//! codecs interpret is `xmlns`, which selects the WbXML code space.

use crate::consts::XML_NAMESPACE;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub value: String,
    pub cdata: bool,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: &str) -> Element {
        Element { name: name.to_string(), ..Default::default() }
    }

    pub fn with_value(name: &str, value: impl Into<String>) -> Element {
        Element { name: name.to_string(), value: value.into(), ..Default::default() }
    }

    pub fn with_cdata(name: &str, value: impl Into<String>) -> Element {
        Element { name: name.to_string(), value: value.into(), cdata: true, ..Default::default() }
    }

    /// Builder-style attribute setter.
    pub fn attr(mut self, name: &str, value: &str) -> Element {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style child appender.
    pub fn child(mut self, child: Element) -> Element {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((name.to_string(), value.to_string()));
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.attribute(XML_NAMESPACE)
    }

    /// Find the first direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Coarse estimate of the serialized XML size of this subtree.
    ///
    /// The document budget is set to 90% of the transport maximum, so this
    /// does not need to be byte-accurate; it must only be cheap and never
    /// shrink when children are added.
    pub fn size_estimate(&self) -> usize {
        let mut size = 0;

        if self.value.is_empty() && self.children.is_empty() {
            // <element/>
            size += 3 + self.name.len();
        } else {
            // <element> + </element>
            if !self.name.is_empty() {
                size += 5 + 2 * self.name.len();
            }

            size += self.value.len();

            if self.cdata {
                // <![CDATA[ ... ]]>
                size += 12;
            }

            for child in &self.children {
                size += child.size_estimate();
            }
        }

        // attr="value"
        for (name, value) in &self.attributes {
            size += 1 + name.len() + 2 + value.len() + 1;
        }

        size
    }
}

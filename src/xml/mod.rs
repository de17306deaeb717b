// xml/mod.rs
//! Minimal XML element tree with the canonical output format used by the
//! section-file editable form: UTF-8 declaration, two-space indentation,
//! hex payloads as uppercase byte pairs 16 per line. Parsing is built on
//! `quick-xml` and accepts case-insensitive element/attribute names and
//! extraneous whitespace.

pub mod json;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, SiError};

/// Ordered child node: nested element or text run.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One XML element. Attribute order is preserved so that emission is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Element {
        Element { name: name.to_string(), attrs: Vec::new(), children: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_lower(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /* ── attributes ── */

    pub fn set_attr(&mut self, name: &str, value: &str) {
        self.attrs.push((name.to_string(), value.to_string()));
    }

    pub fn set_attr_dec(&mut self, name: &str, value: u64) {
        self.set_attr(name, &value.to_string());
    }

    pub fn set_attr_hex8(&mut self, name: &str, value: u8) {
        self.set_attr(name, &format!("0x{value:02X}"));
    }

    pub fn set_attr_hex16(&mut self, name: &str, value: u16) {
        self.set_attr(name, &format!("0x{value:04X}"));
    }

    pub fn set_attr_hex32(&mut self, name: &str, value: u32) {
        self.set_attr(name, &format!("0x{value:08X}"));
    }

    pub fn set_attr_bool(&mut self, name: &str, value: bool) {
        self.set_attr(name, if value { "true" } else { "false" });
    }

    /// Case-insensitive attribute lookup.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Integer attribute, accepting decimal or `0x…` hexadecimal literals.
    pub fn attr_int(&self, name: &str) -> Option<u64> {
        let text = self.attr(name)?;
        match parse_int(&text) {
            Some(v) => Some(v),
            None => {
                log::warn!("<{}>: attribute {}=\"{}\" is not an integer", self.name, name, text);
                None
            }
        }
    }

    pub fn attr_u8(&self, name: &str) -> Option<u8> {
        self.attr_int(name).and_then(|v| u8::try_from(v).ok())
    }

    pub fn attr_u16(&self, name: &str) -> Option<u16> {
        self.attr_int(name).and_then(|v| u16::try_from(v).ok())
    }

    pub fn attr_u32(&self, name: &str) -> Option<u32> {
        self.attr_int(name).and_then(|v| u32::try_from(v).ok())
    }

    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        match self.attr(name)?.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            other => {
                log::warn!("<{}>: attribute {}=\"{}\" is not a boolean", self.name, name, other);
                None
            }
        }
    }

    pub fn req_attr_u8(&self, name: &str) -> Result<u8> {
        self.attr_u8(name)
            .ok_or_else(|| SiError::Xml(format!("<{}>: missing or invalid attribute '{}'", self.name, name)))
    }

    pub fn req_attr_u16(&self, name: &str) -> Result<u16> {
        self.attr_u16(name)
            .ok_or_else(|| SiError::Xml(format!("<{}>: missing or invalid attribute '{}'", self.name, name)))
    }

    pub fn req_attr_u32(&self, name: &str) -> Result<u32> {
        self.attr_u32(name)
            .ok_or_else(|| SiError::Xml(format!("<{}>: missing or invalid attribute '{}'", self.name, name)))
    }

    /* ── children ── */

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: &str) {
        self.children.push(Node::Text(text.to_string()));
    }

    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements with the given name, matched case-insensitively.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children().filter(move |e| e.name.eq_ignore_ascii_case(name))
    }

    /// Concatenated text content of direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Stores a binary payload as uppercase hex byte pairs, 16 per line.
    pub fn set_hex_text(&mut self, bytes: &[u8]) {
        let mut text = String::with_capacity(bytes.len() * 3);
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                text.push(if i % 16 == 0 { '\n' } else { ' ' });
            }
            text.push_str(&format!("{b:02X}"));
        }
        if !text.is_empty() {
            self.push_text(&text);
        }
    }

    /// Parses the text content as whitespace-separated hex bytes.
    pub fn hex_text(&self) -> Result<Vec<u8>> {
        let text = self.text();
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() % 2 != 0 {
            return Err(SiError::Xml(format!("<{}>: odd number of hex digits", self.name)));
        }
        let mut out = Vec::with_capacity(compact.len() / 2);
        for i in (0..compact.len()).step_by(2) {
            let byte = u8::from_str_radix(&compact[i..i + 2], 16)
                .map_err(|_| SiError::Xml(format!("<{}>: invalid hex text", self.name)))?;
            out.push(byte);
        }
        Ok(out)
    }

    /* ── serialization ── */

    /// Canonical document form: XML declaration plus this element as root.
    pub fn to_document_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        out.push_str(&pad);
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push_str(">\n");
        for node in &self.children {
            match node {
                Node::Element(e) => e.write(out, depth + 1),
                Node::Text(t) => {
                    let inner = "  ".repeat(depth + 1);
                    for line in t.lines() {
                        out.push_str(&inner);
                        out.push_str(&escape(line));
                        out.push('\n');
                    }
                }
            }
        }
        out.push_str(&pad);
        out.push_str("</");
        out.push_str(&self.name);
        out.push_str(">\n");
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn parse_int(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Parses a whole XML document into its root element.
pub fn parse_document(text: &str) -> Result<Element> {
    let mut reader = Reader::from_reader(text.as_bytes());
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(element_from_event(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let elem = element_from_event(&e)?;
                attach(&mut stack, &mut root, elem)?;
            }
            Ok(Event::End(_)) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| SiError::Xml("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, elem)?;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| SiError::Xml(e.to_string()))?
                    .to_string();
                if let Some(top) = stack.last_mut() {
                    if !text.trim().is_empty() {
                        top.push_text(text.trim());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declaration, comments, processing instructions
            Err(e) => return Err(SiError::Xml(e.to_string())),
        }
        buf.clear();
    }
    root.ok_or_else(|| SiError::Xml("document has no root element".to_string()))
}

fn element_from_event(e: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut elem = Element::new(&name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SiError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| SiError::Xml(e.to_string()))?
            .to_string();
        elem.set_attr(&key, &value);
    }
    Ok(elem)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, elem: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_child(elem);
    } else if root.is_none() {
        *root = Some(elem);
    } else {
        return Err(SiError::Xml("multiple root elements".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_output() {
        let mut root = Element::new("test");
        let mut desc = Element::new("generic_descriptor");
        desc.set_attr_hex8("tag", 0x72);
        desc.set_hex_text(&[1, 2, 3, 4, 5, 6, 7]);
        root.push_child(desc);
        assert_eq!(
            root.to_document_string(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <test>\n\
             \x20 <generic_descriptor tag=\"0x72\">\n\
             \x20   01 02 03 04 05 06 07\n\
             \x20 </generic_descriptor>\n\
             </test>\n"
        );
    }

    #[test]
    fn test_hex_text_wraps_at_16_bytes() {
        let mut elem = Element::new("section");
        elem.set_hex_text(&(0u8..20).collect::<Vec<_>>());
        let text = elem.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00 01"));
        assert!(lines[1].starts_with("10 11"));
        assert_eq!(elem.hex_text().unwrap(), (0u8..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_round_trip() {
        let text = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                    <tsduck>\n\
                    \x20 <pat version=\"7\" current=\"true\" transport_stream_id=\"0x1234\"/>\n\
                    </tsduck>\n";
        let root = parse_document(text).unwrap();
        assert_eq!(root.name(), "tsduck");
        let pat = root.children().next().unwrap();
        assert_eq!(pat.attr_u8("version"), Some(7));
        assert_eq!(pat.attr_bool("current"), Some(true));
        assert_eq!(pat.attr_u16("transport_stream_id"), Some(0x1234));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let root = parse_document("<T><GENERIC_long_TABLE Table_ID=\"0xCD\"/></T>").unwrap();
        let child = root.children_named("generic_long_table").next().unwrap();
        assert_eq!(child.attr_u8("table_id"), Some(0xCD));
    }

    #[test]
    fn test_attribute_escaping() {
        let mut elem = Element::new("metadata");
        elem.set_attr("attribute", "a<b&\"c\"");
        let text = elem.to_document_string();
        assert!(text.contains("attribute=\"a&lt;b&amp;&quot;c&quot;\""));
        let parsed = parse_document(&text).unwrap();
        assert_eq!(parsed.attr("attribute").unwrap(), "a<b&\"c\"");
    }
}

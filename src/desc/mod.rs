// desc/mod.rs
//! Descriptors: tag + length + payload records nested in table payloads.

pub mod ca;
pub mod ca_identifier;
pub mod private_data_specifier;
pub mod registration;
mod registry;

pub use ca::CaDescriptor;
pub use ca_identifier::CaIdentifierDescriptor;
pub use private_data_specifier::PrivateDataSpecifierDescriptor;
pub use registration::RegistrationDescriptor;

use crate::buffer::ByteBuffer;
use crate::context::{SiContext, Standard};
use crate::error::{Result, SiError};
use crate::xml::Element;

/// Tag of the DVB extension descriptor: the first payload byte then acts
/// as the real tag.
pub const DID_EXTENSION: u8 = 0x7F;
/// Tag of the private data specifier descriptor, which re-scopes the
/// private tag range for the rest of its list.
pub const DID_PRIVATE_DATA_SPECIFIER: u8 = 0x5F;

const MAX_PAYLOAD: usize = 255;

/// A raw descriptor. Typed views (see [`SiDescriptor`]) parse the payload
/// on demand; the raw form is what lists store and serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    tag: u8,
    payload: Vec<u8>,
}

impl Descriptor {
    pub fn new(tag: u8, payload: Vec<u8>) -> Result<Descriptor> {
        if payload.len() > MAX_PAYLOAD {
            return Err(SiError::InvalidStructure("descriptor payload longer than 255 bytes"));
        }
        Ok(Descriptor { tag, payload })
    }

    /// Parses one descriptor from the head of `data`, returning it with
    /// the number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Descriptor, usize)> {
        if data.len() < 2 {
            return Err(SiError::InvalidLength { expected: 2, actual: data.len() });
        }
        let length = data[1] as usize;
        if data.len() < 2 + length {
            return Err(SiError::InvalidLength { expected: 2 + length, actual: data.len() });
        }
        Ok((Descriptor { tag: data[0], payload: data[2..2 + length].to_vec() }, 2 + length))
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Extension tag carried in the first payload byte of a tag-0x7F
    /// descriptor.
    pub fn extended_tag(&self) -> Option<u8> {
        if self.tag == DID_EXTENSION { self.payload.first().copied() } else { None }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Encoded size: tag, length and payload bytes.
    pub fn size(&self) -> usize {
        2 + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.push(self.tag);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn write(&self, buf: &mut ByteBuffer) {
        buf.put_u8(self.tag);
        buf.put_u8(self.payload.len() as u8);
        buf.put_bytes(&self.payload);
    }

    /// XML form: the registered element for (tag, context), or the
    /// `generic_descriptor` hex dump for unknown tags.
    pub fn to_xml(&self, ctx: &DescriptorContext) -> Element {
        if let Some(codec) = registry::by_tag(self.tag, ctx) {
            if let Ok(elem) = (codec.to_xml)(self) {
                return elem;
            }
        }
        let mut elem = Element::new("generic_descriptor");
        elem.set_attr_hex8("tag", self.tag);
        elem.set_hex_text(&self.payload);
        elem
    }

    /// Builds a descriptor from its XML form, matched case-insensitively
    /// against the registry. Unknown element names fail.
    pub fn from_xml(elem: &Element) -> Result<Descriptor> {
        let name = elem.name_lower();
        if name == "generic_descriptor" {
            let tag = elem.req_attr_u8("tag")?;
            return Descriptor::new(tag, elem.hex_text()?);
        }
        match registry::by_name(&name) {
            Some(codec) => (codec.from_xml)(elem),
            None => Err(SiError::UnknownElement(elem.name().to_string())),
        }
    }
}

/// A typed descriptor: a parsed view of one tag, able to round-trip
/// between the raw record and its XML element.
pub trait SiDescriptor: Sized {
    const TAG: u8;
    /// XML element name, lowercase.
    const NAME: &'static str;

    /// Parses the typed view out of a raw payload.
    fn read(payload: &[u8]) -> Result<Self>;

    /// Serializes the payload bytes (tag and length excluded).
    fn write(&self, buf: &mut ByteBuffer);

    fn to_xml(&self) -> Element;

    fn from_xml(elem: &Element) -> Result<Self>;

    /// Converts a raw descriptor of the matching tag.
    fn from_descriptor(desc: &Descriptor) -> Result<Self> {
        if desc.tag() != Self::TAG {
            return Err(SiError::WrongDescriptorTag { expected: Self::TAG, actual: desc.tag() });
        }
        Self::read(desc.payload())
    }

    /// Seals the typed view into a raw descriptor.
    fn descriptor(&self) -> Result<Descriptor> {
        let mut buf = ByteBuffer::new();
        self.write(&mut buf);
        if buf.write_error() {
            return Err(SiError::InvalidStructure("descriptor payload serialization failed"));
        }
        Descriptor::new(Self::TAG, buf.into_bytes())
    }
}

/// Ambient classification state while walking a descriptor list: the
/// owning table id, the standards flavor and the private data specifier
/// currently in force. The specifier evolves *in list order*, so a
/// `private_data_specifier_descriptor` re-scopes only what follows it.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorContext {
    pub table_id: u8,
    pub standard: Standard,
    pub pds: u32,
}

impl DescriptorContext {
    pub fn new(ctx: &SiContext, table_id: u8) -> DescriptorContext {
        DescriptorContext { table_id, standard: ctx.standard, pds: ctx.default_pds }
    }

    /// Folds one descriptor into the ambient state.
    pub fn update(&mut self, desc: &Descriptor) {
        if desc.tag() == DID_PRIVATE_DATA_SPECIFIER && desc.payload_size() >= 4 {
            let p = desc.payload();
            self.pds = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
        }
    }
}

/// An ordered descriptor list with its accumulated encoded size and the
/// table id it lives in.
#[derive(Debug, Clone, Default)]
pub struct DescriptorList {
    table_id: u8,
    descs: Vec<Descriptor>,
}

/// Lists compare on content only; the table-id context is not part of it.
impl PartialEq for DescriptorList {
    fn eq(&self, other: &Self) -> bool {
        self.descs == other.descs
    }
}

impl Eq for DescriptorList {}

impl DescriptorList {
    pub fn new(table_id: u8) -> DescriptorList {
        DescriptorList { table_id, descs: Vec::new() }
    }

    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Descriptor> {
        self.descs.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.descs.iter()
    }

    pub fn push(&mut self, desc: Descriptor) {
        self.descs.push(desc);
    }

    /// Appends a typed descriptor.
    pub fn add<T: SiDescriptor>(&mut self, desc: &T) -> Result<()> {
        self.descs.push(desc.descriptor()?);
        Ok(())
    }

    /// Total encoded size of all descriptors.
    pub fn binary_size(&self) -> usize {
        self.descs.iter().map(Descriptor::size).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.binary_size());
        for d in &self.descs {
            out.extend_from_slice(&d.to_bytes());
        }
        out
    }

    /// Parses exactly `data` into descriptors.
    pub fn from_bytes(table_id: u8, data: &[u8]) -> Result<DescriptorList> {
        let mut list = DescriptorList::new(table_id);
        let mut rest = data;
        while !rest.is_empty() {
            let (desc, used) = Descriptor::from_bytes(rest)?;
            list.descs.push(desc);
            rest = &rest[used..];
        }
        Ok(list)
    }

    /// Appends every descriptor's XML form to `parent`, evolving the
    /// context in list order.
    pub fn to_xml(&self, ctx: &SiContext, parent: &mut Element) {
        let mut dctx = DescriptorContext::new(ctx, self.table_id);
        for desc in &self.descs {
            parent.push_child(desc.to_xml(&dctx));
            dctx.update(desc);
        }
    }

    /// Collects descriptor children of `elem`, skipping element names the
    /// caller handles itself (entry loops, metadata). Unknown names fail
    /// with [`SiError::UnknownElement`].
    pub fn from_xml_children(
        table_id: u8,
        elem: &Element,
        skip: &[&str],
    ) -> Result<DescriptorList> {
        let mut list = DescriptorList::new(table_id);
        for child in elem.children() {
            let name = child.name_lower();
            if name == "metadata" || skip.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                continue;
            }
            list.descs.push(Descriptor::from_xml(child)?);
        }
        Ok(list)
    }
}

impl<'a> IntoIterator for &'a DescriptorList {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SiContext;

    #[test]
    fn test_descriptor_wire_round_trip() {
        let desc = Descriptor::new(0x72, vec![1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(desc.size(), 9);
        assert_eq!(desc.payload_size(), 7);
        let bytes = desc.to_bytes();
        assert_eq!(bytes[..2], [0x72, 0x07]);
        let (back, used) = Descriptor::from_bytes(&bytes).unwrap();
        assert_eq!(used, 9);
        assert_eq!(back, desc);
    }

    #[test]
    fn test_truncated_descriptor() {
        assert!(matches!(
            Descriptor::from_bytes(&[0x72, 0x07, 1, 2]),
            Err(SiError::InvalidLength { expected: 9, actual: 4 })
        ));
    }

    #[test]
    fn test_extension_tag() {
        let desc = Descriptor::new(DID_EXTENSION, vec![0x04, 0xAA]).unwrap();
        assert_eq!(desc.extended_tag(), Some(0x04));
        let plain = Descriptor::new(0x48, vec![0x04]).unwrap();
        assert_eq!(plain.extended_tag(), None);
    }

    #[test]
    fn test_generic_xml_round_trip() {
        let ctx = SiContext::default();
        let desc = Descriptor::new(0x72, vec![1, 2, 3, 4, 5, 6, 7]).unwrap();
        let elem = desc.to_xml(&DescriptorContext::new(&ctx, 0xFF));
        assert_eq!(elem.name(), "generic_descriptor");
        assert_eq!(elem.attr("tag").unwrap(), "0x72");
        assert_eq!(elem.hex_text().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
        let back = Descriptor::from_xml(&elem).unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn test_unknown_element_name() {
        let elem = Element::new("no_such_descriptor");
        assert!(matches!(
            Descriptor::from_xml(&elem),
            Err(SiError::UnknownElement(_))
        ));
    }

    #[test]
    fn test_context_evolves_in_list_order() {
        let ctx = SiContext::default();
        let mut dctx = DescriptorContext::new(&ctx, 0xFF);
        assert_eq!(dctx.pds, 0);
        let pds = Descriptor::new(DID_PRIVATE_DATA_SPECIFIER, vec![0x00, 0x00, 0x00, 0x28]).unwrap();
        dctx.update(&pds);
        assert_eq!(dctx.pds, 0x28);
    }

    #[test]
    fn test_list_round_trip_preserves_order() {
        let mut list = DescriptorList::new(0x02);
        list.push(Descriptor::new(0x0A, vec![b'e', b'n', b'g', 0]).unwrap());
        list.push(Descriptor::new(0x52, vec![0x01]).unwrap());
        assert_eq!(list.binary_size(), 6 + 3);
        let bytes = list.to_bytes();
        let back = DescriptorList::from_bytes(0x02, &bytes).unwrap();
        assert_eq!(back, list);
        assert_eq!(back.get(0).unwrap().tag(), 0x0A);
        assert_eq!(back.get(1).unwrap().tag(), 0x52);
    }
}

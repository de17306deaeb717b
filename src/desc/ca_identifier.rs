// desc/ca_identifier.rs
//! CA identifier descriptor (DVB, tag 0x53): the CA system ids in use on
//! a bouquet or service.

use crate::buffer::ByteBuffer;
use crate::context::Standard;
use crate::desc::registry::DescriptorCodec;
use crate::desc::SiDescriptor;
use crate::error::{Result, SiError};
use crate::xml::Element;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaIdentifierDescriptor {
    pub casids: Vec<u16>,
}

impl CaIdentifierDescriptor {
    pub fn new(casids: Vec<u16>) -> Self {
        CaIdentifierDescriptor { casids }
    }
}

impl SiDescriptor for CaIdentifierDescriptor {
    const TAG: u8 = 0x53;
    const NAME: &'static str = "ca_identifier_descriptor";

    fn read(payload: &[u8]) -> Result<Self> {
        if payload.len() % 2 != 0 {
            return Err(SiError::InvalidLength { expected: payload.len() + 1, actual: payload.len() });
        }
        let casids = payload
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        Ok(CaIdentifierDescriptor { casids })
    }

    fn write(&self, buf: &mut ByteBuffer) {
        for id in &self.casids {
            buf.put_u16(*id);
        }
    }

    fn to_xml(&self) -> Element {
        let mut elem = Element::new(Self::NAME);
        for id in &self.casids {
            let mut child = Element::new("ca_system_id");
            child.set_attr_hex16("value", *id);
            elem.push_child(child);
        }
        elem
    }

    fn from_xml(elem: &Element) -> Result<Self> {
        let casids = elem
            .children_named("ca_system_id")
            .map(|c| c.req_attr_u16("value"))
            .collect::<Result<_>>()?;
        Ok(CaIdentifierDescriptor { casids })
    }
}

pub(super) fn register(codecs: &mut Vec<DescriptorCodec>) {
    codecs.push(DescriptorCodec {
        name: CaIdentifierDescriptor::NAME,
        tag: CaIdentifierDescriptor::TAG,
        standard: Some(Standard::Dvb),
        pds: None,
        to_xml: |desc| Ok(CaIdentifierDescriptor::from_descriptor(desc)?.to_xml()),
        from_xml: |elem| CaIdentifierDescriptor::from_xml(elem)?.descriptor(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let desc = CaIdentifierDescriptor::new(vec![0, 1, 2, 3]).descriptor().unwrap();
        assert_eq!(desc.size(), 10);
        assert_eq!(desc.payload(), &[0, 0, 0, 1, 0, 2, 0, 3]);
        let back = CaIdentifierDescriptor::from_descriptor(&desc).unwrap();
        assert_eq!(back.casids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_odd_payload_rejected() {
        assert!(CaIdentifierDescriptor::read(&[0x05]).is_err());
    }

    #[test]
    fn test_mismatched_tag_rejected() {
        let raw = crate::desc::Descriptor::new(0x72, vec![0x00, 0x01]).unwrap();
        assert!(matches!(
            CaIdentifierDescriptor::from_descriptor(&raw),
            Err(SiError::WrongDescriptorTag { expected: 0x53, actual: 0x72 })
        ));
    }

    #[test]
    fn test_xml_round_trip() {
        let desc = CaIdentifierDescriptor::new(vec![0x0100, 0x0500]);
        let elem = desc.to_xml();
        assert_eq!(elem.name(), "ca_identifier_descriptor");
        let back = CaIdentifierDescriptor::from_xml(&elem).unwrap();
        assert_eq!(back, desc);
    }
}

// desc/ca.rs
//! CA descriptor (MPEG, tag 0x09): CA system id and the PID carrying
//! EMM/ECM data, plus system-private bytes.

use crate::buffer::ByteBuffer;
use crate::desc::registry::DescriptorCodec;
use crate::desc::SiDescriptor;
use crate::error::{Result, SiError};
use crate::xml::Element;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    pub ca_pid: u16,
    pub private_data: Vec<u8>,
}

impl CaDescriptor {
    pub fn new(ca_system_id: u16, ca_pid: u16) -> Self {
        CaDescriptor { ca_system_id, ca_pid, private_data: Vec::new() }
    }
}

impl SiDescriptor for CaDescriptor {
    const TAG: u8 = 0x09;
    const NAME: &'static str = "ca_descriptor";

    fn read(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(SiError::InvalidLength { expected: 4, actual: payload.len() });
        }
        let mut buf = ByteBuffer::from_slice(payload);
        let ca_system_id = buf.get_u16();
        buf.get_bits(3); // reserved
        let ca_pid = buf.get_bits(13) as u16;
        let private_data = buf.get_remaining();
        Ok(CaDescriptor { ca_system_id, ca_pid, private_data })
    }

    fn write(&self, buf: &mut ByteBuffer) {
        buf.put_u16(self.ca_system_id);
        buf.put_bits(0b111, 3);
        buf.put_bits(self.ca_pid as u64, 13);
        buf.put_bytes(&self.private_data);
    }

    fn to_xml(&self) -> Element {
        let mut elem = Element::new(Self::NAME);
        elem.set_attr_hex16("ca_system_id", self.ca_system_id);
        elem.set_attr_hex16("ca_pid", self.ca_pid);
        elem.set_hex_text(&self.private_data);
        elem
    }

    fn from_xml(elem: &Element) -> Result<Self> {
        Ok(CaDescriptor {
            ca_system_id: elem.req_attr_u16("ca_system_id")?,
            ca_pid: elem.req_attr_u16("ca_pid")?,
            private_data: elem.hex_text()?,
        })
    }
}

pub(super) fn register(codecs: &mut Vec<DescriptorCodec>) {
    codecs.push(DescriptorCodec {
        name: CaDescriptor::NAME,
        tag: CaDescriptor::TAG,
        standard: None,
        pds: None,
        to_xml: |desc| Ok(CaDescriptor::from_descriptor(desc)?.to_xml()),
        from_xml: |elem| CaDescriptor::from_xml(elem)?.descriptor(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_field_packing() {
        let desc = CaDescriptor::new(0x0500, 0x1FFF);
        let raw = desc.descriptor().unwrap();
        assert_eq!(raw.payload(), &[0x05, 0x00, 0xFF, 0xFF]);
        let back = CaDescriptor::from_descriptor(&raw).unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn test_xml_round_trip_with_private_data() {
        let mut desc = CaDescriptor::new(0x0100, 0x0111);
        desc.private_data = vec![0xDE, 0xAD];
        let elem = desc.to_xml();
        assert_eq!(CaDescriptor::from_xml(&elem).unwrap(), desc);
    }
}

// desc/registration.rs
//! Registration descriptor (MPEG, tag 0x05): a SMPTE-registered format
//! identifier such as "CUEI", plus free-form identification bytes.

use crate::buffer::ByteBuffer;
use crate::desc::registry::DescriptorCodec;
use crate::desc::SiDescriptor;
use crate::error::{Result, SiError};
use crate::xml::Element;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationDescriptor {
    pub format_identifier: u32,
    pub additional_identification_info: Vec<u8>,
}

impl RegistrationDescriptor {
    pub fn new(format_identifier: u32) -> Self {
        RegistrationDescriptor { format_identifier, additional_identification_info: Vec::new() }
    }
}

impl SiDescriptor for RegistrationDescriptor {
    const TAG: u8 = 0x05;
    const NAME: &'static str = "registration_descriptor";

    fn read(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(SiError::InvalidLength { expected: 4, actual: payload.len() });
        }
        Ok(RegistrationDescriptor {
            format_identifier: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            additional_identification_info: payload[4..].to_vec(),
        })
    }

    fn write(&self, buf: &mut ByteBuffer) {
        buf.put_u32(self.format_identifier);
        buf.put_bytes(&self.additional_identification_info);
    }

    fn to_xml(&self) -> Element {
        let mut elem = Element::new(Self::NAME);
        elem.set_attr_hex32("format_identifier", self.format_identifier);
        elem.set_hex_text(&self.additional_identification_info);
        elem
    }

    fn from_xml(elem: &Element) -> Result<Self> {
        Ok(RegistrationDescriptor {
            format_identifier: elem.req_attr_u32("format_identifier")?,
            additional_identification_info: elem.hex_text()?,
        })
    }
}

pub(super) fn register(codecs: &mut Vec<DescriptorCodec>) {
    codecs.push(DescriptorCodec {
        name: RegistrationDescriptor::NAME,
        tag: RegistrationDescriptor::TAG,
        standard: None, // MPEG-defined, valid under every standard
        pds: None,
        to_xml: |desc| Ok(RegistrationDescriptor::from_descriptor(desc)?.to_xml()),
        from_xml: |elem| RegistrationDescriptor::from_xml(elem)?.descriptor(),
    });
}

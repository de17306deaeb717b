// desc/private_data_specifier.rs
//! Private data specifier descriptor (DVB, tag 0x5F). Position-sensitive:
//! it re-scopes the private tag range for every descriptor after it in
//! the same list.

use crate::buffer::ByteBuffer;
use crate::context::Standard;
use crate::desc::registry::DescriptorCodec;
use crate::desc::SiDescriptor;
use crate::error::{Result, SiError};
use crate::xml::Element;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrivateDataSpecifierDescriptor {
    pub pds: u32,
}

impl PrivateDataSpecifierDescriptor {
    pub fn new(pds: u32) -> Self {
        PrivateDataSpecifierDescriptor { pds }
    }
}

impl SiDescriptor for PrivateDataSpecifierDescriptor {
    const TAG: u8 = super::DID_PRIVATE_DATA_SPECIFIER;
    const NAME: &'static str = "private_data_specifier_descriptor";

    fn read(payload: &[u8]) -> Result<Self> {
        if payload.len() != 4 {
            return Err(SiError::InvalidLength { expected: 4, actual: payload.len() });
        }
        Ok(PrivateDataSpecifierDescriptor {
            pds: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
        })
    }

    fn write(&self, buf: &mut ByteBuffer) {
        buf.put_u32(self.pds);
    }

    fn to_xml(&self) -> Element {
        let mut elem = Element::new(Self::NAME);
        elem.set_attr_hex32("private_data_specifier", self.pds);
        elem
    }

    fn from_xml(elem: &Element) -> Result<Self> {
        Ok(PrivateDataSpecifierDescriptor { pds: elem.req_attr_u32("private_data_specifier")? })
    }
}

pub(super) fn register(codecs: &mut Vec<DescriptorCodec>) {
    codecs.push(DescriptorCodec {
        name: PrivateDataSpecifierDescriptor::NAME,
        tag: PrivateDataSpecifierDescriptor::TAG,
        standard: Some(Standard::Dvb),
        pds: None,
        to_xml: |desc| Ok(PrivateDataSpecifierDescriptor::from_descriptor(desc)?.to_xml()),
        from_xml: |elem| PrivateDataSpecifierDescriptor::from_xml(elem)?.descriptor(),
    });
}

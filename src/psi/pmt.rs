// psi/pmt.rs
//! Program Map Table: PCR PID, program-level descriptors and the
//! elementary stream loop.
//!
//! Multi-section layout: program-level descriptors fill from section 0
//! first, with each section's program_info_length covering only the
//! descriptors placed there; once exhausted, stream entries follow. A
//! stream entry (type, PID, es_info_length, descriptors) never splits
//! across sections.

use std::collections::BTreeMap;

use crate::buffer::ByteBuffer;
use crate::constants::TID_PMT;
use crate::context::SiContext;
use crate::desc::DescriptorList;
use crate::error::{Result, SiError};
use crate::psi::{self, PsiTable, TableFactory};
use crate::section::MAX_LONG_PAYLOAD_SIZE;
use crate::table::BinaryTable;
use crate::xml::Element;

/// Fixed bytes at the start of every PMT section payload: PCR PID and
/// program_info_length.
const FIXED_PART: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub descs: DescriptorList,
}

impl PmtStream {
    pub fn new(stream_type: u8) -> PmtStream {
        PmtStream { stream_type, descs: DescriptorList::new(TID_PMT) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    pub version: u8,
    pub current: bool,
    /// Program number, serialized as the table id extension.
    pub service_id: u16,
    pub pcr_pid: u16,
    pub descs: DescriptorList,
    /// elementary PID → stream entry, in PID order.
    pub streams: BTreeMap<u16, PmtStream>,
    valid: bool,
    attribute: String,
}

impl Default for Pmt {
    fn default() -> Self {
        Pmt::new(0, true, 0)
    }
}

impl Pmt {
    pub fn new(version: u8, current: bool, service_id: u16) -> Pmt {
        Pmt {
            version,
            current,
            service_id,
            pcr_pid: crate::constants::PID_NULL,
            descs: DescriptorList::new(TID_PMT),
            streams: BTreeMap::new(),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Pmt {
        psi::from_binary(ctx, bin)
    }

    pub fn is_private(&self) -> bool {
        false
    }

    /// Section payload prefix with a zero program_info_length, patched
    /// once the section's descriptor share is known.
    fn fixed_part(&self) -> Vec<u8> {
        vec![0xE0 | (self.pcr_pid >> 8) as u8, self.pcr_pid as u8, 0xF0, 0x00]
    }

    fn patch_program_info_length(payload: &mut [u8], length: usize) {
        payload[2] = 0xF0 | ((length >> 8) as u8 & 0x0F);
        payload[3] = length as u8;
    }

    fn stream_entry(pid: u16, stream: &PmtStream) -> Vec<u8> {
        let descs = stream.descs.to_bytes();
        let mut entry = Vec::with_capacity(5 + descs.len());
        entry.push(stream.stream_type);
        entry.push(0xE0 | (pid >> 8) as u8);
        entry.push(pid as u8);
        entry.push(0xF0 | ((descs.len() >> 8) as u8 & 0x0F));
        entry.push(descs.len() as u8);
        entry.extend_from_slice(&descs);
        entry
    }
}

impl PsiTable for Pmt {
    fn table_id(&self) -> u8 {
        TID_PMT
    }

    fn name(&self) -> &'static str {
        "pmt"
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn attribute(&self) -> &str {
        &self.attribute
    }

    fn set_attribute(&mut self, attribute: &str) {
        self.attribute = attribute.to_string();
    }

    fn serialize(&self, _ctx: &SiContext, bin: &mut BinaryTable) -> Result<()> {
        bin.clear();
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut payload = self.fixed_part();
        let mut info_length = 0usize;

        for desc in &self.descs {
            let enc = desc.to_bytes();
            if FIXED_PART + enc.len() > MAX_LONG_PAYLOAD_SIZE {
                return Err(SiError::Overflow {
                    size: enc.len(),
                    limit: MAX_LONG_PAYLOAD_SIZE - FIXED_PART,
                });
            }
            if payload.len() + enc.len() > MAX_LONG_PAYLOAD_SIZE {
                Self::patch_program_info_length(&mut payload, info_length);
                payloads.push(std::mem::replace(&mut payload, self.fixed_part()));
                info_length = 0;
            }
            payload.extend_from_slice(&enc);
            info_length += enc.len();
        }
        Self::patch_program_info_length(&mut payload, info_length);

        for (&pid, stream) in &self.streams {
            let entry = Self::stream_entry(pid, stream);
            if FIXED_PART + entry.len() > MAX_LONG_PAYLOAD_SIZE {
                return Err(SiError::Overflow {
                    size: entry.len(),
                    limit: MAX_LONG_PAYLOAD_SIZE - FIXED_PART,
                });
            }
            if payload.len() + entry.len() > MAX_LONG_PAYLOAD_SIZE {
                payloads.push(std::mem::replace(&mut payload, self.fixed_part()));
            }
            payload.extend_from_slice(&entry);
        }
        payloads.push(payload);

        psi::emit_long_sections(
            bin,
            TID_PMT,
            false,
            self.service_id,
            self.version,
            self.current,
            &self.attribute,
            &payloads,
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Pmt::new(0, true, 0);
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_PMT])?;
        self.version = bin.version();
        self.current = bin.is_current();
        self.service_id = bin.table_id_extension();
        self.attribute = bin.attribute().to_string();
        for sec in sections {
            let mut buf = ByteBuffer::from_slice(sec.payload());
            buf.get_bits(3);
            self.pcr_pid = buf.get_bits(13) as u16;
            buf.get_bits(4);
            let info_length = buf.get_bits(12) as usize;
            let info = buf.get_bytes(info_length);
            if buf.read_error() {
                return Err(SiError::InvalidStructure("PMT program_info_length beyond section"));
            }
            for desc in &DescriptorList::from_bytes(TID_PMT, &info)? {
                self.descs.push(desc.clone());
            }
            while buf.remaining_bytes() > 0 {
                let stream_type = buf.get_u8();
                buf.get_bits(3);
                let pid = buf.get_bits(13) as u16;
                buf.get_bits(4);
                let es_length = buf.get_bits(12) as usize;
                let es_info = buf.get_bytes(es_length);
                if buf.read_error() {
                    return Err(SiError::InvalidStructure("PMT es_info_length beyond section"));
                }
                let mut stream = PmtStream::new(stream_type);
                stream.descs = DescriptorList::from_bytes(TID_PMT, &es_info)?;
                self.streams.insert(pid, stream);
            }
        }
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        elem.set_attr_hex16("service_id", self.service_id);
        elem.set_attr_hex16("pcr_pid", self.pcr_pid);
        psi::push_metadata(&mut elem, &self.attribute);
        self.descs.to_xml(ctx, &mut elem);
        for (&pid, stream) in &self.streams {
            let mut component = Element::new("component");
            component.set_attr_hex16("elementary_pid", pid);
            component.set_attr_hex8("stream_type", stream.stream_type);
            stream.descs.to_xml(ctx, &mut component);
            elem.push_child(component);
        }
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        *self = Pmt::new(0, true, 0);
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.service_id = elem.req_attr_u16("service_id")?;
        self.pcr_pid = elem.attr_u16("pcr_pid").unwrap_or(crate::constants::PID_NULL);
        self.descs = DescriptorList::from_xml_children(TID_PMT, elem, &["component"])?;
        for component in elem.children_named("component") {
            let pid = component.req_attr_u16("elementary_pid")?;
            let mut stream = PmtStream::new(component.req_attr_u8("stream_type")?);
            stream.descs = DescriptorList::from_xml_children(TID_PMT, component, &[])?;
            self.streams.insert(pid, stream);
        }
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "pmt",
        handles: |tid| tid == TID_PMT,
        new_boxed: || Box::<Pmt>::default(),
    });
}

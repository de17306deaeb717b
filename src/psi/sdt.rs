// psi/sdt.rs
//! Service Description Table (actual 0x42 / other 0x46): one entry per
//! service with its descriptor loop. A service entry is atomic across
//! sections.

use std::collections::BTreeMap;

use crate::buffer::ByteBuffer;
use crate::constants::{TID_SDT_ACTUAL, TID_SDT_OTHER};
use crate::context::SiContext;
use crate::desc::DescriptorList;
use crate::error::{Result, SiError};
use crate::psi::{self, PsiTable, TableFactory};
use crate::segment::Segmenter;
use crate::table::BinaryTable;
use crate::xml::Element;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdtService {
    pub eit_schedule: bool,
    pub eit_pf: bool,
    /// DVB running status, 3 bits.
    pub running_status: u8,
    /// True when access is controlled by a CA system.
    pub ca_mode: bool,
    pub descs: DescriptorList,
}

impl SdtService {
    pub fn new() -> SdtService {
        SdtService { descs: DescriptorList::new(TID_SDT_ACTUAL), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdt {
    /// Actual (0x42) vs other (0x46) transport stream.
    pub actual: bool,
    pub version: u8,
    pub current: bool,
    /// Serialized as the table id extension.
    pub ts_id: u16,
    pub original_network_id: u16,
    /// service_id → entry, in service order.
    pub services: BTreeMap<u16, SdtService>,
    valid: bool,
    attribute: String,
}

impl Default for Sdt {
    fn default() -> Self {
        Sdt::new(true, 0, true, 0, 0)
    }
}

impl Sdt {
    pub fn new(actual: bool, version: u8, current: bool, ts_id: u16, original_network_id: u16) -> Sdt {
        Sdt {
            actual,
            version,
            current,
            ts_id,
            original_network_id,
            services: BTreeMap::new(),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Sdt {
        psi::from_binary(ctx, bin)
    }

    fn service_entry(service_id: u16, service: &SdtService) -> Vec<u8> {
        let descs = service.descs.to_bytes();
        let mut buf = ByteBuffer::with_capacity(5 + descs.len());
        buf.put_u16(service_id);
        buf.put_bits(0b111111, 6);
        buf.put_bits(service.eit_schedule as u64, 1);
        buf.put_bits(service.eit_pf as u64, 1);
        buf.put_bits(service.running_status as u64 & 0x07, 3);
        buf.put_bits(service.ca_mode as u64, 1);
        buf.put_bits(descs.len() as u64, 12);
        buf.put_bytes(&descs);
        buf.into_bytes()
    }
}

impl PsiTable for Sdt {
    fn table_id(&self) -> u8 {
        if self.actual { TID_SDT_ACTUAL } else { TID_SDT_OTHER }
    }

    fn name(&self) -> &'static str {
        "sdt"
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
        let onid = self.original_network_id.to_be_bytes();
        let mut seg = Segmenter::with_preamble(vec![onid[0], onid[1], 0xFF]);
        for (&service_id, service) in &self.services {
            seg.add_record(&Self::service_entry(service_id, service))?;
        }
        psi::emit_long_sections(
            bin,
            self.table_id(),
            true,
            self.ts_id,
            self.version,
            self.current,
            &self.attribute,
            &seg.finish(),
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Sdt::default();
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_SDT_ACTUAL, TID_SDT_OTHER])?;
        self.actual = bin.table_id() == TID_SDT_ACTUAL;
        self.version = bin.version();
        self.current = bin.is_current();
        self.ts_id = bin.table_id_extension();
        self.attribute = bin.attribute().to_string();
        for sec in sections {
            let mut buf = ByteBuffer::from_slice(sec.payload());
            self.original_network_id = buf.get_u16();
            buf.get_u8(); // reserved
            while buf.remaining_bytes() > 0 {
                let service_id = buf.get_u16();
                buf.get_bits(6);
                let mut service = SdtService::new();
                service.eit_schedule = buf.get_bits(1) != 0;
                service.eit_pf = buf.get_bits(1) != 0;
                service.running_status = buf.get_bits(3) as u8;
                service.ca_mode = buf.get_bits(1) != 0;
                let length = buf.get_bits(12) as usize;
                let descs = buf.get_bytes(length);
                if buf.read_error() {
                    return Err(SiError::InvalidStructure("SDT service loop beyond section"));
                }
                service.descs = DescriptorList::from_bytes(self.table_id(), &descs)?;
                self.services.insert(service_id, service);
            }
        }
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        elem.set_attr_hex16("transport_stream_id", self.ts_id);
        elem.set_attr_hex16("original_network_id", self.original_network_id);
        elem.set_attr_bool("actual", self.actual);
        psi::push_metadata(&mut elem, &self.attribute);
        for (&service_id, service) in &self.services {
            let mut child = Element::new("service");
            child.set_attr_hex16("service_id", service_id);
            child.set_attr_bool("eit_schedule", service.eit_schedule);
            child.set_attr_bool("eit_present_following", service.eit_pf);
            child.set_attr_dec("running_status", service.running_status as u64);
            child.set_attr_bool("ca_mode", service.ca_mode);
            service.descs.to_xml(ctx, &mut child);
            elem.push_child(child);
        }
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        *self = Sdt::default();
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.ts_id = elem.req_attr_u16("transport_stream_id")?;
        self.original_network_id = elem.req_attr_u16("original_network_id")?;
        self.actual = elem.attr_bool("actual").unwrap_or(true);
        for child in elem.children() {
            match child.name_lower().as_str() {
                "metadata" => {}
                "service" => {
                    let service_id = child.req_attr_u16("service_id")?;
                    let mut service = SdtService::new();
                    service.eit_schedule = child.attr_bool("eit_schedule").unwrap_or(false);
                    service.eit_pf = child.attr_bool("eit_present_following").unwrap_or(false);
                    service.running_status = child.attr_u8("running_status").unwrap_or(0) & 0x07;
                    service.ca_mode = child.attr_bool("ca_mode").unwrap_or(false);
                    service.descs =
                        DescriptorList::from_xml_children(self.table_id(), child, &[])?;
                    self.services.insert(service_id, service);
                }
                _ => return Err(SiError::UnknownElement(child.name().to_string())),
            }
        }
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "sdt",
        handles: |tid| tid == TID_SDT_ACTUAL || tid == TID_SDT_OTHER,
        new_boxed: || Box::<Sdt>::default(),
    });
}

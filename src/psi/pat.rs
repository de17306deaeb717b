// psi/pat.rs
//! Program Association Table: program_number to PMT PID, plus the NIT PID
//! carried as program 0.

use std::collections::BTreeMap;

use crate::constants::{PID_NIT, PID_NULL, TID_PAT};
use crate::context::SiContext;
use crate::error::{Result, SiError};
use crate::psi::{self, PsiTable, TableFactory};
use crate::segment::Segmenter;
use crate::table::BinaryTable;
use crate::xml::Element;

/// One PID per program, 8191 assignable PIDs.
const MAX_PROGRAMS: usize = 8191;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub version: u8,
    pub current: bool,
    pub ts_id: u16,
    /// PID of the NIT (program_number 0); `PID_NULL` when absent.
    pub nit_pid: u16,
    /// program_number → PMT PID, in program order.
    pub pmts: BTreeMap<u16, u16>,
    valid: bool,
    attribute: String,
}

impl Default for Pat {
    fn default() -> Self {
        Pat::new(0, true, 0)
    }
}

impl Pat {
    pub fn new(version: u8, current: bool, ts_id: u16) -> Pat {
        Pat {
            version,
            current,
            ts_id,
            nit_pid: PID_NIT,
            pmts: BTreeMap::new(),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Pat {
        psi::from_binary(ctx, bin)
    }

    fn program_record(program_number: u16, pid: u16) -> [u8; 4] {
        let pn = program_number.to_be_bytes();
        [pn[0], pn[1], 0xE0 | (pid >> 8) as u8, pid as u8]
    }
}

impl PsiTable for Pat {
    fn table_id(&self) -> u8 {
        TID_PAT
    }

    fn name(&self) -> &'static str {
        "pat"
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
        if self.pmts.len() > MAX_PROGRAMS {
            return Err(SiError::InvalidStructure("more than 8191 programs in a PAT"));
        }
        let mut seg = Segmenter::new();
        if self.nit_pid != PID_NULL {
            seg.add_record(&Self::program_record(0, self.nit_pid))?;
        }
        for (&program_number, &pid) in &self.pmts {
            seg.add_record(&Self::program_record(program_number, pid))?;
        }
        psi::emit_long_sections(
            bin,
            TID_PAT,
            false,
            self.ts_id,
            self.version,
            self.current,
            &self.attribute,
            &seg.finish(),
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Pat::new(0, true, 0);
        self.valid = false;
        self.nit_pid = PID_NULL;
        let sections = psi::checked_sections(bin, &[TID_PAT])?;
        self.version = bin.version();
        self.current = bin.is_current();
        self.ts_id = bin.table_id_extension();
        self.attribute = bin.attribute().to_string();
        for sec in sections {
            let payload = sec.payload();
            if payload.len() % 4 != 0 {
                return Err(SiError::InvalidStructure("PAT payload is not 4-byte records"));
            }
            for rec in payload.chunks_exact(4) {
                let program_number = u16::from_be_bytes([rec[0], rec[1]]);
                let pid = ((rec[2] as u16 & 0x1F) << 8) | rec[3] as u16;
                if program_number == 0 {
                    self.nit_pid = pid;
                } else {
                    self.pmts.insert(program_number, pid);
                }
            }
        }
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, _ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        elem.set_attr_hex16("transport_stream_id", self.ts_id);
        if self.nit_pid != PID_NULL {
            elem.set_attr_hex16("network_pid", self.nit_pid);
        }
        psi::push_metadata(&mut elem, &self.attribute);
        for (&program_number, &pid) in &self.pmts {
            let mut service = Element::new("service");
            service.set_attr_hex16("service_id", program_number);
            service.set_attr_hex16("program_map_pid", pid);
            elem.push_child(service);
        }
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        *self = Pat::new(0, true, 0);
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.ts_id = elem.req_attr_u16("transport_stream_id")?;
        self.nit_pid = elem.attr_u16("network_pid").unwrap_or(PID_NULL);
        for child in elem.children() {
            match child.name_lower().as_str() {
                "metadata" => {}
                "service" => {
                    let program_number = child.req_attr_u16("service_id")?;
                    let pid = child.req_attr_u16("program_map_pid")?;
                    self.pmts.insert(program_number, pid);
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
        name: "pat",
        handles: |tid| tid == TID_PAT,
        new_boxed: || Box::<Pat>::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_round_trip() {
        let ctx = SiContext::default();
        let mut pat = Pat::new(7, true, 0x1234);
        pat.pmts.insert(0x0101, 0x0234);
        pat.pmts.insert(0x0102, 0x0235);
        let mut bin = BinaryTable::new();
        pat.serialize(&ctx, &mut bin).unwrap();
        assert!(bin.is_valid());
        assert_eq!(bin.table_id(), TID_PAT);
        assert_eq!(bin.table_id_extension(), 0x1234);
        assert_eq!(bin.section_count(), 1);
        // NIT entry + 2 programs
        assert_eq!(bin.section_at(0).unwrap().payload_size(), 12);

        let back = Pat::from_binary(&ctx, &bin);
        assert!(back.is_valid());
        assert_eq!(back, pat);
    }

    #[test]
    fn test_two_section_split() {
        let ctx = SiContext::default();
        let mut pat = Pat::new(7, true, 0x1234);
        // 303 programs + the NIT record: 304 records, 253 fit per section
        for srv in 3u16..306 {
            pat.pmts.insert(srv, srv + 2);
        }
        let mut bin = BinaryTable::new();
        pat.serialize(&ctx, &mut bin).unwrap();
        assert_eq!(bin.section_count(), 2);
        assert_eq!(bin.section_at(0).unwrap().payload_size(), 1012);
        assert_eq!(bin.section_at(1).unwrap().payload_size(), 304 * 4 - 1012);

        let back = Pat::from_binary(&ctx, &bin);
        assert_eq!(back.nit_pid, PID_NIT);
        assert_eq!(back.pmts, pat.pmts);
    }

    #[test]
    fn test_wrong_table_id() {
        let ctx = SiContext::default();
        let mut cat = crate::psi::Cat::default();
        let mut bin = BinaryTable::new();
        cat.serialize(&ctx, &mut bin).unwrap();
        let pat = Pat::from_binary(&ctx, &bin);
        assert!(!pat.is_valid());
    }

    #[test]
    fn test_xml_round_trip() {
        let ctx = SiContext::default();
        let mut pat = Pat::new(3, false, 0x0042);
        pat.pmts.insert(1, 0x1000);
        let elem = pat.to_xml(&ctx);
        assert_eq!(elem.name(), "pat");
        let mut back = Pat::default();
        back.from_xml(&ctx, &elem).unwrap();
        assert_eq!(back, pat);
    }
}

// psi/tdt.rs
//! Time and Date Table (0x70): a short section carrying one MJD+BCD UTC
//! instant, no CRC.

use chrono::NaiveDateTime;

use crate::buffer::ByteBuffer;
use crate::constants::TID_TDT;
use crate::context::SiContext;
use crate::error::{Result, SiError};
use crate::psi::{self, PsiTable, TableFactory};
use crate::table::BinaryTable;
use crate::time;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tdt {
    pub utc_time: NaiveDateTime,
    valid: bool,
    attribute: String,
}

impl Default for Tdt {
    fn default() -> Self {
        Tdt::new(NaiveDateTime::UNIX_EPOCH)
    }
}

impl Tdt {
    pub fn new(utc_time: NaiveDateTime) -> Tdt {
        Tdt { utc_time, valid: true, attribute: String::new() }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Tdt {
        psi::from_binary(ctx, bin)
    }
}

impl PsiTable for Tdt {
    fn table_id(&self) -> u8 {
        TID_TDT
    }

    fn name(&self) -> &'static str {
        "tdt"
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
        let mut buf = ByteBuffer::with_capacity(5);
        time::put_utc(&mut buf, &self.utc_time);
        psi::emit_short_section(bin, TID_TDT, true, &self.attribute, buf.bytes())
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Tdt::default();
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_TDT])?;
        self.attribute = bin.attribute().to_string();
        let mut buf = ByteBuffer::from_slice(sections[0].payload());
        self.utc_time = time::get_utc(&mut buf)
            .ok_or(SiError::InvalidStructure("TDT time out of range"))?;
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, _ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr("utc_time", &self.utc_time.format("%Y-%m-%d %H:%M:%S").to_string());
        psi::push_metadata(&mut elem, &self.attribute);
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        let text = elem
            .attr("utc_time")
            .ok_or_else(|| SiError::Xml("<tdt>: missing attribute 'utc_time'".to_string()))?;
        let utc_time = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| SiError::Xml(format!("<tdt>: bad utc_time '{text}'")))?;
        *self = Tdt::new(utc_time);
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "tdt",
        handles: |tid| tid == TID_TDT,
        new_boxed: || Box::<Tdt>::default(),
    });
}

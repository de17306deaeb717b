// psi/cat.rs
//! Conditional Access Table: a bare descriptor loop on PID 1. The table
//! id extension carries no semantics and is emitted as 0xFFFF.

use crate::constants::TID_CAT;
use crate::context::SiContext;
use crate::desc::DescriptorList;
use crate::error::Result;
use crate::psi::{self, PsiTable, TableFactory};
use crate::segment::Segmenter;
use crate::table::BinaryTable;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cat {
    pub version: u8,
    pub current: bool,
    pub descs: DescriptorList,
    valid: bool,
    attribute: String,
}

impl Default for Cat {
    fn default() -> Self {
        Cat::new(0, true)
    }
}

impl Cat {
    pub fn new(version: u8, current: bool) -> Cat {
        Cat {
            version,
            current,
            descs: DescriptorList::new(TID_CAT),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Cat {
        psi::from_binary(ctx, bin)
    }

    pub fn is_private(&self) -> bool {
        false
    }
}

impl PsiTable for Cat {
    fn table_id(&self) -> u8 {
        TID_CAT
    }

    fn name(&self) -> &'static str {
        "cat"
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
        // descriptors are atomic, the loop itself splits freely
        let mut seg = Segmenter::new();
        for desc in &self.descs {
            seg.add_record(&desc.to_bytes())?;
        }
        psi::emit_long_sections(
            bin,
            TID_CAT,
            false,
            0xFFFF,
            self.version,
            self.current,
            &self.attribute,
            &seg.finish(),
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Cat::new(0, true);
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_CAT])?;
        self.version = bin.version();
        self.current = bin.is_current();
        self.attribute = bin.attribute().to_string();
        for sec in sections {
            let part = DescriptorList::from_bytes(TID_CAT, sec.payload())?;
            for desc in &part {
                self.descs.push(desc.clone());
            }
        }
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        psi::push_metadata(&mut elem, &self.attribute);
        self.descs.to_xml(ctx, &mut elem);
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        *self = Cat::new(0, true);
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.descs = DescriptorList::from_xml_children(TID_CAT, elem, &[])?;
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "cat",
        handles: |tid| tid == TID_CAT,
        new_boxed: || Box::<Cat>::default(),
    });
}

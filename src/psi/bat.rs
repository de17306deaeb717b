// psi/bat.rs
//! Bouquet Association Table (0x4A): bouquet descriptors plus one
//! descriptor loop per transport stream, same two-loop body as the NIT.

use std::collections::BTreeMap;

use crate::constants::TID_BAT;
use crate::context::SiContext;
use crate::desc::DescriptorList;
use crate::error::Result;
use crate::psi::transport_list::{self, TransportKey};
use crate::psi::{self, PsiTable, TableFactory};
use crate::table::BinaryTable;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bat {
    pub version: u8,
    pub current: bool,
    /// Serialized as the table id extension.
    pub bouquet_id: u16,
    pub descs: DescriptorList,
    /// (ts_id, original_network_id) → transport descriptors, in key order.
    pub transports: BTreeMap<TransportKey, DescriptorList>,
    valid: bool,
    attribute: String,
}

impl Default for Bat {
    fn default() -> Self {
        Bat::new(0, true, 0)
    }
}

impl Bat {
    pub fn new(version: u8, current: bool, bouquet_id: u16) -> Bat {
        Bat {
            version,
            current,
            bouquet_id,
            descs: DescriptorList::new(TID_BAT),
            transports: BTreeMap::new(),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Bat {
        psi::from_binary(ctx, bin)
    }
}

impl PsiTable for Bat {
    fn table_id(&self) -> u8 {
        TID_BAT
    }

    fn name(&self) -> &'static str {
        "bat"
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
        let payloads = transport_list::serialize_body(&self.descs, &self.transports)?;
        psi::emit_long_sections(
            bin,
            TID_BAT,
            true,
            self.bouquet_id,
            self.version,
            self.current,
            &self.attribute,
            &payloads,
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Bat::default();
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_BAT])?;
        self.version = bin.version();
        self.current = bin.is_current();
        self.bouquet_id = bin.table_id_extension();
        self.attribute = bin.attribute().to_string();
        let (descs, transports) = transport_list::deserialize_body(TID_BAT, &sections)?;
        self.descs = descs;
        self.transports = transports;
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        elem.set_attr_hex16("bouquet_id", self.bouquet_id);
        psi::push_metadata(&mut elem, &self.attribute);
        self.descs.to_xml(ctx, &mut elem);
        for (&(ts_id, onid), descs) in &self.transports {
            let mut child = Element::new("transport_stream");
            child.set_attr_hex16("transport_stream_id", ts_id);
            child.set_attr_hex16("original_network_id", onid);
            descs.to_xml(ctx, &mut child);
            elem.push_child(child);
        }
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        *self = Bat::default();
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.bouquet_id = elem.req_attr_u16("bouquet_id")?;
        self.descs = DescriptorList::from_xml_children(TID_BAT, elem, &["transport_stream"])?;
        for child in elem.children_named("transport_stream") {
            let ts_id = child.req_attr_u16("transport_stream_id")?;
            let onid = child.req_attr_u16("original_network_id")?;
            let descs = DescriptorList::from_xml_children(TID_BAT, child, &[])?;
            self.transports.insert((ts_id, onid), descs);
        }
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "bat",
        handles: |tid| tid == TID_BAT,
        new_boxed: || Box::<Bat>::default(),
    });
}

// psi/nit.rs
//! Network Information Table (actual 0x40 / other 0x41): network-level
//! descriptors and one descriptor loop per transport stream.

use std::collections::BTreeMap;

use crate::constants::{TID_NIT_ACTUAL, TID_NIT_OTHER};
use crate::context::SiContext;
use crate::desc::DescriptorList;
use crate::error::Result;
use crate::psi::transport_list::{self, TransportKey};
use crate::psi::{self, PsiTable, TableFactory};
use crate::table::BinaryTable;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nit {
    /// Actual (0x40) vs other (0x41) network.
    pub actual: bool,
    pub version: u8,
    pub current: bool,
    /// Serialized as the table id extension.
    pub network_id: u16,
    pub descs: DescriptorList,
    /// (ts_id, original_network_id) → transport descriptors, in key order.
    pub transports: BTreeMap<TransportKey, DescriptorList>,
    valid: bool,
    attribute: String,
}

impl Default for Nit {
    fn default() -> Self {
        Nit::new(true, 0, true, 0)
    }
}

impl Nit {
    pub fn new(actual: bool, version: u8, current: bool, network_id: u16) -> Nit {
        Nit {
            actual,
            version,
            current,
            network_id,
            descs: DescriptorList::new(TID_NIT_ACTUAL),
            transports: BTreeMap::new(),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Nit {
        psi::from_binary(ctx, bin)
    }
}

impl PsiTable for Nit {
    fn table_id(&self) -> u8 {
        if self.actual { TID_NIT_ACTUAL } else { TID_NIT_OTHER }
    }

    fn name(&self) -> &'static str {
        "nit"
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
            self.table_id(),
            true,
            self.network_id,
            self.version,
            self.current,
            &self.attribute,
            &payloads,
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Nit::default();
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_NIT_ACTUAL, TID_NIT_OTHER])?;
        self.actual = bin.table_id() == TID_NIT_ACTUAL;
        self.version = bin.version();
        self.current = bin.is_current();
        self.network_id = bin.table_id_extension();
        self.attribute = bin.attribute().to_string();
        let (descs, transports) = transport_list::deserialize_body(self.table_id(), &sections)?;
        self.descs = descs;
        self.transports = transports;
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        elem.set_attr_hex16("network_id", self.network_id);
        elem.set_attr_bool("actual", self.actual);
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
        *self = Nit::default();
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.network_id = elem.req_attr_u16("network_id")?;
        self.actual = elem.attr_bool("actual").unwrap_or(true);
        self.descs =
            DescriptorList::from_xml_children(self.table_id(), elem, &["transport_stream"])?;
        for child in elem.children_named("transport_stream") {
            let ts_id = child.req_attr_u16("transport_stream_id")?;
            let onid = child.req_attr_u16("original_network_id")?;
            let descs = DescriptorList::from_xml_children(self.table_id(), child, &[])?;
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
        name: "nit",
        handles: |tid| tid == TID_NIT_ACTUAL || tid == TID_NIT_OTHER,
        new_boxed: || Box::<Nit>::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::Descriptor;

    #[test]
    fn test_round_trip() {
        let ctx = SiContext::default();
        let mut nit = Nit::new(true, 2, true, 0x3001);
        nit.descs.push(Descriptor::new(0x40, b"Network".to_vec()).unwrap());
        let mut tdescs = DescriptorList::new(TID_NIT_ACTUAL);
        tdescs.push(Descriptor::new(0x41, vec![0x01, 0x01, 0x01]).unwrap());
        nit.transports.insert((0x0044, 0x2014), tdescs);

        let mut bin = BinaryTable::new();
        nit.serialize(&ctx, &mut bin).unwrap();
        assert_eq!(bin.table_id(), TID_NIT_ACTUAL);
        assert_eq!(bin.table_id_extension(), 0x3001);

        let back = Nit::from_binary(&ctx, &bin);
        assert!(back.is_valid());
        assert_eq!(back, nit);
    }

    #[test]
    fn test_xml_round_trip() {
        let ctx = SiContext::default();
        let mut nit = Nit::new(false, 1, false, 0x00FF);
        nit.transports.insert((1, 2), DescriptorList::new(TID_NIT_OTHER));
        let elem = nit.to_xml(&ctx);
        assert_eq!(elem.name(), "nit");
        let mut back = Nit::default();
        back.from_xml(&ctx, &elem).unwrap();
        assert_eq!(back, nit);
    }
}

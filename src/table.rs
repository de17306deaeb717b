// table.rs
//! Ordered set of sections forming one logical table instance.

use crate::context::SiContext;
use crate::error::{Result, SiError};
use crate::section::Section;
use crate::xml::Element;

/// Outcome of [`BinaryTable::add_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Section stored (or silently dropped as a byte-identical repeat).
    Added,
    /// The slot for this section_number holds different content.
    DuplicateSlot,
    /// (table_id, extension, version, current) disagree with the set.
    Conflict,
    /// This section completed the table.
    Completed,
}

/// A long table owns `last_section_number + 1` slots, filled as sections
/// arrive in any order; a short table owns exactly one. The table is valid
/// once every slot is filled with a valid section, and stays queryable
/// while still partial.
#[derive(Clone, Default)]
pub struct BinaryTable {
    sections: Vec<Option<Section>>,
    attribute: String,
}

impl BinaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from complete, already-ordered sections.
    pub fn from_sections(sections: Vec<Section>) -> Result<BinaryTable> {
        let mut table = BinaryTable::new();
        for sec in sections {
            match table.add_section(sec) {
                AddResult::Added | AddResult::Completed => {}
                AddResult::Conflict => {
                    return Err(SiError::InvalidStructure("sections belong to different tables"))
                }
                AddResult::DuplicateSlot => {
                    return Err(SiError::InvalidStructure("conflicting duplicate section"))
                }
            }
        }
        Ok(table)
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.attribute.clear();
    }

    pub fn add_section(&mut self, section: Section) -> AddResult {
        let index = section.section_number() as usize;
        match self.first_section() {
            None => {
                let slots = if section.is_long_section() {
                    section.last_section_number() as usize + 1
                } else {
                    1
                };
                self.sections = vec![None; slots];
                self.sections[index] = Some(section);
                if self.missing() == 0 { AddResult::Completed } else { AddResult::Added }
            }
            Some(first) => {
                if section.table_id() != first.table_id()
                    || section.is_long_section() != first.is_long_section()
                    || (section.is_long_section()
                        && (section.table_id_extension() != first.table_id_extension()
                            || section.version() != first.version()
                            || section.is_current() != first.is_current()
                            || section.last_section_number() != first.last_section_number()))
                {
                    return AddResult::Conflict;
                }
                match &self.sections[index] {
                    Some(existing) if *existing == section => AddResult::Added,
                    Some(_) => AddResult::DuplicateSlot,
                    None => {
                        self.sections[index] = Some(section);
                        if self.missing() == 0 { AddResult::Completed } else { AddResult::Added }
                    }
                }
            }
        }
    }

    fn first_section(&self) -> Option<&Section> {
        self.sections.iter().flatten().next()
    }

    fn missing(&self) -> usize {
        self.sections.iter().filter(|s| s.is_none()).count()
    }

    /* ── accessors ── */

    /// Table id, or 0xFF while the table is still empty.
    pub fn table_id(&self) -> u8 {
        self.first_section().map_or(0xFF, Section::table_id)
    }

    /// Table id extension; 0xFFFF for short-section tables and tables whose
    /// extension field carries no semantic value.
    pub fn table_id_extension(&self) -> u16 {
        self.first_section().map_or(0xFFFF, Section::table_id_extension)
    }

    pub fn version(&self) -> u8 {
        self.first_section().map_or(0, Section::version)
    }

    pub fn is_current(&self) -> bool {
        self.first_section().is_none_or(Section::is_current)
    }

    pub fn is_short_section(&self) -> bool {
        self.first_section().is_some_and(Section::is_short_section)
    }

    pub fn is_long_section(&self) -> bool {
        self.first_section().is_some_and(Section::is_long_section)
    }

    /// Complete and consistent: every slot filled, every section valid.
    pub fn is_valid(&self) -> bool {
        !self.sections.is_empty()
            && self.sections.iter().all(|s| s.as_ref().is_some_and(Section::is_valid))
    }

    /// Number of section slots (`last_section_number + 1` for long tables).
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section_at(&self, index: usize) -> Option<&Section> {
        self.sections.get(index).and_then(Option::as_ref)
    }

    /// Sections present so far, in section_number order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().flatten()
    }

    /// Total encoded size of the sections present.
    pub fn binary_size(&self) -> usize {
        self.sections().map(Section::size).sum()
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Sets the annotation on the table and every section it holds.
    pub fn set_attribute(&mut self, attribute: &str) {
        self.attribute = attribute.to_string();
        for sec in self.sections.iter_mut().flatten() {
            sec.set_attribute(attribute);
        }
    }

    /* ── XML ── */

    /// Emits the table as XML: through its typed form when the table id is
    /// registered, or as a `generic_short_table` / `generic_long_table`
    /// hex dump when unknown or when `force_generic` is set.
    pub fn to_xml(&self, ctx: &SiContext, force_generic: bool) -> Element {
        if !force_generic {
            if let Some(elem) = crate::psi::binary_to_xml(ctx, self) {
                return elem;
            }
        }
        self.to_xml_generic()
    }

    fn to_xml_generic(&self) -> Element {
        let mut elem;
        if self.is_short_section() {
            elem = Element::new("generic_short_table");
            elem.set_attr_hex8("table_id", self.table_id());
            elem.set_attr_bool("private", self.first_section().is_some_and(Section::is_private_section));
            self.push_metadata(&mut elem);
            if let Some(sec) = self.section_at(0) {
                elem.set_hex_text(sec.payload());
            }
        } else {
            elem = Element::new("generic_long_table");
            elem.set_attr_hex8("table_id", self.table_id());
            elem.set_attr_hex16("table_id_ext", self.table_id_extension());
            elem.set_attr_dec("version", self.version() as u64);
            elem.set_attr_bool("current", self.is_current());
            elem.set_attr_bool("private", self.first_section().is_some_and(Section::is_private_section));
            self.push_metadata(&mut elem);
            for sec in self.sections() {
                let mut child = Element::new("section");
                child.set_hex_text(sec.payload());
                elem.push_child(child);
            }
        }
        elem
    }

    fn push_metadata(&self, elem: &mut Element) {
        if !self.attribute.is_empty() {
            let mut meta = Element::new("metadata");
            meta.set_attr("attribute", &self.attribute);
            elem.push_child(meta);
        }
    }

    /// Builds a table from an XML element: the generic forms are handled
    /// here, any other element name is resolved through the table factory
    /// registry. Unknown names fail with [`SiError::UnknownElement`].
    pub fn from_xml(ctx: &SiContext, elem: &Element) -> Result<BinaryTable> {
        let mut table = match elem.name_lower().as_str() {
            "generic_short_table" => Self::generic_short_from_xml(elem)?,
            "generic_long_table" => Self::generic_long_from_xml(elem)?,
            _ => crate::psi::table_from_xml(ctx, elem)?,
        };
        if let Some(attr) = metadata_attribute(elem) {
            table.set_attribute(&attr);
        }
        Ok(table)
    }

    fn generic_short_from_xml(elem: &Element) -> Result<BinaryTable> {
        let table_id = elem.req_attr_u8("table_id")?;
        let private = elem.attr_bool("private").unwrap_or(true);
        let payload = elem.hex_text()?;
        let mut table = BinaryTable::new();
        table.add_section(Section::short(table_id, private, &payload)?);
        Ok(table)
    }

    fn generic_long_from_xml(elem: &Element) -> Result<BinaryTable> {
        let table_id = elem.req_attr_u8("table_id")?;
        let table_id_ext = elem.attr_u16("table_id_ext").unwrap_or(0xFFFF);
        let version = elem.attr_u8("version").unwrap_or(0);
        let current = elem.attr_bool("current").unwrap_or(true);
        let private = elem.attr_bool("private").unwrap_or(true);
        let payloads: Vec<Vec<u8>> = elem
            .children_named("section")
            .map(Element::hex_text)
            .collect::<Result<_>>()?;
        if payloads.is_empty() {
            return Err(SiError::InvalidStructure("generic_long_table without <section> children"));
        }
        let last = (payloads.len() - 1) as u8;
        let mut table = BinaryTable::new();
        for (i, payload) in payloads.iter().enumerate() {
            table.add_section(Section::long(
                table_id,
                private,
                table_id_ext,
                version,
                current,
                i as u8,
                last,
                payload,
            )?);
        }
        Ok(table)
    }
}

/// Reads the free-form annotation of an optional `<metadata>` first child.
pub(crate) fn metadata_attribute(elem: &Element) -> Option<String> {
    elem.children_named("metadata")
        .next()
        .and_then(|m| m.attr("attribute"))
}

impl PartialEq for BinaryTable {
    fn eq(&self, other: &Self) -> bool {
        self.sections == other.sections
    }
}

impl Eq for BinaryTable {}

impl std::fmt::Debug for BinaryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryTable")
            .field("table_id", &format_args!("0x{:02X}", self.table_id()))
            .field("table_id_extension", &format_args!("0x{:04X}", self.table_id_extension()))
            .field("version", &self.version())
            .field("sections", &self.section_count())
            .field("valid", &self.is_valid())
            .finish()
    }
}

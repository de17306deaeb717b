// section_file.rs
//! Aggregate of complete tables plus not-yet-assembled orphan sections,
//! loadable and savable in binary, XML and JSON form.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::constants::TID_NULL;
use crate::context::{CrcPolicy, SiContext};
use crate::error::{Result, SiError};
use crate::section::Section;
use crate::table::BinaryTable;
use crate::xml::{self, Element};

/// Root element of the XML/JSON editable form.
const ROOT_ELEMENT: &str = "tsduck";

/// Holds tables in insertion order. Long sections fed one by one
/// accumulate among the orphans until their table completes, at which
/// point the set is promoted to a table; a version change on the same
/// table identity discards the stale accumulation.
#[derive(Default)]
pub struct SectionFile {
    ctx: SiContext,
    tables: Vec<BinaryTable>,
    orphans: Vec<Section>,
    crc_override: Option<CrcPolicy>,
}

impl SectionFile {
    pub fn new(ctx: SiContext) -> SectionFile {
        SectionFile { ctx, ..Default::default() }
    }

    pub fn context(&self) -> &SiContext {
        &self.ctx
    }

    /// Forces one CRC policy for every load; without it files are
    /// checked and in-memory buffers accepted as-is.
    pub fn set_crc_validation(&mut self, policy: CrcPolicy) {
        self.crc_override = Some(policy);
    }

    fn policy(&self, default: CrcPolicy) -> CrcPolicy {
        self.crc_override.unwrap_or(default)
    }

    /* ── content ── */

    pub fn tables(&self) -> &[BinaryTable] {
        &self.tables
    }

    pub fn tables_count(&self) -> usize {
        self.tables.len()
    }

    pub fn orphan_sections(&self) -> &[Section] {
        &self.orphans
    }

    /// Every section of every table, then the orphans.
    pub fn sections(&self) -> Vec<&Section> {
        let mut out: Vec<&Section> = Vec::new();
        for table in &self.tables {
            out.extend(table.sections());
        }
        out.extend(self.orphans.iter());
        out
    }

    pub fn sections_count(&self) -> usize {
        self.sections().len()
    }

    /// Total encoded size of all sections, orphans included.
    pub fn binary_size(&self) -> usize {
        self.sections().iter().map(|s| s.size()).sum()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.orphans.clear();
    }

    /// Appends a complete table.
    pub fn add_table(&mut self, table: BinaryTable) -> Result<()> {
        if !table.is_valid() {
            return Err(SiError::IncompleteTable);
        }
        self.tables.push(table);
        Ok(())
    }

    /// Routes one section: short sections become single-section tables at
    /// once, long sections accumulate among the orphans until their table
    /// is complete. Byte-identical repeats of pending orphans are dropped.
    pub fn add_section(&mut self, section: Section) {
        if section.is_short_section() {
            let mut table = BinaryTable::new();
            table.add_section(section);
            self.tables.push(table);
            return;
        }
        if self.orphans.contains(&section) {
            return;
        }
        // a version rollover obsoletes the pending accumulation
        self.orphans.retain(|o| {
            o.table_id() != section.table_id()
                || o.table_id_extension() != section.table_id_extension()
                || (o.version() == section.version() && o.is_current() == section.is_current())
        });
        self.orphans.push(section);
        self.try_assemble();
    }

    /// Promotes the newest orphan's table if all its sections are pending.
    fn try_assemble(&mut self) {
        let newest = self.orphans.last().unwrap();
        let key = (
            newest.table_id(),
            newest.table_id_extension(),
            newest.version(),
            newest.is_current(),
            newest.last_section_number(),
        );
        let matching: Vec<usize> = self
            .orphans
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                (o.table_id(), o.table_id_extension(), o.version(), o.is_current(), o.last_section_number())
                    == key
            })
            .map(|(i, _)| i)
            .collect();
        let needed = key.4 as usize + 1;
        let mut by_number = vec![None; needed];
        for &i in &matching {
            by_number[self.orphans[i].section_number() as usize].get_or_insert(i);
        }
        if by_number.iter().any(Option::is_none) {
            return;
        }
        let picked: Vec<usize> = by_number.into_iter().flatten().collect();
        let mut table = BinaryTable::new();
        for &i in &picked {
            table.add_section(self.orphans[i].clone());
        }
        debug_assert!(table.is_valid());
        let mut i = 0;
        self.orphans.retain(|_| {
            let drop = picked.contains(&i);
            i += 1;
            !drop
        });
        self.tables.push(table);
    }

    /* ── binary form ── */

    /// Parses consecutive sections from `data[offset .. offset + len]`.
    /// Padding (a 0xFF table id) ends the stream; the first malformed
    /// section aborts the load with an error, keeping what was read.
    pub fn load_buffer(&mut self, data: &[u8], offset: usize, len: usize) -> Result<()> {
        if offset + len > data.len() {
            return Err(SiError::InvalidLength { expected: offset + len, actual: data.len() });
        }
        self.load_sections(&data[offset..offset + len], self.policy(CrcPolicy::Ignore))
    }

    /// Loads a whole binary section file; CRC policy defaults to `Check`.
    pub fn load_binary<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let data = fs::read(path)?;
        self.load_sections(&data, self.policy(CrcPolicy::Check))
    }

    /// Reads a binary section stream to EOF; CRC policy defaults to
    /// `Check`.
    pub fn load_binary_reader<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.load_sections(&data, self.policy(CrcPolicy::Check))
    }

    fn load_sections(&mut self, mut data: &[u8], policy: CrcPolicy) -> Result<()> {
        while !data.is_empty() && data[0] != TID_NULL {
            let (section, used) = Section::parse(data, policy)?;
            self.add_section(section);
            data = &data[used..];
        }
        Ok(())
    }

    /// Appends every section back-to-back, tables first then orphans, and
    /// returns the number of bytes written. Existing content of `out` is
    /// preserved, so callers can reserve a prefix.
    pub fn save_buffer(&self, out: &mut Vec<u8>) -> usize {
        let mut written = 0;
        for section in self.sections() {
            out.extend_from_slice(section.as_bytes());
            written += section.size();
        }
        written
    }

    /// Fills `out` with as many complete sections as fit, returning their
    /// total size.
    pub fn save_buffer_slice(&self, out: &mut [u8]) -> usize {
        let mut written = 0;
        for section in self.sections() {
            if written + section.size() > out.len() {
                break;
            }
            out[written..written + section.size()].copy_from_slice(section.as_bytes());
            written += section.size();
        }
        written
    }

    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut data = Vec::with_capacity(self.binary_size());
        self.save_buffer(&mut data);
        fs::write(path, data)?;
        Ok(())
    }

    pub fn save_binary_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        for section in self.sections() {
            writer.write_all(section.as_bytes())?;
        }
        Ok(())
    }

    /* ── XML form ── */

    /// Parses a whole XML document. Tables that do parse are kept even
    /// when a later sibling fails; the first failure is still returned.
    pub fn parse_xml(&mut self, text: &str) -> Result<()> {
        let root = xml::parse_document(text)?;
        self.take_root(&root)
    }

    pub fn load_xml<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let text = fs::read_to_string(path)?;
        self.parse_xml(&text)
    }

    fn take_root(&mut self, root: &Element) -> Result<()> {
        if !root.name().eq_ignore_ascii_case(ROOT_ELEMENT) {
            return Err(SiError::Xml(format!(
                "expected root <{ROOT_ELEMENT}>, found <{}>",
                root.name()
            )));
        }
        let mut first_error = None;
        for child in root.children() {
            match BinaryTable::from_xml(&self.ctx, child) {
                Ok(table) => self.tables.push(table),
                Err(e) => {
                    log::warn!("skipping <{}>: {e}", child.name());
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn to_root(&self) -> Element {
        let mut root = Element::new(ROOT_ELEMENT);
        for table in &self.tables {
            root.push_child(table.to_xml(&self.ctx, false));
        }
        if !self.orphans.is_empty() {
            log::warn!("{} orphan sections not representable in XML, skipped", self.orphans.len());
        }
        root
    }

    pub fn to_xml_string(&self) -> String {
        self.to_root().to_document_string()
    }

    pub fn save_xml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_xml_string())?;
        Ok(())
    }

    /* ── JSON form ── */

    pub fn parse_json(&mut self, text: &str) -> Result<()> {
        let root = xml::json::parse_document(text)?;
        self.take_root(&root)
    }

    pub fn load_json<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let text = fs::read_to_string(path)?;
        self.parse_json(&text)
    }

    pub fn to_json_string(&self) -> String {
        xml::json::to_document_string(&self.to_root())
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string())?;
        Ok(())
    }
}

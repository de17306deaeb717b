// psi/mod.rs
//! Typed PSI/SI tables and the factory registry tying them to XML element
//! names and table ids.

pub mod bat;
pub mod cat;
pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod tdt;
pub mod tot;
mod transport_list;

pub use bat::Bat;
pub use cat::Cat;
pub use eit::{Eit, EitEvent};
pub use nit::Nit;
pub use pat::Pat;
pub use pmt::{Pmt, PmtStream};
pub use sdt::{Sdt, SdtService};
pub use tdt::Tdt;
pub use tot::Tot;

use std::sync::LazyLock;

use crate::context::SiContext;
use crate::error::{Result, SiError};
use crate::section::Section;
use crate::table::BinaryTable;
use crate::xml::Element;

/// A structured table able to round-trip with [`BinaryTable`] and XML.
///
/// Wire parse failures are recorded, not thrown: [`from_binary`] returns
/// an instance whose `is_valid()` is false and logs the cause.
/// Serialization returns `Result` and leaves the destination table empty
/// on failure.
pub trait PsiTable {
    /// Canonical table id this instance serializes under.
    fn table_id(&self) -> u8;

    /// Lowercase XML element name.
    fn name(&self) -> &'static str;

    fn is_valid(&self) -> bool;

    /// Free-form annotation, mirrored onto serialized sections.
    fn attribute(&self) -> &str;

    fn set_attribute(&mut self, attribute: &str);

    fn serialize(&self, ctx: &SiContext, bin: &mut BinaryTable) -> Result<()>;

    fn deserialize(&mut self, ctx: &SiContext, bin: &BinaryTable) -> Result<()>;

    fn to_xml(&self, ctx: &SiContext) -> Element;

    fn from_xml(&mut self, ctx: &SiContext, elem: &Element) -> Result<()>;
}

/// Deserializes a typed table, recording (not raising) wire errors.
pub fn from_binary<T: PsiTable + Default>(ctx: &SiContext, bin: &BinaryTable) -> T {
    let mut table = T::default();
    if let Err(e) = table.deserialize(ctx, bin) {
        log::warn!("deserialization of {} failed: {e}", table.name());
    }
    table
}

/* ── serialization helpers shared by the table modules ── */

/// Seals `payloads` into consecutively numbered long sections of `bin`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_long_sections(
    bin: &mut BinaryTable,
    table_id: u8,
    private: bool,
    table_id_extension: u16,
    version: u8,
    current: bool,
    attribute: &str,
    payloads: &[Vec<u8>],
) -> Result<()> {
    bin.clear();
    if payloads.is_empty() || payloads.len() > 256 {
        return Err(SiError::InvalidStructure("long table needs 1 to 256 sections"));
    }
    let last = (payloads.len() - 1) as u8;
    for (i, payload) in payloads.iter().enumerate() {
        bin.add_section(Section::long(
            table_id,
            private,
            table_id_extension,
            version,
            current,
            i as u8,
            last,
            payload,
        )?);
    }
    if !attribute.is_empty() {
        bin.set_attribute(attribute);
    }
    Ok(())
}

/// Seals one short section into `bin`.
pub(crate) fn emit_short_section(
    bin: &mut BinaryTable,
    table_id: u8,
    private: bool,
    attribute: &str,
    payload: &[u8],
) -> Result<()> {
    bin.clear();
    bin.add_section(Section::short(table_id, private, payload)?);
    if !attribute.is_empty() {
        bin.set_attribute(attribute);
    }
    Ok(())
}

/// Validates a binary table before typed deserialization: complete, and
/// carrying one of the expected table ids.
pub(crate) fn checked_sections<'a>(
    bin: &'a BinaryTable,
    expected: &[u8],
) -> Result<Vec<&'a Section>> {
    if !bin.is_valid() {
        return Err(SiError::IncompleteTable);
    }
    let tid = bin.table_id();
    if !expected.contains(&tid) {
        return Err(SiError::WrongTableId { expected: expected[0], actual: tid });
    }
    Ok(bin.sections().collect())
}

/* ── factory registry ── */

pub struct TableFactory {
    /// Lowercase XML element name.
    pub name: &'static str,
    /// Binary dispatch: does this factory handle the table id?
    pub handles: fn(u8) -> bool,
    pub new_boxed: fn() -> Box<dyn PsiTable>,
}

static REGISTRY: LazyLock<Vec<TableFactory>> = LazyLock::new(|| {
    let mut factories = Vec::new();
    pat::register(&mut factories);
    cat::register(&mut factories);
    pmt::register(&mut factories);
    nit::register(&mut factories);
    sdt::register(&mut factories);
    bat::register(&mut factories);
    eit::register(&mut factories);
    tdt::register(&mut factories);
    tot::register(&mut factories);
    factories
});

pub fn factory_by_name(lower_name: &str) -> Option<&'static TableFactory> {
    REGISTRY.iter().find(|f| f.name == lower_name)
}

pub fn factory_by_table_id(table_id: u8) -> Option<&'static TableFactory> {
    REGISTRY.iter().find(|f| (f.handles)(table_id))
}

/// Builds a binary table from a typed table's XML element. Names not in
/// the registry fail with [`SiError::UnknownElement`]; the generic forms
/// are handled by [`BinaryTable::from_xml`] before calling here.
pub fn table_from_xml(ctx: &SiContext, elem: &Element) -> Result<BinaryTable> {
    let factory = factory_by_name(&elem.name_lower())
        .ok_or_else(|| SiError::UnknownElement(elem.name().to_string()))?;
    let mut typed = (factory.new_boxed)();
    typed.from_xml(ctx, elem)?;
    let mut bin = BinaryTable::new();
    typed.serialize(ctx, &mut bin)?;
    Ok(bin)
}

/// Emits a binary table through its typed form; `None` when the table id
/// is not registered or the payload does not deserialize, so callers can
/// fall back to the generic hex form.
pub fn binary_to_xml(ctx: &SiContext, bin: &BinaryTable) -> Option<Element> {
    let factory = factory_by_table_id(bin.table_id())?;
    let mut typed = (factory.new_boxed)();
    match typed.deserialize(ctx, bin) {
        Ok(()) => Some(typed.to_xml(ctx)),
        Err(e) => {
            log::debug!(
                "typed emission of table id 0x{:02X} failed, falling back to generic: {e}",
                bin.table_id()
            );
            None
        }
    }
}

/// Prepends the `<metadata>` annotation child when `attribute` is set.
pub(crate) fn push_metadata(elem: &mut Element, attribute: &str) {
    if !attribute.is_empty() {
        let mut meta = Element::new("metadata");
        meta.set_attr("attribute", attribute);
        elem.push_child(meta);
    }
}

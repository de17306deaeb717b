// desc/registry.rs
//! Process-wide descriptor registry: maps XML element names to codecs and
//! (tag, context) pairs back to element emitters. Populated once, before
//! first use, from the registration hooks of the typed descriptor modules.

use std::sync::LazyLock;

use crate::context::Standard;
use crate::desc::{Descriptor, DescriptorContext};
use crate::error::Result;
use crate::xml::Element;

pub struct DescriptorCodec {
    /// Lowercase XML element name.
    pub name: &'static str,
    pub tag: u8,
    /// `None` for MPEG-defined tags valid under every standard.
    pub standard: Option<Standard>,
    /// Private descriptors are only recognized under their specifier.
    pub pds: Option<u32>,
    pub to_xml: fn(&Descriptor) -> Result<Element>,
    pub from_xml: fn(&Element) -> Result<Descriptor>,
}

static REGISTRY: LazyLock<Vec<DescriptorCodec>> = LazyLock::new(|| {
    let mut codecs = Vec::new();
    super::ca::register(&mut codecs);
    super::ca_identifier::register(&mut codecs);
    super::private_data_specifier::register(&mut codecs);
    super::registration::register(&mut codecs);
    codecs
});

pub fn by_name(lower_name: &str) -> Option<&'static DescriptorCodec> {
    REGISTRY.iter().find(|c| c.name == lower_name)
}

/// Classifies a tag against the ambient context: a codec matches when its
/// standard is compatible and, for private tags, when the current private
/// data specifier agrees.
pub fn by_tag(tag: u8, ctx: &DescriptorContext) -> Option<&'static DescriptorCodec> {
    REGISTRY.iter().find(|c| {
        c.tag == tag
            && c.standard.is_none_or(|s| s == ctx.standard)
            && c.pds.is_none_or(|p| p == ctx.pds)
    })
}

// section.rs
//! One on-air PSI/SI section, short or long form, sealed with its CRC.

use crate::buffer::crc32_mpeg2;
use crate::context::CrcPolicy;
use crate::error::{Result, SiError};

/// Total encoded size limit of a PSI section, header and CRC included.
pub const MAX_SECTION_SIZE: usize = 1024;
/// Fixed header bytes common to both forms (table_id + flags/length).
pub const SHORT_HEADER_SIZE: usize = 3;
/// Fixed header bytes of a long section, CRC excluded.
pub const LONG_HEADER_SIZE: usize = 8;
/// Trailing CRC-32 bytes of a long section.
pub const CRC_SIZE: usize = 4;
/// Maximum payload of a long section: 1024 - 8 header - 4 CRC.
pub const MAX_LONG_PAYLOAD_SIZE: usize = MAX_SECTION_SIZE - LONG_HEADER_SIZE - CRC_SIZE;
/// Maximum payload of a short section: 1024 - 3 header.
pub const MAX_SHORT_PAYLOAD_SIZE: usize = MAX_SECTION_SIZE - SHORT_HEADER_SIZE;

/// A section is immutable once built: the constructors write the
/// `section_length` field, compute the CRC for the long form and seal the
/// encoded bytes. Parsing validates structure and, per [`CrcPolicy`], the
/// CRC; a section that fails validation under `Ignore` is kept but reports
/// `is_valid() == false`.
#[derive(Clone)]
pub struct Section {
    data: Vec<u8>, // full encoded bytes, CRC included for long sections
    valid: bool,
    attribute: String,
}

impl Section {
    /// Builds a short section (no table-id extension, no CRC).
    pub fn short(table_id: u8, private: bool, payload: &[u8]) -> Result<Section> {
        if payload.len() > MAX_SHORT_PAYLOAD_SIZE {
            return Err(SiError::Overflow { size: payload.len(), limit: MAX_SHORT_PAYLOAD_SIZE });
        }
        let section_length = payload.len();
        let mut data = Vec::with_capacity(SHORT_HEADER_SIZE + payload.len());
        data.push(table_id);
        data.push(0x30 | if private { 0x40 } else { 0 } | ((section_length >> 8) as u8 & 0x0F));
        data.push(section_length as u8);
        data.extend_from_slice(payload);
        Ok(Section { data, valid: true, attribute: String::new() })
    }

    /// Builds a long section and seals it with its CRC-32.
    #[allow(clippy::too_many_arguments)]
    pub fn long(
        table_id: u8,
        private: bool,
        table_id_extension: u16,
        version: u8,
        current: bool,
        section_number: u8,
        last_section_number: u8,
        payload: &[u8],
    ) -> Result<Section> {
        if version > 31 {
            return Err(SiError::VersionExhausted(version));
        }
        if section_number > last_section_number {
            return Err(SiError::InvalidStructure("section_number beyond last_section_number"));
        }
        if payload.len() > MAX_LONG_PAYLOAD_SIZE {
            return Err(SiError::Overflow { size: payload.len(), limit: MAX_LONG_PAYLOAD_SIZE });
        }
        // section_length counts everything after its own field, CRC included
        let section_length = LONG_HEADER_SIZE - SHORT_HEADER_SIZE + payload.len() + CRC_SIZE;
        let mut data = Vec::with_capacity(SHORT_HEADER_SIZE + section_length);
        data.push(table_id);
        data.push(0xB0 | if private { 0x40 } else { 0 } | ((section_length >> 8) as u8 & 0x0F));
        data.push(section_length as u8);
        data.extend_from_slice(&table_id_extension.to_be_bytes());
        data.push(0xC0 | (version << 1) | current as u8);
        data.push(section_number);
        data.push(last_section_number);
        data.extend_from_slice(payload);
        let crc = crc32_mpeg2(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        Ok(Section { data, valid: true, attribute: String::new() })
    }

    /// Parses one section from the head of `bytes`, returning it together
    /// with the number of bytes consumed.
    pub fn parse(bytes: &[u8], policy: CrcPolicy) -> Result<(Section, usize)> {
        if bytes.len() < SHORT_HEADER_SIZE {
            return Err(SiError::InvalidLength { expected: SHORT_HEADER_SIZE, actual: bytes.len() });
        }
        let section_length = ((bytes[1] as usize & 0x0F) << 8) | bytes[2] as usize;
        let total = SHORT_HEADER_SIZE + section_length;
        if total > MAX_SECTION_SIZE {
            return Err(SiError::InvalidStructure("section_length beyond the 1024-byte limit"));
        }
        if bytes.len() < total {
            return Err(SiError::InvalidLength { expected: total, actual: bytes.len() });
        }
        let long = bytes[1] & 0x80 != 0;
        let mut data = bytes[..total].to_vec();
        let mut valid = true;
        if long {
            if section_length < LONG_HEADER_SIZE - SHORT_HEADER_SIZE + CRC_SIZE {
                return Err(SiError::InvalidStructure("long section too short for header and CRC"));
            }
            if data[6] > data[7] {
                return Err(SiError::InvalidStructure("section_number beyond last_section_number"));
            }
            let computed = crc32_mpeg2(&data[..total - CRC_SIZE]);
            let stored = u32::from_be_bytes([
                data[total - 4],
                data[total - 3],
                data[total - 2],
                data[total - 1],
            ]);
            match policy {
                CrcPolicy::Check => {
                    if stored != computed {
                        return Err(SiError::BadCrc { stored, computed });
                    }
                }
                CrcPolicy::Compute => {
                    data[total - 4..].copy_from_slice(&computed.to_be_bytes());
                }
                CrcPolicy::Ignore => {
                    valid = stored == computed;
                }
            }
        }
        Ok((Section { data, valid, attribute: String::new() }, total))
    }

    /* ── accessors ── */

    pub fn table_id(&self) -> u8 {
        self.data[0]
    }

    pub fn is_long_section(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    pub fn is_short_section(&self) -> bool {
        !self.is_long_section()
    }

    pub fn is_private_section(&self) -> bool {
        self.data[1] & 0x40 != 0
    }

    pub fn section_length(&self) -> usize {
        ((self.data[1] as usize & 0x0F) << 8) | self.data[2] as usize
    }

    /// Total encoded size, header and CRC included.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Table id extension of a long section; 0xFFFF for short sections.
    pub fn table_id_extension(&self) -> u16 {
        if self.is_long_section() {
            u16::from_be_bytes([self.data[3], self.data[4]])
        } else {
            0xFFFF
        }
    }

    pub fn version(&self) -> u8 {
        if self.is_long_section() { (self.data[5] >> 1) & 0x1F } else { 0 }
    }

    pub fn is_current(&self) -> bool {
        self.is_short_section() || self.data[5] & 0x01 != 0
    }

    pub fn section_number(&self) -> u8 {
        if self.is_long_section() { self.data[6] } else { 0 }
    }

    pub fn last_section_number(&self) -> u8 {
        if self.is_long_section() { self.data[7] } else { 0 }
    }

    /// Payload bytes: everything between the header and the CRC for long
    /// sections, everything after the header for short ones.
    pub fn payload(&self) -> &[u8] {
        if self.is_long_section() {
            &self.data[LONG_HEADER_SIZE..self.data.len() - CRC_SIZE]
        } else {
            &self.data[SHORT_HEADER_SIZE..]
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload().len()
    }

    /// Stored CRC-32 of a long section; 0 for short sections.
    pub fn crc32(&self) -> u32 {
        if self.is_long_section() {
            let n = self.data.len();
            u32::from_be_bytes([self.data[n - 4], self.data[n - 3], self.data[n - 2], self.data[n - 1]])
        } else {
            0
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Full encoded bytes, as emitted on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Free-form annotation carried through the editable form, never
    /// wire-encoded.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn set_attribute(&mut self, attribute: &str) {
        self.attribute = attribute.to_string();
    }
}

/// Sections compare on their full encoded bytes, CRC included; the
/// `attribute` annotation does not participate.
impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Section {}

impl std::fmt::Debug for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("Section");
        d.field("table_id", &format_args!("0x{:02X}", self.table_id()))
            .field("size", &self.size());
        if self.is_long_section() {
            d.field("table_id_extension", &format_args!("0x{:04X}", self.table_id_extension()))
                .field("version", &self.version())
                .field("section_number", &self.section_number())
                .field("last_section_number", &self.last_section_number());
        }
        d.field("valid", &self.valid).finish()
    }
}

// psi/tot.rs
//! Time Offset Table (0x73): a short section with the UTC instant, a
//! descriptor loop and its own trailing CRC-32, validated here rather
//! than by the generic section layer.

use chrono::NaiveDateTime;

use crate::buffer::{crc32_mpeg2, ByteBuffer};
use crate::constants::TID_TOT;
use crate::context::{CrcPolicy, SiContext};
use crate::desc::DescriptorList;
use crate::error::{Result, SiError};
use crate::psi::{self, PsiTable, TableFactory};
use crate::table::BinaryTable;
use crate::time;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tot {
    pub utc_time: NaiveDateTime,
    pub descs: DescriptorList,
    valid: bool,
    attribute: String,
}

impl Default for Tot {
    fn default() -> Self {
        Tot::new(NaiveDateTime::UNIX_EPOCH)
    }
}

impl Tot {
    pub fn new(utc_time: NaiveDateTime) -> Tot {
        Tot {
            utc_time,
            descs: DescriptorList::new(TID_TOT),
            valid: true,
            attribute: String::new(),
        }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Tot {
        psi::from_binary(ctx, bin)
    }
}

impl PsiTable for Tot {
    fn table_id(&self) -> u8 {
        TID_TOT
    }

    fn name(&self) -> &'static str {
        "tot"
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
        let descs = self.descs.to_bytes();
        if descs.len() > 0x0FFF {
            return Err(SiError::InvalidStructure("TOT descriptor loop longer than 4095 bytes"));
        }
        let mut buf = ByteBuffer::with_capacity(7 + descs.len() + 4);
        time::put_utc(&mut buf, &self.utc_time);
        buf.put_bits(0b1111, 4);
        buf.put_bits(descs.len() as u64, 12);
        buf.put_bytes(&descs);

        // The CRC covers the section header too, so build the header the
        // short-section constructor will emit and checksum across both.
        let section_length = buf.len() + 4;
        let header = [
            TID_TOT,
            0x70 | ((section_length >> 8) as u8 & 0x0F),
            section_length as u8,
        ];
        let mut body = header.to_vec();
        body.extend_from_slice(buf.bytes());
        let crc = crc32_mpeg2(&body);

        let mut payload = buf.into_bytes();
        payload.extend_from_slice(&crc.to_be_bytes());
        psi::emit_short_section(bin, TID_TOT, true, &self.attribute, &payload)
    }

    fn deserialize(&mut self, ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Tot::default();
        self.valid = false;
        let sections = psi::checked_sections(bin, &[TID_TOT])?;
        self.attribute = bin.attribute().to_string();
        let sec = sections[0];
        if sec.payload_size() < 5 + 2 + 4 {
            return Err(SiError::InvalidLength { expected: 11, actual: sec.payload_size() });
        }
        if ctx.crc_policy == CrcPolicy::Check {
            let data = sec.as_bytes();
            let computed = crc32_mpeg2(&data[..data.len() - 4]);
            let n = data.len();
            let stored = u32::from_be_bytes([data[n - 4], data[n - 3], data[n - 2], data[n - 1]]);
            if stored != computed {
                return Err(SiError::BadCrc { stored, computed });
            }
        }
        let body = &sec.payload()[..sec.payload_size() - 4];
        let mut buf = ByteBuffer::from_slice(body);
        self.utc_time =
            time::get_utc(&mut buf).ok_or(SiError::InvalidStructure("TOT time out of range"))?;
        buf.get_bits(4);
        let length = buf.get_bits(12) as usize;
        let descs = buf.get_bytes(length);
        if buf.read_error() || buf.remaining_bytes() != 0 {
            return Err(SiError::InvalidStructure("TOT descriptor loop length mismatch"));
        }
        self.descs = DescriptorList::from_bytes(TID_TOT, &descs)?;
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        elem.set_attr("utc_time", &self.utc_time.format("%Y-%m-%d %H:%M:%S").to_string());
        psi::push_metadata(&mut elem, &self.attribute);
        self.descs.to_xml(ctx, &mut elem);
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        let text = elem
            .attr("utc_time")
            .ok_or_else(|| SiError::Xml("<tot>: missing attribute 'utc_time'".to_string()))?;
        let utc_time = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| SiError::Xml(format!("<tot>: bad utc_time '{text}'")))?;
        *self = Tot::new(utc_time);
        self.descs = DescriptorList::from_xml_children(TID_TOT, elem, &[])?;
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "tot",
        handles: |tid| tid == TID_TOT,
        new_boxed: || Box::<Tot>::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::Descriptor;
    use chrono::NaiveDate;

    fn sample() -> Tot {
        let mut tot = Tot::new(
            NaiveDate::from_ymd_opt(2021, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap(),
        );
        // local_time_offset-style payload, kept opaque here
        tot.descs.push(Descriptor::new(0x58, vec![b'E', b'S', b'P', 0x02, 0x01, 0x00, 0xC5, 0x34, 0x17, 0x02, 0x30, 0x00, 0x00]).unwrap());
        tot
    }

    #[test]
    fn test_round_trip_with_crc() {
        let ctx = SiContext::default();
        let tot = sample();
        let mut bin = BinaryTable::new();
        tot.serialize(&ctx, &mut bin).unwrap();
        assert!(bin.is_short_section());
        let sec = bin.section_at(0).unwrap();
        // the table-level CRC seals everything before the last 4 bytes
        let data = sec.as_bytes();
        assert_eq!(
            crc32_mpeg2(&data[..data.len() - 4]).to_be_bytes(),
            data[data.len() - 4..]
        );

        let back = Tot::from_binary(&ctx, &bin);
        assert!(back.is_valid());
        assert_eq!(back, tot);
    }

    #[test]
    fn test_corrupt_crc_rejected_under_check() {
        let ctx = SiContext::default();
        let tot = sample();
        let mut bin = BinaryTable::new();
        tot.serialize(&ctx, &mut bin).unwrap();
        let sec = bin.section_at(0).unwrap();
        let mut bytes = sec.as_bytes().to_vec();
        let n = bytes.len();
        bytes[n - 1] ^= 0xFF;
        let (bad, _) = crate::section::Section::parse(&bytes, CrcPolicy::Ignore).unwrap();
        let mut bad_bin = BinaryTable::new();
        bad_bin.add_section(bad);

        let back = Tot::from_binary(&ctx, &bad_bin);
        assert!(!back.is_valid());

        let ignore = SiContext { crc_policy: CrcPolicy::Ignore, ..SiContext::default() };
        let back = Tot::from_binary(&ignore, &bad_bin);
        assert!(back.is_valid());
    }
}

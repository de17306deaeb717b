// psi/eit.rs
//! Event Information Table: present/following (0x4E/0x4F) and schedule
//! (0x50-0x5F actual, 0x60-0x6F other).
//!
//! Schedule tables are laid out in 3-hour segments counted from midnight
//! of the day of the earliest event: every segment in range gets at least
//! one section, a segment holds at most 8 sections, events never split.
//! Sections are numbered consecutively from 0 and each section's
//! segment_last_section_number points at the last section of its segment.

use chrono::NaiveDateTime;

use crate::buffer::ByteBuffer;
use crate::constants::{
    TID_EIT_PF_ACTUAL, TID_EIT_PF_OTHER, TID_EIT_SCHED_ACTUAL_MIN, TID_EIT_SCHED_OTHER_MAX,
    TID_EIT_SCHED_OTHER_MIN,
};
use crate::context::SiContext;
use crate::desc::DescriptorList;
use crate::error::{Result, SiError};
use crate::psi::{self, PsiTable, TableFactory};
use crate::section::MAX_LONG_PAYLOAD_SIZE;
use crate::table::BinaryTable;
use crate::time;
use crate::xml::Element;

/// ts_id + onid + segment_last_section_number + last_table_id.
const PREAMBLE_SIZE: usize = 6;
/// Fixed bytes of one event entry before its descriptor loop.
const EVENT_FIXED: usize = 12;
/// 3-hour schedule segments.
const SEGMENT_SECONDS: i64 = 3 * 3600;
/// A schedule table id spans 32 segments (4 days).
const SEGMENTS_PER_TABLE: i64 = 32;
/// At most 8 sections per segment.
const SECTIONS_PER_SEGMENT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitEvent {
    pub event_id: u16,
    pub start_time: NaiveDateTime,
    /// Event duration in seconds, BCD hh:mm:ss on the wire.
    pub duration: u32,
    pub running_status: u8,
    pub free_ca: bool,
    pub descs: DescriptorList,
}

impl EitEvent {
    pub fn new(event_id: u16, start_time: NaiveDateTime, duration: u32) -> EitEvent {
        EitEvent {
            event_id,
            start_time,
            duration,
            running_status: 0,
            free_ca: false,
            descs: DescriptorList::new(TID_EIT_PF_ACTUAL),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let descs = self.descs.to_bytes();
        let mut buf = ByteBuffer::with_capacity(EVENT_FIXED + descs.len());
        buf.put_u16(self.event_id);
        time::put_utc(&mut buf, &self.start_time);
        time::put_bcd_duration(&mut buf, self.duration);
        buf.put_bits(self.running_status as u64 & 0x07, 3);
        buf.put_bits(self.free_ca as u64, 1);
        buf.put_bits(descs.len() as u64, 12);
        buf.put_bytes(&descs);
        buf.into_bytes()
    }

    fn read(table_id: u8, buf: &mut ByteBuffer) -> Result<EitEvent> {
        let event_id = buf.get_u16();
        let start_time = time::get_utc(buf);
        let duration = time::get_bcd_duration(buf);
        let running_status = buf.get_bits(3) as u8;
        let free_ca = buf.get_bits(1) != 0;
        let length = buf.get_bits(12) as usize;
        let descs = buf.get_bytes(length);
        if buf.read_error() {
            return Err(SiError::InvalidStructure("EIT event loop beyond section"));
        }
        let start_time =
            start_time.ok_or(SiError::InvalidStructure("EIT event start time out of range"))?;
        let mut event = EitEvent::new(event_id, start_time, duration);
        event.running_status = running_status;
        event.free_ca = free_ca;
        event.descs = DescriptorList::from_bytes(table_id, &descs)?;
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eit {
    /// One of the p/f or schedule table ids.
    pub table_id: u8,
    pub version: u8,
    pub current: bool,
    /// Serialized as the table id extension.
    pub service_id: u16,
    pub ts_id: u16,
    pub original_network_id: u16,
    pub last_table_id: u8,
    /// Events in presentation order (p/f: present first, following next).
    pub events: Vec<EitEvent>,
    valid: bool,
    attribute: String,
}

impl Default for Eit {
    fn default() -> Self {
        Eit::new_pf(true, 0, true, 0)
    }
}

impl Eit {
    pub fn new_pf(actual: bool, version: u8, current: bool, service_id: u16) -> Eit {
        let table_id = if actual { TID_EIT_PF_ACTUAL } else { TID_EIT_PF_OTHER };
        Eit {
            table_id,
            version,
            current,
            service_id,
            ts_id: 0,
            original_network_id: 0,
            last_table_id: table_id,
            events: Vec::new(),
            valid: true,
            attribute: String::new(),
        }
    }

    /// `table_index` selects the 4-day window: 0 covers the first 4 days.
    pub fn new_schedule(actual: bool, table_index: u8, version: u8, current: bool, service_id: u16) -> Eit {
        let base = if actual { TID_EIT_SCHED_ACTUAL_MIN } else { TID_EIT_SCHED_OTHER_MIN };
        let table_id = base + (table_index & 0x0F);
        Eit { table_id, last_table_id: table_id, ..Eit::new_pf(actual, version, current, service_id) }
    }

    pub fn from_binary(ctx: &SiContext, bin: &BinaryTable) -> Eit {
        psi::from_binary(ctx, bin)
    }

    pub fn is_pf(&self) -> bool {
        self.table_id == TID_EIT_PF_ACTUAL || self.table_id == TID_EIT_PF_OTHER
    }

    pub fn is_actual(&self) -> bool {
        self.table_id == TID_EIT_PF_ACTUAL
            || (TID_EIT_SCHED_ACTUAL_MIN..TID_EIT_SCHED_OTHER_MIN).contains(&self.table_id)
    }

    fn preamble(&self, segment_last_section: u8) -> Vec<u8> {
        let mut buf = ByteBuffer::with_capacity(PREAMBLE_SIZE);
        buf.put_u16(self.ts_id);
        buf.put_u16(self.original_network_id);
        buf.put_u8(segment_last_section);
        buf.put_u8(self.last_table_id);
        buf.into_bytes()
    }

    /// Present/following: always two sections, one event each at most.
    fn serialize_pf(&self) -> Result<Vec<Vec<u8>>> {
        if self.events.len() > 2 {
            return Err(SiError::InvalidStructure("p/f EIT holds at most two events"));
        }
        let mut payloads = Vec::with_capacity(2);
        for i in 0..2 {
            let mut payload = self.preamble(1);
            if let Some(event) = self.events.get(i) {
                payload.extend_from_slice(&event.to_bytes());
            }
            if payload.len() > MAX_LONG_PAYLOAD_SIZE {
                return Err(SiError::Overflow {
                    size: payload.len() - PREAMBLE_SIZE,
                    limit: MAX_LONG_PAYLOAD_SIZE - PREAMBLE_SIZE,
                });
            }
            payloads.push(payload);
        }
        Ok(payloads)
    }

    /// Schedule: bucket events into 3-hour segments, then lay each segment
    /// out over up to 8 sections. The returned payloads still need their
    /// segment_last_section_number patched, done by the caller once
    /// section numbers are final.
    fn serialize_schedule(&self) -> Result<Vec<Vec<u8>>> {
        let mut events: Vec<&EitEvent> = self.events.iter().collect();
        events.sort_by_key(|e| (e.start_time, e.event_id));

        let Some(first) = events.first() else {
            return Ok(vec![self.preamble(0)]);
        };
        let base = first.start_time.date().and_hms_opt(0, 0, 0).unwrap();

        let mut segments: Vec<Vec<&EitEvent>> = Vec::new();
        for event in events {
            let offset = event.start_time.signed_duration_since(base).num_seconds();
            let slot = offset / SEGMENT_SECONDS;
            if slot >= SEGMENTS_PER_TABLE {
                return Err(SiError::InvalidStructure("schedule events span more than 4 days"));
            }
            let slot = slot as usize;
            if segments.len() <= slot {
                segments.resize_with(slot + 1, Vec::new);
            }
            segments[slot].push(event);
        }

        let mut payloads: Vec<Vec<u8>> = Vec::new();
        for segment in &segments {
            let mut sections: Vec<Vec<u8>> = vec![self.preamble(0)];
            for event in segment {
                let enc = event.to_bytes();
                if PREAMBLE_SIZE + enc.len() > MAX_LONG_PAYLOAD_SIZE {
                    return Err(SiError::Overflow {
                        size: enc.len(),
                        limit: MAX_LONG_PAYLOAD_SIZE - PREAMBLE_SIZE,
                    });
                }
                if sections.last().unwrap().len() + enc.len() > MAX_LONG_PAYLOAD_SIZE {
                    if sections.len() == SECTIONS_PER_SEGMENT {
                        return Err(SiError::InvalidStructure(
                            "more than 8 sections in a 3-hour schedule segment",
                        ));
                    }
                    sections.push(self.preamble(0));
                }
                sections.last_mut().unwrap().extend_from_slice(&enc);
            }
            let segment_last = (payloads.len() + sections.len() - 1) as u8;
            for mut payload in sections {
                payload[4] = segment_last;
                payloads.push(payload);
            }
        }
        Ok(payloads)
    }
}

impl PsiTable for Eit {
    fn table_id(&self) -> u8 {
        self.table_id
    }

    fn name(&self) -> &'static str {
        "eit"
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
        let payloads = if self.is_pf() { self.serialize_pf()? } else { self.serialize_schedule()? };
        psi::emit_long_sections(
            bin,
            self.table_id,
            true,
            self.service_id,
            self.version,
            self.current,
            &self.attribute,
            &payloads,
        )
    }

    fn deserialize(&mut self, _ctx: &SiContext, bin: &BinaryTable) -> Result<()> {
        *self = Eit::default();
        self.valid = false;
        let expected: Vec<u8> = (TID_EIT_PF_ACTUAL..=TID_EIT_SCHED_OTHER_MAX).collect();
        let sections = psi::checked_sections(bin, &expected)?;
        self.table_id = bin.table_id();
        self.version = bin.version();
        self.current = bin.is_current();
        self.service_id = bin.table_id_extension();
        self.attribute = bin.attribute().to_string();
        for sec in sections {
            let mut buf = ByteBuffer::from_slice(sec.payload());
            self.ts_id = buf.get_u16();
            self.original_network_id = buf.get_u16();
            buf.get_u8(); // segment_last_section_number, recomputed on emit
            self.last_table_id = buf.get_u8();
            if buf.read_error() {
                return Err(SiError::InvalidStructure("EIT section shorter than its fixed part"));
            }
            while buf.remaining_bytes() > 0 {
                self.events.push(EitEvent::read(self.table_id, &mut buf)?);
            }
        }
        self.valid = true;
        Ok(())
    }

    fn to_xml(&self, ctx: &SiContext) -> Element {
        let mut elem = Element::new(self.name());
        if self.is_pf() {
            elem.set_attr("type", "pf");
        } else {
            let base = if self.is_actual() { TID_EIT_SCHED_ACTUAL_MIN } else { TID_EIT_SCHED_OTHER_MIN };
            elem.set_attr_dec("type", (self.table_id - base) as u64);
        }
        elem.set_attr_bool("actual", self.is_actual());
        elem.set_attr_dec("version", self.version as u64);
        elem.set_attr_bool("current", self.current);
        elem.set_attr_hex16("service_id", self.service_id);
        elem.set_attr_hex16("transport_stream_id", self.ts_id);
        elem.set_attr_hex16("original_network_id", self.original_network_id);
        elem.set_attr_hex8("last_table_id", self.last_table_id);
        psi::push_metadata(&mut elem, &self.attribute);
        for event in &self.events {
            let mut child = Element::new("event");
            child.set_attr_hex16("event_id", event.event_id);
            child.set_attr("start_time", &event.start_time.format("%Y-%m-%d %H:%M:%S").to_string());
            child.set_attr(
                "duration",
                &format!(
                    "{:02}:{:02}:{:02}",
                    event.duration / 3600,
                    event.duration / 60 % 60,
                    event.duration % 60
                ),
            );
            child.set_attr_dec("running_status", event.running_status as u64);
            child.set_attr_bool("free_ca_mode", event.free_ca);
            event.descs.to_xml(ctx, &mut child);
            elem.push_child(child);
        }
        elem
    }

    fn from_xml(&mut self, _ctx: &SiContext, elem: &Element) -> Result<()> {
        let actual = elem.attr_bool("actual").unwrap_or(true);
        let type_attr = elem.attr("type").unwrap_or_else(|| "pf".to_string());
        *self = if type_attr.eq_ignore_ascii_case("pf") {
            Eit::new_pf(actual, 0, true, 0)
        } else {
            let index = type_attr
                .parse::<u8>()
                .map_err(|_| SiError::Xml(format!("<eit>: bad type attribute '{type_attr}'")))?;
            Eit::new_schedule(actual, index, 0, true, 0)
        };
        self.version = elem.attr_u8("version").unwrap_or(0);
        self.current = elem.attr_bool("current").unwrap_or(true);
        self.service_id = elem.req_attr_u16("service_id")?;
        self.ts_id = elem.attr_u16("transport_stream_id").unwrap_or(0);
        self.original_network_id = elem.attr_u16("original_network_id").unwrap_or(0);
        self.last_table_id = elem.attr_u8("last_table_id").unwrap_or(self.table_id);
        for child in elem.children() {
            match child.name_lower().as_str() {
                "metadata" => {}
                "event" => {
                    let start_text = child.attr("start_time").ok_or_else(|| {
                        SiError::Xml("<event>: missing attribute 'start_time'".to_string())
                    })?;
                    let start_time =
                        NaiveDateTime::parse_from_str(&start_text, "%Y-%m-%d %H:%M:%S").map_err(
                            |_| SiError::Xml(format!("<event>: bad start_time '{start_text}'")),
                        )?;
                    let duration = parse_duration(&child.attr("duration").unwrap_or_default())?;
                    let mut event =
                        EitEvent::new(child.req_attr_u16("event_id")?, start_time, duration);
                    event.running_status = child.attr_u8("running_status").unwrap_or(0) & 0x07;
                    event.free_ca = child.attr_bool("free_ca_mode").unwrap_or(false);
                    event.descs = DescriptorList::from_xml_children(self.table_id, child, &[])?;
                    self.events.push(event);
                }
                _ => return Err(SiError::UnknownElement(child.name().to_string())),
            }
        }
        if let Some(attr) = crate::table::metadata_attribute(elem) {
            self.attribute = attr;
        }
        Ok(())
    }
}

fn parse_duration(text: &str) -> Result<u32> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return Err(SiError::Xml(format!("<event>: bad duration '{text}'")));
    }
    let mut seconds = 0u32;
    for part in parts {
        let v: u32 = part
            .parse()
            .map_err(|_| SiError::Xml(format!("<event>: bad duration '{text}'")))?;
        seconds = seconds * 60 + v;
    }
    Ok(seconds)
}

pub(super) fn register(factories: &mut Vec<TableFactory>) {
    factories.push(TableFactory {
        name: "eit",
        handles: |tid| (TID_EIT_PF_ACTUAL..=TID_EIT_SCHED_OTHER_MAX).contains(&tid),
        new_boxed: || Box::<Eit>::default(),
    });
}

// psi/transport_list.rs
//! Shared body codec for the two-loop tables (NIT, BAT): a top-level
//! descriptor loop followed by a transport stream loop, each with a
//! per-section 12-bit length.
//!
//! The top loop may split mid-list (never mid-descriptor); a transport
//! entry with its descriptors is atomic. Both loop lengths are rewritten
//! per section to cover only what landed there.

use std::collections::BTreeMap;

use crate::buffer::ByteBuffer;
use crate::desc::DescriptorList;
use crate::error::{Result, SiError};
use crate::section::{Section, MAX_LONG_PAYLOAD_SIZE};

/// (transport_stream_id, original_network_id)
pub(crate) type TransportKey = (u16, u16);

/// Loop-length field: reserved nibble plus 12 bits of length.
fn length_field(length: usize) -> [u8; 2] {
    [0xF0 | ((length >> 8) as u8 & 0x0F), length as u8]
}

fn patch_length(payload: &mut [u8], at: usize, length: usize) {
    let field = length_field(length);
    payload[at] = field[0];
    payload[at + 1] = field[1];
}

fn transport_entry(key: TransportKey, descs: &DescriptorList) -> Vec<u8> {
    let bytes = descs.to_bytes();
    let mut entry = Vec::with_capacity(6 + bytes.len());
    entry.extend_from_slice(&key.0.to_be_bytes());
    entry.extend_from_slice(&key.1.to_be_bytes());
    entry.extend_from_slice(&length_field(bytes.len()));
    entry.extend_from_slice(&bytes);
    entry
}

pub(crate) fn serialize_body(
    top_descs: &DescriptorList,
    transports: &BTreeMap<TransportKey, DescriptorList>,
) -> Result<Vec<Vec<u8>>> {
    let mut payloads: Vec<Vec<u8>> = Vec::new();
    let mut payload: Vec<u8> = length_field(0).to_vec();
    let mut top_length = 0usize;

    for desc in top_descs {
        let enc = desc.to_bytes();
        // both length fields must still fit alongside the descriptor
        if 4 + enc.len() > MAX_LONG_PAYLOAD_SIZE {
            return Err(SiError::Overflow { size: enc.len(), limit: MAX_LONG_PAYLOAD_SIZE - 4 });
        }
        if payload.len() + enc.len() + 2 > MAX_LONG_PAYLOAD_SIZE {
            patch_length(&mut payload, 0, top_length);
            payload.extend_from_slice(&length_field(0));
            payloads.push(std::mem::replace(&mut payload, length_field(0).to_vec()));
            top_length = 0;
        }
        payload.extend_from_slice(&enc);
        top_length += enc.len();
    }
    patch_length(&mut payload, 0, top_length);

    let mut loop_at = payload.len();
    payload.extend_from_slice(&length_field(0));
    let mut loop_length = 0usize;

    for (&key, descs) in transports {
        let entry = transport_entry(key, descs);
        if 4 + entry.len() > MAX_LONG_PAYLOAD_SIZE {
            return Err(SiError::Overflow { size: entry.len(), limit: MAX_LONG_PAYLOAD_SIZE - 4 });
        }
        if payload.len() + entry.len() > MAX_LONG_PAYLOAD_SIZE {
            patch_length(&mut payload, loop_at, loop_length);
            payloads.push(std::mem::take(&mut payload));
            payload.extend_from_slice(&length_field(0));
            payload.extend_from_slice(&length_field(0));
            loop_at = 2;
            loop_length = 0;
        }
        payload.extend_from_slice(&entry);
        loop_length += entry.len();
    }
    patch_length(&mut payload, loop_at, loop_length);
    payloads.push(payload);
    Ok(payloads)
}

#[allow(clippy::type_complexity)]
pub(crate) fn deserialize_body(
    table_id: u8,
    sections: &[&Section],
) -> Result<(DescriptorList, BTreeMap<TransportKey, DescriptorList>)> {
    let mut top_descs = DescriptorList::new(table_id);
    let mut transports = BTreeMap::new();
    for sec in sections {
        let mut buf = ByteBuffer::from_slice(sec.payload());
        buf.get_bits(4);
        let top_length = buf.get_bits(12) as usize;
        let top = buf.get_bytes(top_length);
        if buf.read_error() {
            return Err(SiError::InvalidStructure("top descriptor loop beyond section"));
        }
        for desc in &DescriptorList::from_bytes(table_id, &top)? {
            top_descs.push(desc.clone());
        }
        buf.get_bits(4);
        let loop_length = buf.get_bits(12) as usize;
        if buf.read_error() || loop_length != buf.remaining_bytes() {
            return Err(SiError::InvalidStructure("transport loop length mismatch"));
        }
        while buf.remaining_bytes() > 0 {
            let ts_id = buf.get_u16();
            let onid = buf.get_u16();
            buf.get_bits(4);
            let length = buf.get_bits(12) as usize;
            let descs = buf.get_bytes(length);
            if buf.read_error() {
                return Err(SiError::InvalidStructure("transport entry beyond section"));
            }
            transports.insert((ts_id, onid), DescriptorList::from_bytes(table_id, &descs)?);
        }
    }
    Ok((top_descs, transports))
}

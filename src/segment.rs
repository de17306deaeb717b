// segment.rs
//! Splits a table body of atomic records into long-section payloads.

use crate::error::{Result, SiError};
use crate::section::MAX_LONG_PAYLOAD_SIZE;

/// Accumulates atomic records into section payloads of at most
/// [`MAX_LONG_PAYLOAD_SIZE`] bytes. A record that does not fit closes the
/// current payload and opens the next one, re-emitting the configured
/// preamble; a record that can never fit is an [`SiError::Overflow`],
/// never a truncation.
///
/// Tables whose per-section preamble holds a loop length that must be
/// rewritten (PMT, NIT, BAT) assemble their payloads directly and only
/// share the envelope arithmetic; the flat-record families (PAT, CAT,
/// SDT, TOT descriptor loop) go through here.
pub struct Segmenter {
    max_payload: usize,
    preamble: Vec<u8>,
    payloads: Vec<Vec<u8>>,
    cur: Vec<u8>,
}

impl Segmenter {
    pub fn new() -> Segmenter {
        Self::with_preamble(Vec::new())
    }

    /// `preamble` is emitted at the start of every section payload.
    pub fn with_preamble(preamble: Vec<u8>) -> Segmenter {
        debug_assert!(preamble.len() < MAX_LONG_PAYLOAD_SIZE);
        Segmenter {
            max_payload: MAX_LONG_PAYLOAD_SIZE,
            cur: preamble.clone(),
            preamble,
            payloads: Vec::new(),
        }
    }

    /// Bytes still available in the current section payload.
    pub fn remaining(&self) -> usize {
        self.max_payload - self.cur.len()
    }

    /// Appends one atomic record, breaking to a new section if needed.
    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        if self.preamble.len() + record.len() > self.max_payload {
            return Err(SiError::Overflow {
                size: record.len(),
                limit: self.max_payload - self.preamble.len(),
            });
        }
        if self.cur.len() + record.len() > self.max_payload {
            self.break_section();
        }
        self.cur.extend_from_slice(record);
        Ok(())
    }

    /// Forces the next record into a fresh section.
    pub fn break_section(&mut self) {
        let next = self.preamble.clone();
        self.payloads.push(std::mem::replace(&mut self.cur, next));
    }

    /// Closes the last section and returns every payload in order. A table
    /// with no records still emits one (preamble-only) section.
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        if self.payloads.is_empty() || self.cur.len() > self.preamble.len() {
            self.payloads.push(self.cur);
        }
        self.payloads
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_yields_one_section() {
        let payloads = Segmenter::new().finish();
        assert_eq!(payloads, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_record_never_split() {
        let mut seg = Segmenter::new();
        // 101 ten-byte records fill a 1012-byte payload; the 102nd breaks
        for _ in 0..102 {
            seg.add_record(&[0u8; 10]).unwrap();
        }
        let payloads = seg.finish();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].len(), 1010);
        assert_eq!(payloads[1].len(), 10);
    }

    #[test]
    fn test_preamble_repeats_per_section() {
        let mut seg = Segmenter::with_preamble(vec![0xAA, 0xBB]);
        for _ in 0..102 {
            seg.add_record(&[0u8; 10]).unwrap();
        }
        let payloads = seg.finish();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].len(), 2 + 1010);
        assert_eq!(&payloads[1][..2], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_oversized_record_is_overflow() {
        let mut seg = Segmenter::new();
        assert!(matches!(
            seg.add_record(&[0u8; MAX_LONG_PAYLOAD_SIZE + 1]),
            Err(SiError::Overflow { .. })
        ));
    }
}

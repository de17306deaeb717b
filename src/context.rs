// context.rs
//! Ambient defaults threaded through parsing and serialization.

/// Signalling standard a descriptor or table belongs to. Tag ranges
/// 0x40-0xFF are interpreted against this (plus the current private data
/// specifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Standard {
    Mpeg,
    Dvb,
    Atsc,
    Isdb,
}

/// CRC-32 handling on incoming sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcPolicy {
    /// Accept the stored CRC unconditionally.
    Ignore,
    /// Reject sections whose stored CRC does not match.
    #[default]
    Check,
    /// Replace the stored CRC with a recomputed one before validation.
    Compute,
}

/// Per-call context: standards flavor, default private data specifier and
/// CRC policy. Cheap to copy; a [`crate::SectionFile`] owns one and passes
/// it down to tables and descriptors.
#[derive(Debug, Clone, Copy)]
pub struct SiContext {
    pub standard: Standard,
    pub crc_policy: CrcPolicy,
    /// Private data specifier assumed before any
    /// `private_data_specifier_descriptor` is seen.
    pub default_pds: u32,
}

impl Default for SiContext {
    fn default() -> Self {
        SiContext {
            standard: Standard::Dvb,
            crc_policy: CrcPolicy::Check,
            default_pds: 0,
        }
    }
}

impl SiContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_standard(standard: Standard) -> Self {
        SiContext { standard, ..Self::default() }
    }
}

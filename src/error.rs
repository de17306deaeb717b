use thiserror::Error;

/// Errors surfaced by the section / table core.
#[derive(Error, Debug)]
pub enum SiError {
    #[error("buffer ends inside a declared field: need {expected} bytes, {actual} left")]
    InvalidLength { expected: usize, actual: usize },

    #[error("CRC-32 mismatch: section carries 0x{stored:08X}, computed 0x{computed:08X}")]
    BadCrc { stored: u32, computed: u32 },

    #[error("wrong table id: expected 0x{expected:02X}, got 0x{actual:02X}")]
    WrongTableId { expected: u8, actual: u8 },

    #[error("wrong descriptor tag: expected 0x{expected:02X}, got 0x{actual:02X}")]
    WrongDescriptorTag { expected: u8, actual: u8 },

    #[error("invalid table structure: {0}")]
    InvalidStructure(&'static str),

    #[error("atomic record of {size} bytes exceeds the {limit}-byte section payload limit")]
    Overflow { size: usize, limit: usize },

    #[error("unknown element <{0}>")]
    UnknownElement(String),

    #[error("table is incomplete, sections are missing")]
    IncompleteTable,

    #[error("illegal version number {0}, must be 0..=31")]
    VersionExhausted(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SiError>;

// src/lib.rs
//! MPEG-2 / DVB PSI-SI signalling core.
//!
//! Tables move between three interchangeable representations: structured
//! table objects ([`psi`]), binary sections as sent on air ([`Section`],
//! [`BinaryTable`]) and editable XML/JSON documents ([`xml`],
//! [`SectionFile`]). Serialization is deterministic and byte-exact,
//! including the CRC-32 sealing every long section, and the segmentation
//! rules that spread a logical table across multiple 1024-byte sections
//! follow each table family's own split points.
//!
//! ```no_run
//! use mpegts_tables::{SectionFile, SiContext};
//!
//! let mut file = SectionFile::new(SiContext::default());
//! file.load_xml("tables.xml")?;
//! file.save_binary("tables.bin")?;
//! # Ok::<(), mpegts_tables::SiError>(())
//! ```

pub mod buffer;
pub mod constants;
pub mod context;
pub mod desc;
pub mod error;
pub mod psi;
pub mod section;
pub mod section_file;
pub mod segment;
pub mod table;
pub mod time;
pub mod xml;

pub use context::{CrcPolicy, SiContext, Standard};
pub use error::{Result, SiError};
pub use section::Section;
pub use section_file::SectionFile;
pub use table::{AddResult, BinaryTable};

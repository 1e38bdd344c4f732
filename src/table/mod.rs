//! Translation between on-disk chunk table entries and the chunk list.
//!
//! One [`ChunkGroup`] handles the table of one section: the format layer
//! parses the section framing and the table header, then hands the raw
//! entry bytes to [`fill_v1`](ChunkGroup::fill_v1) or
//! [`fill_v2`](ChunkGroup::fill_v2). Segments that carry a redundant
//! backup table run [`correct_v1`](ChunkGroup::correct_v1) afterwards
//! over the same index range. [`write_table_entries`] reads a populated
//! list back into wire bytes.

mod correct;
mod encode;
mod v1;
mod v2;

pub use self::encode::write_table_entries;

use slog::Logger;
use std::convert::TryFrom;

use crate::errors::*;

/// Generation of the on-disk table entry format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormatVersion {
    One,
    Two,
}

impl FormatVersion {
    /// Size in bytes of one packed table entry.
    pub fn entry_size(self) -> usize {
        match self {
            FormatVersion::One => repr::table::ENTRY_V1_SIZE,
            FormatVersion::Two => repr::table::ENTRY_V2_SIZE,
        }
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self> {
        match version {
            1 => Ok(FormatVersion::One),
            2 => Ok(FormatVersion::Two),
            _ => UnsupportedFormatVersion { version }
                .fail()
                .map_err(Into::into),
        }
    }
}

/// Decoder for the chunk table of one section.
///
/// `chunk_size` is the uniform logical chunk length of the image, used to
/// lay out the mapped ranges; `pool_entry` is the handle of the segment
/// file the decoded chunk data lives in.
pub struct ChunkGroup {
    chunk_size: u32,
    pool_entry: u32,
    logger: Logger,
}

impl ChunkGroup {
    pub fn new(chunk_size: u32, pool_entry: u32) -> Self {
        Self::with_logger(chunk_size, pool_entry, crate::default_logger())
    }

    pub fn with_logger(chunk_size: u32, pool_entry: u32, logger: Logger) -> Self {
        ChunkGroup {
            chunk_size,
            pool_entry,
            logger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryInto;

    #[test]
    fn format_version_from_wire_byte() {
        assert_eq!(FormatVersion::try_from(1).unwrap(), FormatVersion::One);
        assert_eq!(FormatVersion::try_from(2).unwrap(), FormatVersion::Two);
        assert!(FormatVersion::try_from(3).is_err());

        let version: Result<FormatVersion> = 0u8.try_into();
        assert!(version.is_err());
    }

    #[test]
    fn entry_sizes_match_wire_format() {
        assert_eq!(FormatVersion::One.entry_size(), 4);
        assert_eq!(FormatVersion::Two.entry_size(), 16);
    }
}

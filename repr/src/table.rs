//! Chunk table headers and entries.
//!
//! A version 1 table stores one packed 32-bit value per chunk. Bit 31 is
//! the compressed flag, bits 0..31 are the chunk's offset relative to the
//! table's base offset. A chunk's size is the distance to the next entry's
//! offset; the size of the last chunk is not stored at all and has to be
//! derived from the framing of the section that holds the table.
//!
//! A version 2 table stores an explicit 16-byte record per chunk: a 64-bit
//! absolute offset, a 32-bit size and a 32-bit flag bitmask.

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use static_assertions::const_assert_eq;

/// Size of a version 1 table header: number of entries (4), padding (4),
/// base offset (8), padding (4), checksum (4).
pub const HEADER_V1_SIZE: usize = 24;

/// Size of a version 2 table header: first chunk number (8), number of
/// entries (4), padding (4), checksum (4), padding (12).
pub const HEADER_V2_SIZE: usize = 32;

pub const ENTRY_V1_SIZE: usize = 4;
pub const ENTRY_V2_SIZE: usize = 16;

const_assert_eq!(ENTRY_V2_SIZE, 8 + 4 + 4);

/// A version 1 table entry: the packed chunk data offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntryV1(pub u32);

impl EntryV1 {
    pub const COMPRESSED_FLAG: u32 = 0x8000_0000;

    pub fn new(offset: u32, compressed: bool) -> Self {
        let mut stored = offset;
        if compressed {
            stored |= Self::COMPRESSED_FLAG;
        }
        EntryV1(stored)
    }

    /// Reads the entry at `index` from raw table entry bytes.
    pub fn read(data: &[u8], index: usize) -> Self {
        let pos = index * ENTRY_V1_SIZE;
        EntryV1(LittleEndian::read_u32(&data[pos..pos + ENTRY_V1_SIZE]))
    }

    /// Writes the entry at `index` into raw table entry bytes.
    pub fn write(self, data: &mut [u8], index: usize) {
        let pos = index * ENTRY_V1_SIZE;
        LittleEndian::write_u32(&mut data[pos..pos + ENTRY_V1_SIZE], self.0);
    }

    #[inline]
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED_FLAG != 0
    }

    /// The stored offset with the compressed flag masked out.
    #[inline]
    pub fn offset(self) -> u32 {
        self.0 & !Self::COMPRESSED_FLAG
    }

    /// The stored 32-bit value as-is, compressed flag included.
    #[inline]
    pub fn stored(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// On-disk chunk data flags of a version 2 table entry.
    ///
    /// Bits outside the known set are reserved; readers pass them through
    /// unvalidated.
    #[derive(Default)]
    pub struct ChunkDataFlags: u32 {
        const IS_COMPRESSED     = 0x0000_0001;
        const HAS_CHECKSUM      = 0x0000_0002;
        const USES_PATTERN_FILL = 0x0000_0004;
    }
}

/// A version 2 table entry.
///
/// `flags` keeps the raw bitmask so that reserved bits survive a
/// read; [`chunk_data_flags`](EntryV2::chunk_data_flags) exposes the
/// known bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntryV2 {
    pub offset: u64,
    pub size: u32,
    pub flags: u32,
}

impl EntryV2 {
    /// Reads the entry at `index` from raw table entry bytes.
    pub fn read(data: &[u8], index: usize) -> Self {
        let pos = index * ENTRY_V2_SIZE;
        EntryV2 {
            offset: LittleEndian::read_u64(&data[pos..pos + 8]),
            size: LittleEndian::read_u32(&data[pos + 8..pos + 12]),
            flags: LittleEndian::read_u32(&data[pos + 12..pos + 16]),
        }
    }

    /// Writes the entry at `index` into raw table entry bytes.
    pub fn write(&self, data: &mut [u8], index: usize) {
        let pos = index * ENTRY_V2_SIZE;
        LittleEndian::write_u64(&mut data[pos..pos + 8], self.offset);
        LittleEndian::write_u32(&mut data[pos + 8..pos + 12], self.size);
        LittleEndian::write_u32(&mut data[pos + 12..pos + 16], self.flags);
    }

    pub fn chunk_data_flags(&self) -> ChunkDataFlags {
        ChunkDataFlags::from_bits_truncate(self.flags)
    }

    /// The reserved flag bits, if any are set.
    pub fn reserved_flags(&self) -> u32 {
        self.flags & !ChunkDataFlags::all().bits()
    }
}

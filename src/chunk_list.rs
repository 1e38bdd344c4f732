//! The shared chunk index that table decoding feeds.
//!
//! One list spans the whole logical image; each decoded table section
//! contributes a contiguous run of descriptors. The list itself belongs
//! to the image session, the codec only ever holds a borrowed handle.

use bitflags::bitflags;
use std::error;
use std::fmt;

bitflags! {
    /// In-memory classification of one chunk's data range.
    #[derive(Default)]
    pub struct RangeFlags: u32 {
        /// The chunk payload is deflate compressed.
        const IS_COMPRESSED     = 0x01;
        /// The chunk payload is followed by an Adler-32 checksum.
        const HAS_CHECKSUM      = 0x02;
        /// The chunk payload is an 8-byte repeating pattern stored inline
        /// in the table entry itself.
        const USES_PATTERN_FILL = 0x04;
        /// The table geometry for this chunk was damaged.
        const IS_CORRUPTED      = 0x08;
        /// The whole table this chunk came from is untrustworthy.
        const IS_TAINTED        = 0x10;
    }
}

/// Physical location of one chunk within the segment file pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChunkDataRange {
    /// Handle of the segment file holding the chunk data.
    pub pool_entry: u32,
    /// Byte position of the chunk data within that segment file.
    pub offset: u64,
    /// Byte length of the chunk data on disk.
    pub size: u64,
    pub flags: RangeFlags,
}

/// Failure surfaced by a [`ChunkList`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkListError {
    pub index: usize,
    pub len: usize,
}

impl fmt::Display for ChunkListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk index {} out of bounds for list of {} entries",
            self.index, self.len
        )
    }
}

impl error::Error for ChunkListError {}

/// The ordered, randomly-indexable chunk index consumed and produced by
/// the table codec.
///
/// Logical indices are assigned by [`append`](ChunkList::append) and are
/// stable for the lifetime of the list. Implementations only have to be
/// safe for a single writer per index range; the codec never shares an
/// append cursor across threads.
pub trait ChunkList {
    /// Appends a descriptor, returning its logical index.
    fn append(&mut self, range: ChunkDataRange) -> Result<usize, ChunkListError>;

    /// Assigns the contiguous logical media range covered by a chunk.
    fn set_mapped_range(
        &mut self,
        index: usize,
        mapped_offset: u64,
        mapped_size: u64,
    ) -> Result<(), ChunkListError>;

    fn get(&self, index: usize) -> Result<ChunkDataRange, ChunkListError>;

    fn set(&mut self, index: usize, range: ChunkDataRange) -> Result<(), ChunkListError>;
}

#[derive(Debug, Copy, Clone)]
struct ChunkEntry {
    range: ChunkDataRange,
    mapped_offset: u64,
    mapped_size: u64,
}

/// Growable in-memory [`ChunkList`] used by the image session layer.
#[derive(Debug, Default)]
pub struct ImageChunkList {
    entries: Vec<ChunkEntry>,
}

impl ImageChunkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        ImageChunkList {
            entries: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The logical media range assigned to a chunk, as
    /// `(mapped_offset, mapped_size)`.
    pub fn mapped_range(&self, index: usize) -> Result<(u64, u64), ChunkListError> {
        let entry = self.entry(index)?;
        Ok((entry.mapped_offset, entry.mapped_size))
    }

    /// Looks up the chunk whose mapped range contains `media_offset`.
    pub fn range_at(&self, media_offset: u64) -> Option<(usize, ChunkDataRange)> {
        let index = self
            .entries
            .binary_search_by(|entry| {
                if media_offset < entry.mapped_offset {
                    std::cmp::Ordering::Greater
                } else if media_offset >= entry.mapped_offset + entry.mapped_size {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        Some((index, self.entries[index].range))
    }

    fn entry(&self, index: usize) -> Result<&ChunkEntry, ChunkListError> {
        let len = self.entries.len();
        self.entries.get(index).ok_or(ChunkListError { index, len })
    }
}

impl ChunkList for ImageChunkList {
    fn append(&mut self, range: ChunkDataRange) -> Result<usize, ChunkListError> {
        let index = self.entries.len();
        self.entries.push(ChunkEntry {
            range,
            mapped_offset: 0,
            mapped_size: 0,
        });
        Ok(index)
    }

    fn set_mapped_range(
        &mut self,
        index: usize,
        mapped_offset: u64,
        mapped_size: u64,
    ) -> Result<(), ChunkListError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(ChunkListError { index, len })?;
        entry.mapped_offset = mapped_offset;
        entry.mapped_size = mapped_size;
        Ok(())
    }

    fn get(&self, index: usize) -> Result<ChunkDataRange, ChunkListError> {
        Ok(self.entry(index)?.range)
    }

    fn set(&mut self, index: usize, range: ChunkDataRange) -> Result<(), ChunkListError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(ChunkListError { index, len })?;
        entry.range = range;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(offset: u64, size: u64) -> ChunkDataRange {
        ChunkDataRange {
            pool_entry: 0,
            offset,
            size,
            flags: RangeFlags::HAS_CHECKSUM,
        }
    }

    #[test]
    fn append_assigns_sequential_indices() {
        let mut list = ImageChunkList::new();
        assert_eq!(list.append(range(0, 10)).unwrap(), 0);
        assert_eq!(list.append(range(10, 10)).unwrap(), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().offset, 10);
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut list = ImageChunkList::new();
        list.append(range(0, 10)).unwrap();

        let err = list.get(3).unwrap_err();
        assert_eq!(err, ChunkListError { index: 3, len: 1 });
        assert!(list.set(3, range(0, 1)).is_err());
        assert!(list.set_mapped_range(3, 0, 1).is_err());
    }

    #[test]
    fn set_replaces_data_range_only() {
        let mut list = ImageChunkList::new();
        list.append(range(100, 10)).unwrap();
        list.set_mapped_range(0, 0, 32768).unwrap();

        list.set(0, range(200, 20)).unwrap();
        assert_eq!(list.get(0).unwrap().offset, 200);
        assert_eq!(list.mapped_range(0).unwrap(), (0, 32768));
    }

    #[test]
    fn range_at_finds_containing_chunk() {
        let mut list = ImageChunkList::new();
        for i in 0..4u64 {
            let index = list.append(range(1000 + i * 100, 100)).unwrap();
            list.set_mapped_range(index, i * 32768, 32768).unwrap();
        }

        let (index, found) = list.range_at(2 * 32768 + 17).unwrap();
        assert_eq!(index, 2);
        assert_eq!(found.offset, 1200);
        assert_eq!(list.range_at(0).unwrap().0, 0);
        assert!(list.range_at(4 * 32768).is_none());
    }
}

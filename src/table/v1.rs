//! Version 1 table decoding.

use slog::Logger;
use snafu::{ensure, ResultExt};

use super::ChunkGroup;
use crate::chunk_list::{ChunkDataRange, ChunkList, RangeFlags};
use crate::errors::*;
use crate::section::TableSection;
use repr::table::{EntryV1, ENTRY_V1_SIZE};

/// Geometry of one chunk derived from a pair of consecutive entries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) struct ChunkGeometry {
    pub offset: u32,
    pub size: u32,
    pub is_compressed: bool,
    pub corrupted: bool,
}

/// The final entry carries no size of its own; see
/// [`infer_last_chunk_size`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) struct LastChunkGeometry {
    pub offset: u32,
    pub is_compressed: bool,
}

/// Streaming decoder for packed version 1 entries.
///
/// Decoded offsets normally increase monotonically, but EnCase 6.7 kept
/// writing the compressed flag into bit 31 after a segment file grew past
/// 2 GiB, so the masked offsets of such tables jump backwards while the
/// raw stored values keep increasing. The first time the running offset
/// plus chunk size crosses the 31-bit maximum the stream stops masking
/// for good: every following stored value is taken as the full offset and
/// the compressed flag is pinned to false.
pub(super) struct EntryStreamV1<'a> {
    data: &'a [u8],
    number_of_entries: u32,
    logger: &'a Logger,
    index: u32,
    stored: u32,
    overflow: bool,
    is_compressed: bool,
}

impl<'a> EntryStreamV1<'a> {
    pub fn new(data: &'a [u8], number_of_entries: u32, logger: &'a Logger) -> Self {
        EntryStreamV1 {
            data,
            number_of_entries,
            logger,
            index: 0,
            stored: EntryV1::read(data, 0).stored(),
            overflow: false,
            is_compressed: false,
        }
    }

    #[cfg(test)]
    pub fn in_overflow(&self) -> bool {
        self.overflow
    }

    fn current_offset(&mut self) -> u32 {
        let entry = EntryV1(self.stored);
        if self.overflow {
            entry.stored()
        } else {
            self.is_compressed = entry.is_compressed();
            entry.offset()
        }
    }

    /// Decodes the next chunk that still has a following entry; `None`
    /// once only the final entry remains.
    pub fn next_chunk(&mut self) -> Option<ChunkGeometry> {
        if self.index + 1 >= self.number_of_entries {
            return None;
        }
        let current_offset = self.current_offset();

        self.stored = EntryV1::read(self.data, self.index as usize + 1).stored();
        let next_offset = if self.overflow {
            self.stored
        } else {
            EntryV1(self.stored).offset()
        };
        let mut corrupted = false;

        let size = if next_offset < current_offset {
            // A backwards jump with the raw stored value still ahead of
            // the current offset is the 2 GiB wrap; anything else is
            // broken geometry.
            if self.stored < current_offset {
                slog::debug!(
                    self.logger,
                    "chunk offset exceeds stored next offset";
                    "table_entry_index" => self.index,
                    "chunk_data_offset" => current_offset,
                    "stored_next_offset" => self.stored,
                );
                corrupted = true;
            }
            self.stored.wrapping_sub(current_offset)
        } else {
            next_offset - current_offset
        };
        if size == 0 {
            slog::debug!(
                self.logger,
                "invalid chunk size value is zero";
                "table_entry_index" => self.index,
            );
            corrupted = true;
        } else if size > i32::MAX as u32 {
            slog::debug!(
                self.logger,
                "invalid chunk size value exceeds maximum";
                "table_entry_index" => self.index,
                "chunk_data_size" => size,
            );
            corrupted = true;
        }
        let geometry = ChunkGeometry {
            offset: current_offset,
            size,
            is_compressed: self.is_compressed,
            corrupted,
        };

        if !self.overflow && current_offset.wrapping_add(size) > i32::MAX as u32 {
            slog::debug!(
                self.logger,
                "chunk data offsets overflow into the compressed flag bit";
                "table_entry_index" => self.index,
                "chunk_data_offset" => current_offset,
            );
            self.overflow = true;
            self.is_compressed = false;
        }
        self.index += 1;
        Some(geometry)
    }

    /// Decodes the final entry.
    pub fn last_chunk(&mut self) -> LastChunkGeometry {
        let offset = self.current_offset();
        LastChunkGeometry {
            offset,
            is_compressed: self.is_compressed,
        }
    }
}

/// Derives the byte extent of the final chunk from the section framing.
///
/// Original EWF and its smart variant fill the section with chunk data up
/// to the end offset; every later variant stores the chunk data before
/// the section. Zero means the extent could not be determined.
pub(super) fn infer_last_chunk_size(
    last_chunk_offset: i64,
    table_section: &TableSection,
    logger: &Logger,
) -> i64 {
    if last_chunk_offset < table_section.start_offset {
        table_section.start_offset - last_chunk_offset
    } else if last_chunk_offset < table_section.end_offset {
        table_section.end_offset - last_chunk_offset
    } else {
        slog::debug!(
            logger,
            "last chunk offset exceeds table section end offset";
            "last_chunk_offset" => last_chunk_offset,
            "section_end_offset" => table_section.end_offset,
        );
        0
    }
}

/// Classifies an inferred last chunk size, returning the physical extent
/// to record and whether the geometry is damaged.
pub(super) fn classify_last_chunk_size(
    last_chunk_size: i64,
    logger: &Logger,
) -> (u64, bool) {
    if last_chunk_size <= 0 {
        slog::debug!(logger, "invalid last chunk size value is zero or less");
        (0, true)
    } else if last_chunk_size > i64::from(i32::MAX) {
        slog::debug!(
            logger,
            "invalid last chunk size value exceeds maximum";
            "chunk_data_size" => last_chunk_size,
        );
        (last_chunk_size as u64, true)
    } else {
        (last_chunk_size as u64, false)
    }
}

pub(super) fn validate_entries_v1(
    base_offset: i64,
    number_of_entries: u32,
    table_entries_data: &[u8],
) -> Result<()> {
    ensure!(base_offset >= 0, InvalidBaseOffset { base_offset });
    ensure!(number_of_entries > 0, EmptyTable);
    let required = number_of_entries as usize * ENTRY_V1_SIZE;
    ensure!(
        table_entries_data.len() >= required,
        ShortEntriesData {
            number_of_entries,
            data_size: table_entries_data.len(),
        }
    );
    Ok(())
}

impl ChunkGroup {
    /// Fills the chunk list from the version 1 table entries of one
    /// section.
    ///
    /// `tainted` marks every produced descriptor as coming from an
    /// untrustworthy table, e.g. a backup copy read because the primary
    /// failed its checksum. Damaged geometry is recorded per chunk via
    /// [`RangeFlags::IS_CORRUPTED`] and never fails the call; only
    /// structural problems with the table itself do.
    pub fn fill_v1<L>(
        &self,
        chunks_list: &mut L,
        table_section: &TableSection,
        base_offset: i64,
        number_of_entries: u32,
        table_entries_data: &[u8],
        tainted: bool,
    ) -> Result<()>
    where
        L: ChunkList + ?Sized,
    {
        validate_entries_v1(base_offset, number_of_entries, table_entries_data)?;
        let base_offset = base_offset as u64;

        let mut stream = EntryStreamV1::new(table_entries_data, number_of_entries, &self.logger);
        let mut entry_index = 0;
        let mut media_offset = 0u64;

        while let Some(geometry) = stream.next_chunk() {
            let mut flags = if geometry.is_compressed {
                RangeFlags::IS_COMPRESSED
            } else {
                RangeFlags::HAS_CHECKSUM
            };
            if geometry.corrupted {
                flags |= RangeFlags::IS_CORRUPTED;
            }
            if tainted {
                flags |= RangeFlags::IS_TAINTED;
            }
            let range = ChunkDataRange {
                pool_entry: self.pool_entry,
                offset: base_offset + u64::from(geometry.offset),
                size: u64::from(geometry.size),
                flags,
            };
            self.append_mapped(chunks_list, entry_index, range, &mut media_offset)?;
            entry_index += 1;
        }

        let last = stream.last_chunk();
        let last_chunk_offset = base_offset + u64::from(last.offset);
        ensure!(
            last_chunk_offset <= i64::MAX as u64,
            LastChunkOffsetOutOfBounds {
                offset: last_chunk_offset,
            }
        );
        let last_chunk_size =
            infer_last_chunk_size(last_chunk_offset as i64, table_section, &self.logger);
        let (size, corrupted) = classify_last_chunk_size(last_chunk_size, &self.logger);

        let mut flags = if last.is_compressed {
            RangeFlags::IS_COMPRESSED
        } else {
            RangeFlags::HAS_CHECKSUM
        };
        if corrupted {
            flags |= RangeFlags::IS_CORRUPTED;
        }
        if tainted {
            flags |= RangeFlags::IS_TAINTED;
        }
        let range = ChunkDataRange {
            pool_entry: self.pool_entry,
            offset: last_chunk_offset,
            size,
            flags,
        };
        self.append_mapped(chunks_list, entry_index, range, &mut media_offset)?;
        Ok(())
    }

    /// Appends a descriptor and assigns it the next chunk-sized slice of
    /// the logical media.
    pub(super) fn append_mapped<L>(
        &self,
        chunks_list: &mut L,
        entry_index: usize,
        range: ChunkDataRange,
        media_offset: &mut u64,
    ) -> Result<()>
    where
        L: ChunkList + ?Sized,
    {
        slog::trace!(
            self.logger,
            "table entry";
            "table_entry_index" => entry_index,
            "chunk_data_offset" => range.offset,
            "chunk_data_size" => range.size,
            "range_flags" => ?range.flags,
        );
        let index = chunks_list.append(range).context(AppendChunk {
            index: entry_index,
        })?;
        chunks_list
            .set_mapped_range(index, *media_offset, u64::from(self.chunk_size))
            .context(SetMappedRange { index })?;
        *media_offset += u64::from(self.chunk_size);
        Ok(())
    }
}

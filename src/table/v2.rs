//! Version 2 table decoding.

use super::ChunkGroup;
use crate::chunk_list::{ChunkDataRange, ChunkList, RangeFlags};
use crate::errors::*;
use crate::section::TableSection;
use repr::table::{ChunkDataFlags, EntryV2, ENTRY_V2_SIZE, HEADER_V2_SIZE};

/// Length of the repeating pattern a pattern-fill entry stores in place
/// of its offset field.
const PATTERN_FILL_SIZE: u64 = 8;

impl ChunkGroup {
    /// Fills the chunk list from the version 2 table entries of one
    /// section.
    ///
    /// Offsets and sizes are explicit in this format and are taken
    /// as-is; the plausibility checks of the version 1 path have no
    /// counterpart here. Flag bits outside the known set pass through
    /// unvalidated. Trailing bytes that do not make up a whole entry are
    /// ignored.
    pub fn fill_v2<L>(
        &self,
        chunks_list: &mut L,
        table_section: &TableSection,
        table_entries_data: &[u8],
        tainted: bool,
    ) -> Result<()>
    where
        L: ChunkList + ?Sized,
    {
        let number_of_entries = table_entries_data.len() / ENTRY_V2_SIZE;
        let mut media_offset = 0u64;

        for entry_index in 0..number_of_entries {
            let entry = EntryV2::read(table_entries_data, entry_index);
            let chunk_data_flags = entry.chunk_data_flags();

            let mut flags = RangeFlags::empty();
            if chunk_data_flags.contains(ChunkDataFlags::IS_COMPRESSED) {
                flags |= RangeFlags::IS_COMPRESSED;
                if chunk_data_flags.contains(ChunkDataFlags::USES_PATTERN_FILL) {
                    flags |= RangeFlags::USES_PATTERN_FILL;
                }
            }
            if chunk_data_flags.contains(ChunkDataFlags::HAS_CHECKSUM) {
                flags |= RangeFlags::HAS_CHECKSUM;
            }
            if tainted {
                flags |= RangeFlags::IS_TAINTED;
            }
            if entry.reserved_flags() != 0 {
                slog::debug!(
                    self.logger,
                    "unsupported chunk data flags";
                    "table_entry_index" => entry_index,
                    "chunk_data_flags" => entry.flags,
                );
            }

            let (offset, size) = if flags.contains(RangeFlags::USES_PATTERN_FILL) {
                // The pattern is stored in the entry itself; point the
                // range at the entry's own position in the file.
                let entry_offset = table_section.start_offset
                    + HEADER_V2_SIZE as i64
                    + (entry_index * ENTRY_V2_SIZE) as i64;
                (entry_offset as u64, PATTERN_FILL_SIZE)
            } else {
                (entry.offset, u64::from(entry.size))
            };

            let range = ChunkDataRange {
                pool_entry: self.pool_entry,
                offset,
                size,
                flags,
            };
            self.append_mapped(chunks_list, entry_index, range, &mut media_offset)?;
        }
        Ok(())
    }
}

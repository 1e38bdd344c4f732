//! Serialization of a chunk list back into packed table entries.

use snafu::{ensure, OptionExt, ResultExt};

use super::FormatVersion;
use crate::chunk_list::{ChunkList, RangeFlags};
use crate::errors::*;
use repr::table::{ChunkDataFlags, EntryV1, EntryV2};

/// Serializes the first `number_of_entries` chunk descriptors of
/// `chunks_list` into on-disk table entries.
///
/// Geometry that does not fit the requested format fails the call rather
/// than being silently truncated: an image whose chunk offsets cannot be
/// expressed in 31 bits relative to `base_offset` has to be written as
/// format version 2 instead. `base_offset` is ignored by version 2,
/// which stores absolute offsets.
///
/// Corruption and taint are in-memory classifications and are not
/// written out; a serialized table always claims its chunks are intact.
pub fn write_table_entries<L>(
    chunks_list: &L,
    format_version: FormatVersion,
    table_entries_data: &mut [u8],
    number_of_entries: u32,
    base_offset: i64,
) -> Result<()>
where
    L: ChunkList + ?Sized,
{
    ensure!(base_offset >= 0, InvalidBaseOffset { base_offset });
    let required = number_of_entries as usize * format_version.entry_size();
    ensure!(
        required <= table_entries_data.len(),
        ShortEntriesBuffer {
            required,
            data_size: table_entries_data.len(),
        }
    );

    for index in 0..number_of_entries as usize {
        let range = chunks_list.get(index).context(GetChunk { index })?;

        match format_version {
            FormatVersion::One => {
                let relative = range
                    .offset
                    .checked_sub(base_offset as u64)
                    .filter(|&offset| offset <= i32::MAX as u64)
                    .context(OffsetOutOfBounds { index, base_offset })?;
                let compressed = range.flags.contains(RangeFlags::IS_COMPRESSED);
                EntryV1::new(relative as u32, compressed).write(table_entries_data, index);
            }
            FormatVersion::Two => {
                ensure!(
                    range.size <= u64::from(u32::MAX),
                    SizeOutOfBounds {
                        index,
                        size: range.size,
                    }
                );
                let mut chunk_data_flags = ChunkDataFlags::empty();
                if range.flags.contains(RangeFlags::IS_COMPRESSED) {
                    chunk_data_flags |= ChunkDataFlags::IS_COMPRESSED;
                }
                if range.flags.contains(RangeFlags::HAS_CHECKSUM) {
                    chunk_data_flags |= ChunkDataFlags::HAS_CHECKSUM;
                }
                if range.flags.contains(RangeFlags::USES_PATTERN_FILL) {
                    chunk_data_flags |= ChunkDataFlags::USES_PATTERN_FILL;
                }
                let entry = EntryV2 {
                    offset: range.offset,
                    size: range.size as u32,
                    flags: chunk_data_flags.bits(),
                };
                entry.write(table_entries_data, index);
            }
        }
    }
    Ok(())
}

//! Reconciliation of an already-filled chunk list against the redundant
//! backup table some segment files carry.

use snafu::{ensure, ResultExt};

use super::v1::{
    classify_last_chunk_size, infer_last_chunk_size, validate_entries_v1, EntryStreamV1,
};
use super::ChunkGroup;
use crate::chunk_list::{ChunkDataRange, ChunkList, RangeFlags};
use crate::errors::*;
use crate::section::TableSection;

/// Whether a freshly decoded backup entry should replace the descriptor
/// already in the list.
///
/// A mismatching backup wins when it reports no problems of its own, or
/// when the list entry is already known bad and the backup is not. A
/// matching backup clears an existing taint: two independently stored
/// copies agreeing is as good as a clean read.
fn should_update(mismatch: bool, corrupted: bool, tainted: bool, existing: RangeFlags) -> bool {
    if mismatch {
        (!corrupted && !tainted) || (existing.contains(RangeFlags::IS_CORRUPTED) && !corrupted)
    } else {
        existing.contains(RangeFlags::IS_TAINTED)
    }
}

impl ChunkGroup {
    /// Compares the version 1 backup table entries of one section against
    /// the chunk list and overwrites descriptors the backup is in a
    /// better position to describe.
    ///
    /// Indices line up with the primary table decoded by
    /// [`fill_v1`](ChunkGroup::fill_v1): entry `i` here describes the
    /// chunk at list index `i`. Mapped ranges are left untouched, only
    /// the data ranges change.
    pub fn correct_v1<L>(
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

        while let Some(geometry) = stream.next_chunk() {
            let mut flags = RangeFlags::HAS_CHECKSUM;
            if geometry.is_compressed {
                flags |= RangeFlags::IS_COMPRESSED;
            }
            if geometry.corrupted {
                flags |= RangeFlags::IS_CORRUPTED;
            }
            if tainted {
                flags |= RangeFlags::IS_TAINTED;
            }
            self.reconcile_entry(
                chunks_list,
                entry_index,
                base_offset + u64::from(geometry.offset),
                u64::from(geometry.size),
                flags,
                geometry.corrupted,
                tainted,
            )?;
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
        // The backup table itself sits between the chunk data and the
        // boundary used for the inference, so its on-disk size is not
        // part of the final chunk.
        let last_chunk_size =
            infer_last_chunk_size(last_chunk_offset as i64, table_section, &self.logger)
                - table_section.size as i64;
        let (size, corrupted) = classify_last_chunk_size(last_chunk_size, &self.logger);

        let mut flags = RangeFlags::HAS_CHECKSUM;
        if last.is_compressed {
            flags |= RangeFlags::IS_COMPRESSED;
        }
        if corrupted {
            flags |= RangeFlags::IS_CORRUPTED;
        }
        if tainted {
            flags |= RangeFlags::IS_TAINTED;
        }
        self.reconcile_entry(
            chunks_list,
            entry_index,
            last_chunk_offset,
            size,
            flags,
            corrupted,
            tainted,
        )?;
        Ok(())
    }

    fn reconcile_entry<L>(
        &self,
        chunks_list: &mut L,
        index: usize,
        offset: u64,
        size: u64,
        flags: RangeFlags,
        corrupted: bool,
        tainted: bool,
    ) -> Result<()>
    where
        L: ChunkList + ?Sized,
    {
        let existing = chunks_list.get(index).context(GetChunk { index })?;

        let mismatch = if existing.offset != offset {
            slog::debug!(
                self.logger,
                "chunk data offset mismatch";
                "chunk_index" => index,
                "in_list" => existing.offset,
                "in_backup" => offset,
            );
            true
        } else if existing.size != size {
            slog::debug!(
                self.logger,
                "chunk data size mismatch";
                "chunk_index" => index,
                "in_list" => existing.size,
                "in_backup" => size,
            );
            true
        } else if (existing.flags & RangeFlags::IS_COMPRESSED)
            != (flags & RangeFlags::IS_COMPRESSED)
        {
            slog::debug!(
                self.logger,
                "chunk compression flag mismatch";
                "chunk_index" => index,
            );
            true
        } else {
            false
        };

        if should_update(mismatch, corrupted, tainted, existing.flags) {
            let range = ChunkDataRange {
                pool_entry: self.pool_entry,
                offset,
                size,
                flags,
            };
            chunks_list.set(index, range).context(SetChunk { index })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_list::ImageChunkList;
    use byteorder::{ByteOrder, LittleEndian};
    use repr::table::{EntryV1, ENTRY_V1_SIZE};

    fn entries(stored: &[u32]) -> Vec<u8> {
        let mut data = vec![0u8; stored.len() * ENTRY_V1_SIZE];
        LittleEndian::write_u32_into(stored, &mut data);
        data
    }

    fn group() -> ChunkGroup {
        ChunkGroup::new(32768, 0)
    }

    // Fills a three-chunk list with offsets base+0, base+100, base+250
    // and sizes 100, 150, 75.
    fn filled_list(tainted: bool) -> (ImageChunkList, TableSection) {
        let table_section = TableSection {
            start_offset: 1325,
            end_offset: 1361,
            size: 36,
        };
        let data = entries(&[0, 100, 250]);
        let mut chunks = ImageChunkList::new();
        group()
            .fill_v1(&mut chunks, &table_section, 1000, 3, &data, tainted)
            .unwrap();
        (chunks, table_section)
    }

    // A backup section framed so that the last chunk comes out at the
    // same 75 bytes the primary produced: the inference yields
    // start_offset - last_offset and the section size is subtracted
    // on top of it.
    fn backup_section() -> TableSection {
        TableSection {
            start_offset: 1361,
            end_offset: 1397,
            size: 36,
        }
    }

    #[test]
    fn matching_backup_leaves_list_untouched() {
        let (mut chunks, _) = filled_list(false);
        let data = entries(&[0, 100, 250]);

        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, false)
            .unwrap();

        // Untouched means the fill-style flags survive, not the
        // checksum-always flags an overwrite would leave behind.
        for index in 0..3 {
            assert_eq!(chunks.get(index).unwrap().flags, RangeFlags::HAS_CHECKSUM);
        }
        assert_eq!(chunks.get(1).unwrap().size, 150);
    }

    #[test]
    fn clean_mismatching_backup_overwrites() {
        let (mut chunks, _) = filled_list(false);
        // Compressed flag differs on the middle entry.
        let data = entries(&[0, 100 | EntryV1::COMPRESSED_FLAG, 250]);

        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, false)
            .unwrap();

        let range = chunks.get(1).unwrap();
        assert_eq!(
            range.flags,
            RangeFlags::HAS_CHECKSUM | RangeFlags::IS_COMPRESSED
        );
        assert_eq!(range.offset, 1100);
        // The matching neighbours stay as the primary wrote them.
        assert_eq!(chunks.get(0).unwrap().flags, RangeFlags::HAS_CHECKSUM);
    }

    #[test]
    fn backup_geometry_replaces_mismatching_entries() {
        let (mut chunks, _) = filled_list(false);
        // Moving the middle offset changes the sizes of chunks 0 and 1.
        let data = entries(&[0, 120, 250]);

        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, false)
            .unwrap();

        assert_eq!(chunks.get(0).unwrap().size, 120);
        let range = chunks.get(1).unwrap();
        assert_eq!(range.offset, 1120);
        assert_eq!(range.size, 130);
        // Mapped ranges are not the reconciler's business.
        assert_eq!(chunks.mapped_range(1).unwrap(), (32768, 32768));
    }

    #[test]
    fn corrupted_backup_never_overwrites_clean_entries() {
        let (mut chunks, _) = filled_list(false);
        // Duplicate offsets make chunk 0 of the backup zero-sized.
        let data = entries(&[0, 0, 250]);

        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, false)
            .unwrap();

        let range = chunks.get(0).unwrap();
        assert_eq!(range.size, 100);
        assert!(!range.flags.contains(RangeFlags::IS_CORRUPTED));
    }

    #[test]
    fn clean_backup_replaces_corrupted_entries() {
        let table_section = TableSection {
            start_offset: 1325,
            end_offset: 1361,
            size: 36,
        };
        // Duplicate offsets corrupt chunk 0 of the primary.
        let primary = entries(&[0, 0, 250]);
        let mut chunks = ImageChunkList::new();
        group()
            .fill_v1(&mut chunks, &table_section, 1000, 3, &primary, false)
            .unwrap();
        assert!(chunks.get(0).unwrap().flags.contains(RangeFlags::IS_CORRUPTED));

        let backup = entries(&[0, 100, 250]);
        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &backup, false)
            .unwrap();

        let range = chunks.get(0).unwrap();
        assert_eq!(range.size, 100);
        assert!(!range.flags.contains(RangeFlags::IS_CORRUPTED));
    }

    #[test]
    fn agreeing_backup_clears_taint() {
        let (mut chunks, _) = filled_list(true);
        assert!(chunks.get(0).unwrap().flags.contains(RangeFlags::IS_TAINTED));

        let data = entries(&[0, 100, 250]);
        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, false)
            .unwrap();

        for index in 0..3 {
            assert!(!chunks.get(index).unwrap().flags.contains(RangeFlags::IS_TAINTED));
        }
    }

    #[test]
    fn tainted_backup_never_wins_a_mismatch() {
        let (mut chunks, _) = filled_list(false);
        let data = entries(&[0, 120, 250]);

        group()
            .correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, true)
            .unwrap();

        assert_eq!(chunks.get(0).unwrap().size, 100);
        assert_eq!(chunks.get(1).unwrap().offset, 1100);
    }

    #[test]
    fn last_chunk_size_excludes_backup_section() {
        let table_section = TableSection {
            start_offset: 2000,
            end_offset: 2024,
            size: 24,
        };
        let data = entries(&[1000]);
        let mut chunks = ImageChunkList::new();
        let group = group();
        group
            .fill_v1(&mut chunks, &table_section, 0, 1, &data, false)
            .unwrap();
        assert_eq!(chunks.get(0).unwrap().size, 1000);

        let backup_section = TableSection {
            start_offset: 2024,
            end_offset: 2048,
            size: 24,
        };
        group
            .correct_v1(&mut chunks, &backup_section, 0, 1, &data, false)
            .unwrap();

        assert_eq!(chunks.get(0).unwrap().size, 1000);
    }

    #[test]
    fn reconciling_a_short_list_is_fatal() {
        let mut chunks = ImageChunkList::new();
        let data = entries(&[0, 100, 250]);

        let result = group().correct_v1(&mut chunks, &backup_section(), 1000, 3, &data, false);
        assert!(result.is_err());
    }

    #[test]
    fn update_policy() {
        let clean = RangeFlags::HAS_CHECKSUM;
        assert!(should_update(true, false, false, clean));
        assert!(!should_update(true, true, false, clean));
        assert!(!should_update(true, false, true, clean));
        assert!(!should_update(true, true, false, clean | RangeFlags::IS_CORRUPTED));
        assert!(should_update(true, false, true, clean | RangeFlags::IS_CORRUPTED));
        assert!(!should_update(false, false, false, clean));
        assert!(should_update(false, false, false, clean | RangeFlags::IS_TAINTED));
    }
}

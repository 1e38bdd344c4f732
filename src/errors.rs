use snafu::Snafu;

use crate::chunk_list::ChunkListError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub struct Error(ErrorInner);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum ErrorInner {
    #[snafu(display("Invalid base offset: {}", base_offset))]
    InvalidBaseOffset { base_offset: i64 },
    #[snafu(display("Table must contain at least one entry"))]
    EmptyTable,
    #[snafu(display(
        "Table declares {} entries but only {} bytes of entry data are present",
        number_of_entries,
        data_size
    ))]
    ShortEntriesData {
        number_of_entries: u32,
        data_size: usize,
    },
    #[snafu(display(
        "Table entries require {} bytes but the destination holds {}",
        required,
        data_size
    ))]
    ShortEntriesBuffer { required: usize, data_size: usize },
    #[snafu(display("Unsupported table format version: {}", version))]
    UnsupportedFormatVersion { version: u8 },
    #[snafu(display("Invalid last chunk offset {:#x} exceeds maximum", offset))]
    LastChunkOffsetOutOfBounds { offset: u64 },
    #[snafu(display(
        "Chunk {} offset is not representable relative to base offset {}",
        index,
        base_offset
    ))]
    OffsetOutOfBounds { index: usize, base_offset: i64 },
    #[snafu(display("Chunk {} size {} does not fit in a table entry", index, size))]
    SizeOutOfBounds { index: usize, size: u64 },
    #[snafu(display("Unable to append chunk {} to the chunks list: {}", index, source))]
    AppendChunk {
        index: usize,
        source: ChunkListError,
    },
    #[snafu(display("Unable to set mapped range of chunk {}: {}", index, source))]
    SetMappedRange {
        index: usize,
        source: ChunkListError,
    },
    #[snafu(display("Unable to retrieve chunk {} from the chunks list: {}", index, source))]
    GetChunk {
        index: usize,
        source: ChunkListError,
    },
    #[snafu(display("Unable to set chunk {} in the chunks list: {}", index, source))]
    SetChunk {
        index: usize,
        source: ChunkListError,
    },
}

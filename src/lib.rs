//! Codec for the chunk tables of EWF (Expert Witness compression Format)
//! evidence files.
//!
//! The surrounding format layer parses a table section out of a segment
//! file and hands its raw entry bytes to a [`ChunkGroup`], which appends
//! one descriptor per chunk to a shared [chunk list](chunk_list). When a
//! segment carries a redundant backup table, [`ChunkGroup::correct_v1`]
//! merges it into the already-populated index. [`write_table_entries`] is
//! the reverse path used when producing new evidence files.
//!
//! Damaged table geometry is never an error here: whatever can still be
//! read is recorded on the affected descriptor as
//! [`RangeFlags::IS_CORRUPTED`] / [`RangeFlags::IS_TAINTED`], and the
//! read layer decides whether to zero-fill, decompress anyway, or report
//! a media error.

pub mod chunk_list;
pub mod errors;
pub mod section;
pub mod table;

pub use crate::chunk_list::{ChunkDataRange, ChunkList, ImageChunkList, RangeFlags};
pub use crate::errors::{Error, Result};
pub use crate::section::TableSection;
pub use crate::table::{write_table_entries, ChunkGroup, FormatVersion};

use slog::{Drain, Logger};

pub(crate) fn default_logger() -> Logger {
    Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}

/// Read-only framing of the on-disk section that held a chunk table.
///
/// Produced by the segment-file layer. The codec only needs it to infer
/// the size of the final chunk, which is never stored on disk: depending
/// on the writer generation the chunk data either precedes the table
/// (bounded by `start_offset`) or fills the section up to `end_offset`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableSection {
    /// File offset where the section starts.
    pub start_offset: i64,
    /// File offset one past the end of the section.
    pub end_offset: i64,
    /// Size of the section on disk, including its descriptor.
    pub size: u64,
}

//! On-disk representation of EWF chunk tables.
//!
//! An EWF segment file is a sequence of framed sections. The sections this
//! crate describes are the chunk tables: the `table` section (and its
//! redundant `table2` backup copy) of format version 1, and the
//! `sector table` section of format version 2.
//!
//! * [Version 1 table](table/index.html): a 24-byte header followed by one
//!   packed 4-byte entry per chunk
//! * [Version 2 table](table/index.html): a 32-byte header followed by one
//!   explicit 16-byte entry per chunk
//!
//! All multi-byte fields are little-endian. Field values are exposed
//! through explicit accessors over byte slices; nothing in this crate
//! reinterprets raw memory as structured records.

pub mod table;

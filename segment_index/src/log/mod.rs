//! The sparse offset index of a commit log segment.
//! The segment appends an entry every so often as records are written and uses the index to
//! jump close to a log offset instead of scanning the segment file from its start.

pub mod abstract_index;
pub mod index_config;
pub mod index_entry;
pub mod index_file;
pub mod index_scanner;
pub mod offset_index;

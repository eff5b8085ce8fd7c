#![warn(rust_2018_idioms)]

pub mod common;
pub mod log;

pub use log::abstract_index::AbstractIndex;
pub use log::index_entry::{Entry, ENTRY_WIDTH};
pub use log::index_scanner::IndexScanner;
pub use log::offset_index::{OffsetIndex, OffsetIndexError, OffsetIndexOptions};

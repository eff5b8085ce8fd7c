//! Offset index entries and their on-disk encoding.
//! Each entry is stored as a fixed 12-byte record, big endian:
//! - (4 bytes) offset relative to the base offset of the segment
//! - (4 bytes) physical position of the record inside the segment file
//! - (4 bytes) size of the record at such position
//! Keeping offsets relative to the base offset lets 32-bit fields address a whole segment.

use super::offset_index::OffsetIndexError;
use bytes::{Buf, BufMut};

pub const OFFSET_WIDTH: usize = 4;
pub const POSITION_WIDTH: usize = 4;
pub const SIZE_WIDTH: usize = 4;
pub const ENTRY_WIDTH: usize = OFFSET_WIDTH + POSITION_WIDTH + SIZE_WIDTH;

/// An absolute (log offset, file position, size) triple as seen by callers of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entry {
    /// Logical offset of the record in the log
    pub offset: i64,
    /// Byte position of the record in the segment file
    pub position: i64,
    /// Length in bytes of the record
    pub size: i32,
}

impl Entry {
    pub fn new(offset: i64, position: i64, size: i32) -> Self {
        Self { offset, position, size }
    }
}

/// An `Entry` expressed relative to the base offset of its index, this is what lands on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelativeEntry {
    pub offset: i32,
    pub position: i32,
    pub size: i32,
}

impl RelativeEntry {
    /// Converts an absolute entry into its on-disk form. The offset must not precede
    /// `base_offset` and both the offset spread and the position must fit the 4-byte fields.
    pub fn try_from_entry(entry: &Entry, base_offset: i64) -> Result<Self, OffsetIndexError> {
        let relative = entry.offset.checked_sub(base_offset).filter(|rel| *rel >= 0).ok_or_else(
            || {
                OffsetIndexError::InvalidArgument(format!(
                    "offset {} is below base offset {}",
                    entry.offset, base_offset
                ))
            },
        )?;
        let offset = i32::try_from(relative).map_err(|_| {
            OffsetIndexError::InvalidArgument(format!(
                "offset {} is too far from base offset {} for a relative entry",
                entry.offset, base_offset
            ))
        })?;
        let position = i32::try_from(entry.position).map_err(|_| {
            OffsetIndexError::InvalidArgument(format!(
                "position {} for offset {} does not fit in an index entry",
                entry.position, entry.offset
            ))
        })?;
        Ok(Self { offset, position, size: entry.size })
    }

    pub fn to_entry(self, base_offset: i64) -> Entry {
        Entry {
            offset: base_offset + i64::from(self.offset),
            position: i64::from(self.position),
            size: self.size,
        }
    }

    /// An all-zero slot, which is what the pre-allocated region holds before it is written.
    pub fn is_unwritten(&self) -> bool {
        self.position == 0 && self.size == 0
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.offset);
        buf.put_i32(self.position);
        buf.put_i32(self.size);
    }

    /// Decodes exactly `ENTRY_WIDTH` bytes, callers are in charge of bounds checking.
    pub fn read_from<B: Buf>(buf: &mut B) -> Self {
        let offset = buf.get_i32();
        let position = buf.get_i32();
        let size = buf.get_i32();
        Self { offset, position, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test_log::test]
    fn it_converts_to_relative_and_back() {
        let base_offset = 1_000_000_000_000;
        let entry = Entry::new(base_offset + 42, 4096, 512);
        let rel = RelativeEntry::try_from_entry(&entry, base_offset).unwrap();
        assert_eq!(rel, RelativeEntry { offset: 42, position: 4096, size: 512 });
        assert_eq!(rel.to_entry(base_offset), entry);
    }

    #[test_log::test]
    fn it_encodes_big_endian_fixed_width() {
        let rel = RelativeEntry { offset: 1, position: 0x0102_0304, size: 258 };
        let mut buf = BytesMut::with_capacity(ENTRY_WIDTH);
        rel.write_to(&mut buf);
        assert_eq!(buf.len(), ENTRY_WIDTH);
        assert_eq!(&buf[..], &[0, 0, 0, 1, 1, 2, 3, 4, 0, 0, 1, 2]);
        let mut slice = &buf[..];
        assert_eq!(RelativeEntry::read_from(&mut slice), rel);
        assert!(slice.is_empty());
    }

    #[test_log::test]
    fn it_rejects_offsets_outside_relative_range() {
        let below = RelativeEntry::try_from_entry(&Entry::new(99, 0, 10), 100);
        assert!(matches!(below, Err(OffsetIndexError::InvalidArgument(_))));
        let too_far = RelativeEntry::try_from_entry(&Entry::new(i64::from(i32::MAX) + 1, 0, 1), 0);
        assert!(matches!(too_far, Err(OffsetIndexError::InvalidArgument(_))));
        let bad_position =
            RelativeEntry::try_from_entry(&Entry::new(5, i64::from(i32::MAX) + 1, 1), 0);
        assert!(matches!(bad_position, Err(OffsetIndexError::InvalidArgument(_))));
    }

    #[test_log::test]
    fn it_detects_unwritten_slots() {
        assert!(RelativeEntry::default().is_unwritten());
        // The first record of a segment lives at position 0 but always has a size.
        assert!(!RelativeEntry { offset: 0, position: 0, size: 50 }.is_unwritten());
    }
}

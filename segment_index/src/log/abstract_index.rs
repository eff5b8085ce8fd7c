//! Behavior shared by segment indexes whose entries are stored in increasing offset order in
//! fixed-width slots.

use super::index_entry::Entry;
use super::offset_index::OffsetIndexError;

pub trait AbstractIndex {
    /// The offset of the first record of the segment
    fn base_offset(&self) -> i64;

    /// Number of entries written
    fn entries(&self) -> usize;

    /// Number of slots available in the index file
    fn max_entries(&self) -> usize;

    fn read_entry_at_slot(&self, slot: usize) -> Result<Entry, OffsetIndexError>;

    fn is_empty(&self) -> bool {
        self.entries() == 0
    }

    fn is_full(&self) -> bool {
        self.entries() >= self.max_entries()
    }

    fn last_entry(&self) -> Result<Option<Entry>, OffsetIndexError> {
        match self.entries() {
            0 => Ok(None),
            entries => self.read_entry_at_slot(entries - 1).map(Some),
        }
    }

    /// Finds the entry with the largest offset that is less than or equal to `target_offset`.
    /// The segment can start reading at its position and scan forward to the target.
    /// Returns None if the target is before the first entry of the index.
    fn lookup(&self, target_offset: i64) -> Result<Option<Entry>, OffsetIndexError> {
        let (mut low, mut high) = (0, self.entries());
        while low < high {
            let mid = low + (high - low) / 2;
            if self.read_entry_at_slot(mid)?.offset <= target_offset {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        if low == 0 {
            return Ok(None);
        }
        self.read_entry_at_slot(low - 1).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::offset_index::tests::{empty_index, sample_entries};
    use tempfile::TempDir;

    #[test_log::test]
    fn it_looks_up_the_floor_entry() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 1024);
        assert_eq!(index.lookup(150).unwrap(), None);
        index
            .append(&[Entry::new(100, 0, 50), Entry::new(110, 500, 60), Entry::new(120, 1000, 40)])
            .unwrap();
        assert_eq!(index.lookup(99).unwrap(), None);
        assert_eq!(index.lookup(100).unwrap(), Some(Entry::new(100, 0, 50)));
        assert_eq!(index.lookup(115).unwrap(), Some(Entry::new(110, 500, 60)));
        assert_eq!(index.lookup(120).unwrap(), Some(Entry::new(120, 1000, 40)));
        assert_eq!(index.lookup(i64::MAX).unwrap(), Some(Entry::new(120, 1000, 40)));
    }

    #[test_log::test]
    fn it_reports_counts_and_last_entry() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 5 * 12);
        assert!(index.is_empty());
        assert_eq!(index.last_entry().unwrap(), None);
        assert_eq!(index.max_entries(), 5);
        assert_eq!(index.base_offset(), 100);
        index.append(&sample_entries()).unwrap();
        assert_eq!(index.entries(), 3);
        assert!(!index.is_full());
        assert_eq!(index.last_entry().unwrap(), Some(Entry::new(102, 110, 40)));
    }
}

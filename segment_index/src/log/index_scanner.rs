//! A forward only cursor over the entries of an [`OffsetIndex`].

use super::abstract_index::AbstractIndex;
use super::index_entry::Entry;
use super::offset_index::{OffsetIndex, OffsetIndexError};

#[derive(Debug)]
pub struct IndexScanner<'a> {
    index: &'a OffsetIndex,
    slot: usize,
}

impl<'a> IndexScanner<'a> {
    pub fn new(index: &'a OffsetIndex) -> Self {
        Self { index, slot: 0 }
    }

    /// Returns the entry at the current slot and moves to the next one, whether or not the read
    /// succeeded. An entry sitting at its base offset past the first slot can only be a zeroed
    /// slot, it ends the scan with [`OffsetIndexError::EndOfIndex`] as reading past the position
    /// does.
    pub fn scan(&mut self) -> Result<Entry, OffsetIndexError> {
        let slot = self.slot;
        self.slot += 1;
        let entry = self.index.read_entry_at_slot(slot)?;
        if slot != 0 && entry.offset == self.index.base_offset() {
            return Err(OffsetIndexError::EndOfIndex);
        }
        Ok(entry)
    }
}

impl Iterator for IndexScanner<'_> {
    type Item = Result<Entry, OffsetIndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan() {
            Err(OffsetIndexError::EndOfIndex) => None,
            res => Some(res),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::offset_index::tests::{empty_index, sample_entries, TEST_BASE_OFFSET};
    use crate::log::offset_index::OffsetIndexOptions;
    use tempfile::TempDir;

    #[test_log::test]
    fn it_scans_in_append_order_then_ends() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 1024);
        index.append(&sample_entries()).unwrap();
        let mut scanner = index.scanner();
        for expected in sample_entries() {
            assert_eq!(IndexScanner::scan(&mut scanner).unwrap(), expected);
        }
        assert!(matches!(IndexScanner::scan(&mut scanner), Err(OffsetIndexError::EndOfIndex)));
        assert!(matches!(IndexScanner::scan(&mut scanner), Err(OffsetIndexError::EndOfIndex)));
    }

    #[test_log::test]
    fn it_moves_on_after_reading_past_the_end() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 1024);
        index.append(&sample_entries()).unwrap();
        let mut scanner = index.scanner();
        for _ in 0..3 {
            IndexScanner::scan(&mut scanner).unwrap();
        }
        assert!(matches!(IndexScanner::scan(&mut scanner), Err(OffsetIndexError::EndOfIndex)));
        index.append(&[Entry::new(103, 150, 20), Entry::new(104, 170, 30)]).unwrap();
        // Slot 3 was consumed by the failed read
        assert_eq!(IndexScanner::scan(&mut scanner).unwrap(), Entry::new(104, 170, 30));
        assert!(matches!(IndexScanner::scan(&mut scanner), Err(OffsetIndexError::EndOfIndex)));
    }

    #[test_log::test]
    fn it_moves_on_after_a_slot_at_the_base_offset() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 1024);
        index
            .append(&[
                Entry::new(TEST_BASE_OFFSET, 0, 50),
                Entry::new(TEST_BASE_OFFSET, 50, 10),
                Entry::new(102, 60, 40),
            ])
            .unwrap();
        assert_eq!(index.scanner().count(), 1);
        let mut scanner = index.scanner();
        assert_eq!(IndexScanner::scan(&mut scanner).unwrap(), Entry::new(100, 0, 50));
        assert!(matches!(IndexScanner::scan(&mut scanner), Err(OffsetIndexError::EndOfIndex)));
        assert_eq!(IndexScanner::scan(&mut scanner).unwrap(), Entry::new(102, 60, 40));
        assert!(matches!(IndexScanner::scan(&mut scanner), Err(OffsetIndexError::EndOfIndex)));
    }

    #[test_log::test]
    fn it_scans_an_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 1024);
        assert!(matches!(IndexScanner::scan(&mut index.scanner()), Err(OffsetIndexError::EndOfIndex)));
        assert_eq!(index.scanner().count(), 0);
    }

    #[test_log::test]
    fn it_stops_at_zeroed_slots_inside_the_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("00000000000000000000.index");
        // Without recovery the whole pre-allocated file is readable.
        let index = OffsetIndex::new(OffsetIndexOptions::new(path, 1024, 0)).unwrap();
        let entries: Vec<Entry> = index.scanner().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries, vec![Entry::new(0, 0, 0)]);
    }

    #[test_log::test]
    fn it_iterates_lazily() {
        let dir = TempDir::new().unwrap();
        let index = empty_index(&dir, 1024);
        index.append(&sample_entries()).unwrap();
        let first_two: Vec<Entry> = index.scanner().take(2).map(Result::unwrap).collect();
        assert_eq!(first_two, sample_entries()[..2].to_vec());
        let all: Vec<Entry> = index.scanner().collect::<Result<_, _>>().unwrap();
        assert_eq!(all, sample_entries());
    }
}

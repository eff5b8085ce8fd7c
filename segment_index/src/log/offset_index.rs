//! The offset index of a log segment.
//! An OffsetIndex file contains a set of 12-byte entries (see [`super::index_entry`]) that map a
//! sparse set of log offsets to the position and size of their record in the segment file.
//! The file is pre-allocated to its maximum size and memory mapped, entries are appended
//! contiguously from the start and the `position` marks the first free byte. Bytes after the
//! `position` are not readable even if they still hold data from before a truncation.
//!
//! After an unclean shutdown only the pre-allocated length of the file is known,
//! [`OffsetIndex::initialize_position`] recovers the real `position` by searching for the first
//! all-zero slot. This relies on real entries never having both position 0 and size 0.
//! A crash in the middle of an append that leaves a record with only zero position and size
//! bytes would be taken as the end of the index and that record would be lost.

use super::abstract_index::AbstractIndex;
use super::index_entry::{Entry, RelativeEntry, ENTRY_WIDTH};
use super::index_file::delete_file_if_exists;
use super::index_scanner::IndexScanner;
use bytes::BytesMut;
use fs_err::{File, OpenOptions};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace};
use tracing_attributes::instrument;

/// Size of the index file when no size is requested.
pub const DEFAULT_MAX_INDEX_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum OffsetIndexError {
    #[error("Invalid offset index configuration: {0}")]
    Configuration(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("End of index")]
    EndOfIndex,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Offset index is full: position {position} with capacity {capacity}")]
    IndexFull { position: usize, capacity: usize },
    #[error("Corrupt index file: {0}")]
    CorruptIndex(String),
}

/// Parameters to open an [`OffsetIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetIndexOptions {
    /// The index file, created if it doesn't exist
    pub path: PathBuf,
    /// Requested size of the file, 0 means [`DEFAULT_MAX_INDEX_SIZE`]
    pub bytes: usize,
    /// The offset of the first record in the segment
    pub base_offset: i64,
}

impl OffsetIndexOptions {
    pub fn new(path: PathBuf, bytes: usize, base_offset: i64) -> Self {
        Self { path, bytes, base_offset }
    }
}

/// The mapped file and the boundary of its readable bytes, these change together.
#[derive(Debug)]
struct MappedRegion {
    mmap: MmapMut,
    position: usize,
}

impl MappedRegion {
    /// Decodes slot `slot` ignoring `position`, the caller must keep `slot` under the capacity.
    fn slot(&self, slot: usize) -> RelativeEntry {
        let start = slot * ENTRY_WIDTH;
        let mut bytes = &self.mmap[start..start + ENTRY_WIDTH];
        RelativeEntry::read_from(&mut bytes)
    }
}

#[derive(Debug)]
pub struct OffsetIndex {
    file: File,
    path: PathBuf,
    base_offset: i64,
    capacity: usize,
    read_only: bool,
    region: RwLock<MappedRegion>,
}

fn round_down_to_entry(bytes: usize) -> usize {
    bytes - bytes % ENTRY_WIDTH
}

fn check_path(path: &Path) -> Result<(), OffsetIndexError> {
    if path.as_os_str().is_empty() {
        return Err(OffsetIndexError::Configuration(String::from("index path is empty")));
    }
    Ok(())
}

fn file_length(file: &File) -> Result<usize, OffsetIndexError> {
    let file_len = file.metadata()?.len();
    usize::try_from(file_len).map_err(|_| {
        OffsetIndexError::Configuration(format!("index file length {} is not addressable", file_len))
    })
}

impl OffsetIndex {
    /// Opens or creates the index file and maps it fully. The file is resized to the requested
    /// size rounded down to a multiple of the entry width and the position is set to the end of
    /// it, use [`Self::initialize_position`] to find where the written entries really end.
    #[instrument(skip_all, fields(path = %options.path.display(), base_offset = options.base_offset))]
    pub fn new(options: OffsetIndexOptions) -> Result<Self, OffsetIndexError> {
        let OffsetIndexOptions { path, bytes, base_offset } = options;
        check_path(&path)?;
        let bytes = if bytes == 0 { DEFAULT_MAX_INDEX_SIZE } else { bytes };
        let capacity = round_down_to_entry(bytes);
        if capacity == 0 {
            return Err(OffsetIndexError::Configuration(format!(
                "index size {} cannot hold a single {}-byte entry",
                bytes, ENTRY_WIDTH
            )));
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.set_len(capacity as u64)?;
        let position = file_length(&file)?;
        // SAFETY: The index is the only writer of the file while it's open, the mapping is never
        // handed out and every access is bounds checked against the capacity.
        let mmap = unsafe { MmapOptions::new().len(capacity).map_mut(file.file())? };
        debug!(capacity, position, "Opened offset index");
        Ok(Self {
            file,
            path,
            base_offset,
            capacity,
            read_only: false,
            region: RwLock::new(MappedRegion { mmap, position }),
        })
    }

    /// Maps an existing index file at its current length, for inspection. The file is neither
    /// resized nor written to: the mapping is private, appends and truncations are refused and
    /// [`Self::close`] leaves the file as it found it. The `bytes` option is ignored and the file
    /// must hold a whole number of entries.
    #[instrument(skip_all, fields(path = %options.path.display(), base_offset = options.base_offset))]
    pub fn open_read_only(options: OffsetIndexOptions) -> Result<Self, OffsetIndexError> {
        let OffsetIndexOptions { path, base_offset, .. } = options;
        check_path(&path)?;
        let file = OpenOptions::new().read(true).open(&path)?;
        let capacity = file_length(&file)?;
        if capacity == 0 || capacity % ENTRY_WIDTH != 0 {
            return Err(OffsetIndexError::Configuration(format!(
                "{} is {} bytes, not a whole number of {}-byte entries",
                path.display(),
                capacity,
                ENTRY_WIDTH
            )));
        }
        // SAFETY: Copy-on-write mapping of a file opened for reading, changes to the pages never
        // reach the file and every access is bounds checked against the capacity.
        let mmap = unsafe { MmapOptions::new().len(capacity).map_copy(file.file())? };
        debug!(capacity, "Opened offset index read only");
        Ok(Self {
            file,
            path,
            base_offset,
            capacity,
            read_only: true,
            region: RwLock::new(MappedRegion { mmap, position: capacity }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self) -> Result<(), OffsetIndexError> {
        if self.read_only {
            return Err(OffsetIndexError::InvalidArgument(format!(
                "{} is open read only",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Byte offset of the next free slot
    pub fn write_position(&self) -> usize {
        self.region.read().position
    }

    /// Encodes the entries relative to the base offset and writes them after the last entry.
    /// Entries become visible to readers only once all of them have been copied.
    ///
    /// An entry with both position and size 0 is rejected, recovery would take it for the first
    /// unwritten slot and drop it together with every entry after it. Offsets are expected to
    /// increase from one entry to the next but this is not checked, [`AbstractIndex::lookup`]
    /// returns arbitrary entries for an index that breaks the order.
    pub fn append(&self, entries: &[Entry]) -> Result<(), OffsetIndexError> {
        self.check_writable()?;
        let mut buf = BytesMut::with_capacity(entries.len() * ENTRY_WIDTH);
        for entry in entries {
            let relative = RelativeEntry::try_from_entry(entry, self.base_offset)?;
            if relative.is_unwritten() {
                return Err(OffsetIndexError::InvalidArgument(format!(
                    "entry at offset {} has position 0 and size 0",
                    entry.offset
                )));
            }
            relative.write_to(&mut buf);
        }
        let mut region = self.region.write();
        let start = region.position;
        let end = start + buf.len();
        if end > self.capacity {
            return Err(OffsetIndexError::IndexFull { position: start, capacity: self.capacity });
        }
        region.mmap[start..end].copy_from_slice(&buf);
        region.position = end;
        trace!(entries = entries.len(), position = end, "Appended to offset index");
        Ok(())
    }

    /// Reads the entry stored at byte `file_offset` of the index file. Reading a slot that has
    /// not been written yet results in [`OffsetIndexError::EndOfIndex`].
    pub fn read_entry_at_file_offset(&self, file_offset: usize) -> Result<Entry, OffsetIndexError> {
        let region = self.region.read();
        let end = file_offset
            .checked_add(ENTRY_WIDTH)
            .filter(|end| *end <= region.position)
            .ok_or(OffsetIndexError::EndOfIndex)?;
        let mut bytes = &region.mmap[file_offset..end];
        Ok(RelativeEntry::read_from(&mut bytes).to_entry(self.base_offset))
    }

    /// Reads the `slot`-th entry of the index. This is not a log offset lookup, see
    /// [`AbstractIndex::lookup`] for that.
    pub fn read_entry_at_slot(&self, slot: usize) -> Result<Entry, OffsetIndexError> {
        let file_offset = slot.checked_mul(ENTRY_WIDTH).ok_or(OffsetIndexError::EndOfIndex)?;
        self.read_entry_at_file_offset(file_offset)
    }

    /// Keeps only the first `count` entries. The discarded bytes stay in the file until they are
    /// overwritten by new appends.
    pub fn truncate_entries(&self, count: usize) -> Result<(), OffsetIndexError> {
        self.check_writable()?;
        let mut region = self.region.write();
        let new_position =
            count.checked_mul(ENTRY_WIDTH).filter(|pos| *pos <= region.position).ok_or_else(
                || {
                    OffsetIndexError::InvalidArgument(format!(
                        "cannot truncate to {} entries, index holds {}",
                        count,
                        region.position / ENTRY_WIDTH
                    ))
                },
            )?;
        region.position = new_position;
        debug!(count, position = new_position, "Truncated offset index");
        Ok(())
    }

    /// Flushes the mapped pages and the file metadata to disk. Appends are not durable until
    /// this is called.
    pub fn sync(&self) -> Result<(), OffsetIndexError> {
        if self.read_only {
            return Ok(());
        }
        let region = self.region.read();
        region.mmap.flush()?;
        self.file.sync_all()?;
        trace!(position = region.position, "Synced offset index");
        Ok(())
    }

    /// Syncs and trims the file down to the written entries. A read only index is only unmapped.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn close(self) -> Result<(), OffsetIndexError> {
        self.sync()?;
        let Self { file, region, read_only, .. } = self;
        let MappedRegion { mmap, position } = region.into_inner();
        // The mapping must be gone before the file shrinks under it.
        drop(mmap);
        if read_only {
            debug!(position, "Closed read only offset index");
            return Ok(());
        }
        file.set_len(position as u64)?;
        debug!(position, "Closed offset index");
        Ok(())
    }

    /// Unmaps the index and removes its file. Returns whether there was a file to delete.
    pub fn delete_if_exists(self) -> Result<bool, OffsetIndexError> {
        let Self { file, region, path, .. } = self;
        drop(region);
        drop(file);
        Ok(delete_file_if_exists(&path)?)
    }

    /// Recovers the position after the last written entry by binary searching the first unwritten
    /// slot of the whole capacity. Returns the last entry of the index, if any, so that the
    /// segment can reconcile its own recovery point.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn initialize_position(&self) -> Result<Option<Entry>, OffsetIndexError> {
        let mut region = self.region.write();
        let (mut low, mut high) = (0, self.capacity / ENTRY_WIDTH);
        while low < high {
            let mid = low + (high - low) / 2;
            if region.slot(mid).is_unwritten() {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        region.position = low * ENTRY_WIDTH;
        if low == 0 {
            info!("Offset index is empty");
            return Ok(None);
        }
        let last_entry = region.slot(low - 1).to_entry(self.base_offset);
        if last_entry.offset < self.base_offset {
            return Err(OffsetIndexError::CorruptIndex(format!(
                "{}: last offset {} is below base offset {}",
                self.path.display(),
                last_entry.offset,
                self.base_offset
            )));
        }
        if region.position % ENTRY_WIDTH != 0 {
            return Err(OffsetIndexError::CorruptIndex(format!(
                "{}: position {} is not a multiple of {}",
                self.path.display(),
                region.position,
                ENTRY_WIDTH
            )));
        }
        info!(entries = low, last_offset = last_entry.offset, "Recovered offset index position");
        Ok(Some(last_entry))
    }

    /// A forward cursor over the entries, starting at the first slot
    pub fn scanner(&self) -> IndexScanner<'_> {
        IndexScanner::new(self)
    }
}

impl AbstractIndex for OffsetIndex {
    fn base_offset(&self) -> i64 {
        self.base_offset
    }

    fn entries(&self) -> usize {
        self.write_position() / ENTRY_WIDTH
    }

    fn max_entries(&self) -> usize {
        self.capacity / ENTRY_WIDTH
    }

    fn read_entry_at_slot(&self, slot: usize) -> Result<Entry, OffsetIndexError> {
        OffsetIndex::read_entry_at_slot(self, slot)
    }
}

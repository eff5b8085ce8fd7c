//! Naming and housekeeping of segment index files.
//! A segment index is named after the base offset of its segment, zero padded to 20 digits so
//! that a directory listing sorts the same as the offsets, i.e. `00000000000000000368.index`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const INDEX_FILE_SUFFIX: &str = ".index";

/// Returns the index file of the segment starting at `base_offset` inside `dir`.
pub fn offset_index_file(dir: &Path, base_offset: i64) -> PathBuf {
    dir.join(format!("{:020}{}", base_offset, INDEX_FILE_SUFFIX))
}

/// Parses the base offset out of an index file name
pub fn offset_from_file_name(file: &Path) -> Option<i64> {
    let name = file.file_name()?.to_str()?;
    name.strip_suffix(INDEX_FILE_SUFFIX)?.parse::<i64>().ok().filter(|offset| *offset >= 0)
}

/// Removes a file if it exists, returns whether it existed.
pub fn delete_file_if_exists(file: &Path) -> Result<bool, std::io::Error> {
    match fs_err::remove_file(file) {
        Ok(()) => {
            tracing::debug!("Successfully deleted file: {}", file.display());
            Ok(true)
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("No need to delete {} as it doesn't exist", file.display());
            Ok(false)
        },
        Err(err) => {
            tracing::error!("Unable to delete {}: {}", file.display(), err);
            Err(err)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn it_names_index_files_by_base_offset() {
        let file = offset_index_file(Path::new("/tmp/kafka-logs/topic-0"), 368);
        assert_eq!(file, PathBuf::from("/tmp/kafka-logs/topic-0/00000000000000000368.index"));
        assert_eq!(offset_from_file_name(&file), Some(368));
    }

    #[test_log::test]
    fn it_ignores_non_index_files() {
        assert_eq!(offset_from_file_name(Path::new("00000000000000000368.log")), None);
        assert_eq!(offset_from_file_name(Path::new("segment.index")), None);
        assert_eq!(offset_from_file_name(Path::new("-0000000000000000001.index")), None);
        assert_eq!(offset_from_file_name(Path::new("/")), None);
    }
}

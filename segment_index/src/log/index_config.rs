//! Offset index configuration
//! Properties are read from a java .properties file, unknown keys are rejected.

use super::index_entry::ENTRY_WIDTH;
use super::index_file::offset_index_file;
use super::offset_index::{OffsetIndexOptions, DEFAULT_MAX_INDEX_SIZE};
use crate::common::config_def::{ConfigDef, ConfigDefImportance};
use const_format::concatcp;
use enum_iterator::IntoEnumIterator;
use fs_err::File;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

// Config Keys
pub const LOG_DIR_PROP: &str = "log.dir";
pub const LOG_INDEX_SIZE_MAX_BYTES_PROP: &str = "log.index.size.max.bytes";

// Documentation
pub const LOG_DIR_DOC: &str = "The directory in which the segment index files are kept";
pub const LOG_INDEX_SIZE_MAX_BYTES_DOC: &str = concatcp!(
    "The maximum size in bytes of the offset index. The index file is pre-allocated to this size \
     rounded down to a multiple of ",
    ENTRY_WIDTH,
    " bytes and trimmed to its written entries when it is closed."
);

pub const DEFAULT_LOG_DIR: &str = "/tmp/kafka-logs";

#[derive(Debug, Error)]
pub enum IndexConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Property error: {0}")]
    Property(#[from] java_properties::PropertiesError),
    #[error("Missing Key error: {0:?}")]
    MissingKey(String),
    #[error("Invalid Value: {0}")]
    InvalidValue(String),
    #[error("Unknown Key: {0}")]
    UnknownKey(String),
    #[error("Attempt to compare a value that is not provided and has no default: {0}")]
    ComparisonOnNone(String),
}

/// This implementation is only for testing, for example any I/O error is considered equal
impl PartialEq for IndexConfigError {
    fn eq(&self, rhs: &Self) -> bool {
        match self {
            Self::Io(_) => matches!(rhs, Self::Io(_)),
            Self::Property(lhs) => {
                matches!(rhs, Self::Property(rhs) if lhs.line_number() == rhs.line_number())
            },
            Self::MissingKey(lhs) => matches!(rhs, Self::MissingKey(rhs) if lhs == rhs),
            Self::InvalidValue(lhs) => matches!(rhs, Self::InvalidValue(rhs) if lhs == rhs),
            Self::UnknownKey(lhs) => matches!(rhs, Self::UnknownKey(rhs) if lhs == rhs),
            Self::ComparisonOnNone(lhs) => matches!(rhs, Self::ComparisonOnNone(rhs) if lhs == rhs),
        }
    }
}

#[derive(Debug, IntoEnumIterator)]
pub enum IndexConfigKey {
    LogDir,
    LogIndexSizeMaxBytes,
}

impl fmt::Display for IndexConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogDir => write!(f, "{}", LOG_DIR_PROP),
            Self::LogIndexSizeMaxBytes => write!(f, "{}", LOG_INDEX_SIZE_MAX_BYTES_PROP),
        }
    }
}

impl FromStr for IndexConfigKey {
    type Err = IndexConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            LOG_DIR_PROP => Ok(Self::LogDir),
            LOG_INDEX_SIZE_MAX_BYTES_PROP => Ok(Self::LogIndexSizeMaxBytes),
            _ => Err(IndexConfigError::UnknownKey(input.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct IndexConfigProperties {
    log_dir: ConfigDef<PathBuf>,
    log_index_size_max_bytes: ConfigDef<usize>,
}

impl Default for IndexConfigProperties {
    fn default() -> Self {
        Self {
            log_dir: ConfigDef::default()
                .with_key(LOG_DIR_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(LOG_DIR_DOC)
                .with_default(PathBuf::from(DEFAULT_LOG_DIR)),
            log_index_size_max_bytes: ConfigDef::default()
                .with_key(LOG_INDEX_SIZE_MAX_BYTES_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(LOG_INDEX_SIZE_MAX_BYTES_DOC)
                .with_default(DEFAULT_MAX_INDEX_SIZE)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &ENTRY_WIDTH, LOG_INDEX_SIZE_MAX_BYTES_PROP)
                })),
        }
    }
}

impl IndexConfigProperties {
    /// `read_config_file` Reads the index config from a .properties file.
    pub fn read_config_file(filename: &str) -> Result<Self, IndexConfigError> {
        debug!("read_config_file: Reading {}", filename);
        let mut config_file_content = File::open(filename)?;
        let input_config = java_properties::read(BufReader::new(&mut config_file_content))?;
        Self::from_properties_hashmap(input_config)
    }

    /// Transforms from a HashMap of configs into IndexConfigProperties
    /// This may return IndexConfigError::UnknownKey errors
    pub fn from_properties_hashmap(
        input_config: HashMap<String, String>,
    ) -> Result<Self, IndexConfigError> {
        let mut config_builder = Self::default();
        for (property, property_value) in &input_config {
            debug!("from_properties_hashmap: {} = {}", property, property_value);
            config_builder.try_set_property(property, property_value)?;
        }
        Ok(config_builder)
    }

    pub fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), IndexConfigError> {
        match IndexConfigKey::from_str(property_name)? {
            IndexConfigKey::LogDir => self.log_dir.try_set_parsed_value(property_value)?,
            IndexConfigKey::LogIndexSizeMaxBytes => {
                self.log_index_size_max_bytes.try_set_parsed_value(property_value)?
            },
        };
        Ok(())
    }

    /// `config_names` returns a list of config keys used
    pub fn config_names() -> Vec<String> {
        IndexConfigKey::into_enum_iter().map(|val| val.to_string()).collect()
    }

    pub fn build(&mut self) -> Result<IndexConfig, IndexConfigError> {
        trace!("IndexConfigProperties::build()");
        let log_dir = self.log_dir.build()?;
        if log_dir.as_os_str().is_empty() {
            return Err(IndexConfigError::InvalidValue(format!("{}: must not be empty", LOG_DIR_PROP)));
        }
        let log_index_size_max_bytes = self.log_index_size_max_bytes.build()?;
        Ok(IndexConfig { log_dir, log_index_size_max_bytes })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct IndexConfig {
    pub log_dir: PathBuf,
    pub log_index_size_max_bytes: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_index_size_max_bytes: DEFAULT_MAX_INDEX_SIZE,
        }
    }
}

impl IndexConfig {
    /// The options to open the index of the segment starting at `base_offset`
    pub fn offset_index_options(&self, base_offset: i64) -> OffsetIndexOptions {
        OffsetIndexOptions::new(
            offset_index_file(&self.log_dir, base_offset),
            self.log_index_size_max_bytes,
            base_offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test_log::test]
    fn it_builds_defaults() {
        let conf = IndexConfigProperties::default().build().unwrap();
        assert_eq!(conf, IndexConfig::default());
        assert_eq!(
            IndexConfigProperties::config_names(),
            vec![LOG_DIR_PROP.to_string(), LOG_INDEX_SIZE_MAX_BYTES_PROP.to_string()]
        );
    }

    #[test_log::test]
    fn it_sets_and_validates_properties() {
        let mut conf_props = IndexConfigProperties::default();
        conf_props.try_set_property(LOG_INDEX_SIZE_MAX_BYTES_PROP, "4096").unwrap();
        assert_eq!(conf_props.build().unwrap().log_index_size_max_bytes, 4096);
        conf_props.try_set_property(LOG_INDEX_SIZE_MAX_BYTES_PROP, "11").unwrap();
        assert!(matches!(conf_props.build(), Err(IndexConfigError::InvalidValue(_))));
        assert_eq!(
            conf_props.try_set_property("log.index.interval.bytes", "4096"),
            Err(IndexConfigError::UnknownKey(String::from("log.index.interval.bytes")))
        );
        conf_props.try_set_property(LOG_INDEX_SIZE_MAX_BYTES_PROP, "12").unwrap();
        conf_props.try_set_property(LOG_DIR_PROP, "").unwrap();
        assert!(matches!(conf_props.build(), Err(IndexConfigError::InvalidValue(_))));
    }

    #[test_log::test]
    fn it_reads_properties_files() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# segment indexes").unwrap();
        writeln!(file, "{}=/var/lib/kafka/topic-0", LOG_DIR_PROP).unwrap();
        writeln!(file, "{}=1200", LOG_INDEX_SIZE_MAX_BYTES_PROP).unwrap();
        let mut conf_props =
            IndexConfigProperties::read_config_file(file.path().to_str().unwrap()).unwrap();
        let conf = conf_props.build().unwrap();
        assert_eq!(
            conf.offset_index_options(368),
            OffsetIndexOptions::new(
                PathBuf::from("/var/lib/kafka/topic-0/00000000000000000368.index"),
                1200,
                368
            )
        );
    }

    #[test_log::test]
    fn it_fails_on_missing_files() {
        let res = IndexConfigProperties::read_config_file("/nonexistent/index.properties");
        assert!(matches!(res, Err(IndexConfigError::Io(_))));
    }
}

//! This class is used for specifying the set of expected configurations.
use crate::log::index_config::IndexConfigError;
use std::fmt;
use std::str::FromStr;
use tracing::{error, trace};

/// `ConfigDefImportance` provides the levels of importance that different java_properties
/// have.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ConfigDefImportance {
    High,
    Medium,
    Low,
}

/// A boxed check run on the current value of a `ConfigDef` when it's built.
pub type ConfigValidator<T> = Box<dyn Fn(Option<&T>) -> Result<(), IndexConfigError>>;

/// `ConfigDef` defines a configuration property, its documentation, its default and the
/// validation of the value read from the .properties file.
pub struct ConfigDef<T> {
    /// The configuration key that is used to apply this value
    pub key: String,
    /// How important the configuration definition is
    importance: ConfigDefImportance,
    default: Option<T>,
    /// The documentation of the field, used for showing errors
    doc: &'static str,
    /// Whether or not this variable was provided by the configuration file.
    provided: bool,
    /// The current value, be it the default or overwritten by config
    value: Option<T>,
    validator: Option<ConfigValidator<T>>,
}

impl<T> fmt::Debug for ConfigDef<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDef")
            .field("key", &self.key)
            .field("importance", &self.importance)
            .field("default", &self.default)
            .field("doc", &self.doc)
            .field("provided", &self.provided)
            .field("value", &self.value)
            .field("validator_exists", &self.validator.is_some())
            .finish()
    }
}

impl<T> Default for ConfigDef<T> {
    fn default() -> Self {
        Self {
            importance: ConfigDefImportance::Low,
            doc: "",
            key: String::from("unset.key"),
            default: None,
            provided: false,
            value: None,
            validator: None,
        }
    }
}

impl<T> ConfigDef<T>
where
    T: FromStr + fmt::Debug,
    <T as FromStr>::Err: fmt::Display,
{
    /// Sets the `key` value, this comes from const &str values in the calling modules
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }

    pub fn with_importance(mut self, importance: ConfigDefImportance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_default(mut self, default: T) -> Self
    where
        T: Clone,
    {
        self.value = Some(default.clone());
        self.default = Some(default);
        self
    }

    pub fn with_validator(mut self, validator: ConfigValidator<T>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn set_value(&mut self, value: T) {
        self.value = Some(value);
        self.provided = true;
    }

    pub fn try_set_parsed_value(&mut self, value: &str) -> Result<(), IndexConfigError> {
        match value.parse::<T>() {
            Ok(val) => {
                trace!("Setting {} to {:?}", self.key, val);
                self.set_value(val);
                Ok(())
            },
            Err(err) => {
                error!("Unable to parse property {:?} : {}. Doc: {}", value, err, self.doc);
                Err(IndexConfigError::InvalidValue(format!("{}: {}: {}", self.key, value, err)))
            },
        }
    }

    pub fn at_least(data: Option<&T>, rhs: &T, key: &str) -> Result<(), IndexConfigError>
    where
        T: PartialOrd + fmt::Display,
    {
        match data {
            Some(val) => {
                if val < rhs {
                    Err(IndexConfigError::InvalidValue(format!(
                        "{}: '{}' should be at least {}",
                        key, val, rhs
                    )))
                } else {
                    Ok(())
                }
            },
            None => {
                error!("Running at_least() with no value provided for ConfigDef {}", key);
                Err(IndexConfigError::ComparisonOnNone(key.to_string()))
            },
        }
    }

    pub fn validate(&self) -> Result<(), IndexConfigError> {
        match &self.validator {
            Some(validator) => (validator)(self.value.as_ref()),
            None => Ok(()),
        }
    }

    /// build() does not consume self, a property may be read from a .properties file first and
    /// later overridden, the validator and default should outlive the first build.
    pub fn build(&mut self) -> Result<T, IndexConfigError>
    where
        T: Clone,
    {
        self.validate()?;
        match &self.value {
            Some(value) => Ok(value.clone()),
            None => Err(IndexConfigError::MissingKey(self.key.to_string())),
        }
    }
}

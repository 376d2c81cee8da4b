//! Database configuration
//!
//! Loadable from TOML; every field has a default, so an empty document is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use stratadex_core::{Error, Result};

/// Default root key part
pub const DEFAULT_KEY_PREFIX: &str = "__stratadex__";
/// Default single-entry size bound used for chunking
pub const DEFAULT_MAX_VALUE_BYTES: usize = 65_536;
/// Default entries per range read
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Database configuration
///
/// # Example
///
/// ```toml
/// key_prefix = "__stratadex__"
/// max_value_bytes = 65536
/// default_batch_size = 500
/// history_by_default = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// First key part of every key the database writes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Largest encoded value stored in one entry
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
    /// Entries fetched per range read when a query does not say
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    /// History for collections that do not choose
    #[serde(default)]
    pub history_by_default: bool,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_max_value_bytes() -> usize {
    DEFAULT_MAX_VALUE_BYTES
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            max_value_bytes: default_max_value_bytes(),
            default_batch_size: default_batch_size(),
            history_by_default: false,
        }
    }
}

impl DatabaseConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# stratadex configuration
#
# First key part of every key written by the database. Two databases on one
# substrate stay disjoint when their prefixes differ.
key_prefix = "__stratadex__"

# Largest encoded value stored in a single entry (bytes). Plain collections
# reject larger values; segmented collections split values into chunks of
# this size. The substrate's own limit applies when it is smaller.
max_value_bytes = 65536

# Entries fetched per range read when a query sets no batch_size.
default_batch_size = 500

# Record write/delete history for collections that do not choose.
history_by_default = false
"#
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the document cannot be parsed or a
    /// value is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DatabaseConfig = toml::from_str(content)
            .map_err(|e| Error::validation(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Reject unusable values
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(Error::validation("key_prefix must not be empty"));
        }
        if self.max_value_bytes == 0 {
            return Err(Error::validation("max_value_bytes must be positive"));
        }
        if self.default_batch_size == 0 {
            return Err(Error::validation("default_batch_size must be positive"));
        }
        Ok(())
    }
}

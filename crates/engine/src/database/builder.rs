//! Database builder for fluent configuration
//!
//! Provides a builder pattern for picking a substrate and tuning
//! [`DatabaseConfig`] before opening a [`Database`].

use std::fmt;
use std::sync::Arc;
use stratadex_concurrency::Substrate;
use stratadex_core::Result;
use stratadex_storage::MemorySubstrate;

use super::{Database, DatabaseConfig};

// ============================================================================
// Database Builder Pattern
// ============================================================================

/// Builder for Database configuration
///
/// # Three Ways to Open a Database
///
/// ```ignore
/// use stratadex_engine::Database;
///
/// // 1. In memory with defaults
/// let db = Database::in_memory();
///
/// // 2. Builder over any substrate
/// let db = Database::builder()
///     .substrate(my_substrate)
///     .key_prefix("app")
///     .history_by_default(true)
///     .open()?;
///
/// // 3. From a TOML document
/// let db = Database::builder().toml(&text)?.open()?;
/// ```
///
/// Without an explicit substrate the builder opens over a fresh
/// [`MemorySubstrate`].
#[derive(Clone, Default)]
pub struct DatabaseBuilder {
    /// Backing store; a new `MemorySubstrate` if unset
    substrate: Option<Arc<dyn Substrate>>,
    /// Layer configuration
    config: DatabaseConfig,
}

impl DatabaseBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing substrate
    pub fn substrate<S: Substrate + 'static>(mut self, substrate: S) -> Self {
        self.substrate = Some(Arc::new(substrate));
        self
    }

    /// Backing substrate already behind an `Arc`
    pub fn shared_substrate(mut self, substrate: Arc<dyn Substrate>) -> Self {
        self.substrate = Some(substrate);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Root key part
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Largest single entry written by the layer
    pub fn max_value_bytes(mut self, bytes: usize) -> Self {
        self.config.max_value_bytes = bytes;
        self
    }

    /// Entries fetched per range read
    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.config.default_batch_size = size;
        self
    }

    /// Record history for collections that do not say otherwise
    pub fn history_by_default(mut self, enabled: bool) -> Self {
        self.config.history_by_default = enabled;
        self
    }

    /// Load the configuration from TOML
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed TOML.
    pub fn toml(mut self, text: &str) -> Result<Self> {
        self.config = DatabaseConfig::from_toml_str(text)?;
        Ok(self)
    }

    /// Open the database
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configuration is unusable.
    pub fn open(self) -> Result<Database> {
        let substrate = self
            .substrate
            .unwrap_or_else(|| Arc::new(MemorySubstrate::new()));
        Database::open(substrate, self.config)
    }
}

impl fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("substrate", &self.substrate.is_some())
            .field("config", &self.config)
            .finish()
    }
}

//! Substrate size limits
//!
//! This module defines the limits every substrate advertises and enforces at
//! commit time. The document layer reads `max_value_bytes` to decide whether a
//! value fits in a single entry or must be segmented.
//!
//! Violations are reported as `Error::LimitExceeded`.

use crate::error::{Error, Result};

/// Size limits for keys, values and commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum packed key length in bytes (default: 2048)
    pub max_key_bytes: usize,

    /// Maximum single-entry value size in bytes (default: 64KiB)
    pub max_value_bytes: usize,

    /// Maximum mutations per atomic commit (default: 1000)
    pub max_mutations: usize,

    /// Maximum checks per atomic commit (default: 100)
    pub max_checks: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: 2048,
            max_value_bytes: 64 * 1024,
            max_mutations: 1000,
            max_checks: 100,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    ///
    /// Lets tests hit segmentation and commit-size limits without building
    /// large values.
    pub fn with_small_limits() -> Self {
        Limits {
            max_key_bytes: 100,
            max_value_bytes: 256,
            max_mutations: 64,
            max_checks: 16,
        }
    }

    /// Validate an encoded value size
    pub fn validate_value_len(&self, len: usize) -> Result<()> {
        if len > self.max_value_bytes {
            return Err(Error::LimitExceeded(format!(
                "value is {} bytes, max {}",
                len, self.max_value_bytes
            )));
        }
        Ok(())
    }

    /// Validate the shape of one commit
    pub fn validate_commit_shape(&self, checks: usize, mutations: usize) -> Result<()> {
        if checks > self.max_checks {
            return Err(Error::LimitExceeded(format!(
                "{} checks in one commit, max {}",
                checks, self.max_checks
            )));
        }
        if mutations > self.max_mutations {
            return Err(Error::LimitExceeded(format!(
                "{} mutations in one commit, max {}",
                mutations, self.max_mutations
            )));
        }
        Ok(())
    }
}

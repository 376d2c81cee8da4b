//! Microsecond timestamps for history entries
//!
//! History keys embed a timestamp so that one document's entries iterate in
//! write order. Timestamps are microseconds since the Unix epoch and pack into
//! a key as an `Int` part.

use crate::types::KeyPart;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time
    ///
    /// Returns the epoch if the system clock is before it.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// Create from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Microseconds since epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Milliseconds since epoch (truncates)
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// Key part for this timestamp; saturates at `i64::MAX`
    pub fn to_key_part(self) -> KeyPart {
        KeyPart::Int(i64::try_from(self.0).unwrap_or(i64::MAX))
    }

    /// Inverse of [`Timestamp::to_key_part`]
    pub fn from_key_part(part: &KeyPart) -> Option<Self> {
        part.as_int()
            .and_then(|i| u64::try_from(i).ok())
            .map(Timestamp)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_now_advances() {
        let before = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(Timestamp::now() > before);
    }

    #[test]
    fn test_timestamp_key_part_roundtrip() {
        let ts = Timestamp::from_micros(1_700_000_000_123_456);
        assert_eq!(Timestamp::from_key_part(&ts.to_key_part()), Some(ts));
        assert_eq!(Timestamp::from_key_part(&KeyPart::Int(-1)), None);
        assert_eq!(Timestamp::from_key_part(&KeyPart::from("x")), None);
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp::from_micros(1_234_567_890).to_string(), "1234.567890");
        assert_eq!(Timestamp::EPOCH.as_millis(), 0);
    }
}

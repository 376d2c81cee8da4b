//! Core key types for stratadex
//!
//! This module defines the foundational key types:
//! - KeyPart: One typed element of a composite key
//! - Key: Ordered sequence of key parts
//! - DocumentId: The key part that identifies a document inside a collection
//!
//! Keys are compared element by element. Elements of different types order by
//! type rank (Bytes < String < Int < Float < Bool < Date < BigInt), elements of the same type
//! order by value. `Key::pack()` (see `key.rs`) produces bytes whose
//! lexicographic order is exactly this ordering, so the substrate can keep a
//! plain byte-ordered map.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One element of a composite key
///
/// ## Ordering
///
/// - Different types: Bytes < String < Int < Float < Bool < Date < BigInt
/// - Float uses IEEE-754 total order (`-NaN < -inf < -0.0 < 0.0 < inf < NaN`)
///
/// Equality follows the ordering: `Float(-0.0) != Float(0.0)` as key parts,
/// because they pack to different bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyPart {
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Milliseconds since the Unix epoch
    Date(i64),
    /// 128-bit signed integer
    BigInt(i128),
}

/// Identifier of a document inside a collection
pub type DocumentId = KeyPart;

impl KeyPart {
    /// Type rank used for cross-type ordering
    pub fn type_rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Float(_) => 3,
            KeyPart::Bool(_) => 4,
            KeyPart::Date(_) => 5,
            KeyPart::BigInt(_) => 6,
        }
    }

    /// Get as &str if this is a String part
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyPart::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int part
    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyPart::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => a.total_cmp(b),
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            (KeyPart::Date(a), KeyPart::Date(b)) => a.cmp(b),
            (KeyPart::BigInt(a), KeyPart::BigInt(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            KeyPart::Bytes(b) => b.hash(state),
            KeyPart::String(s) => s.hash(state),
            KeyPart::Int(i) => i.hash(state),
            KeyPart::Float(f) => f.to_bits().hash(state),
            KeyPart::Bool(b) => b.hash(state),
            KeyPart::Date(ms) => ms.hash(state),
            KeyPart::BigInt(i) => i.hash(state),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Float(x) => write!(f, "{:?}", x),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Date(ms) => write!(f, "date:{}", ms),
            KeyPart::BigInt(i) => write!(f, "{}n", i),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::String(s.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<i32> for KeyPart {
    fn from(i: i32) -> Self {
        KeyPart::Int(i as i64)
    }
}

impl From<u32> for KeyPart {
    fn from(i: u32) -> Self {
        KeyPart::Int(i as i64)
    }
}

impl From<f64> for KeyPart {
    fn from(f: f64) -> Self {
        KeyPart::Float(f)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(b: Vec<u8>) -> Self {
        KeyPart::Bytes(b)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(b: &[u8]) -> Self {
        KeyPart::Bytes(b.to_vec())
    }
}

/// Composite key: an ordered sequence of key parts
///
/// # Ordering
///
/// Keys are ordered part by part; a key that is a strict prefix of another
/// sorts first. This ordering is critical for range scans:
/// - All keys of a collection are grouped under its base key
/// - Within a collection, keys are grouped by role segment
/// - Within a role, keys are ordered by their trailing parts
///
/// # Examples
///
/// ```
/// use stratadex_core::{Key, KeyPart};
///
/// let base = Key::from_parts(["__stratadex__", "users"]);
/// let id_key = base.child("__id__").child("alice");
/// assert!(id_key.starts_with(&base));
/// assert_eq!(id_key.len(), 4);
/// assert_eq!(id_key.last(), Some(&KeyPart::from("alice")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(Vec<KeyPart>);

impl Key {
    /// Create an empty key
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a key from parts
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Return a new key with one part appended
    pub fn child(&self, part: impl Into<KeyPart>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }

    /// Append a part in place
    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.0.push(part.into());
    }

    /// Borrow the parts
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Consume into parts
    pub fn into_parts(self) -> Vec<KeyPart> {
        self.0
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the key has no parts
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last part, if any
    pub fn last(&self) -> Option<&KeyPart> {
        self.0.last()
    }

    /// Part at `index`, if any
    pub fn get(&self, index: usize) -> Option<&KeyPart> {
        self.0.get(index)
    }

    /// True if `prefix` is a (non-strict) prefix of this key
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

//! Range selectors for ordered listing
//!
//! A selector is a half-open range `[start, end)` over packed key bytes.
//! Prefix selectors exclude the prefix key itself and cover every key that
//! strictly extends it.

use crate::types::Key;

/// Half-open byte range over packed keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSelector {
    start: Vec<u8>,
    end: Vec<u8>,
}

impl ListSelector {
    /// Every key strictly extending `prefix`
    pub fn prefix(prefix: &Key) -> Self {
        let mut start = prefix.pack();
        start.push(0x00);
        ListSelector {
            start,
            end: prefix.prefix_end(),
        }
    }

    /// Keys extending `prefix`, starting at `start` (inclusive)
    pub fn prefix_from(prefix: &Key, start: &Key) -> Self {
        Self::prefix(prefix).at_or_after(&start.pack())
    }

    /// Keys extending `prefix`, ending before `end` (exclusive)
    pub fn prefix_until(prefix: &Key, end: &Key) -> Self {
        Self::prefix(prefix).before(&end.pack())
    }

    /// Keys in `[start, end)`
    pub fn range(start: &Key, end: &Key) -> Self {
        ListSelector {
            start: start.pack(),
            end: end.pack(),
        }
    }

    /// Narrow the range to keys at or after packed key `first`
    pub fn at_or_after(mut self, first: &[u8]) -> Self {
        if first > self.start.as_slice() {
            self.start = first.to_vec();
        }
        self
    }

    /// Narrow the range to keys strictly after packed key `last`
    pub fn after(mut self, last: &[u8]) -> Self {
        let mut bound = last.to_vec();
        bound.push(0x00);
        if bound > self.start {
            self.start = bound;
        }
        self
    }

    /// Narrow the range to keys strictly before packed key `last`
    pub fn before(mut self, last: &[u8]) -> Self {
        if last < self.end.as_slice() {
            self.end = last.to_vec();
        }
        self
    }

    /// Inclusive lower bound
    pub fn start(&self) -> &[u8] {
        &self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> &[u8] {
        &self.end
    }

    /// True if the packed key lies inside the range
    pub fn contains(&self, packed: &[u8]) -> bool {
        packed >= self.start.as_slice() && packed < self.end.as_slice()
    }

    /// True if no key can fall inside the range
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Options for one `list` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Maximum number of entries returned
    pub limit: Option<usize>,
    /// Iterate in descending key order
    pub reverse: bool,
}

impl ListOptions {
    /// Forward listing with a bound
    pub fn limited(limit: usize) -> Self {
        ListOptions {
            limit: Some(limit),
            reverse: false,
        }
    }

    /// Set direction
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_excludes_prefix_key() {
        let prefix = Key::from_parts(["c", "__id__"]);
        let sel = ListSelector::prefix(&prefix);
        assert!(!sel.contains(&prefix.pack()));
        assert!(sel.contains(&prefix.child("a").pack()));
        assert!(sel.contains(&prefix.child(5i64).pack()));
        assert!(!sel.contains(&Key::from_parts(["c", "__idx"]).pack()));
    }

    #[test]
    fn test_prefix_from_and_until() {
        let prefix = Key::from_parts(["c"]);
        let sel = ListSelector::prefix_from(&prefix, &prefix.child("m"));
        assert!(!sel.contains(&prefix.child("a").pack()));
        assert!(sel.contains(&prefix.child("m").pack()));
        let sel = ListSelector::prefix_until(&prefix, &prefix.child("m"));
        assert!(sel.contains(&prefix.child("a").pack()));
        assert!(!sel.contains(&prefix.child("m").pack()));
    }

    #[test]
    fn test_after_and_before_exclude_cursor() {
        let prefix = Key::from_parts(["c"]);
        let b = prefix.child("b").pack();
        let sel = ListSelector::prefix(&prefix).after(&b);
        assert!(!sel.contains(&b));
        assert!(sel.contains(&prefix.child("b").child(1i64).pack()));
        assert!(sel.contains(&prefix.child("c").pack()));

        let sel = ListSelector::prefix(&prefix).before(&b);
        assert!(!sel.contains(&b));
        assert!(sel.contains(&prefix.child("a").pack()));
    }

    #[test]
    fn test_empty_range() {
        let a = Key::from_parts(["b"]);
        let b = Key::from_parts(["a"]);
        assert!(ListSelector::range(&a, &b).is_empty());
    }
}

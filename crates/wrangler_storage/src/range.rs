//! Key ranges for ordered scans.

use std::ops::Bound;

/// A half-open range of keys: `start` inclusive, `end` exclusive.
///
/// An `end` of `None` means the range is unbounded above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    start: Vec<u8>,
    end: Option<Vec<u8>>,
}

impl KeyRange {
    /// Creates a range from `start` (inclusive) to `end` (exclusive).
    #[must_use]
    pub fn new(start: impl Into<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end,
        }
    }

    /// Creates a range covering every key that starts with `prefix`.
    #[must_use]
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        let start = prefix.into();
        let end = prefix_successor(&start);
        Self { start, end }
    }

    /// Creates a range covering every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            start: Vec::new(),
            end: None,
        }
    }

    /// Returns the inclusive start key.
    #[must_use]
    pub fn start(&self) -> &[u8] {
        &self.start
    }

    /// Returns the exclusive end key, if bounded.
    #[must_use]
    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    /// Returns true if `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().map_or(true, |end| key < end)
    }

    /// Returns true if no key can fall inside the range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.end.as_deref(), Some(end) if end <= self.start.as_slice())
    }

    /// Returns the bounds to use when resuming a scan after `after`.
    ///
    /// Used by stores to translate a page cursor into `BTreeMap::range` bounds.
    #[must_use]
    pub fn bounds_after(&self, after: Option<&[u8]>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let lower = match after {
            Some(key) if key >= self.start.as_slice() => Bound::Excluded(key.to_vec()),
            _ => Bound::Included(self.start.clone()),
        };
        let upper = match &self.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        (lower, upper)
    }
}

/// Returns the smallest key greater than every key starting with `prefix`.
///
/// Returns `None` when the prefix is empty or made only of `0xFF` bytes,
/// in which case no finite upper bound exists.
#[must_use]
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Returns the smallest key strictly greater than `key`.
#[must_use]
pub fn key_successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_range_covers_extensions() {
        let range = KeyRange::prefix(b"user\xff".to_vec());
        assert!(range.contains(b"user\xff"));
        assert!(range.contains(b"user\xffalice"));
        assert!(!range.contains(b"user"));
        assert!(!range.contains(b"usf"));
    }

    #[test]
    fn successor_carries_over_max_bytes() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(b"a\xff\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(b"\xff\xff"), None);
        assert_eq!(prefix_successor(b""), None);
    }

    #[test]
    fn all_range_is_unbounded() {
        let range = KeyRange::all();
        assert!(range.contains(b""));
        assert!(range.contains(b"\xff\xff\xff"));
        assert!(!range.is_empty());
    }

    #[test]
    fn inverted_range_is_empty() {
        let range = KeyRange::new(b"b".to_vec(), Some(b"a".to_vec()));
        assert!(range.is_empty());
        assert!(!range.contains(b"a"));
    }

    #[test]
    fn bounds_after_excludes_cursor() {
        let range = KeyRange::prefix(b"k".to_vec());
        let (lower, upper) = range.bounds_after(Some(b"k1"));
        assert_eq!(lower, Bound::Excluded(b"k1".to_vec()));
        assert_eq!(upper, Bound::Excluded(b"l".to_vec()));

        let (lower, _) = range.bounds_after(None);
        assert_eq!(lower, Bound::Included(b"k".to_vec()));
    }

    #[test]
    fn key_successor_is_next_key() {
        let next = key_successor(b"abc");
        assert!(next.as_slice() > b"abc".as_slice());
        assert!(next.as_slice() < b"abc\x01".as_slice());
    }
}

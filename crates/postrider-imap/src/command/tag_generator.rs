//! Command tag generator.
//!
//! Tags match commands with their completions. One generator lives for
//! the lifetime of a connection; a reconnect starts a fresh one, so
//! completions from a dead link can never collide with live tags.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Tag;

/// Tag generator producing `T1`, `T2`, ... in issue order.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
}

impl TagGenerator {
    /// Creates a generator whose first tag is `T1`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
        }
    }

    /// Issues the next tag.
    ///
    /// # Panics
    ///
    /// Panics if the counter would overflow `u32::MAX`, which would
    /// take four billion commands on one connection.
    #[must_use]
    pub fn next(&self) -> Tag {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        assert!(n != u32::MAX, "tag counter overflow");
        Tag::new(n)
    }

    /// Highest sequence number issued so far; 0 before the first tag.
    #[must_use]
    pub fn last_issued(&self) -> u32 {
        self.counter.load(Ordering::Relaxed) - 1
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sequential_tags() {
        let generator = TagGenerator::new();
        assert_eq!(generator.next().as_str(), "T1");
        assert_eq!(generator.next().as_str(), "T2");
        assert_eq!(generator.next().as_str(), "T3");
    }

    #[test]
    fn last_issued_tracks_next() {
        let generator = TagGenerator::new();
        assert_eq!(generator.last_issued(), 0);
        let _ = generator.next();
        let _ = generator.next();
        assert_eq!(generator.last_issued(), 2);
    }

    #[test]
    fn tags_are_unique() {
        let generator = TagGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let tag = generator.next();
            assert!(seen.insert(tag.as_str().to_string()), "duplicate tag issued");
        }
    }

    #[test]
    fn tags_round_trip_through_parse() {
        let generator = TagGenerator::new();
        let tag = generator.next();
        let parsed = Tag::parse(tag.as_str()).unwrap();
        assert_eq!(parsed.number(), 1);
    }

    #[test]
    #[should_panic(expected = "tag counter overflow")]
    fn overflow_detection() {
        let generator = TagGenerator::new();
        generator.counter.store(u32::MAX, Ordering::Relaxed);
        let _ = generator.next();
    }
}

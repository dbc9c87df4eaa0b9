//! Identifier newtypes.

use std::num::NonZeroU32;

/// A command tag: `T` followed by the decimal sequence number.
///
/// The tag carries its sequence number so correlation can distinguish a
/// stale completion (older than the command being drained) from one the
/// session never issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    text: String,
    seq: u32,
}

impl Tag {
    /// Creates the tag for a sequence number.
    #[must_use]
    pub fn new(seq: u32) -> Self {
        Self {
            text: format!("T{seq}"),
            seq,
        }
    }

    /// Parses a tag of this client's shape. Returns `None` for tags the
    /// session cannot have issued (foreign prefix, no number).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('T')?;
        let seq: u32 = digits.parse().ok()?;
        Some(Self {
            text: text.to_string(),
            seq,
        })
    }

    /// The wire form of the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The sequence number embedded in the tag.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.seq
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// 1-based message sequence number (ordinal position in the folder).
///
/// Not stable across expunges; [`Uid`] is the identifier that survives
/// reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a sequence number, rejecting zero.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned unique identifier, stable within a UID-validity epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a UID, rejecting zero.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Folder epoch stamp. When it changes, every cached UID for the folder
/// is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a UID-validity stamp, rejecting zero.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for UidValidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod tag_tests {
        use super::*;

        #[test]
        fn wire_form() {
            let tag = Tag::new(1);
            assert_eq!(tag.as_str(), "T1");
            assert_eq!(tag.number(), 1);
            assert_eq!(Tag::new(4711).as_str(), "T4711");
        }

        #[test]
        fn parse_round_trips() {
            let tag = Tag::parse("T42").unwrap();
            assert_eq!(tag, Tag::new(42));
        }

        #[test]
        fn parse_rejects_foreign_tags() {
            assert!(Tag::parse("A0001").is_none());
            assert!(Tag::parse("T").is_none());
            assert!(Tag::parse("Txyz").is_none());
            assert!(Tag::parse("").is_none());
        }

        #[test]
        fn display_matches_wire_form() {
            assert_eq!(Tag::new(7).to_string(), "T7");
        }
    }

    mod seq_num_tests {
        use super::*;

        #[test]
        fn rejects_zero() {
            assert!(SeqNum::new(0).is_none());
            assert_eq!(SeqNum::new(5).unwrap().get(), 5);
        }

        #[test]
        fn orders_numerically() {
            assert!(SeqNum::new(2).unwrap() < SeqNum::new(10).unwrap());
        }
    }

    mod uid_tests {
        use super::*;

        #[test]
        fn rejects_zero() {
            assert!(Uid::new(0).is_none());
            assert_eq!(Uid::new(77).unwrap().get(), 77);
        }

        #[test]
        fn display() {
            assert_eq!(Uid::new(300).unwrap().to_string(), "300");
        }
    }

    mod uid_validity_tests {
        use super::*;

        #[test]
        fn rejects_zero() {
            assert!(UidValidity::new(0).is_none());
        }

        #[test]
        fn equality_is_epoch_identity() {
            assert_eq!(UidValidity::new(9).unwrap(), UidValidity::new(9).unwrap());
            assert_ne!(UidValidity::new(9).unwrap(), UidValidity::new(10).unwrap());
        }
    }
}

//! Sequence-number and UID set types.

use super::identifiers::{SeqNum, Uid};

/// A set of message sequence numbers, in wire syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// A single message: `5`.
    Single(SeqNum),
    /// An inclusive range: `2:10`.
    Range(SeqNum, SeqNum),
    /// From a message to the end: `50:*`.
    RangeFrom(SeqNum),
    /// Every message: `1:*`.
    All,
    /// Comma-joined parts: `1,3:5,9`.
    List(Vec<SequenceSet>),
}

impl SequenceSet {
    /// Single-message set.
    #[must_use]
    pub const fn single(seq: SeqNum) -> Self {
        Self::Single(seq)
    }

    /// Inclusive contiguous range; collapses to a single when `lo == hi`.
    #[must_use]
    pub fn range(lo: SeqNum, hi: SeqNum) -> Self {
        if lo == hi {
            Self::Single(lo)
        } else {
            Self::Range(lo, hi)
        }
    }

    /// Builds a compact set from ordinals, merging consecutive runs.
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn from_ordinals(ordinals: &[SeqNum]) -> Option<Self> {
        if ordinals.is_empty() {
            return None;
        }
        let mut sorted: Vec<u32> = ordinals.iter().map(|s| s.get()).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut parts = Vec::new();
        let mut run_start = sorted[0];
        let mut run_end = sorted[0];
        for &n in &sorted[1..] {
            if n == run_end + 1 {
                run_end = n;
            } else {
                parts.push(Self::run(run_start, run_end));
                run_start = n;
                run_end = n;
            }
        }
        parts.push(Self::run(run_start, run_end));

        if parts.len() == 1 {
            parts.pop()
        } else {
            Some(Self::List(parts))
        }
    }

    fn run(lo: u32, hi: u32) -> Self {
        // Values came from SeqNum, so they are non-zero.
        match (SeqNum::new(lo), SeqNum::new(hi)) {
            (Some(l), Some(h)) => Self::range(l, h),
            _ => Self::All,
        }
    }

    /// Builds a compact set from UIDs. UID and sequence-number sets
    /// share wire syntax; the `uid` flag on the command decides how
    /// the server reads the numbers.
    #[must_use]
    pub fn from_uids(uids: &[Uid]) -> Option<Self> {
        let ordinals: Vec<SeqNum> = uids.iter().filter_map(|u| SeqNum::new(u.get())).collect();
        Self::from_ordinals(&ordinals)
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(lo, hi) => write!(f, "{lo}:{hi}"),
            Self::RangeFrom(lo) => write!(f, "{lo}:*"),
            Self::All => f.write_str("1:*"),
            Self::List(parts) => {
                let joined = parts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

/// A set of UIDs, in wire syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// A single UID.
    Single(Uid),
    /// An inclusive range. Either endpoint may be the larger one; the
    /// written order is preserved because COPYUID correspondence
    /// depends on it.
    Range(Uid, Uid),
    /// Comma-joined parts.
    List(Vec<UidSet>),
}

impl UidSet {
    /// Single-UID set.
    #[must_use]
    pub const fn single(uid: Uid) -> Self {
        Self::Single(uid)
    }

    /// Parses the uid-set syntax used by APPENDUID/COPYUID response
    /// codes: `n`, `n:m`, and comma-joined combinations. `*` is not
    /// valid there and is rejected.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for piece in s.split(',') {
            let part = if let Some((lo, hi)) = piece.split_once(':') {
                let lo = Uid::new(lo.parse().ok()?)?;
                let hi = Uid::new(hi.parse().ok()?)?;
                if lo == hi {
                    Self::Single(lo)
                } else {
                    Self::Range(lo, hi)
                }
            } else {
                Self::Single(Uid::new(piece.parse().ok()?)?)
            };
            parts.push(part);
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Self::List(parts)),
        }
    }

    /// Expands to individual UIDs in written order. Ranges expand in
    /// the direction they were written.
    #[must_use]
    pub fn expand(&self) -> Vec<Uid> {
        let mut out = Vec::new();
        self.expand_into(&mut out);
        out
    }

    fn expand_into(&self, out: &mut Vec<Uid>) {
        match self {
            Self::Single(uid) => out.push(*uid),
            Self::Range(a, b) => {
                let (lo, hi) = (a.get().min(b.get()), a.get().max(b.get()));
                let ascending = a.get() <= b.get();
                let range = (lo..=hi).filter_map(Uid::new);
                if ascending {
                    out.extend(range);
                } else {
                    let mut chunk: Vec<Uid> = range.collect();
                    chunk.reverse();
                    out.extend(chunk);
                }
            }
            Self::List(parts) => {
                for part in parts {
                    part.expand_into(out);
                }
            }
        }
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(uid) => write!(f, "{uid}"),
            Self::Range(lo, hi) => write!(f, "{lo}:{hi}"),
            Self::List(parts) => {
                let joined = parts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    mod sequence_set_tests {
        use super::*;

        #[test]
        fn display_forms() {
            assert_eq!(SequenceSet::single(seq(5)).to_string(), "5");
            assert_eq!(SequenceSet::range(seq(2), seq(10)).to_string(), "2:10");
            assert_eq!(SequenceSet::RangeFrom(seq(50)).to_string(), "50:*");
            assert_eq!(SequenceSet::All.to_string(), "1:*");
        }

        #[test]
        fn degenerate_range_collapses() {
            assert_eq!(SequenceSet::range(seq(7), seq(7)).to_string(), "7");
        }

        #[test]
        fn from_ordinals_merges_runs() {
            let set =
                SequenceSet::from_ordinals(&[seq(1), seq(2), seq(3), seq(5), seq(9), seq(10)])
                    .unwrap();
            assert_eq!(set.to_string(), "1:3,5,9:10");
        }

        #[test]
        fn from_ordinals_sorts_and_dedups() {
            let set = SequenceSet::from_ordinals(&[seq(4), seq(2), seq(3), seq(2)]).unwrap();
            assert_eq!(set.to_string(), "2:4");
        }

        #[test]
        fn from_ordinals_empty_is_none() {
            assert!(SequenceSet::from_ordinals(&[]).is_none());
        }
    }

    mod uid_set_tests {
        use super::*;

        #[test]
        fn parses_single() {
            assert_eq!(UidSet::parse("42"), Some(UidSet::Single(uid(42))));
        }

        #[test]
        fn parses_range_and_list() {
            let set = UidSet::parse("1:3,7").unwrap();
            assert_eq!(set.to_string(), "1:3,7");
            assert_eq!(set.expand(), vec![uid(1), uid(2), uid(3), uid(7)]);
        }

        #[test]
        fn reversed_range_expands_in_written_order() {
            let set = UidSet::parse("12:10").unwrap();
            assert_eq!(set.expand(), vec![uid(12), uid(11), uid(10)]);
        }

        #[test]
        fn rejects_star_and_garbage() {
            assert!(UidSet::parse("1:*").is_none());
            assert!(UidSet::parse("").is_none());
            assert!(UidSet::parse("a,b").is_none());
            assert!(UidSet::parse("0").is_none());
        }
    }
}

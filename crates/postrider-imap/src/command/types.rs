//! Command-related type definitions.

use crate::types::{Flags, SequenceSet};

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
}

impl StatusAttribute {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// UID.
    Uid,
    /// Full header block, without marking the message seen.
    Rfc822Header,
    /// Body section.
    Body {
        /// Section specifier (`TEXT`, `HEADER`, ...); `None` fetches
        /// the whole message.
        section: Option<String>,
        /// Peek (don't set `\Seen`).
        peek: bool,
    },
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace the flag set.
    SetFlags(Flags),
    /// Add flags to the set.
    AddFlags(Flags),
    /// Remove flags from the set.
    RemoveFlags(Flags),
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with `\Answered`.
    Answered,
    /// Messages with `\Deleted`.
    Deleted,
    /// Messages with `\Draft`.
    Draft,
    /// Messages with `\Flagged`.
    Flagged,
    /// Recent messages without `\Seen`.
    New,
    /// Messages with `\Seen`.
    Seen,
    /// Messages without `\Seen`.
    Unseen,
    /// Messages without `\Deleted`.
    Undeleted,
    /// Messages in a sequence-number set.
    SequenceSet(SequenceSet),
    /// Messages in a UID set.
    Uid(SequenceSet),
    /// Subject contains the string.
    Subject(String),
    /// From contains the string.
    From(String),
    /// To contains the string.
    To(String),
    /// Body contains the string.
    Body(String),
    /// Header or body contains the string.
    Text(String),
    /// Internal date on or after (`d-MMM-yyyy`).
    Since(String),
    /// Internal date before (`d-MMM-yyyy`).
    Before(String),
    /// Internal date on (`d-MMM-yyyy`).
    On(String),
    /// Size larger than, in bytes.
    Larger(u32),
    /// Size smaller than, in bytes.
    Smaller(u32),
    /// Named header contains the string.
    Header(String, String),
    /// Every criterion must match.
    And(Vec<Self>),
    /// Either criterion matches.
    Or(Box<Self>, Box<Self>),
    /// Criterion must not match.
    Not(Box<Self>),
}

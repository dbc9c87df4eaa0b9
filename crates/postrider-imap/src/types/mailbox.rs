//! Mailbox names, selection summaries, and LIST data.

use super::flags::Flags;
use super::identifiers::{SeqNum, Uid, UidValidity};

/// A mailbox (folder) name as the server knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Creates a mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The INBOX mailbox (case-insensitive per RFC 3501).
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State captured from SELECT/EXAMINE and kept current by untagged
/// responses.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Ordinal of the first unseen message.
    pub unseen: Option<SeqNum>,
    /// Predicted next UID.
    pub uid_next: Option<Uid>,
    /// Folder epoch stamp.
    pub uid_validity: Option<UidValidity>,
    /// Flags defined in the mailbox.
    pub flags: Flags,
    /// Flags the client may set permanently.
    pub permanent_flags: Flags,
    /// Whether the selection is read-only.
    pub read_only: bool,
}

/// One LIST line: a node of the folder hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Attributes reported for the node.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, or `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Folder name.
    pub name: Mailbox,
}

impl FolderEntry {
    /// Whether the catalog may descend into this node.
    #[must_use]
    pub fn can_have_children(&self) -> bool {
        self.delimiter.is_some()
            && !self
                .attributes
                .contains(&MailboxAttribute::Noinferiors)
    }

    /// Whether the folder can be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.contains(&MailboxAttribute::NoSelect)
    }
}

/// Attributes from a LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Cannot be selected.
    NoSelect,
    /// Cannot have children; never recurse into it.
    Noinferiors,
    /// Has no children.
    HasNoChildren,
    /// Has children.
    HasChildren,
    /// Marked for attention.
    Marked,
    /// Not marked.
    Unmarked,
    /// SPECIAL-USE (RFC 6154): virtual all-messages folder.
    All,
    /// SPECIAL-USE: archive folder.
    Archive,
    /// SPECIAL-USE: drafts folder.
    Drafts,
    /// SPECIAL-USE: flagged messages.
    Flagged,
    /// SPECIAL-USE: junk/spam folder.
    Junk,
    /// SPECIAL-USE: sent folder.
    Sent,
    /// SPECIAL-USE: trash folder.
    Trash,
    /// Subscribed (from LSUB or LIST extensions).
    Subscribed,
    /// Anything else, preserved verbatim.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses one attribute atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NOINFERIORS" => Self::Noinferiors,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            "\\SUBSCRIBED" => Self::Subscribed,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn inbox_name() {
        assert_eq!(Mailbox::inbox().as_str(), "INBOX");
    }

    #[test]
    fn attribute_parse_is_case_insensitive() {
        assert_eq!(
            MailboxAttribute::parse("\\noselect"),
            MailboxAttribute::NoSelect
        );
        assert_eq!(
            MailboxAttribute::parse("\\NoInferiors"),
            MailboxAttribute::Noinferiors
        );
        assert_eq!(MailboxAttribute::parse("\\Spam"), MailboxAttribute::Junk);
    }

    #[test]
    fn unknown_attribute_preserved() {
        assert_eq!(
            MailboxAttribute::parse("\\Remote"),
            MailboxAttribute::Unknown("\\Remote".to_string())
        );
    }

    #[test]
    fn noinferiors_blocks_descent() {
        let entry = FolderEntry {
            attributes: vec![MailboxAttribute::Noinferiors],
            delimiter: Some('/'),
            name: Mailbox::new("INBOX"),
        };
        assert!(!entry.can_have_children());
    }

    #[test]
    fn flat_namespace_blocks_descent() {
        let entry = FolderEntry {
            attributes: vec![MailboxAttribute::HasChildren],
            delimiter: None,
            name: Mailbox::new("news"),
        };
        assert!(!entry.can_have_children());
    }

    #[test]
    fn selectable_unless_noselect() {
        let entry = FolderEntry {
            attributes: vec![MailboxAttribute::NoSelect],
            delimiter: Some('.'),
            name: Mailbox::new("shared"),
        };
        assert!(!entry.is_selectable());
    }

    #[test]
    fn default_status_is_empty() {
        let status = MailboxStatus::default();
        assert_eq!(status.exists, 0);
        assert!(status.uid_validity.is_none());
        assert!(!status.read_only);
    }
}

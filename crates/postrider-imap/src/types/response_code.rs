//! Bracketed response codes.

use super::capability::Capability;
use super::flags::Flags;
use super::identifiers::{SeqNum, Uid, UidValidity};
use super::sequence::UidSet;

/// The `[...]` code that may follow a status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Human attention required; text must reach the user.
    Alert,
    /// Capability list piggybacked on a greeting or completion.
    Capability(Vec<Capability>),
    /// The server failed to parse a message it holds.
    Parse,
    /// Flags the client may change permanently.
    PermanentFlags(Flags),
    /// Selection is read-only.
    ReadOnly,
    /// Selection is read-write.
    ReadWrite,
    /// Target folder does not exist but may be created.
    TryCreate,
    /// Predicted next UID for the folder.
    UidNext(Uid),
    /// Folder epoch stamp.
    UidValidity(UidValidity),
    /// Ordinal of the first unseen message.
    Unseen(SeqNum),
    /// UIDPLUS: UID assigned by APPEND.
    AppendUid {
        /// Epoch the UID belongs to.
        validity: UidValidity,
        /// Assigned UIDs (a set when multiple messages were appended).
        uids: UidSet,
    },
    /// UIDPLUS: UID mapping produced by COPY.
    CopyUid {
        /// Epoch of the destination folder.
        validity: UidValidity,
        /// Source UIDs, in correspondence order.
        source: UidSet,
        /// Destination UIDs, in correspondence order.
        dest: UidSet,
    },
    /// A code this engine does not act on, preserved verbatim.
    Unknown(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn copyuid_correspondence_is_positional() {
        let code = ResponseCode::CopyUid {
            validity: UidValidity::new(1).unwrap(),
            source: UidSet::parse("3,5").unwrap(),
            dest: UidSet::parse("100:101").unwrap(),
        };
        if let ResponseCode::CopyUid { source, dest, .. } = code {
            let pairs: Vec<_> = source.expand().into_iter().zip(dest.expand()).collect();
            assert_eq!(pairs.len(), 2);
            assert_eq!(pairs[0].0.get(), 3);
            assert_eq!(pairs[0].1.get(), 100);
            assert_eq!(pairs[1].0.get(), 5);
            assert_eq!(pairs[1].1.get(), 101);
        } else {
            panic!("expected CopyUid");
        }
    }
}

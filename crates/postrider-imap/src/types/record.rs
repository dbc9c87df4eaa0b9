//! Per-message bookkeeping for the open folder.

use super::flags::Flags;
use super::identifiers::Uid;

/// Which parts of a message have been materialized locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Have {
    /// Header bytes are held locally.
    pub header: bool,
    /// Body text is held locally.
    pub body: bool,
}

/// Location of a message's text in the local mirror file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSpan {
    /// Byte offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub size: u32,
    /// Number of lines.
    pub lines: u32,
}

/// One entry in the session's message sequence.
///
/// The ordinal is the entry's 1-based position in that sequence and is
/// not stored; expunges shift it. The UID is the stable identity: it
/// starts unknown and, once learned, never changes for the life of the
/// session.
#[derive(Debug, Clone, Default)]
pub struct MessageRecord {
    uid: Option<Uid>,
    /// Server flags, kept current by FETCH responses.
    pub flags: Flags,
    /// Where the materialized text lives in the mirror, if anywhere.
    pub span: Option<MirrorSpan>,
    /// Which parts are materialized.
    pub have: Have,
}

impl MessageRecord {
    /// A fresh record for a message the server says exists but about
    /// which nothing else is known yet.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// A record created for a UID recovered from the cache.
    #[must_use]
    pub fn from_cache(uid: Uid, flags: Flags, have: Have) -> Self {
        Self {
            uid: Some(uid),
            flags,
            span: None,
            have,
        }
    }

    /// The server UID, if learned.
    #[must_use]
    pub const fn uid(&self) -> Option<Uid> {
        self.uid
    }

    /// Installs the UID. Returns `false` when a different UID was
    /// already recorded; the caller treats that as stale data and keeps
    /// the original.
    pub fn assign_uid(&mut self, uid: Uid) -> bool {
        match self.uid {
            None => {
                self.uid = Some(uid);
                true
            }
            Some(existing) => existing == uid,
        }
    }

    /// Whether the cached text satisfies a header request.
    #[must_use]
    pub const fn has_header(&self) -> bool {
        self.have.header
    }

    /// Whether the cached text satisfies a full-body request.
    #[must_use]
    pub const fn has_body(&self) -> bool {
        self.have.header && self.have.body
    }
}

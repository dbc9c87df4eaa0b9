//! Core protocol types.
//!
//! Newtypes for the identifiers the protocol is careless with (tags,
//! sequence numbers, UIDs, epoch stamps), flag and capability sets,
//! mailbox metadata, and the per-message record the session maintains.

mod capability;
mod credentials;
mod flags;
mod identifiers;
mod mailbox;
mod record;
mod response_code;
mod sequence;

pub use capability::{Capability, Status};
pub use credentials::{Credentials, Secret};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{FolderEntry, Mailbox, MailboxAttribute, MailboxStatus};
pub use record::{Have, MessageRecord, MirrorSpan};
pub use response_code::ResponseCode;
pub use sequence::{SequenceSet, UidSet};

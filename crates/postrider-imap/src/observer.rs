//! Mailbox change observer.
//!
//! Servers volunteer mailbox changes at any time; the session queues
//! them while a command is outstanding and replays them once the wire
//! is quiet. An observer sees the changes only after that replay, so
//! every callback describes state the session view already agrees
//! with.
//!
//! # Example
//!
//! ```ignore
//! use postrider_imap::observer::MailboxObserver;
//!
//! struct StatusBar {
//!     total: usize,
//! }
//!
//! impl MailboxObserver for StatusBar {
//!     fn on_new_messages(&mut self, first_ordinal: u32, count: usize) {
//!         self.total += count;
//!         println!("{} new, {} total", count, self.total);
//!     }
//!     // ... other callbacks as needed
//! }
//! ```

use crate::types::{Flags, SeqNum};

/// Receives reconciled mailbox changes.
///
/// All methods have no-op defaults; implement the ones the caller
/// cares about.
pub trait MailboxObserver: Send {
    /// Messages appeared at the end of the mailbox. `first_ordinal` is
    /// the sequence number of the first new message.
    fn on_new_messages(&mut self, first_ordinal: u32, count: usize) {
        let _ = (first_ordinal, count);
    }

    /// A message was removed. The ordinal is its position before
    /// removal; later messages have already shifted down by one.
    fn on_expunged(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// Another client changed a message's flags.
    fn on_flags_updated(&mut self, seq: SeqNum, flags: &Flags) {
        let _ = (seq, flags);
    }

    /// The server demanded the user's attention (ALERT response code).
    /// Implementations should surface the text prominently.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }
}

/// Ignores every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MailboxObserver for NoopObserver {}

/// Logs every change through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl MailboxObserver for LoggingObserver {
    fn on_new_messages(&mut self, first_ordinal: u32, count: usize) {
        tracing::info!(first_ordinal, count, "new messages");
    }

    fn on_expunged(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "message expunged");
    }

    fn on_flags_updated(&mut self, seq: SeqNum, flags: &Flags) {
        tracing::debug!(seq = seq.get(), ?flags, "flags updated");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "server alert");
    }
}

/// A reconciled mailbox change, as collected by [`CollectingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxChange {
    /// Messages appeared at the end of the mailbox.
    NewMessages {
        /// Sequence number of the first new message.
        first_ordinal: u32,
        /// How many arrived.
        count: usize,
    },
    /// A message was removed at this ordinal.
    Expunged(SeqNum),
    /// A message's flags changed.
    FlagsUpdated(SeqNum, Flags),
    /// ALERT text.
    Alert(String),
}

/// Collects changes for later inspection. Used in tests and by
/// callers that poll instead of reacting.
#[derive(Debug, Default, Clone)]
pub struct CollectingObserver {
    /// Collected changes, oldest first.
    pub changes: Vec<MailboxChange>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected changes, leaving the collector empty.
    pub fn take(&mut self) -> Vec<MailboxChange> {
        std::mem::take(&mut self.changes)
    }
}

impl MailboxObserver for CollectingObserver {
    fn on_new_messages(&mut self, first_ordinal: u32, count: usize) {
        self.changes.push(MailboxChange::NewMessages {
            first_ordinal,
            count,
        });
    }

    fn on_expunged(&mut self, seq: SeqNum) {
        self.changes.push(MailboxChange::Expunged(seq));
    }

    fn on_flags_updated(&mut self, seq: SeqNum, flags: &Flags) {
        self.changes
            .push(MailboxChange::FlagsUpdated(seq, flags.clone()));
    }

    fn on_alert(&mut self, text: &str) {
        self.changes.push(MailboxChange::Alert(text.to_string()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn collector_keeps_order() {
        let mut observer = CollectingObserver::new();
        observer.on_new_messages(11, 2);
        observer.on_expunged(SeqNum::new(5).unwrap());
        observer.on_alert("quota exceeded");

        assert_eq!(
            observer.take(),
            vec![
                MailboxChange::NewMessages {
                    first_ordinal: 11,
                    count: 2
                },
                MailboxChange::Expunged(SeqNum::new(5).unwrap()),
                MailboxChange::Alert("quota exceeded".to_string()),
            ]
        );
        assert!(observer.changes.is_empty());
    }

    #[test]
    fn defaults_are_noops() {
        let mut observer = NoopObserver;
        observer.on_new_messages(1, 1);
        observer.on_alert("noted");
    }
}

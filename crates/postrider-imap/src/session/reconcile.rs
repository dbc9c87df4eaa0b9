//! Queued mailbox-change replay.
//!
//! EXISTS and EXPUNGE may arrive while any command is being drained,
//! but applying them immediately would shift ordinals under an
//! operation that addressed messages by ordinal. So the drain loop only
//! queues them here, and the session replays the queue at its next
//! quiescent point, in arrival order, as one non-preemptible step.

use crate::types::{MessageRecord, SeqNum, Uid};

/// One queued server-initiated mailbox change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MailboxEvent {
    /// `* n EXISTS`: the mailbox now holds n messages.
    Exists(u32),
    /// `* n EXPUNGE`: the message at ordinal n is gone; later ordinals
    /// shift down by one immediately (server-side).
    Expunge(SeqNum),
}

/// FIFO of changes observed while commands were outstanding.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    events: Vec<MailboxEvent>,
}

impl PendingChanges {
    pub(crate) fn push(&mut self, event: MailboxEvent) {
        self.events.push(event);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<MailboxEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}

/// What a replay did to the record sequence.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReplayOutcome {
    /// Removed messages, in removal order: the ordinal at removal time
    /// and the UID if one was known (for cache eviction).
    pub expunged: Vec<(SeqNum, Option<Uid>)>,
    /// Number of blank records appended for newly arrived messages.
    pub appended: u32,
    /// Ordinal of the first appended record.
    pub first_new: Option<SeqNum>,
    /// False when the queue claimed an expunge beyond the justified
    /// count; the remaining queue was discarded and the records stand
    /// at the last consistent point.
    pub consistent: bool,
}

/// Applies queued events to the record sequence.
///
/// An `Expunge(n)` with `n` within the held records removes the record;
/// with `n` beyond them but within the announced total it refers to a
/// message that was announced and expunged before the session ever
/// materialized it, so only the expected total shrinks. Anything larger
/// is a server contradiction: the replay stops there.
pub(crate) fn replay(records: &mut Vec<MessageRecord>, events: Vec<MailboxEvent>) -> ReplayOutcome {
    let mut announced = u32::try_from(records.len()).unwrap_or(u32::MAX);
    let mut outcome = ReplayOutcome {
        consistent: true,
        ..ReplayOutcome::default()
    };

    for event in events {
        match event {
            MailboxEvent::Exists(n) => announced = n,
            MailboxEvent::Expunge(seq) => {
                let n = seq.get();
                if (n as usize) <= records.len() {
                    let record = records.remove(n as usize - 1);
                    outcome.expunged.push((seq, record.uid()));
                    announced = announced.saturating_sub(1);
                } else if n <= announced {
                    // Arrived and left again before we ever fetched it.
                    announced -= 1;
                } else {
                    tracing::warn!(
                        ordinal = n,
                        announced,
                        held = records.len(),
                        "expunge beyond mailbox size; dropping remaining queue"
                    );
                    outcome.consistent = false;
                    return outcome;
                }
            }
        }
    }

    let held = u32::try_from(records.len()).unwrap_or(u32::MAX);
    if announced > held {
        outcome.appended = announced - held;
        outcome.first_new = SeqNum::new(held + 1);
        records.resize_with(announced as usize, MessageRecord::unknown);
    } else if announced < held {
        tracing::warn!(
            announced,
            held,
            "mailbox shrank without expunge; keeping local records"
        );
        outcome.consistent = false;
    }

    outcome
}

//! The operation surface of [`Session`]: folder selection, reads,
//! flag changes, transfers, and the reconciliation that keeps local
//! ordinals honest.
//!
//! Every operation checks the cancel token before touching the wire
//! and refuses ordinal-addressed work while reconciliation is owed
//! ([`Error::Pending`]); the caller resolves that with
//! [`refresh`](Session::refresh).

#![allow(clippy::missing_errors_doc)]

use std::collections::{HashMap, HashSet, VecDeque};

use crate::cache::{CacheEntry, MessageCache, MessagePart};
use crate::cancel::CancelToken;
use crate::command::{Command, FetchAttribute, SearchCriteria, StatusAttribute, StoreAction};
use crate::error::{Error, Result};
use crate::mirror::{MirrorSink, append_span, normalize, split_header_body, to_crlf};
use crate::observer::MailboxObserver;
use crate::parser::{FetchItem, StatusItem, UntaggedResponse};
use crate::session::link::{CommandOutcome, Link, Step};
use crate::session::reconcile;
use crate::session::{FolderState, Session};
use crate::types::{
    Capability, Flag, Flags, FolderEntry, Have, Mailbox, MailboxStatus, MessageRecord,
    ResponseCode, SeqNum, SequenceSet, Uid, UidSet, UidValidity,
};

impl<C: MessageCache, M: MirrorSink> Session<C, M> {
    /// Opens a folder with SELECT (or EXAMINE when `read_only`),
    /// replacing any previous selection.
    ///
    /// The returned status reflects the untagged responses of the
    /// selection. Records for every message present are built and
    /// their flags and UIDs fetched immediately, warming the cache
    /// and restoring have-bits for anything already stored. A change
    /// of UIDVALIDITY drops the folder's cached messages.
    ///
    /// Offline, the folder opens read-only from the cache; a folder
    /// the cache has never seen fails [`Error::NotCached`].
    pub async fn open_folder(
        &mut self,
        name: &Mailbox,
        read_only: bool,
        cancel: &CancelToken,
        observer: &mut dyn MailboxObserver,
    ) -> Result<MailboxStatus> {
        cancel.check()?;
        if self.link.is_none() {
            return self.open_folder_offline(name).await;
        }
        if !self.authenticated {
            return Err(Error::InvalidState(
                "open_folder before authentication".to_string(),
            ));
        }
        // Stores batched against the folder being left are collected
        // now, while the records they refer to still exist.
        self.flush_stores(cancel).await?;

        // A refused SELECT leaves no mailbox selected server-side, so
        // the old local state goes first either way.
        self.folder = None;
        self.pending.clear();

        let command = if read_only {
            Command::Examine {
                mailbox: name.clone(),
            }
        } else {
            Command::Select {
                mailbox: name.clone(),
            }
        };
        let outcome = self.execute(&command, cancel).await?.into_result()?;

        let mut status = MailboxStatus {
            read_only,
            ..MailboxStatus::default()
        };
        match &outcome.code {
            Some(ResponseCode::ReadOnly) => status.read_only = true,
            Some(ResponseCode::ReadWrite) => status.read_only = false,
            Some(ResponseCode::Alert) => observer.on_alert(&outcome.text),
            _ => {}
        }
        for item in &outcome.data {
            match item {
                UntaggedResponse::Flags(flags) => status.flags = flags.clone(),
                UntaggedResponse::Recent(n) => status.recent = *n,
                UntaggedResponse::Ok { code, text } => {
                    apply_selection_code(&mut status, code.as_ref(), text, observer);
                }
                _ => {}
            }
        }

        // The selection's EXISTS went through the pending queue;
        // replaying against an empty sequence materializes the records.
        let events = self.pending.take();
        let mut records = Vec::new();
        reconcile::replay(&mut records, events);
        status.exists = u32::try_from(records.len()).unwrap_or(u32::MAX);

        if let Some(validity) = status.uid_validity {
            let stored = self.cache.uid_validity(name.as_str()).await?;
            if stored.is_some_and(|v| v != validity) {
                tracing::info!(folder = %name, "UIDVALIDITY changed; cached messages dropped");
            }
            self.cache.set_uid_validity(name.as_str(), validity).await?;
        }

        self.folder = Some(FolderState {
            name: name.clone(),
            records,
            read_only: status.read_only,
        });
        tracing::info!(
            folder = %name,
            exists = status.exists,
            read_only = status.read_only,
            "folder opened"
        );

        if status.exists > 0 {
            self.refresh_flags(1, status.exists, cancel).await?;
        }
        Ok(status)
    }

    async fn open_folder_offline(&mut self, name: &Mailbox) -> Result<MailboxStatus> {
        let validity = self.cache.uid_validity(name.as_str()).await?;
        let known = self.cache.known(name.as_str()).await?;
        if validity.is_none() && known.is_empty() {
            return Err(Error::NotCached);
        }
        let records: Vec<MessageRecord> = known
            .into_iter()
            .map(|summary| MessageRecord::from_cache(summary.uid, summary.flags, summary.have))
            .collect();
        let status = MailboxStatus {
            exists: u32::try_from(records.len()).unwrap_or(u32::MAX),
            read_only: true,
            uid_validity: validity,
            ..MailboxStatus::default()
        };
        tracing::info!(folder = %name, exists = status.exists, "folder opened from cache");
        self.folder = Some(FolderState {
            name: name.clone(),
            records,
            read_only: true,
        });
        Ok(status)
    }

    /// Closes the open folder. On a live session CLOSE also expunges
    /// `\Deleted` messages server-side, silently, unless the folder
    /// was opened read-only. A no-op when nothing is open.
    pub async fn close_folder(&mut self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        if self.folder.is_none() {
            return Ok(());
        }
        if self.link.is_some() {
            self.flush_stores(cancel).await?;
            self.execute(&Command::Close, cancel).await?.into_result()?;
        }
        self.folder = None;
        self.pending.clear();
        Ok(())
    }

    /// Brings the local view of the open folder up to date.
    ///
    /// Owed reconciliation is folded in; when none is owed, or the
    /// link has idled near the server's autologout horizon, a NOOP
    /// gives the server a chance to speak first. New arrivals,
    /// expunges, and flag changes reach the observer.
    pub async fn refresh(
        &mut self,
        cancel: &CancelToken,
        observer: &mut dyn MailboxObserver,
    ) -> Result<()> {
        cancel.check()?;
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        if self.folder.is_none() {
            return Err(Error::InvalidState("no folder is open".to_string()));
        }
        self.flush_stores(cancel).await?;

        if self.pending.is_empty() || self.keepalive_due() {
            let outcome = self.execute(&Command::Noop, cancel).await?.into_result()?;
            for item in &outcome.data {
                if let UntaggedResponse::Fetch { seq, items } = item {
                    if let Some(flags) = self.apply_flag_items(*seq, items).await? {
                        observer.on_flags_updated(*seq, &flags);
                    }
                }
            }
        }
        self.reconcile(cancel, observer).await
    }

    /// The header of one message, blank separator line included.
    ///
    /// Cache-first: bytes already held answer locally. A live miss
    /// fetches RFC822.HEADER, stores it, and lands it in the mirror;
    /// a disconnected miss fails [`Error::NotCached`].
    pub async fn fetch_header(&mut self, ordinal: SeqNum, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.fetch_part(ordinal, false, cancel).await
    }

    /// The whole text of one message, header included.
    ///
    /// Cache-first like [`fetch_header`](Session::fetch_header). A
    /// live miss fetches with BODY.PEEK so the server's `\Seen` state
    /// is untouched; when the header is already cached only the body
    /// text crosses the wire.
    pub async fn fetch_body(&mut self, ordinal: SeqNum, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.fetch_part(ordinal, true, cancel).await
    }

    /// Adds flags to one message.
    ///
    /// STOREs go out fire-and-continue; completions are collected at
    /// the next drain boundary (every Nth store, or before the next
    /// non-store command). Records and cache update optimistically,
    /// and the server reports disagreement through unsolicited FETCH.
    pub async fn set_flags(
        &mut self,
        ordinal: SeqNum,
        flags: &Flags,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.store_flags(ordinal, StoreAction::AddFlags(flags.clone()), cancel)
            .await
    }

    /// Removes flags from one message. Same batching as
    /// [`set_flags`](Session::set_flags).
    pub async fn clear_flags(
        &mut self,
        ordinal: SeqNum,
        flags: &Flags,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.store_flags(ordinal, StoreAction::RemoveFlags(flags.clone()), cancel)
            .await
    }

    /// Expunges `\Deleted` messages, folding the removals into the
    /// records and the observer before returning.
    pub async fn expunge_now(
        &mut self,
        cancel: &CancelToken,
        observer: &mut dyn MailboxObserver,
    ) -> Result<()> {
        cancel.check()?;
        self.require_writable()?;
        self.flush_stores(cancel).await?;
        self.execute(&Command::Expunge, cancel)
            .await?
            .into_result()?;
        self.reconcile(cancel, observer).await
    }

    /// Appends a message to `folder`, creating the folder on demand if
    /// the server refuses the first try.
    ///
    /// `message` is mailbox-normalized text (bare LF line endings); the
    /// wire form is derived here. The new message's UID is returned
    /// only when the server names it (UIDPLUS APPENDUID) and is never
    /// guessed; when named, the message is also written through to the
    /// destination's cache.
    pub async fn append(
        &mut self,
        folder: &Mailbox,
        message: &[u8],
        flags: Option<&Flags>,
        cancel: &CancelToken,
    ) -> Result<Option<Uid>> {
        cancel.check()?;
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        if !self.authenticated {
            return Err(Error::InvalidState(
                "append before authentication".to_string(),
            ));
        }
        self.flush_stores(cancel).await?;

        let command = Command::Append {
            mailbox: folder.clone(),
            flags: flags.cloned(),
            date: None,
            message: to_crlf(message),
            literal_plus: self.has_capability(&Capability::LiteralPlus),
        };
        let outcome = match self.run_append(&command, cancel).await {
            Ok(outcome) => outcome,
            Err(Error::No(text)) => {
                tracing::debug!(folder = %folder, text, "APPEND refused; creating the folder");
                self.execute(
                    &Command::Create {
                        mailbox: folder.clone(),
                    },
                    cancel,
                )
                .await?
                .into_result()?;
                self.run_append(&command, cancel).await?
            }
            Err(err) => return Err(err),
        };

        let Some(ResponseCode::AppendUid { validity, uids }) = outcome.code else {
            return Ok(None);
        };
        let Some(uid) = uids.expand().into_iter().next() else {
            return Ok(None);
        };
        // Seed the destination's cache under its declared epoch.
        self.cache
            .set_uid_validity(folder.as_str(), validity)
            .await?;
        let normalized = normalize(message);
        let (header, body) = split_header_body(&normalized);
        let entry = CacheEntry::flags_only(flags.cloned().unwrap_or_default())
            .with_header(header.to_vec())
            .with_body(body.to_vec());
        self.cache.put(folder.as_str(), uid, entry).await?;
        Ok(Some(uid))
    }

    /// Copies messages to `destination` (created on demand). With
    /// UIDPLUS the server names the copies' UIDs; they are returned
    /// and the cached text travels with them. Without it the result
    /// is `None`: the new UIDs are unknown, not guessed.
    pub async fn copy_messages(
        &mut self,
        ordinals: &[SeqNum],
        destination: &Mailbox,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<Uid>>> {
        cancel.check()?;
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        self.require_folder()?;
        self.require_quiescent()?;
        let Some(sequence) = SequenceSet::from_ordinals(ordinals) else {
            return Ok(Some(Vec::new()));
        };
        self.flush_stores(cancel).await?;

        let command = Command::Copy {
            sequence,
            mailbox: destination.clone(),
            uid: false,
        };
        let outcome = self.run_with_create(&command, destination, cancel).await?;
        match outcome.code {
            Some(ResponseCode::CopyUid {
                validity,
                source,
                dest,
            }) => {
                let installed = self
                    .install_copied(destination, validity, &source, &dest)
                    .await?;
                Ok(Some(installed))
            }
            _ => Ok(None),
        }
    }

    /// Moves messages to `destination`.
    ///
    /// With the MOVE capability this is one command, and the server's
    /// expunges are folded in before returning. The fallback is COPY
    /// plus `\Deleted` on the originals, with no expunge: expunging
    /// here would also destroy other messages already flagged deleted.
    pub async fn move_messages(
        &mut self,
        ordinals: &[SeqNum],
        destination: &Mailbox,
        cancel: &CancelToken,
        observer: &mut dyn MailboxObserver,
    ) -> Result<()> {
        cancel.check()?;
        self.require_writable()?;
        self.require_quiescent()?;
        let Some(sequence) = SequenceSet::from_ordinals(ordinals) else {
            return Ok(());
        };
        self.flush_stores(cancel).await?;

        if self.has_capability(&Capability::Move) {
            let command = Command::Move {
                sequence,
                mailbox: destination.clone(),
                uid: false,
            };
            let outcome = self.run_with_create(&command, destination, cancel).await?;
            // RFC 6851 delivers COPYUID on an untagged OK ahead of the
            // expunges.
            for item in &outcome.data {
                if let UntaggedResponse::Ok {
                    code:
                        Some(ResponseCode::CopyUid {
                            validity,
                            source,
                            dest,
                        }),
                    ..
                } = item
                {
                    self.install_copied(destination, *validity, source, dest)
                        .await?;
                }
            }
            return self.reconcile(cancel, observer).await;
        }

        self.copy_messages(ordinals, destination, cancel).await?;
        let store = Command::Store {
            sequence,
            action: StoreAction::AddFlags(Flags::from_vec(vec![Flag::Deleted])),
            uid: false,
            silent: true,
        };
        self.execute(&store, cancel).await?.into_result()?;
        let folder_name = self.require_folder()?.name.as_str().to_string();
        for ordinal in ordinals {
            let update = self.record_mut(*ordinal).and_then(|record| {
                record.flags.insert(Flag::Deleted);
                record.uid().map(|uid| (uid, record.flags.clone()))
            });
            if let Some((uid, flags)) = update {
                self.cache.update_flags(&folder_name, uid, &flags).await?;
            }
        }
        self.reconcile(cancel, observer).await
    }

    /// Lists folders under `base` (empty string for the top level),
    /// descending one LIST per level up to the configured depth.
    /// Depth 0 lists a single level.
    ///
    /// Offline the listing is the cache's folder set, names only.
    pub async fn list_folders(&mut self, base: &str, cancel: &CancelToken) -> Result<Vec<FolderEntry>> {
        cancel.check()?;
        if self.link.is_none() {
            let mut entries = Vec::new();
            for name in self.cache.folders().await? {
                entries.push(FolderEntry {
                    name: Mailbox::new(name),
                    delimiter: None,
                    attributes: Vec::new(),
                });
            }
            return Ok(entries);
        }
        self.flush_stores(cancel).await?;

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back((base.to_string(), 0u32));
        while let Some((prefix, depth)) = frontier.pop_front() {
            let command = Command::List {
                reference: String::new(),
                pattern: format!("{prefix}%"),
            };
            let outcome = self.execute(&command, cancel).await?.into_result()?;
            for item in outcome.data {
                let entry = match item {
                    UntaggedResponse::List(entry) => entry,
                    // Some servers answer LIST with bare mailbox-name
                    // lines; carry them with what little they say.
                    UntaggedResponse::MailboxName(name) => FolderEntry {
                        name: Mailbox::new(name),
                        delimiter: None,
                        attributes: Vec::new(),
                    },
                    _ => continue,
                };
                if !seen.insert(entry.name.as_str().to_string()) {
                    continue;
                }
                if depth < self.config.list_depth && entry.can_have_children() {
                    if let Some(delimiter) = entry.delimiter {
                        frontier.push_back((format!("{}{delimiter}", entry.name), depth + 1));
                    }
                }
                results.push(entry);
            }
        }
        Ok(results)
    }

    /// SEARCH in the open folder. Hits come back as current ordinals,
    /// valid until the next reconciliation.
    pub async fn search(
        &mut self,
        criteria: &SearchCriteria,
        cancel: &CancelToken,
    ) -> Result<Vec<SeqNum>> {
        cancel.check()?;
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        self.require_folder()?;
        self.require_quiescent()?;
        let command = Command::Search {
            criteria: criteria.clone(),
            uid: false,
        };
        let outcome = self.execute(&command, cancel).await?.into_result()?;
        let mut hits = Vec::new();
        for item in outcome.data {
            if let UntaggedResponse::Search(ordinals) = item {
                hits.extend(ordinals);
            }
        }
        Ok(hits)
    }

    /// STATUS for a folder without selecting it. Counters come back
    /// exactly as reported.
    pub async fn status(
        &mut self,
        mailbox: &Mailbox,
        items: &[StatusAttribute],
        cancel: &CancelToken,
    ) -> Result<Vec<StatusItem>> {
        cancel.check()?;
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        let command = Command::Status {
            mailbox: mailbox.clone(),
            items: items.to_vec(),
        };
        let outcome = self.execute(&command, cancel).await?.into_result()?;
        let mut found = Vec::new();
        for item in outcome.data {
            if let UntaggedResponse::Status {
                mailbox: name,
                items,
            } = item
            {
                if name.as_str() == mailbox.as_str() {
                    found.extend(items);
                } else {
                    tracing::debug!(folder = %name, "STATUS for a folder not asked about");
                }
            }
        }
        Ok(found)
    }

    /// A bare NOOP: keep-alive, and a chance for the server to speak.
    /// Flag updates it volunteers are absorbed; anything structural is
    /// queued for the next [`refresh`](Session::refresh).
    pub async fn noop(&mut self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        let outcome = self.execute(&Command::Noop, cancel).await?.into_result()?;
        self.absorb_flag_updates(&outcome.data).await?;
        Ok(())
    }

    /// Says goodbye and closes the transport. Batched stores drain
    /// best-effort first; the server's BYE is the expected shape of a
    /// LOGOUT, not an error. Safe to call on a disconnected session.
    pub async fn disconnect(&mut self, cancel: &CancelToken) -> Result<()> {
        if self.link.is_none() {
            self.folder = None;
            return Ok(());
        }
        if let Err(err) = self.flush_stores(cancel).await {
            tracing::warn!(error = %err, "flush before LOGOUT failed");
        }
        if let Some(link) = self.link.as_mut() {
            match link.run(&Command::Logout, &mut self.pending, cancel).await {
                Ok(_) | Err(Error::Bye(_)) => {}
                Err(err) => tracing::debug!(error = %err, "LOGOUT failed"),
            }
        }
        self.teardown().await;
        self.folder = None;
        tracing::info!(host = %self.config.host, "disconnected");
        Ok(())
    }

    /// Replays queued EXISTS/EXPUNGE events onto the records, evicts
    /// expunged messages from the cache, and notifies the observer.
    /// New arrivals get their flags and UIDs fetched right away.
    pub(super) async fn reconcile(
        &mut self,
        cancel: &CancelToken,
        observer: &mut dyn MailboxObserver,
    ) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let events = self.pending.take();
        let Some(folder) = self.folder.as_mut() else {
            return Ok(());
        };
        let outcome = reconcile::replay(&mut folder.records, events);
        let folder_name = folder.name.as_str().to_string();
        for (seq, uid) in &outcome.expunged {
            if let Some(uid) = uid {
                self.cache.delete(&folder_name, *uid).await?;
            }
            observer.on_expunged(*seq);
        }
        if let Some(first) = outcome.first_new {
            observer.on_new_messages(first.get(), outcome.appended as usize);
            let hi = first
                .get()
                .saturating_add(outcome.appended)
                .saturating_sub(1);
            self.refresh_flags(first.get(), hi, cancel).await?;
        }
        Ok(())
    }

    /// Fetches `FLAGS` and `UID` for an ordinal range and installs the
    /// results: UIDs assigned, flags written through, have-bits
    /// restored for anything the cache already holds.
    async fn refresh_flags(&mut self, lo: u32, hi: u32, cancel: &CancelToken) -> Result<()> {
        let (Some(lo), Some(hi)) = (SeqNum::new(lo), SeqNum::new(hi)) else {
            return Ok(());
        };
        let folder_name = match &self.folder {
            Some(folder) => folder.name.as_str().to_string(),
            None => return Ok(()),
        };
        let command = Command::Fetch {
            sequence: SequenceSet::range(lo, hi),
            attributes: vec![FetchAttribute::Flags, FetchAttribute::Uid],
            uid: false,
        };
        let outcome = self.execute(&command, cancel).await?.into_result()?;

        let known = self.cache.known(&folder_name).await?;
        let held: HashMap<u32, Have> = known
            .iter()
            .map(|summary| (summary.uid.get(), summary.have))
            .collect();

        for item in &outcome.data {
            let UntaggedResponse::Fetch { seq, items } = item else {
                continue;
            };
            let Some(folder) = self.folder.as_mut() else {
                return Ok(());
            };
            let Some(record) = folder.records.get_mut(seq.get() as usize - 1) else {
                continue;
            };
            if let Some(uid) = items.iter().find_map(|i| match i {
                FetchItem::Uid(uid) => Some(*uid),
                _ => None,
            }) {
                if !record.assign_uid(uid) {
                    tracing::debug!(seq = seq.get(), "discarding FETCH for a reassigned ordinal");
                    continue;
                }
                if let Some(have) = held.get(&uid.get()) {
                    record.have = *have;
                }
            }
            let Some(flags) = items.iter().find_map(|i| match i {
                FetchItem::Flags(flags) => Some(flags.clone()),
                _ => None,
            }) else {
                continue;
            };
            record.flags = flags.clone();
            if let Some(uid) = record.uid() {
                self.cache
                    .put(&folder_name, uid, CacheEntry::flags_only(flags))
                    .await?;
            }
        }
        Ok(())
    }

    async fn fetch_part(
        &mut self,
        ordinal: SeqNum,
        want_body: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        cancel.check()?;
        self.require_quiescent()?;
        let index = ordinal.get() as usize - 1;
        {
            let folder = self.require_folder()?;
            if index >= folder.records.len() {
                return Err(Error::InvalidState(format!(
                    "no message {} in {}",
                    ordinal.get(),
                    folder.name
                )));
            }
        }
        if let Some(text) = self.from_cache(index, want_body).await? {
            return Ok(text);
        }
        if self.link.is_none() {
            return Err(Error::NotCached);
        }
        self.fetch_from_wire(ordinal, want_body, cancel).await
    }

    /// Answers a fetch from the cache when the record's have-bits say
    /// the bytes are held. First materialization in a session also
    /// lands the text in the mirror so the record's span is valid.
    async fn from_cache(&mut self, index: usize, want_body: bool) -> Result<Option<Vec<u8>>> {
        let (folder_name, uid, satisfied, span) = {
            let Some(folder) = self.folder.as_ref() else {
                return Ok(None);
            };
            let Some(record) = folder.records.get(index) else {
                return Ok(None);
            };
            let Some(uid) = record.uid() else {
                return Ok(None);
            };
            let satisfied = if want_body {
                record.has_body()
            } else {
                record.has_header()
            };
            (
                folder.name.as_str().to_string(),
                uid,
                satisfied,
                record.span,
            )
        };
        if !satisfied {
            return Ok(None);
        }
        let Some(header) = self.cache.get(&folder_name, uid, MessagePart::Header).await? else {
            tracing::warn!(uid = uid.get(), "record claims a header the cache lacks");
            return Ok(None);
        };
        let text = if want_body {
            let Some(body) = self.cache.get(&folder_name, uid, MessagePart::Body).await? else {
                tracing::warn!(uid = uid.get(), "record claims a body the cache lacks");
                return Ok(None);
            };
            let mut full = header;
            full.extend_from_slice(&body);
            full
        } else {
            header
        };
        if span.is_none_or(|s| (s.size as usize) < text.len()) {
            let new_span = append_span(&mut self.mirror, &text).await?;
            if let Some(folder) = self.folder.as_mut() {
                if let Some(record) = folder.records.get_mut(index) {
                    record.span = Some(new_span);
                }
            }
        }
        Ok(Some(text))
    }

    async fn fetch_from_wire(
        &mut self,
        ordinal: SeqNum,
        want_body: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let (folder_name, uid, has_header) = {
            let folder = self.require_folder()?;
            let record = folder
                .records
                .get(ordinal.get() as usize - 1)
                .ok_or_else(|| {
                    Error::InvalidState(format!("no message {}", ordinal.get()))
                })?;
            (
                folder.name.as_str().to_string(),
                record.uid(),
                record.has_header(),
            )
        };
        // A cached header lets the wire carry only the body text.
        let cached_header = match (want_body && has_header, uid) {
            (true, Some(uid)) => {
                self.cache
                    .get(&folder_name, uid, MessagePart::Header)
                    .await?
            }
            _ => None,
        };
        let (attributes, expected_section) = if !want_body {
            (
                vec![FetchAttribute::Uid, FetchAttribute::Rfc822Header],
                Some("HEADER"),
            )
        } else if cached_header.is_some() {
            (
                vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Body {
                        section: Some("TEXT".to_string()),
                        peek: true,
                    },
                ],
                Some("TEXT"),
            )
        } else {
            (
                vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Body {
                        section: None,
                        peek: true,
                    },
                ],
                None,
            )
        };
        let command = Command::Fetch {
            sequence: SequenceSet::single(ordinal),
            attributes,
            uid: false,
        };
        let outcome = self.execute(&command, cancel).await?.into_result()?;

        let mut raw: Option<Vec<u8>> = None;
        let mut reported_uid: Option<Uid> = None;
        let mut reported_flags: Option<Flags> = None;
        for item in &outcome.data {
            let UntaggedResponse::Fetch { seq, items } = item else {
                continue;
            };
            if *seq != ordinal {
                self.apply_flag_items(*seq, items).await?;
                continue;
            }
            for fetched in items {
                match fetched {
                    FetchItem::Uid(uid) => reported_uid = Some(*uid),
                    FetchItem::Flags(flags) => reported_flags = Some(flags.clone()),
                    FetchItem::Body { section, data, .. }
                        if section.as_deref() == expected_section =>
                    {
                        raw = match data {
                            Some(bytes) => Some(bytes.clone()),
                            None => {
                                tracing::warn!(seq = seq.get(), "NIL for fetched text");
                                Some(Vec::new())
                            }
                        };
                    }
                    _ => {}
                }
            }
        }

        // Identity check: a UID that contradicts the record marks the
        // response as another message's data.
        if let Some(reported) = reported_uid {
            if let Some(record) = self.record_mut(ordinal) {
                if record.assign_uid(reported) {
                    if let Some(flags) = reported_flags {
                        record.flags = flags;
                    }
                } else {
                    tracing::debug!(
                        seq = ordinal.get(),
                        "discarding FETCH for a reassigned ordinal"
                    );
                    raw = None;
                }
            }
        }

        let Some(raw) = raw else {
            // Either the mailbox shifted under the command (events are
            // now queued, the caller refreshes and retries) or the
            // server answered OK with nothing, which does not deserve
            // trust.
            if !self.pending.is_empty() {
                return Err(Error::Pending);
            }
            let failure: Result<Vec<u8>> = Err(Error::Protocol(format!(
                "FETCH completed without data for message {}",
                ordinal.get()
            )));
            return self.settle(failure).await;
        };

        let text = normalize(&raw);
        let uid = self
            .require_folder()?
            .records
            .get(ordinal.get() as usize - 1)
            .and_then(MessageRecord::uid);
        if !want_body {
            return self.commit_header(ordinal, text, uid, &folder_name).await;
        }
        if let Some(header) = cached_header {
            return self
                .commit_body_text(ordinal, header, text, uid, &folder_name)
                .await;
        }
        self.commit_whole(ordinal, text, uid, &folder_name).await
    }

    /// Stores a fetched header: mirror, record bits, cache.
    async fn commit_header(
        &mut self,
        ordinal: SeqNum,
        text: Vec<u8>,
        uid: Option<Uid>,
        folder_name: &str,
    ) -> Result<Vec<u8>> {
        let span = append_span(&mut self.mirror, &text).await?;
        let flags = self.record_mut(ordinal).map(|record| {
            record.span = Some(span);
            record.have.header = true;
            record.flags.clone()
        });
        if let Some(uid) = uid {
            let entry = CacheEntry::flags_only(flags.unwrap_or_default()).with_header(text.clone());
            self.cache.put(folder_name, uid, entry).await?;
        } else {
            tracing::warn!(seq = ordinal.get(), "UID unknown; header not cached");
        }
        Ok(text)
    }

    /// Joins freshly fetched body text onto the cached header and
    /// stores the result.
    async fn commit_body_text(
        &mut self,
        ordinal: SeqNum,
        header: Vec<u8>,
        text: Vec<u8>,
        uid: Option<Uid>,
        folder_name: &str,
    ) -> Result<Vec<u8>> {
        let mut full = header;
        full.extend_from_slice(&text);
        let span = append_span(&mut self.mirror, &full).await?;
        let flags = self.record_mut(ordinal).map(|record| {
            record.span = Some(span);
            record.have.header = true;
            record.have.body = true;
            record.flags.clone()
        });
        if let Some(uid) = uid {
            let entry = CacheEntry::flags_only(flags.unwrap_or_default()).with_body(text);
            self.cache.put(folder_name, uid, entry).await?;
        }
        Ok(full)
    }

    /// Stores a whole fetched message, split into header and body for
    /// the cache.
    async fn commit_whole(
        &mut self,
        ordinal: SeqNum,
        full: Vec<u8>,
        uid: Option<Uid>,
        folder_name: &str,
    ) -> Result<Vec<u8>> {
        let span = append_span(&mut self.mirror, &full).await?;
        let (header, body) = split_header_body(&full);
        let (header, body) = (header.to_vec(), body.to_vec());
        let flags = self.record_mut(ordinal).map(|record| {
            record.span = Some(span);
            record.have.header = true;
            record.have.body = true;
            record.flags.clone()
        });
        if let Some(uid) = uid {
            let entry = CacheEntry::flags_only(flags.unwrap_or_default())
                .with_header(header)
                .with_body(body);
            self.cache.put(folder_name, uid, entry).await?;
        } else {
            tracing::warn!(seq = ordinal.get(), "UID unknown; message not cached");
        }
        Ok(full)
    }

    async fn store_flags(
        &mut self,
        ordinal: SeqNum,
        action: StoreAction,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        self.require_writable()?;
        self.require_quiescent()?;
        let index = ordinal.get() as usize - 1;
        if index >= self.require_folder()?.records.len() {
            return Err(Error::InvalidState(format!(
                "no message {}",
                ordinal.get()
            )));
        }

        let command = Command::Store {
            sequence: SequenceSet::single(ordinal),
            action: action.clone(),
            uid: false,
            silent: true,
        };
        let sent = match self.link.as_mut() {
            Some(link) => link.send(&command).await.map(|_| ()),
            None => return Err(Error::NotConnected),
        };
        self.settle(sent).await?;
        self.touch();

        // Optimistic: the server reports disagreement through
        // unsolicited FETCH, which the next refresh folds back in.
        let update = {
            let Some(record) = self.record_mut(ordinal) else {
                return Ok(());
            };
            match &action {
                StoreAction::AddFlags(flags) => record.flags.merge(flags),
                StoreAction::RemoveFlags(flags) => {
                    for flag in flags.iter() {
                        record.flags.remove(flag);
                    }
                }
                StoreAction::SetFlags(flags) => record.flags = flags.clone(),
            }
            record.uid().map(|uid| (uid, record.flags.clone()))
        };
        if let Some((uid, flags)) = update {
            let folder_name = self.require_folder()?.name.as_str().to_string();
            self.cache.update_flags(&folder_name, uid, &flags).await?;
        }

        let outstanding = self.link.as_ref().map_or(0, Link::outstanding_count);
        if outstanding >= self.config.store_drain_interval {
            tracing::debug!(outstanding, "draining batched stores");
            self.flush_stores(cancel).await?;
        }
        Ok(())
    }

    async fn run_append(&mut self, command: &Command, cancel: &CancelToken) -> Result<CommandOutcome> {
        let result = self.run_append_on_wire(command, cancel).await;
        let outcome = self.settle(result).await?;
        outcome.into_result()
    }

    /// One APPEND round: command line, literal payload (inline under
    /// LITERAL+, after the continuation otherwise), completion.
    async fn run_append_on_wire(
        &mut self,
        command: &Command,
        cancel: &CancelToken,
    ) -> Result<CommandOutcome> {
        let Command::Append {
            message,
            literal_plus,
            ..
        } = command
        else {
            return Err(Error::InvalidState(
                "append round without an APPEND command".to_string(),
            ));
        };
        let Some(link) = self.link.as_mut() else {
            return Err(Error::NotConnected);
        };
        let outcome = if *literal_plus {
            let tag = link.send_with_payload(command, message).await?;
            link.drain(&tag, &mut self.pending, cancel).await?
        } else {
            let tag = link.send(command).await?;
            let mut data = Vec::new();
            let mut payload_sent = false;
            loop {
                match link.step(&tag, &mut self.pending, &mut data, cancel).await? {
                    Step::Continuation(_) if !payload_sent => {
                        cancel.check()?;
                        link.send_literal_payload(message).await?;
                        payload_sent = true;
                    }
                    Step::Continuation(_) => {
                        return Err(Error::Protocol(
                            "continuation after the APPEND payload".to_string(),
                        ));
                    }
                    Step::Done(outcome) => break outcome,
                }
            }
        };
        self.touch();
        Ok(outcome)
    }

    /// Runs a command that targets a mailbox which may not exist yet;
    /// a NO gets one CREATE-and-retry.
    async fn run_with_create(
        &mut self,
        command: &Command,
        mailbox: &Mailbox,
        cancel: &CancelToken,
    ) -> Result<CommandOutcome> {
        match self.execute(command, cancel).await?.into_result() {
            Ok(outcome) => Ok(outcome),
            Err(Error::No(text)) => {
                tracing::debug!(folder = %mailbox, text, "refused; creating the folder");
                self.execute(
                    &Command::Create {
                        mailbox: mailbox.clone(),
                    },
                    cancel,
                )
                .await?
                .into_result()?;
                self.execute(command, cancel).await?.into_result()
            }
            Err(err) => Err(err),
        }
    }

    /// Installs cached copies for messages the server just copied,
    /// under the destination's declared UIDVALIDITY. Returns the new
    /// UIDs in destination order.
    async fn install_copied(
        &mut self,
        destination: &Mailbox,
        validity: UidValidity,
        source: &UidSet,
        dest: &UidSet,
    ) -> Result<Vec<Uid>> {
        let sources = source.expand();
        let dests = dest.expand();
        if sources.len() != dests.len() {
            tracing::warn!(folder = %destination, "COPYUID with mismatched sets");
        }
        self.cache
            .set_uid_validity(destination.as_str(), validity)
            .await?;
        let source_folder = self.folder.as_ref().map(|f| f.name.as_str().to_string());
        if let Some(source_folder) = source_folder {
            for (src, dst) in sources.iter().zip(dests.iter()) {
                let header = self
                    .cache
                    .get(&source_folder, *src, MessagePart::Header)
                    .await?;
                let body = self
                    .cache
                    .get(&source_folder, *src, MessagePart::Body)
                    .await?;
                let mut entry = CacheEntry::flags_only(self.flags_for_uid(*src));
                if let Some(header) = header {
                    entry = entry.with_header(header);
                }
                if let Some(body) = body {
                    entry = entry.with_body(body);
                }
                self.cache.put(destination.as_str(), *dst, entry).await?;
            }
        }
        Ok(dests)
    }

    fn flags_for_uid(&self, uid: Uid) -> Flags {
        self.folder
            .as_ref()
            .and_then(|folder| {
                folder
                    .records
                    .iter()
                    .find(|record| record.uid() == Some(uid))
                    .map(|record| record.flags.clone())
            })
            .unwrap_or_default()
    }

    fn record_mut(&mut self, ordinal: SeqNum) -> Option<&mut MessageRecord> {
        self.folder
            .as_mut()?
            .records
            .get_mut(ordinal.get() as usize - 1)
    }

    fn require_folder(&self) -> Result<&FolderState> {
        self.folder
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no folder is open".to_string()))
    }

    fn require_writable(&self) -> Result<()> {
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }
        if self.require_folder()?.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Ordinal-addressed commands are refused while reconciliation is
    /// owed; the caller resolves that with a refresh.
    fn require_quiescent(&self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(Error::Pending)
        }
    }
}

fn apply_selection_code(
    status: &mut MailboxStatus,
    code: Option<&ResponseCode>,
    text: &str,
    observer: &mut dyn MailboxObserver,
) {
    match code {
        Some(ResponseCode::UidValidity(validity)) => status.uid_validity = Some(*validity),
        Some(ResponseCode::UidNext(uid)) => status.uid_next = Some(*uid),
        Some(ResponseCode::Unseen(seq)) => status.unseen = Some(*seq),
        Some(ResponseCode::PermanentFlags(flags)) => status.permanent_flags = flags.clone(),
        Some(ResponseCode::Alert) => observer.on_alert(text),
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::connection::SessionConfig;
    use crate::mirror::MemoryMirror;
    use crate::observer::NoopObserver;

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn validity(n: u32) -> UidValidity {
        UidValidity::new(n).unwrap()
    }

    fn offline_session(cache: MemoryCache) -> Session<MemoryCache, MemoryMirror> {
        Session::offline(
            SessionConfig::new("mail.example.net"),
            cache,
            MemoryMirror::new(),
        )
    }

    async fn seeded_cache() -> MemoryCache {
        let mut cache = MemoryCache::new();
        cache.set_uid_validity("Archive", validity(7)).await.unwrap();
        cache
            .put(
                "Archive",
                uid(3),
                CacheEntry::flags_only(Flags::from_vec(vec![Flag::Seen]))
                    .with_header(b"Subject: three\n\n".to_vec())
                    .with_body(b"third body\n".to_vec()),
            )
            .await
            .unwrap();
        cache
            .put(
                "Archive",
                uid(9),
                CacheEntry::flags_only(Flags::new())
                    .with_header(b"Subject: nine\n\n".to_vec()),
            )
            .await
            .unwrap();
        cache
    }

    #[tokio::test]
    async fn unknown_folder_offline_is_not_cached() {
        let mut session = offline_session(MemoryCache::new());
        let err = session
            .open_folder(
                &Mailbox::inbox(),
                true,
                &CancelToken::new(),
                &mut NoopObserver,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotCached));
    }

    #[tokio::test]
    async fn offline_folder_opens_from_cache_in_uid_order() {
        let mut session = offline_session(seeded_cache().await);
        let status = session
            .open_folder(
                &Mailbox::new("Archive"),
                true,
                &CancelToken::new(),
                &mut NoopObserver,
            )
            .await
            .unwrap();

        assert_eq!(status.exists, 2);
        assert!(status.read_only);
        assert_eq!(status.uid_validity, Some(validity(7)));
        assert_eq!(session.message_count(), Some(2));
        // UID 3 sorts before UID 9, so ordinal 1 carries \Seen.
        assert!(session.message_flags(seq(1)).unwrap().is_seen());
        assert!(!session.message_flags(seq(2)).unwrap().is_seen());
    }

    #[tokio::test]
    async fn cached_header_answers_offline_and_lands_in_the_mirror() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();

        let header = session.fetch_header(seq(1), &cancel).await.unwrap();
        assert_eq!(header, b"Subject: three\n\n");
        assert_eq!(session.mirror().bytes, b"Subject: three\n\n");

        // A second read reuses the span; nothing is appended twice.
        let again = session.fetch_header(seq(1), &cancel).await.unwrap();
        assert_eq!(again, header);
        assert_eq!(session.mirror().bytes.len(), header.len());
    }

    #[tokio::test]
    async fn full_message_concatenates_header_and_body() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();

        let full = session.fetch_body(seq(1), &cancel).await.unwrap();
        assert_eq!(full, b"Subject: three\n\nthird body\n");
        assert!(session.mirror().bytes.ends_with(b"third body\n"));
    }

    #[tokio::test]
    async fn body_read_after_header_read_grows_the_span() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();

        let header = session.fetch_header(seq(1), &cancel).await.unwrap();
        let full = session.fetch_body(seq(1), &cancel).await.unwrap();
        // The full text is re-materialized after the header-only span.
        assert_eq!(
            session.mirror().bytes.len(),
            header.len() + full.len()
        );
        // And a further body read appends nothing new.
        session.fetch_body(seq(1), &cancel).await.unwrap();
        assert_eq!(
            session.mirror().bytes.len(),
            header.len() + full.len()
        );
    }

    #[tokio::test]
    async fn missing_body_offline_is_not_cached() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();

        // Ordinal 2 (UID 9) has only its header cached.
        let err = session.fetch_body(seq(2), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::NotCached));
        // The header alone is still served.
        let header = session.fetch_header(seq(2), &cancel).await.unwrap();
        assert_eq!(header, b"Subject: nine\n\n");
    }

    #[tokio::test]
    async fn ordinal_out_of_range_is_invalid_state() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();
        let err = session.fetch_header(seq(40), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn mutations_need_a_connection() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();

        let flags = Flags::from_vec(vec![Flag::Flagged]);
        assert!(matches!(
            session.set_flags(seq(1), &flags, &cancel).await.unwrap_err(),
            Error::NotConnected
        ));
        assert!(matches!(
            session
                .append(&Mailbox::new("Sent"), b"From: me\n\nhi\n", None, &cancel)
                .await
                .unwrap_err(),
            Error::NotConnected
        ));
        assert!(matches!(
            session
                .expunge_now(&cancel, &mut NoopObserver)
                .await
                .unwrap_err(),
            Error::NotConnected
        ));
        assert!(matches!(
            session
                .refresh(&cancel, &mut NoopObserver)
                .await
                .unwrap_err(),
            Error::NotConnected
        ));
        assert!(matches!(
            session.search(&SearchCriteria::All, &cancel).await.unwrap_err(),
            Error::NotConnected
        ));
    }

    #[tokio::test]
    async fn offline_listing_is_the_cache_folder_set() {
        let mut cache = seeded_cache().await;
        cache.set_uid_validity("INBOX", validity(1)).await.unwrap();
        let mut session = offline_session(cache);

        let entries = session
            .list_folders("", &CancelToken::new())
            .await
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Archive", "INBOX"]);
        assert!(entries.iter().all(|e| e.delimiter.is_none()));
    }

    #[tokio::test]
    async fn close_folder_offline_drops_local_state() {
        let mut session = offline_session(seeded_cache().await);
        let cancel = CancelToken::new();
        session
            .open_folder(&Mailbox::new("Archive"), true, &cancel, &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(session.current_folder(), Some(&Mailbox::new("Archive")));

        session.close_folder(&cancel).await.unwrap();
        assert_eq!(session.current_folder(), None);
        assert_eq!(session.message_count(), None);
    }

    #[tokio::test]
    async fn disconnect_without_a_link_is_a_no_op() {
        let mut session = offline_session(MemoryCache::new());
        session.disconnect(&CancelToken::new()).await.unwrap();
        assert!(!session.is_connected());
        assert!(!session.is_authenticated());
    }
}

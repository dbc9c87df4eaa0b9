//! The mailbox session.
//!
//! One [`Session`] value is one conversation with one server, driven
//! by exactly one task. Operations borrow it mutably, run the tagged
//! command/response protocol over the link, and keep three local
//! structures consistent with the server: the per-message record
//! sequence for the open folder, the offline cache, and the mirror of
//! fetched message text.
//!
//! Reads are cache-first: a record whose bytes are already held
//! answers locally, connected or not. Disconnected sessions answer
//! everything they can from the cache and fail the rest with
//! [`Error::NotCached`] or [`Error::NotConnected`].
//!
//! Transport-shaped failures (I/O, BYE, timeout, protocol
//! inconsistency) close the link before they are reported; the records
//! stay at their last consistent point so cached reads keep working.
//! NO/BAD completions and authentication failures leave everything
//! standing.

#![allow(clippy::missing_errors_doc)]

mod auth;
mod link;
mod ops;
mod reconcile;

use postrider_sasl::GssExchange;

use crate::cache::MessageCache;
use crate::cancel::CancelToken;
use crate::command::Command;
use crate::connection::{ImapStream, Security, SessionConfig, connect_plain, connect_tls};
use crate::error::{Error, Result};
use crate::mirror::MirrorSink;
use crate::parser::{FetchItem, UntaggedResponse};
use crate::session::link::{CommandOutcome, Link};
use crate::session::reconcile::PendingChanges;
use crate::time::{BoxClock, KeepAlive, SystemClock};
use crate::types::{Capability, Credentials, Flags, Mailbox, MessageRecord, SeqNum};

/// Local state for the folder currently open.
#[derive(Debug)]
struct FolderState {
    name: Mailbox,
    /// Densely indexed message sequence; ordinal n is `records[n - 1]`.
    records: Vec<MessageRecord>,
    read_only: bool,
}

/// A mailbox session: live connection, cache, and mirror behind one
/// handle.
///
/// Construct with [`connect`](Session::connect) for a live server or
/// [`offline`](Session::offline) for cache-only access; the operation
/// surface is identical either way. More than one mailbox at a time
/// means more than one `Session` value.
pub struct Session<C, M> {
    config: SessionConfig,
    cache: C,
    mirror: M,
    /// Live half; `None` while disconnected.
    link: Option<Link>,
    folder: Option<FolderState>,
    pending: PendingChanges,
    capabilities: Vec<Capability>,
    clock: BoxClock,
    keepalive: KeepAlive,
    authenticated: bool,
}

impl<C: MessageCache, M: MirrorSink> Session<C, M> {
    /// Connects, reads the greeting, settles capabilities, and runs the
    /// STARTTLS upgrade when the configuration calls for one.
    ///
    /// The session comes back unauthenticated (unless the server
    /// greeted with PREAUTH); call [`authenticate`](Session::authenticate)
    /// next. A failure at any point here leaves no connection behind.
    pub async fn connect(
        config: SessionConfig,
        cache: C,
        mirror: M,
        cancel: &CancelToken,
    ) -> Result<Self> {
        Self::connect_with_clock(config, cache, mirror, Box::new(SystemClock), cancel).await
    }

    /// [`connect`](Session::connect) with a caller-supplied clock, for
    /// tests that fake time.
    pub async fn connect_with_clock(
        config: SessionConfig,
        cache: C,
        mirror: M,
        clock: BoxClock,
        cancel: &CancelToken,
    ) -> Result<Self> {
        cancel.check()?;
        tracing::info!(host = %config.host, port = config.port, security = ?config.security, "connecting");
        let stream = open_transport(&config, cancel).await?;
        let link = Link::new(
            stream,
            config.command_timeout,
            config.max_line_length,
            config.max_literal_size,
        );
        let mut pending = PendingChanges::default();
        let (link, capabilities, pre_authenticated) =
            bootstrap(link, &config, &mut pending, cancel).await?;

        let keepalive = KeepAlive::new(&clock, config.keepalive_interval);
        Ok(Self {
            config,
            cache,
            mirror,
            link: Some(link),
            folder: None,
            pending,
            capabilities,
            clock,
            keepalive,
            authenticated: pre_authenticated,
        })
    }

    /// A session with no connection at all: every operation answers
    /// from the cache or fails [`Error::NotCached`] /
    /// [`Error::NotConnected`].
    pub fn offline(config: SessionConfig, cache: C, mirror: M) -> Self {
        let clock: BoxClock = Box::new(SystemClock);
        let keepalive = KeepAlive::new(&clock, config.keepalive_interval);
        Self {
            config,
            cache,
            mirror,
            link: None,
            folder: None,
            pending: PendingChanges::default(),
            capabilities: Vec::new(),
            clock,
            keepalive,
            authenticated: false,
        }
    }

    /// Authenticates with the mechanism named in `credentials`.
    ///
    /// A NO/BAD completion surfaces as [`Error::Auth`] and leaves the
    /// connection standing, so different credentials can be tried
    /// without reconnecting. Transport failures tear the link down as
    /// usual.
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.run_authentication(credentials, None, cancel).await
    }

    /// GSSAPI authentication, with the token rounds delegated to the
    /// caller's security context.
    pub async fn authenticate_gssapi(
        &mut self,
        credentials: &Credentials,
        context: &mut dyn GssExchange,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.run_authentication(credentials, Some(context), cancel)
            .await
    }

    async fn run_authentication(
        &mut self,
        credentials: &Credentials,
        gss: Option<&mut dyn GssExchange>,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        if self.authenticated {
            return Err(Error::InvalidState(
                "session is already authenticated".to_string(),
            ));
        }
        let Some(link) = self.link.as_mut() else {
            return Err(Error::NotConnected);
        };
        let result = auth::authenticate(
            link,
            &mut self.pending,
            cancel,
            credentials,
            &self.capabilities,
            gss,
        )
        .await;
        let piggybacked = self.settle(result).await?;
        self.authenticated = true;
        // The capability list changes once authenticated; take the one
        // the completion carried or ask again.
        match piggybacked {
            Some(capabilities) => self.capabilities = capabilities,
            None => {
                let refreshed = match self.link.as_mut() {
                    Some(link) => {
                        auth::query_capabilities(link, &mut self.pending, cancel).await
                    }
                    None => Err(Error::NotConnected),
                };
                self.capabilities = self.settle(refreshed).await?;
            }
        }
        self.touch();
        Ok(())
    }

    /// Whether a live link exists.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Whether the session has authenticated (or the server greeted
    /// with PREAUTH).
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether the transport is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_tls)
    }

    /// The capability list as last reported by the server.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Whether the server advertised a capability.
    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// The folder currently open, if any.
    #[must_use]
    pub fn current_folder(&self) -> Option<&Mailbox> {
        self.folder.as_ref().map(|f| &f.name)
    }

    /// Number of messages in the open folder.
    #[must_use]
    pub fn message_count(&self) -> Option<usize> {
        self.folder.as_ref().map(|f| f.records.len())
    }

    /// The locally known flags of one message. No wire traffic.
    #[must_use]
    pub fn message_flags(&self, ordinal: SeqNum) -> Option<&Flags> {
        let folder = self.folder.as_ref()?;
        folder
            .records
            .get(ordinal.get() as usize - 1)
            .map(|r| &r.flags)
    }

    /// Read access to the cache backend.
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Read access to the mirror sink.
    pub const fn mirror(&self) -> &M {
        &self.mirror
    }

    /// Consumes the session, handing back cache and mirror. Any live
    /// connection closes without LOGOUT ceremony; call
    /// [`disconnect`](Session::disconnect) first for a clean goodbye.
    pub fn into_parts(self) -> (C, M) {
        (self.cache, self.mirror)
    }

    /// Routes an operation result through the teardown policy: fatal
    /// errors and cancellations that caught the wire mid-conversation
    /// close the transport before the error travels on. Folder records
    /// survive teardown; they describe the mailbox at its last
    /// consistent point and keep serving cached reads.
    async fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_session_fatal() || matches!(err, Error::Aborted) {
                tracing::info!(error = %err, "closing link");
                self.teardown().await;
            }
        }
        result
    }

    async fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.shutdown().await;
        }
        self.pending.clear();
        self.authenticated = false;
    }

    /// Sends one command and drains it to completion, collecting any
    /// batched store completions first.
    ///
    /// Cancellation is re-checked before touching the wire, so an
    /// abort here either unwinds cleanly (nothing sent) or closes the
    /// link (mid-conversation); there is no third state.
    async fn execute(&mut self, command: &Command, cancel: &CancelToken) -> Result<CommandOutcome> {
        cancel.check()?;
        let result = self.execute_on_wire(command, cancel).await;
        self.settle(result).await
    }

    async fn execute_on_wire(
        &mut self,
        command: &Command,
        cancel: &CancelToken,
    ) -> Result<CommandOutcome> {
        self.drain_batched(cancel).await?;
        let Some(link) = self.link.as_mut() else {
            return Err(Error::NotConnected);
        };
        let outcome = link.run(command, &mut self.pending, cancel).await?;
        self.touch();
        Ok(outcome)
    }

    /// [`drain_batched`](Session::drain_batched) behind the teardown
    /// policy, for call sites that flush without sending anything next.
    async fn flush_stores(&mut self, cancel: &CancelToken) -> Result<()> {
        let result = self.drain_batched(cancel).await;
        self.settle(result).await
    }

    /// Collects completions for fire-and-continue STOREs. Every
    /// completion is consumed before the first NO/BAD among them is
    /// reported.
    async fn drain_batched(&mut self, cancel: &CancelToken) -> Result<()> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        if link.outstanding_count() == 0 {
            return Ok(());
        }
        let (outcomes, data) = link.drain_outstanding(&mut self.pending, cancel).await?;
        self.touch();

        let mut first_failure = None;
        for outcome in outcomes {
            if let Err(err) = outcome.into_result() {
                tracing::warn!(error = %err, "batched store failed");
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
        self.absorb_flag_updates(&data).await?;
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Folds unsolicited FETCH flag data into the records and the
    /// cache. Used for data that arrives outside an operation that
    /// would otherwise own it.
    async fn absorb_flag_updates(&mut self, data: &[UntaggedResponse]) -> Result<()> {
        for item in data {
            if let UntaggedResponse::Fetch { seq, items } = item {
                self.apply_flag_items(*seq, items).await?;
            }
        }
        Ok(())
    }

    /// Applies the FLAGS (and UID, when present) of one FETCH response
    /// to the record at `seq`, writing changed flags through to the
    /// cache. Returns the new flags when they differ from the old.
    async fn apply_flag_items(
        &mut self,
        seq: SeqNum,
        items: &[FetchItem],
    ) -> Result<Option<Flags>> {
        let Some(folder) = self.folder.as_mut() else {
            return Ok(None);
        };
        let Some(record) = folder.records.get_mut(seq.get() as usize - 1) else {
            tracing::debug!(seq = seq.get(), "FETCH for an ordinal not held");
            return Ok(None);
        };
        if let Some(uid) = items.iter().find_map(|i| match i {
            FetchItem::Uid(uid) => Some(*uid),
            _ => None,
        }) {
            if !record.assign_uid(uid) {
                tracing::debug!(seq = seq.get(), "discarding FETCH for a reassigned ordinal");
                return Ok(None);
            }
        }
        let Some(flags) = items.iter().find_map(|i| match i {
            FetchItem::Flags(flags) => Some(flags.clone()),
            _ => None,
        }) else {
            return Ok(None);
        };
        let changed = record.flags != flags;
        record.flags = flags.clone();
        if let Some(uid) = record.uid() {
            self.cache
                .update_flags(folder.name.as_str(), uid, &flags)
                .await?;
        }
        Ok(changed.then_some(flags))
    }

    fn touch(&mut self) {
        self.keepalive.record_activity(&self.clock);
    }

    fn keepalive_due(&self) -> bool {
        self.keepalive.is_due(&self.clock)
    }
}

impl<C, M> std::fmt::Debug for Session<C, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("connected", &self.link.is_some())
            .field("authenticated", &self.authenticated)
            .field(
                "folder",
                &self.folder.as_ref().map(|f| f.name.as_str()),
            )
            .finish_non_exhaustive()
    }
}

/// Opens the TCP (or implicit-TLS) transport within the connect
/// timeout.
async fn open_transport(config: &SessionConfig, cancel: &CancelToken) -> Result<ImapStream> {
    let connecting = async {
        match config.security {
            Security::Implicit => connect_tls(&config.host, config.port).await,
            Security::StartTls | Security::None => {
                connect_plain(&config.host, config.port).await
            }
        }
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Aborted),
        result = tokio::time::timeout(config.connect_timeout, connecting) => {
            result.map_err(|_| Error::Timeout(config.connect_timeout))?
        }
    }
}

/// Greeting, capability discovery, and the STARTTLS upgrade. An error
/// drops the link, which closes the socket; no half-connected session
/// escapes this function.
async fn bootstrap(
    mut link: Link,
    config: &SessionConfig,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
) -> Result<(Link, Vec<Capability>, bool)> {
    let greeting = auth::read_greeting(&mut link, cancel).await?;

    let mut capabilities = match greeting.capabilities {
        Some(capabilities) => capabilities,
        None => auth::query_capabilities(&mut link, pending, cancel).await?,
    };

    if config.security == Security::StartTls {
        // Required encryption fails closed: no advertised STARTTLS, no
        // session. PREAUTH forecloses the upgrade too, since STARTTLS
        // is only valid before authentication.
        if greeting.pre_authenticated {
            return Err(Error::Protocol(
                "server pre-authenticated the session before STARTTLS could run".to_string(),
            ));
        }
        if !capabilities.contains(&Capability::StartTls) {
            return Err(Error::Protocol(
                "STARTTLS required but the server does not offer it".to_string(),
            ));
        }
        link = auth::upgrade_starttls(link, &config.host, pending, cancel).await?;
        tracing::info!(host = %config.host, "transport upgraded to TLS");
        // The plaintext capability list is not trustworthy.
        capabilities = auth::query_capabilities(&mut link, pending, cancel).await?;
    }

    Ok((link, capabilities, greeting.pre_authenticated))
}

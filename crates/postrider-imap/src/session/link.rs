//! The live half of a session: one framed connection plus the tag
//! ledger that correlates completions with commands.
//!
//! A command is sent, then the link is drained: every line read back is
//! classified, untagged EXISTS/EXPUNGE are queued for reconciliation,
//! other untagged payloads accumulate for the draining operation, and
//! the loop ends at the completion bearing the expected tag. Stale
//! completions (older tags this client issued but stopped waiting for)
//! are logged and dropped; completions for tags never issued, foreign
//! tags, and duplicates are protocol failures that end the session.

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::command::{Command, TagGenerator};
use crate::connection::{FramedStream, ImapStream};
use crate::error::{Error, Result};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::session::reconcile::{MailboxEvent, PendingChanges};
use crate::types::{ResponseCode, Status, Tag};

/// A fully drained command: its completion plus the untagged payloads
/// that arrived while waiting for it.
#[derive(Debug)]
pub(crate) struct CommandOutcome {
    /// Status word of the tagged completion.
    pub status: Status,
    /// Bracketed code on the completion, if any.
    pub code: Option<ResponseCode>,
    /// Human-readable completion text.
    pub text: String,
    /// Untagged data responses, in arrival order. EXISTS/EXPUNGE are
    /// not here; they go to the pending queue.
    pub data: Vec<UntaggedResponse>,
}

impl CommandOutcome {
    /// Maps NO and BAD completions to their errors.
    pub(crate) fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye => Err(Error::Bye(self.text)),
        }
    }

}

/// One turn of a drain.
#[derive(Debug)]
pub(crate) enum Step {
    /// Server requests more client data; the decoded challenge text
    /// follows the `+`.
    Continuation(Option<String>),
    /// The expected completion arrived.
    Done(CommandOutcome),
}

/// One live connection with its correlation state.
pub(crate) struct Link {
    stream: FramedStream<ImapStream>,
    tags: TagGenerator,
    /// Tags sent but not yet completed, oldest first.
    outstanding: Vec<Tag>,
    /// Tags completed in the drain currently in progress.
    completed: Vec<u32>,
    command_timeout: Duration,
    max_line_length: usize,
    max_literal_size: usize,
}

impl Link {
    pub(crate) fn new(
        stream: ImapStream,
        command_timeout: Duration,
        max_line_length: usize,
        max_literal_size: usize,
    ) -> Self {
        Self {
            stream: FramedStream::with_limits(stream, max_line_length, max_literal_size),
            tags: TagGenerator::new(),
            outstanding: Vec::new(),
            completed: Vec::new(),
            command_timeout,
            max_line_length,
            max_literal_size,
        }
    }

    /// Number of commands awaiting completion.
    pub(crate) fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Serializes and sends one command, registering its tag.
    pub(crate) async fn send(&mut self, command: &Command) -> Result<Tag> {
        let tag = self.tags.next();
        tracing::debug!(tag = %tag, command = command.name(), "sending");
        self.completed.clear();
        let line = command.serialize(&tag);
        self.stream.write_command(&line).await?;
        self.outstanding.push(tag.clone());
        Ok(tag)
    }

    /// Sends a command whose trailing literal payload travels in the
    /// same flush (non-synchronizing literal).
    pub(crate) async fn send_with_payload(
        &mut self,
        command: &Command,
        payload: &[u8],
    ) -> Result<Tag> {
        let tag = self.tags.next();
        tracing::debug!(
            tag = %tag,
            command = command.name(),
            payload_len = payload.len(),
            "sending with literal"
        );
        self.completed.clear();
        let line = command.serialize(&tag);
        let mut trailer = Vec::with_capacity(payload.len() + 2);
        trailer.extend_from_slice(payload);
        trailer.extend_from_slice(b"\r\n");
        self.stream
            .write_command_with_payload(&line, &trailer)
            .await?;
        self.outstanding.push(tag.clone());
        Ok(tag)
    }

    /// Sends a bare line in reply to a continuation request. The
    /// content is not logged; continuation replies carry credential
    /// material.
    pub(crate) async fn reply_continuation(&mut self, reply: &str) -> Result<()> {
        let mut line = Vec::with_capacity(reply.len() + 2);
        line.extend_from_slice(reply.as_bytes());
        line.extend_from_slice(b"\r\n");
        self.stream.write_raw(&line).await
    }

    /// Sends literal payload bytes after the server's continuation,
    /// with the CRLF that ends the command.
    pub(crate) async fn send_literal_payload(&mut self, payload: &[u8]) -> Result<()> {
        let mut trailer = Vec::with_capacity(payload.len() + 2);
        trailer.extend_from_slice(payload);
        trailer.extend_from_slice(b"\r\n");
        self.stream.write_raw(&trailer).await
    }

    /// Sends a command and drains to its completion.
    pub(crate) async fn run(
        &mut self,
        command: &Command,
        pending: &mut PendingChanges,
        cancel: &CancelToken,
    ) -> Result<CommandOutcome> {
        let tag = self.send(command).await?;
        self.drain(&tag, pending, cancel).await
    }

    /// Drains to the completion for `tag`. A continuation here is a
    /// protocol error; flows that expect one use [`step`](Self::step).
    pub(crate) async fn drain(
        &mut self,
        tag: &Tag,
        pending: &mut PendingChanges,
        cancel: &CancelToken,
    ) -> Result<CommandOutcome> {
        let mut data = Vec::new();
        match self.step(tag, pending, &mut data, cancel).await? {
            Step::Done(outcome) => Ok(outcome),
            Step::Continuation(_) => Err(Error::Protocol(
                "continuation for a command that sends no more data".to_string(),
            )),
        }
    }

    /// Reads until the completion for `tag` or a continuation request.
    /// Untagged data responses accumulate into `data` across calls and
    /// move into the outcome when the completion arrives.
    pub(crate) async fn step(
        &mut self,
        tag: &Tag,
        pending: &mut PendingChanges,
        data: &mut Vec<UntaggedResponse>,
        cancel: &CancelToken,
    ) -> Result<Step> {
        loop {
            match self.next_response(cancel).await? {
                Response::Continuation { text } => return Ok(Step::Continuation(text)),
                Response::Untagged(untagged) => route_untagged(untagged, pending, data)?,
                Response::Tagged {
                    tag: raw,
                    status,
                    code,
                    text,
                } => {
                    if raw == tag.as_str() {
                        self.outstanding.retain(|t| t.as_str() != raw);
                        self.completed.push(tag.number());
                        return Ok(Step::Done(CommandOutcome {
                            status,
                            code,
                            text,
                            data: std::mem::take(data),
                        }));
                    }
                    self.dismiss_unexpected(&raw)?;
                }
            }
        }
    }

    /// Drains completions for every outstanding tag (store batching).
    /// Returns the completions in arrival order plus the untagged data
    /// seen along the way.
    pub(crate) async fn drain_outstanding(
        &mut self,
        pending: &mut PendingChanges,
        cancel: &CancelToken,
    ) -> Result<(Vec<CommandOutcome>, Vec<UntaggedResponse>)> {
        self.completed.clear();
        let mut outcomes = Vec::new();
        let mut data = Vec::new();

        while !self.outstanding.is_empty() {
            match self.next_response(cancel).await? {
                Response::Continuation { .. } => {
                    return Err(Error::Protocol(
                        "continuation while draining completions".to_string(),
                    ));
                }
                Response::Untagged(untagged) => route_untagged(untagged, pending, &mut data)?,
                Response::Tagged {
                    tag: raw,
                    status,
                    code,
                    text,
                } => {
                    if let Some(pos) = self.outstanding.iter().position(|t| t.as_str() == raw) {
                        let done = self.outstanding.remove(pos);
                        self.completed.push(done.number());
                        outcomes.push(CommandOutcome {
                            status,
                            code,
                            text,
                            data: Vec::new(),
                        });
                    } else {
                        self.dismiss_unexpected(&raw)?;
                    }
                }
            }
        }

        Ok((outcomes, data))
    }

    /// Upgrades the underlying transport to TLS. The read buffer must
    /// be empty: bytes pipelined past the upgrade acknowledgment would
    /// be fed to the handshake.
    pub(crate) async fn upgrade_to_tls(mut self, host: &str) -> Result<Self> {
        if !self.stream.read_buffer_is_empty() {
            return Err(Error::Protocol(
                "unread data buffered across TLS upgrade".to_string(),
            ));
        }
        let plain = self.stream.into_inner();
        let encrypted = plain.upgrade_to_tls(host).await?;
        self.stream = FramedStream::with_limits(
            encrypted,
            self.max_line_length,
            self.max_literal_size,
        );
        Ok(self)
    }

    /// Whether the transport is encrypted.
    pub(crate) fn is_tls(&self) -> bool {
        self.stream.get_ref().is_tls()
    }

    /// Closes the transport without ceremony. Used on fatal errors and
    /// cancellation mid-frame, where the protocol state is unknown.
    pub(crate) async fn shutdown(&mut self) {
        self.stream.shutdown().await;
    }

    /// Reads and parses one response, skipping unclassifiable lines.
    /// Cancellation is observed here, before each read; a cancel that
    /// fires mid-drain leaves the wire mid-conversation, which is why
    /// the session closes the transport when this returns `Aborted`.
    /// Also used directly for the greeting, which precedes any command.
    pub(crate) async fn next_response(&mut self, cancel: &CancelToken) -> Result<Response> {
        loop {
            let unit = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Aborted),
                read = tokio::time::timeout(self.command_timeout, self.stream.read_response()) => {
                    read.map_err(|_| Error::Timeout(self.command_timeout))??
                }
            };

            match ResponseParser::parse(&unit) {
                Ok(response) => return Ok(response),
                Err(Error::Parse { position, message }) => {
                    tracing::warn!(position, message, "skipping unclassifiable line");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Applies the stale-tag policy to a completion that is not the
    /// one being drained.
    fn dismiss_unexpected(&self, raw: &str) -> Result<()> {
        let Some(parsed) = Tag::parse(raw) else {
            return Err(Error::Protocol(format!("completion for foreign tag {raw}")));
        };
        if parsed.number() > self.tags.last_issued() {
            return Err(Error::Protocol(format!(
                "completion for never-issued tag {raw}"
            )));
        }
        if self.completed.contains(&parsed.number()) {
            return Err(Error::Protocol(format!("duplicate completion for {raw}")));
        }
        tracing::debug!(tag = raw, "dropping stale completion");
        Ok(())
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("outstanding", &self.outstanding)
            .field("tls", &self.is_tls())
            .finish_non_exhaustive()
    }
}

/// Dispatches one untagged response: mailbox mutations to the pending
/// queue, BYE to the fatal path, everything else to the drain's data.
fn route_untagged(
    untagged: UntaggedResponse,
    pending: &mut PendingChanges,
    data: &mut Vec<UntaggedResponse>,
) -> Result<()> {
    match untagged {
        UntaggedResponse::Exists(n) => {
            tracing::debug!(count = n, "queueing EXISTS");
            pending.push(MailboxEvent::Exists(n));
        }
        UntaggedResponse::Expunge(seq) => {
            tracing::debug!(ordinal = seq.get(), "queueing EXPUNGE");
            pending.push(MailboxEvent::Expunge(seq));
        }
        UntaggedResponse::Bye { text, .. } => {
            tracing::info!(text, "server BYE");
            return Err(Error::Bye(text));
        }
        other => data.push(other),
    }
    Ok(())
}

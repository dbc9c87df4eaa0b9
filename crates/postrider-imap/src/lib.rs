//! # postrider-imap
//!
//! IMAP4rev1 client engine for the postrider mail agent.
//!
//! This crate provides:
//! - A single-connection [`Session`] driving SELECT, FETCH, STORE,
//!   APPEND, COPY/MOVE, SEARCH, and LIST against one server
//! - Offline-first reads through a pluggable [`MessageCache`], with a
//!   local [`MirrorSink`] holding every fetched message's text
//! - Reconciliation of server-driven mailbox changes (EXISTS/EXPUNGE)
//!   at command boundaries, reported through a [`MailboxObserver`]
//! - LOGIN and SASL authentication (PLAIN, CRAM-MD5, GSSAPI,
//!   XOAUTH2/OAUTHBEARER via `postrider-sasl`), STARTTLS and implicit
//!   TLS transports
//!
//! A session is one value owned by one task:
//!
//! ```no_run
//! use postrider_imap::{
//!     CancelToken, Credentials, Mailbox, MemoryCache, MemoryMirror, NoopObserver, Session,
//!     SessionConfig,
//! };
//!
//! # async fn demo() -> postrider_imap::Result<()> {
//! let cancel = CancelToken::new();
//! let config = SessionConfig::new("imap.example.net");
//! let mut session =
//!     Session::connect(config, MemoryCache::new(), MemoryMirror::new(), &cancel).await?;
//! session
//!     .authenticate(&Credentials::login("user@example.net", "secret"), &cancel)
//!     .await?;
//! let mut observer = NoopObserver;
//! let status = session
//!     .open_folder(&Mailbox::inbox(), false, &cancel, &mut observer)
//!     .await?;
//! println!("{} messages", status.exists);
//! session.disconnect(&cancel).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod cache;
pub mod cancel;
pub mod command;
pub mod connection;
mod error;
pub mod mirror;
pub mod observer;
pub mod parser;
pub mod session;
pub mod time;
pub mod types;

pub use cache::{CacheEntry, CacheError, CachedSummary, MemoryCache, MessageCache, MessagePart};
pub use cancel::CancelToken;
pub use command::{SearchCriteria, StatusAttribute};
pub use connection::{Security, SessionConfig, SessionConfigBuilder};
pub use error::{Error, Result};
pub use mirror::{FileMirror, MemoryMirror, MirrorSink};
pub use observer::{
    CollectingObserver, LoggingObserver, MailboxChange, MailboxObserver, NoopObserver,
};
pub use parser::StatusItem;
pub use session::Session;
pub use types::{
    Capability, Credentials, Flag, Flags, FolderEntry, Have, Mailbox, MailboxAttribute,
    MailboxStatus, MirrorSpan, Secret, SeqNum, Uid, UidValidity,
};

// The mechanism names live in the SASL crate; re-exported so
// [`Credentials`] can be built without a second dependency. Same for
// the GSSAPI exchange trait callers implement for AUTHENTICATE GSSAPI.
pub use postrider_sasl::{GssExchange, Mechanism};

//! SQLite-backed [`MessageCache`](postrider_imap::MessageCache) for the
//! postrider IMAP engine.
//!
//! [`CacheStore`] persists folder epochs, flags, and message text in a
//! single SQLite file, keyed `(folder, uid)` the way the engine's cache
//! seam requires. Recording a changed UIDVALIDITY drops the folder's
//! rows first, so text cached under an old epoch is never served under
//! a new one.
//!
//! ```no_run
//! use postrider_cache::CacheStore;
//!
//! # async fn open() -> Result<(), postrider_imap::CacheError> {
//! let store = CacheStore::open("/var/lib/postrider/mail.db").await?;
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod store;

pub use store::CacheStore;

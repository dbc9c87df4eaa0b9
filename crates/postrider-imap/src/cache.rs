//! Offline message cache seam.
//!
//! Every read path in the session consults an implementation of
//! [`MessageCache`] before (or instead of) the wire: connected sessions
//! write successful results through to it, disconnected sessions answer
//! from it alone and fail [`Error::NotCached`](crate::Error::NotCached)
//! on a miss. The production SQLite store lives in the
//! `postrider-cache` crate; [`MemoryCache`] here backs tests and
//! callers that want no persistence.
//!
//! Keys are `(folder, uid)`. Ordinals never reach the cache: they shift
//! under expunge, UIDs do not.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Flags, Have, Uid, UidValidity};

/// Failure reported by a cache backend.
///
/// The engine does not interpret cache failures; it wraps them in
/// [`Error::Cache`](crate::Error::Cache) and lets the caller decide.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

impl CacheError {
    /// Builds an error from anything displayable.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Which piece of a message is being read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePart {
    /// RFC 5322 header up to and including the blank separator line.
    Header,
    /// Body text after the blank line.
    Body,
}

/// A write-through unit for one message.
///
/// `put` merges: bytes carried here replace the stored part, `None`
/// leaves whatever the cache already holds, and flags always replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// Current server flags.
    pub flags: Flags,
    /// Header bytes, LF line endings.
    pub header: Option<Vec<u8>>,
    /// Body bytes, LF line endings.
    pub body: Option<Vec<u8>>,
}

impl CacheEntry {
    /// An entry carrying flags only.
    #[must_use]
    pub const fn flags_only(flags: Flags) -> Self {
        Self {
            flags,
            header: None,
            body: None,
        }
    }

    /// Attaches header bytes.
    #[must_use]
    pub fn with_header(mut self, bytes: Vec<u8>) -> Self {
        self.header = Some(bytes);
        self
    }

    /// Attaches body bytes.
    #[must_use]
    pub fn with_body(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(bytes);
        self
    }
}

/// What the cache knows about one message, without the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSummary {
    /// Server UID.
    pub uid: Uid,
    /// Flags as of the last write-through.
    pub flags: Flags,
    /// Which parts are stored.
    pub have: Have,
}

/// Storage backend for offline mail.
///
/// Implementations are free to be a database, a directory tree, or a
/// map in memory; the session only requires that a UID round-trips and
/// that [`set_uid_validity`](MessageCache::set_uid_validity) drops every
/// message of a folder whose stamp changed, because after an epoch
/// change cached UIDs may refer to different messages.
#[allow(async_fn_in_trait)]
pub trait MessageCache {
    /// The UID-validity stamp recorded for a folder, if any.
    async fn uid_validity(&self, folder: &str) -> Result<Option<UidValidity>, CacheError>;

    /// Records a folder's UID-validity stamp. A stamp different from
    /// the stored one clears all cached messages for that folder first.
    async fn set_uid_validity(
        &mut self,
        folder: &str,
        validity: UidValidity,
    ) -> Result<(), CacheError>;

    /// All messages cached for a folder, ascending by UID.
    async fn known(&self, folder: &str) -> Result<Vec<CachedSummary>, CacheError>;

    /// The stored bytes for one part of a message.
    async fn get(
        &self,
        folder: &str,
        uid: Uid,
        part: MessagePart,
    ) -> Result<Option<Vec<u8>>, CacheError>;

    /// Writes a message through, merging with any existing entry.
    async fn put(&mut self, folder: &str, uid: Uid, entry: CacheEntry) -> Result<(), CacheError>;

    /// Replaces the stored flags for a message already in the cache.
    /// A UID not present is not an error; there is nothing to update.
    async fn update_flags(
        &mut self,
        folder: &str,
        uid: Uid,
        flags: &Flags,
    ) -> Result<(), CacheError>;

    /// Drops one message. Called when the server expunges it.
    async fn delete(&mut self, folder: &str, uid: Uid) -> Result<(), CacheError>;

    /// Folder names with at least one cached message or a recorded
    /// stamp. Backs the folder list when disconnected.
    async fn folders(&self) -> Result<Vec<String>, CacheError>;
}

#[derive(Debug, Clone, Default)]
struct FolderCache {
    validity: Option<UidValidity>,
    // BTreeMap keeps `known` in UID order for free.
    messages: BTreeMap<u32, CacheEntry>,
}

/// In-memory [`MessageCache`].
///
/// Not persistent. Used by tests and by callers that want the session
/// machinery without a disk footprint.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    folders: HashMap<String, FolderCache>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached messages across all folders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.folders.values().map(|f| f.messages.len()).sum()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageCache for MemoryCache {
    async fn uid_validity(&self, folder: &str) -> Result<Option<UidValidity>, CacheError> {
        Ok(self.folders.get(folder).and_then(|f| f.validity))
    }

    async fn set_uid_validity(
        &mut self,
        folder: &str,
        validity: UidValidity,
    ) -> Result<(), CacheError> {
        let entry = self.folders.entry(folder.to_string()).or_default();
        if entry.validity != Some(validity) {
            entry.messages.clear();
            entry.validity = Some(validity);
        }
        Ok(())
    }

    async fn known(&self, folder: &str) -> Result<Vec<CachedSummary>, CacheError> {
        let Some(cache) = self.folders.get(folder) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(cache.messages.len());
        for (&raw, entry) in &cache.messages {
            let uid = Uid::new(raw)
                .ok_or_else(|| CacheError::new(format!("cached UID {raw} is invalid")))?;
            out.push(CachedSummary {
                uid,
                flags: entry.flags.clone(),
                have: Have {
                    header: entry.header.is_some(),
                    body: entry.body.is_some(),
                },
            });
        }
        Ok(out)
    }

    async fn get(
        &self,
        folder: &str,
        uid: Uid,
        part: MessagePart,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let slot = self
            .folders
            .get(folder)
            .and_then(|f| f.messages.get(&uid.get()));
        Ok(slot.and_then(|entry| match part {
            MessagePart::Header => entry.header.clone(),
            MessagePart::Body => entry.body.clone(),
        }))
    }

    async fn put(&mut self, folder: &str, uid: Uid, entry: CacheEntry) -> Result<(), CacheError> {
        let slot = self
            .folders
            .entry(folder.to_string())
            .or_default()
            .messages
            .entry(uid.get())
            .or_default();
        slot.flags = entry.flags;
        if let Some(header) = entry.header {
            slot.header = Some(header);
        }
        if let Some(body) = entry.body {
            slot.body = Some(body);
        }
        Ok(())
    }

    async fn update_flags(
        &mut self,
        folder: &str,
        uid: Uid,
        flags: &Flags,
    ) -> Result<(), CacheError> {
        if let Some(slot) = self
            .folders
            .get_mut(folder)
            .and_then(|f| f.messages.get_mut(&uid.get()))
        {
            slot.flags = flags.clone();
        }
        Ok(())
    }

    async fn delete(&mut self, folder: &str, uid: Uid) -> Result<(), CacheError> {
        if let Some(cache) = self.folders.get_mut(folder) {
            cache.messages.remove(&uid.get());
        }
        Ok(())
    }

    async fn folders(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.folders.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

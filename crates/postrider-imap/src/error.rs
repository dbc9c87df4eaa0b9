//! Error types for the IMAP engine.

use std::time::Duration;

/// Errors produced by the engine.
///
/// The variants fall into the classes the session machinery cares
/// about: per-command rejections ([`No`](Error::No)/[`Bad`](Error::Bad))
/// leave the session usable; transport-level failures
/// ([`Io`](Error::Io), [`Closed`](Error::Closed), [`Bye`](Error::Bye),
/// [`Timeout`](Error::Timeout), [`Protocol`](Error::Protocol)) tear the
/// link down before they are returned; [`Auth`](Error::Auth) is kept
/// distinct so a caller can retry credentials over the still-healthy
/// transport; [`Aborted`](Error::Aborted) is cooperative cancellation,
/// not a failure of either side.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error during handshake or upgrade.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS verification.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A server line could not be decoded.
    #[error("parse error at position {position}: {message}")]
    Parse {
        /// Byte offset in the line where decoding failed.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// Tagged NO completion: the command was understood but refused.
    #[error("server refused command: {0}")]
    No(String),

    /// Tagged BAD completion: the command itself was rejected.
    #[error("server rejected command: {0}")]
    Bad(String),

    /// The server ended the session with BYE.
    #[error("server closed connection: {0}")]
    Bye(String),

    /// The peer closed the stream without a BYE.
    #[error("connection closed unexpectedly")]
    Closed,

    /// Authentication failed; the transport is still usable.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// An I/O step exceeded the configured deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// No live connection and the requested data is not in the cache.
    #[error("message not cached")]
    NotCached,

    /// The operation needs a live connection and none exists.
    #[error("not connected")]
    NotConnected,

    /// Cooperative cancellation: the caller interrupted the operation.
    #[error("aborted")]
    Aborted,

    /// A mutating command was issued against a read-only selection.
    #[error("folder is open read-only")]
    ReadOnly,

    /// An ordinal-addressed operation was refused because mailbox
    /// changes are queued and not yet reconciled.
    #[error("mailbox changes pending reconciliation")]
    Pending,

    /// The server violated the protocol in a way that cannot be
    /// recovered by retrying; the session is torn down.
    #[error("protocol inconsistency: {0}")]
    Protocol(String),

    /// An operation was invoked in a state that cannot serve it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The cache backend reported a failure.
    #[error(transparent)]
    Cache(#[from] crate::cache::CacheError),
}

impl Error {
    /// Whether this error ends the session.
    ///
    /// Fatal errors are returned only after the link has been released
    /// and the session marked unconnected, so no caller observes a
    /// half-open session.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::Bye(_)
                | Self::Closed
                | Self::Timeout(_)
                | Self::Protocol(_)
        )
    }
}

impl From<postrider_sasl::SaslError> for Error {
    fn from(err: postrider_sasl::SaslError) -> Self {
        Self::Auth(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::Closed.is_session_fatal());
        assert!(Error::Bye("shutting down".into()).is_session_fatal());
        assert!(Error::Protocol("tag reuse".into()).is_session_fatal());
        assert!(!Error::No("over quota".into()).is_session_fatal());
        assert!(!Error::Auth("bad password".into()).is_session_fatal());
        assert!(!Error::Aborted.is_session_fatal());
        assert!(!Error::NotCached.is_session_fatal());
    }

    #[test]
    fn sasl_errors_surface_as_auth() {
        let sasl = postrider_sasl::SaslError::Malformed("truncated".into());
        let err: Error = sasl.into();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn display_is_terse() {
        assert_eq!(Error::Aborted.to_string(), "aborted");
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }
}

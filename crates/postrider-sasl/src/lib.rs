//! SASL response builders for mail protocols.
//!
//! This crate produces the client-side byte strings that IMAP (and the
//! sibling line protocols) place on the wire during authentication. It
//! owns no I/O and no protocol framing: callers feed it decoded server
//! challenges and send back whatever it returns, base64-encoded where
//! the mechanism calls for it.
//!
//! Implements:
//! - LOGIN / PLAIN (RFC 4616) - username/password credentials
//! - CRAM-MD5 (RFC 2195) - keyed-digest challenge response
//! - OAUTHBEARER (RFC 7628) - standard `OAuth2` bearer assertion
//! - XOAUTH2 (Google/Microsoft proprietary) - legacy `OAuth2` assertion
//! - EXTERNAL (RFC 4422) - identity asserted by the transport layer
//! - GSSAPI (RFC 4752) - token-exchange framing over an opaque context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod bearer;
pub mod cram;
pub mod gssapi;
pub mod mechanism;
pub mod plain;

pub use bearer::{OAuthErrorBlob, oauthbearer_response, parse_oauth_error, xoauth2_response};
pub use cram::cram_md5_response;
pub use gssapi::{GssExchange, GssStep, SECURITY_LAYER_NONE, SecurityOffer, security_reply};
pub use mechanism::Mechanism;
pub use plain::{external_response, plain_response};

/// Errors produced while building or decoding SASL exchanges.
#[derive(Debug, thiserror::Error)]
pub enum SaslError {
    /// Server challenge was not valid base64.
    #[error("invalid base64 in challenge: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Challenge decoded but did not have the shape the mechanism requires.
    #[error("malformed challenge: {0}")]
    Malformed(String),

    /// Key material was rejected by the digest primitive.
    #[error("invalid key material")]
    InvalidKey,

    /// The server offered no security layer the client is willing to use.
    #[error("no acceptable security layer offered (mask {0:#04x})")]
    SecurityLayer(u8),

    /// The opaque GSS context reported a failure.
    #[error("GSS context error: {0}")]
    Context(String),
}

/// Result alias for SASL operations.
pub type Result<T> = std::result::Result<T, SaslError>;

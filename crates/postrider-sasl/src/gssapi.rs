//! GSSAPI exchange framing (RFC 4752).
//!
//! The engine drives the round-trips; the Kerberos context itself is a
//! collaborator behind [`GssExchange`]. After the context is
//! established the server sends one wrapped security-layer offer, the
//! client unwraps it, picks a layer, and replies with a wrapped
//! four-byte selection plus its authorization identity.

use crate::{Result, SaslError};

/// Bit for "no security layer" in the offer/selection mask.
pub const SECURITY_LAYER_NONE: u8 = 0x01;

/// Outcome of feeding one server token to the GSS context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GssStep {
    /// Context still establishing; send this token and wait for the
    /// next challenge.
    Continue(Vec<u8>),
    /// Context established. The token (possibly empty) completes the
    /// establishment rounds; the next challenge is the wrapped
    /// security-layer offer.
    Complete(Vec<u8>),
}

/// Opaque security context driving the Kerberos token exchange.
///
/// Implementations wrap whatever GSS library the platform provides.
/// Tests use a scripted stand-in.
pub trait GssExchange: Send {
    /// Feeds one decoded server token (empty on the first round) and
    /// returns the next client token.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::Context`] when the underlying context
    /// rejects the token.
    fn step(&mut self, input: &[u8]) -> Result<GssStep>;

    /// Unwraps a message received under the established context.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::Context`] on integrity failure.
    fn unwrap(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// Wraps a message for transmission under the established context.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::Context`] when wrapping fails.
    fn wrap(&mut self, input: &[u8]) -> Result<Vec<u8>>;
}

/// The server's unwrapped security-layer offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityOffer {
    /// Bitmask of offered layers; bit 0 is "none".
    pub layers: u8,
    /// Maximum message size the server accepts, big-endian 24-bit.
    pub max_size: u32,
}

impl SecurityOffer {
    /// Decodes the four-byte offer.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::Malformed`] when the token is shorter than
    /// four bytes and [`SaslError::SecurityLayer`] when the offer does
    /// not include the no-layer option this client insists on.
    pub fn parse(plain: &[u8]) -> Result<Self> {
        if plain.len() < 4 {
            return Err(SaslError::Malformed(format!(
                "security offer too short: {} bytes",
                plain.len()
            )));
        }
        let layers = plain[0];
        if layers & SECURITY_LAYER_NONE == 0 {
            return Err(SaslError::SecurityLayer(layers));
        }
        let max_size = u32::from(plain[1]) << 16 | u32::from(plain[2]) << 8 | u32::from(plain[3]);
        Ok(Self { layers, max_size })
    }
}

/// Builds the client's unwrapped security-layer selection: no layer,
/// zero maximum size, followed by the authorization identity.
#[must_use]
pub fn security_reply(authzid: &str) -> Vec<u8> {
    let mut reply = Vec::with_capacity(4 + authzid.len());
    reply.extend_from_slice(&[SECURITY_LAYER_NONE, 0, 0, 0]);
    reply.extend_from_slice(authzid.as_bytes());
    reply
}

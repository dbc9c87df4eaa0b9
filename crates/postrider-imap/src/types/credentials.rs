//! Credential material resolved by the caller's credential subsystem.

use postrider_sasl::Mechanism;

/// A password or bearer token.
///
/// The Debug form is redacted; the engine never logs or persists the
/// contained bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps secret material.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the secret for wire encoding.
    #[must_use]
    pub(crate) fn reveal(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resolved credentials for one server identity.
///
/// Supplied once at session start. For bearer mechanisms the secret is
/// the access token; for EXTERNAL and GSSAPI it may be empty.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Authentication identity (user name or email address).
    pub user: String,
    /// Password or token.
    pub secret: Secret,
    /// Mechanism to drive.
    pub mechanism: Mechanism,
    /// Whether the transport must be encrypted before the secret may
    /// be sent. When set and the server cannot offer TLS, the session
    /// fails closed instead of continuing in plaintext.
    pub require_tls: bool,
}

impl Credentials {
    /// Plain LOGIN credentials requiring an encrypted transport.
    #[must_use]
    pub fn login(user: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            user: user.into(),
            secret: password.into(),
            mechanism: Mechanism::Login,
            require_tls: true,
        }
    }

    /// Credentials for an arbitrary mechanism; TLS requirement taken
    /// from the mechanism's own needs.
    #[must_use]
    pub fn for_mechanism(
        user: impl Into<String>,
        secret: impl Into<Secret>,
        mechanism: Mechanism,
    ) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
            mechanism,
            require_tls: mechanism.requires_tls(),
        }
    }
}

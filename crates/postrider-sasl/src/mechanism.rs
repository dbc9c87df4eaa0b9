//! Mechanism names and selection metadata.

/// Client-side authentication mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// The protocol's native LOGIN command carrying user and password.
    /// Not a SASL mechanism, but dispatched through the same negotiator.
    Login,
    /// PLAIN (RFC 4616). Requires an encrypted transport.
    Plain,
    /// CRAM-MD5 (RFC 2195). Challenge-response, secret never on the wire.
    CramMd5,
    /// OAUTHBEARER (RFC 7628). Bearer token assertion.
    OAuthBearer,
    /// XOAUTH2. Legacy bearer assertion used by Gmail and Outlook.
    XOAuth2,
    /// EXTERNAL (RFC 4422). Identity proven by the transport (TLS client
    /// certificate); nothing secret is transmitted.
    External,
    /// GSSAPI (RFC 4752). Multi-round token exchange against an opaque
    /// security context.
    Gssapi,
}

impl Mechanism {
    /// The mechanism name as it appears in `AUTH=` capabilities and the
    /// AUTHENTICATE command.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::OAuthBearer => "OAUTHBEARER",
            Self::XOAuth2 => "XOAUTH2",
            Self::External => "EXTERNAL",
            Self::Gssapi => "GSSAPI",
        }
    }

    /// Parses a mechanism name (as advertised in a capability list).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "LOGIN" => Some(Self::Login),
            "PLAIN" => Some(Self::Plain),
            "CRAM-MD5" => Some(Self::CramMd5),
            "OAUTHBEARER" => Some(Self::OAuthBearer),
            "XOAUTH2" => Some(Self::XOAuth2),
            "EXTERNAL" => Some(Self::External),
            "GSSAPI" => Some(Self::Gssapi),
            _ => None,
        }
    }

    /// Whether the mechanism places a reusable secret on the wire and
    /// therefore must not run over plaintext.
    #[must_use]
    pub const fn requires_tls(self) -> bool {
        matches!(
            self,
            Self::Login | Self::Plain | Self::OAuthBearer | Self::XOAuth2
        )
    }

    /// Whether the client can send its first message inline with the
    /// AUTHENTICATE command when the server advertises SASL-IR.
    #[must_use]
    pub const fn client_first(self) -> bool {
        matches!(
            self,
            Self::Plain | Self::OAuthBearer | Self::XOAuth2 | Self::External
        )
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_names() {
        for mech in [
            Mechanism::Login,
            Mechanism::Plain,
            Mechanism::CramMd5,
            Mechanism::OAuthBearer,
            Mechanism::XOAuth2,
            Mechanism::External,
            Mechanism::Gssapi,
        ] {
            assert_eq!(Mechanism::from_name(mech.name()), Some(mech));
        }
    }

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(Mechanism::from_name("cram-md5"), Some(Mechanism::CramMd5));
        assert_eq!(Mechanism::from_name(" xoauth2 "), Some(Mechanism::XOAuth2));
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(Mechanism::from_name("SCRAM-SHA-1"), None);
    }

    #[test]
    fn bearer_mechanisms_require_tls() {
        assert!(Mechanism::OAuthBearer.requires_tls());
        assert!(Mechanism::XOAuth2.requires_tls());
        assert!(Mechanism::Login.requires_tls());
        assert!(!Mechanism::CramMd5.requires_tls());
        assert!(!Mechanism::Gssapi.requires_tls());
    }

    #[test]
    fn challenge_response_mechanisms_are_server_first() {
        assert!(!Mechanism::CramMd5.client_first());
        assert!(!Mechanism::Gssapi.client_first());
        assert!(Mechanism::Plain.client_first());
        assert!(Mechanism::External.client_first());
    }
}

//! Server capabilities and response status words.

/// Status word of an OK/NO/BAD/PREAUTH/BYE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok,
    /// Operational failure: command understood, refused.
    No,
    /// Protocol failure: command rejected.
    Bad,
    /// Greeting that pre-authenticates the session.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    /// Parses a status word atom, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Whether this status indicates success.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        };
        f.write_str(s)
    }
}

/// A capability advertised by the server.
///
/// Only the capabilities this engine acts on get their own variant;
/// everything else is preserved in [`Capability::Unknown`] so the list
/// can be logged and re-checked verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Core IMAP4rev1 protocol.
    Imap4Rev1,
    /// In-band TLS upgrade available.
    StartTls,
    /// LOGIN command refused (until after STARTTLS, usually).
    LoginDisabled,
    /// SASL initial responses accepted inline (RFC 4959).
    SaslIr,
    /// Non-synchronizing literals (RFC 7888, `LITERAL+`).
    LiteralPlus,
    /// APPENDUID/COPYUID response codes (RFC 4315, `UIDPLUS`).
    UidPlus,
    /// MOVE command (RFC 6851).
    Move,
    /// LIST reports \HasChildren/\HasNoChildren (RFC 3348).
    Children,
    /// An `AUTH=` mechanism, name preserved as advertised.
    Auth(String),
    /// Anything else, preserved verbatim.
    Unknown(String),
}

impl Capability {
    /// Parses one capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if let Some(mech) = s.strip_prefix("AUTH=").or_else(|| s.strip_prefix("auth=")) {
            return Self::Auth(mech.to_uppercase());
        }
        match s.to_uppercase().as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "LITERAL+" => Self::LiteralPlus,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "CHILDREN" => Self::Children,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::LoginDisabled => f.write_str("LOGINDISABLED"),
            Self::SaslIr => f.write_str("SASL-IR"),
            Self::LiteralPlus => f.write_str("LITERAL+"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::Move => f.write_str("MOVE"),
            Self::Children => f.write_str("CHILDREN"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

//! Lexical tokens of a server line.

/// One token of a response line.
///
/// Atoms borrow from the input; quoted strings and literals own their
/// bytes because escapes and literal payloads cannot be represented as
/// slices of the raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bare atom, including backslash-prefixed flag atoms.
    Atom(&'a str),
    /// Double-quoted string, escapes resolved.
    QuotedString(String),
    /// Literal payload: the bytes following a `{n}` count.
    Literal(Vec<u8>),
    /// Unsigned decimal number.
    Number(u32),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// Single space.
    Space,
    /// `*` introducing an untagged response.
    Asterisk,
    /// `+` introducing a continuation request.
    Plus,
    /// The NIL atom.
    Nil,
    /// CRLF line terminator.
    Crlf,
    /// End of input.
    Eof,
}

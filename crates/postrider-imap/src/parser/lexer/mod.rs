//! Byte lexer for server responses.
//!
//! Splits one raw response unit (a CRLF line, possibly with embedded
//! literal payloads already read off the transport) into tokens. The
//! response parser drives it; nothing here knows what a response means.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// Tokenizer over one response unit.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the raw bytes of one response.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset, for error reporting.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// True once every input byte has been consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peeks `offset` bytes ahead.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Consumes and returns one byte.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips `n` bytes, clamped to the input length.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Produces the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("bare CR"))
                }
            }
            b' ' => {
                self.advance();
                Ok(Token::Space)
            }
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }
            b'"' => self.take_quoted(),
            b'{' => self.take_literal(),
            _ if is_atom_char(byte) => self.take_atom_or_number(),
            _ => Err(self.error(&format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn take_quoted(&mut self) -> Result<Token<'a>> {
        self.advance(); // opening quote

        let mut out = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => out.push(c),
                    Some(c) => return Err(self.error(&format!("invalid escape \\{}", c as char))),
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated quoted string")),
            }
        }

        String::from_utf8(out)
            .map(Token::QuotedString)
            .map_err(|_| self.error("quoted string is not UTF-8"))
    }

    /// Consumes `{n}` (or `{n+}`) plus its CRLF and exactly n payload
    /// bytes, all of which the transport has already buffered into this
    /// response unit.
    fn take_literal(&mut self) -> Result<Token<'a>> {
        self.advance(); // `{`

        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("literal count is not UTF-8"))?;
        let size: usize = digits
            .parse()
            .map_err(|_| self.error("literal count out of range"))?;

        // LITERAL+ marker; only the server's side of it matters here.
        if self.peek() == Some(b'+') {
            self.advance();
        }
        if self.advance() != Some(b'}') {
            return Err(self.error("missing } after literal count"));
        }
        if self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n') {
            self.skip(2);
        } else {
            return Err(self.error("missing CRLF after literal count"));
        }

        if self.pos + size > self.input.len() {
            return Err(self.error("literal payload truncated"));
        }
        let data = self.input[self.pos..self.pos + size].to_vec();
        self.skip(size);
        Ok(Token::Literal(data))
    }

    fn take_atom_or_number(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let mut all_digits = true;
        while let Some(b) = self.peek() {
            if !is_atom_char(b) {
                break;
            }
            all_digits &= b.is_ascii_digit();
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("atom is not UTF-8"))?;

        if all_digits {
            s.parse()
                .map(Token::Number)
                .map_err(|_| self.error("number out of range"))
        } else if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes a token and checks its kind (payload ignored).
    pub fn expect(&mut self, expected: &Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}, got {token:?}")))
        }
    }

    /// Consumes one space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(&Token::Space)
    }

    /// Reads an astring: atom, quoted string, or literal.
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => {
                String::from_utf8(data).map_err(|_| self.error("literal is not UTF-8"))
            }
            // INBOX named literally as NIL stays a name, not an absence.
            Token::Nil => Ok("NIL".to_string()),
            token => Err(self.error(&format!("expected astring, got {token:?}"))),
        }
    }

    /// Reads an nstring: NIL or a string form.
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s)),
            Token::Literal(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|_| self.error("literal is not UTF-8")),
            token => Err(self.error(&format!("expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number token.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("expected number, got {token:?}"))),
        }
    }

    /// Reads an atom token and returns the borrowed text.
    pub fn read_atom_str(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("expected atom, got {token:?}"))),
        }
    }

    /// Skips any run of spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }

    /// Takes everything up to the line's CRLF (or end) as text.
    pub fn rest_as_text(&mut self) -> String {
        let start = self.pos;
        let mut end = self.input.len();
        let mut i = self.pos;
        while i + 1 < self.input.len() {
            if self.input[i] == b'\r' && self.input[i + 1] == b'\n' {
                end = i;
                break;
            }
            i += 1;
        }
        self.pos = (end + 2).min(self.input.len());
        String::from_utf8_lossy(&self.input[start..end]).into_owned()
    }
}

/// Atom characters. Backslash is included so flag atoms like `\Seen`
/// lex as single tokens, although the grammar calls it a
/// quoted-special.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 | 0x23 | 0x24 | 0x26 | 0x27 |      // ! # $ & '
        0x2B..=0x5A |                           // + through Z
        0x5C |                                  // backslash
        0x5E..=0x7A |                           // ^ _ ` a-z
        0x7C | 0x7E                             // | ~
    )
}

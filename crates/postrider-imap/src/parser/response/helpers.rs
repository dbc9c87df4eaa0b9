//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, FolderEntry, Mailbox, MailboxAttribute, ResponseCode, SeqNum, Uid,
    UidSet, UidValidity,
};
use crate::{Error, Result};

use super::types::StatusItem;

/// Parses a response code.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(&Token::LBracket)?;

    let atom = lexer.read_atom_str()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid UID 0".to_string(),
            })?;
            ResponseCode::UidNext(uid)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let validity = UidValidity::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid UIDVALIDITY 0".to_string(),
            })?;
            ResponseCode::UidValidity(validity)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid sequence number 0".to_string(),
            })?;
            ResponseCode::Unseen(seq)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let validity = read_uid_validity(lexer)?;
            lexer.expect_space()?;
            let uids = read_uid_set(lexer)?;
            ResponseCode::AppendUid { validity, uids }
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let validity = read_uid_validity(lexer)?;
            lexer.expect_space()?;
            let source = read_uid_set(lexer)?;
            lexer.expect_space()?;
            let dest = read_uid_set(lexer)?;
            ResponseCode::CopyUid {
                validity,
                source,
                dest,
            }
        }
        "CAPABILITY" => {
            let caps = parse_capability_data(lexer)?;
            ResponseCode::Capability(caps)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            let flags = parse_flag_list(lexer)?;
            ResponseCode::PermanentFlags(flags)
        }
        _ => {
            // Skip until ]
            while lexer.peek() != Some(b']') && !lexer.is_eof() {
                lexer.advance();
            }
            ResponseCode::Unknown(atom.to_string())
        }
    };

    // Skip to closing bracket
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(&Token::RBracket)?;

    Ok(code)
}

fn read_uid_validity(lexer: &mut Lexer<'_>) -> Result<UidValidity> {
    let n = lexer.read_number()?;
    UidValidity::new(n).ok_or_else(|| Error::Parse {
        position: lexer.position(),
        message: "Invalid UIDVALIDITY 0".to_string(),
    })
}

/// Reads a uid-set. A lone UID lexes as a number, anything with `,` or
/// `:` lexes as one atom.
fn read_uid_set(lexer: &mut Lexer<'_>) -> Result<UidSet> {
    let position = lexer.position();
    let text = match lexer.next_token()? {
        Token::Number(n) => n.to_string(),
        Token::Atom(s) => s.to_string(),
        token => {
            return Err(Error::Parse {
                position,
                message: format!("Expected uid-set, got {token:?}"),
            });
        }
    };

    UidSet::parse(&text).ok_or_else(|| Error::Parse {
        position,
        message: format!("Invalid uid-set: {text}"),
    })
}

/// Parses capability data.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(&Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            // `\*` in PERMANENTFLAGS lexes as a lone backslash atom
            // followed by an asterisk token.
            Token::Atom("\\") if lexer.peek() == Some(b'*') => {
                lexer.advance();
                flags.insert(Flag::Keyword("\\*".to_string()));
            }
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in flag list: {token:?}"),
                });
            }
        }
    }

    Ok(flags)
}

/// Parses a LIST or LSUB response body.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<FolderEntry> {
    // Parse attributes
    lexer.expect(&Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in LIST attributes: {token:?}"),
                });
            }
        }
    }

    lexer.expect_space()?;

    // Parse delimiter
    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected delimiter, got {token:?}"),
            });
        }
    };

    lexer.expect_space()?;

    // Parse mailbox name
    let mailbox_name = lexer.read_astring()?;

    Ok(FolderEntry {
        attributes,
        delimiter,
        name: Mailbox::new(mailbox_name),
    })
}

/// Parses a SEARCH response.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<SeqNum>> {
    let mut nums = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Number(n) = lexer.next_token()?
            && let Some(seq) = SeqNum::new(n)
        {
            nums.push(seq);
        }
    }

    Ok(nums)
}

/// Parses a STATUS response.
pub fn parse_status_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<StatusItem>)> {
    let mailbox_name = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(&Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                lexer.expect_space()?;
                let value = lexer.read_number()?;

                let item = match name.to_uppercase().as_str() {
                    "MESSAGES" => StatusItem::Messages(value),
                    "RECENT" => StatusItem::Recent(value),
                    "UIDNEXT" => {
                        if let Some(uid) = Uid::new(value) {
                            StatusItem::UidNext(uid)
                        } else {
                            continue;
                        }
                    }
                    "UIDVALIDITY" => {
                        if let Some(v) = UidValidity::new(value) {
                            StatusItem::UidValidity(v)
                        } else {
                            continue;
                        }
                    }
                    "UNSEEN" => StatusItem::Unseen(value),
                    _ => continue,
                };
                items.push(item);
            }
            _ => continue,
        }
    }

    Ok((Mailbox::new(mailbox_name), items))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::manual_string_new)]
mod tests {
    use super::*;

    mod response_code_tests {
        use super::*;

        #[test]
        fn alert() {
            let mut lexer = Lexer::new(b"[ALERT]");
            assert_eq!(parse_response_code(&mut lexer).unwrap(), ResponseCode::Alert);
        }

        #[test]
        fn uidvalidity() {
            let mut lexer = Lexer::new(b"[UIDVALIDITY 3857529045]");
            let code = parse_response_code(&mut lexer).unwrap();
            assert_eq!(
                code,
                ResponseCode::UidValidity(UidValidity::new(3_857_529_045).unwrap())
            );
        }

        #[test]
        fn uidvalidity_zero_is_rejected() {
            let mut lexer = Lexer::new(b"[UIDVALIDITY 0]");
            assert!(parse_response_code(&mut lexer).is_err());
        }

        #[test]
        fn appenduid() {
            let mut lexer = Lexer::new(b"[APPENDUID 38505 3955]");
            let code = parse_response_code(&mut lexer).unwrap();
            let ResponseCode::AppendUid { validity, uids } = code else {
                panic!("expected APPENDUID");
            };
            assert_eq!(validity.get(), 38505);
            assert_eq!(uids.expand(), vec![Uid::new(3955).unwrap()]);
        }

        #[test]
        fn copyuid_with_ranges() {
            let mut lexer = Lexer::new(b"[COPYUID 38505 304,319:320 3956:3958]");
            let code = parse_response_code(&mut lexer).unwrap();
            let ResponseCode::CopyUid {
                validity,
                source,
                dest,
            } = code
            else {
                panic!("expected COPYUID");
            };
            assert_eq!(validity.get(), 38505);
            let src: Vec<u32> = source.expand().iter().map(|u| u.get()).collect();
            let dst: Vec<u32> = dest.expand().iter().map(|u| u.get()).collect();
            assert_eq!(src, vec![304, 319, 320]);
            assert_eq!(dst, vec![3956, 3957, 3958]);
        }

        #[test]
        fn permanentflags() {
            let mut lexer = Lexer::new(b"[PERMANENTFLAGS (\\Seen \\Deleted \\*)]");
            let code = parse_response_code(&mut lexer).unwrap();
            let ResponseCode::PermanentFlags(flags) = code else {
                panic!("expected PERMANENTFLAGS");
            };
            assert!(flags.contains(&Flag::Seen));
            assert!(flags.contains(&Flag::Deleted));
            assert!(flags.contains(&Flag::Keyword("\\*".to_string())));
        }

        #[test]
        fn unknown_code_is_skipped_whole() {
            let mut lexer = Lexer::new(b"[BADCHARSET (US-ASCII)] rest");
            let code = parse_response_code(&mut lexer).unwrap();
            assert_eq!(code, ResponseCode::Unknown("BADCHARSET".to_string()));
            assert_eq!(lexer.peek(), Some(b' '));
        }
    }

    mod list_tests {
        use super::*;

        #[test]
        fn list_with_attributes() {
            let mut lexer = Lexer::new(b"(\\HasNoChildren \\Trash) \"/\" \"[Gmail]/Trash\"");
            let entry = parse_list_response(&mut lexer).unwrap();
            assert!(entry.attributes.contains(&MailboxAttribute::HasNoChildren));
            assert!(entry.attributes.contains(&MailboxAttribute::Trash));
            assert_eq!(entry.delimiter, Some('/'));
            assert_eq!(entry.name.as_str(), "[Gmail]/Trash");
        }

        #[test]
        fn nil_delimiter() {
            let mut lexer = Lexer::new(b"(\\Noinferiors) NIL INBOX");
            let entry = parse_list_response(&mut lexer).unwrap();
            assert_eq!(entry.delimiter, None);
            assert_eq!(entry.name.as_str(), "INBOX");
        }

        #[test]
        fn literal_mailbox_name() {
            let mut lexer = Lexer::new(b"() \".\" {7}\r\nArchive");
            let entry = parse_list_response(&mut lexer).unwrap();
            assert_eq!(entry.name.as_str(), "Archive");
        }
    }

    #[test]
    fn search_numbers() {
        let mut lexer = Lexer::new(b" 2 84 882");
        let nums = parse_search_response(&mut lexer).unwrap();
        let got: Vec<u32> = nums.iter().map(|s| s.get()).collect();
        assert_eq!(got, vec![2, 84, 882]);
    }

    #[test]
    fn search_empty() {
        let mut lexer = Lexer::new(b"");
        assert!(parse_search_response(&mut lexer).unwrap().is_empty());
    }

    #[test]
    fn status_items() {
        let mut lexer = Lexer::new(b"blurdybloop (MESSAGES 231 UIDNEXT 44292 UNSEEN 3)");
        let (mailbox, items) = parse_status_response(&mut lexer).unwrap();
        assert_eq!(mailbox.as_str(), "blurdybloop");
        assert_eq!(
            items,
            vec![
                StatusItem::Messages(231),
                StatusItem::UidNext(Uid::new(44292).unwrap()),
                StatusItem::Unseen(3),
            ]
        );
    }

    #[test]
    fn flag_list_with_keywords() {
        let mut lexer = Lexer::new(b"(\\Answered $Forwarded)");
        let flags = parse_flag_list(&mut lexer).unwrap();
        assert!(flags.contains(&Flag::Answered));
        assert!(flags.contains(&Flag::Keyword("$Forwarded".to_string())));
    }
}

//! IMAP protocol parser.
//!
//! A sans-I/O parser for server responses: the transport hands it one
//! complete response unit (a line plus any literal payloads announced
//! on it) and gets back a structured [`Response`].
//!
//! # Architecture
//!
//! - **Lexer**: tokenizes raw bytes into IMAP tokens (atoms, strings,
//!   numbers, literals)
//! - **Response parser**: builds structured response objects from
//!   tokens
//!
//! # Example
//!
//! ```
//! use postrider_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let input = b"* OK IMAP4rev1 service ready\r\n";
//! let response = ResponseParser::parse(input).unwrap();
//!
//! match response {
//!     Response::Untagged(UntaggedResponse::Ok { text, .. }) => {
//!         assert!(text.contains("IMAP4rev1"));
//!     }
//!     _ => panic!("Expected untagged OK"),
//! }
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, StatusItem, UntaggedResponse};

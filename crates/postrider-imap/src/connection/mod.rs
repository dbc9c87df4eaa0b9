//! Connection plumbing.
//!
//! - Configuration (host, port, security mode, limits)
//! - TLS/plaintext stream abstraction
//! - Framed I/O: one read yields one complete response unit

mod config;
mod framed;
mod stream;

pub use config::{Security, SessionConfig, SessionConfigBuilder};
pub use framed::{FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
pub use stream::{ImapStream, connect_plain, connect_tls, tls_connector};

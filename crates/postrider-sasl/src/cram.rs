//! CRAM-MD5 challenge response (RFC 2195).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::{Result, SaslError};

type HmacMd5 = Hmac<Md5>;

/// Computes the CRAM-MD5 reply for a server challenge.
///
/// The challenge arrives base64 encoded in the continuation line. The
/// reply is `<username> SP <lowercase hex of HMAC-MD5(secret, challenge)>`,
/// base64 encoded. The shared secret itself never appears on the wire,
/// which is why this mechanism is usable before a TLS upgrade.
///
/// # Errors
///
/// Returns [`SaslError::Base64`] if the challenge is not valid base64.
pub fn cram_md5_response(username: &str, secret: &str, challenge_b64: &str) -> Result<String> {
    let challenge = STANDARD.decode(challenge_b64.trim())?;
    let mut mac = HmacMd5::new_from_slice(secret.as_bytes()).map_err(|_| SaslError::InvalidKey)?;
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();

    let reply = format!("{username} {}", lower_hex(&digest));
    Ok(STANDARD.encode(reply.as_bytes()))
}

fn lower_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

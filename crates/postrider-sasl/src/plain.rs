//! PLAIN and EXTERNAL initial responses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates the PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>`, base64 encoded. The leading NUL
/// is the empty authorization identity (authorize as the authenticated
/// user).
///
/// # Example
///
/// ```
/// use postrider_sasl::plain_response;
///
/// let response = plain_response("tim", "tanstaaftanstaaf");
/// assert_eq!(response, "AHRpbQB0YW5zdGFhZnRhbnN0YWFm");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates the EXTERNAL initial response (RFC 4422 appendix A).
///
/// The payload is the requested authorization identity, or empty to
/// derive it from the transport credentials. An empty payload is sent
/// on the wire as `=` per RFC 4959; that substitution belongs to the
/// protocol layer, so this function simply returns the encoding of the
/// identity bytes (empty string for an empty identity).
#[must_use]
pub fn external_response(authzid: &str) -> String {
    STANDARD.encode(authzid.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn plain_rfc4616_vector() {
        // The example exchange from RFC 4616 section 4.
        assert_eq!(
            plain_response("tim", "tanstaaftanstaaf"),
            "AHRpbQB0YW5zdGFhZnRhbnN0YWFm"
        );
    }

    #[test]
    fn plain_embeds_two_nuls() {
        let decoded = STANDARD.decode(plain_response("user", "pass")).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn external_empty_identity() {
        assert_eq!(external_response(""), "");
    }

    #[test]
    fn external_carries_identity() {
        let decoded = STANDARD
            .decode(external_response("admin@example.com"))
            .unwrap();
        assert_eq!(decoded, b"admin@example.com");
    }
}

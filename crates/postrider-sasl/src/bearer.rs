//! OAUTHBEARER and XOAUTH2 assertions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates the OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`, base64 encoded.
///
/// # Example
///
/// ```
/// use postrider_sasl::oauthbearer_response;
///
/// let response = oauthbearer_response("user@example.com", "ya29.a0...");
/// ```
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates the XOAUTH2 initial response (Google/Microsoft proprietary).
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`, base64 encoded.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Parses the JSON error blob a bearer-auth server returns in the
/// continuation that follows a rejected assertion.
///
/// Shape: `{"status":"401","schemes":"bearer","scope":"..."}`. The
/// client acknowledges the blob with an empty line and then receives
/// the tagged NO.
///
/// # Errors
///
/// Returns a `serde_json` error if the blob is not valid JSON of that
/// shape.
pub fn parse_oauth_error(blob: &str) -> Result<OAuthErrorBlob, serde_json::Error> {
    serde_json::from_str(blob)
}

/// Bearer-auth failure details from the server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuthErrorBlob {
    /// HTTP-style status code.
    pub status: String,
    /// Authentication schemes the server supports.
    pub schemes: String,
    /// `OAuth2` scope the server wanted.
    pub scope: Option<String>,
}

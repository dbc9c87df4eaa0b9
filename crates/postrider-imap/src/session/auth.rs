//! Connection greeting, transport upgrade, and authentication.
//!
//! The negotiator runs once per connection: read the greeting, settle
//! capabilities, upgrade to TLS when required or available, then drive
//! the credential mechanism to its tagged completion. NO/BAD during a
//! mechanism becomes [`Error::Auth`] and leaves the transport alive so
//! the caller can retry other credentials; everything transport-shaped
//! stays fatal.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use postrider_sasl::{
    GssExchange, GssStep, Mechanism, SecurityOffer, cram_md5_response, external_response,
    oauthbearer_response, parse_oauth_error, plain_response, security_reply, xoauth2_response,
};

use crate::cancel::CancelToken;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{Response, UntaggedResponse};
use crate::session::link::{CommandOutcome, Link, Step};
use crate::session::reconcile::PendingChanges;
use crate::types::{Capability, Credentials, ResponseCode, Secret, Tag};

/// What the server said first.
#[derive(Debug)]
pub(crate) struct Greeting {
    /// PREAUTH greeting: the session starts authenticated.
    pub pre_authenticated: bool,
    /// Capabilities piggybacked on the greeting, if any.
    pub capabilities: Option<Vec<Capability>>,
}

/// Reads the untagged greeting that the server sends unprompted.
pub(crate) async fn read_greeting(link: &mut Link, cancel: &CancelToken) -> Result<Greeting> {
    match link.next_response(cancel).await? {
        Response::Untagged(UntaggedResponse::Ok { code, text }) => {
            tracing::info!(text, "greeting");
            Ok(Greeting {
                pre_authenticated: false,
                capabilities: capabilities_from_code(code),
            })
        }
        Response::Untagged(UntaggedResponse::PreAuth { code, text }) => {
            tracing::info!(text, "pre-authenticated greeting");
            Ok(Greeting {
                pre_authenticated: true,
                capabilities: capabilities_from_code(code),
            })
        }
        Response::Untagged(UntaggedResponse::Bye { text, .. }) => Err(Error::Bye(text)),
        other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
    }
}

fn capabilities_from_code(code: Option<ResponseCode>) -> Option<Vec<Capability>> {
    match code {
        Some(ResponseCode::Capability(caps)) => Some(caps),
        _ => None,
    }
}

/// Asks the server for its capability list.
pub(crate) async fn query_capabilities(
    link: &mut Link,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
) -> Result<Vec<Capability>> {
    let outcome = link
        .run(&Command::Capability, pending, cancel)
        .await?
        .into_result()?;
    for item in outcome.data {
        if let UntaggedResponse::Capability(caps) = item {
            return Ok(caps);
        }
    }
    if let Some(ResponseCode::Capability(caps)) = outcome.code {
        return Ok(caps);
    }
    Err(Error::Protocol(
        "CAPABILITY completed without a capability list".to_string(),
    ))
}

/// Sends STARTTLS and swaps the transport for its encrypted form.
/// The caller must re-query capabilities afterwards; the plaintext
/// list is not trustworthy and usually differs.
pub(crate) async fn upgrade_starttls(
    mut link: Link,
    host: &str,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
) -> Result<Link> {
    link.run(&Command::StartTls, pending, cancel)
        .await?
        .into_result()?;
    link.upgrade_to_tls(host).await
}

/// Drives the configured mechanism to completion.
///
/// Returns the capability list when the completion carried one, so the
/// session can skip the post-auth CAPABILITY round trip.
pub(crate) async fn authenticate(
    link: &mut Link,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
    credentials: &Credentials,
    capabilities: &[Capability],
    gss: Option<&mut dyn GssExchange>,
) -> Result<Option<Vec<Capability>>> {
    let mechanism = credentials.mechanism;
    if credentials.require_tls && !link.is_tls() {
        return Err(Error::Auth(format!(
            "{mechanism} requires an encrypted transport and none was established"
        )));
    }

    let outcome = match mechanism {
        Mechanism::Login => login(link, pending, cancel, credentials, capabilities).await?,
        Mechanism::Plain => {
            let initial = plain_response(&credentials.user, credentials.secret.reveal());
            client_first(link, pending, cancel, mechanism, initial, capabilities).await?
        }
        Mechanism::OAuthBearer => {
            let initial = oauthbearer_response(&credentials.user, credentials.secret.reveal());
            client_first(link, pending, cancel, mechanism, initial, capabilities).await?
        }
        Mechanism::XOAuth2 => {
            let initial = xoauth2_response(&credentials.user, credentials.secret.reveal());
            client_first(link, pending, cancel, mechanism, initial, capabilities).await?
        }
        Mechanism::External => {
            let initial = external_response("");
            client_first(link, pending, cancel, mechanism, initial, capabilities).await?
        }
        Mechanism::CramMd5 => cram_md5(link, pending, cancel, credentials, capabilities).await?,
        Mechanism::Gssapi => {
            let Some(context) = gss else {
                return Err(Error::Auth(
                    "GSSAPI selected but no security context was supplied".to_string(),
                ));
            };
            gssapi(link, pending, cancel, context, capabilities).await?
        }
    };

    // Servers hand the post-auth capability list back either as a
    // bracketed code on the completion or as untagged data during the
    // exchange.
    let mut caps = match outcome.code {
        Some(ResponseCode::Capability(caps)) => Some(caps),
        _ => None,
    };
    if caps.is_none() {
        for item in outcome.data {
            if let UntaggedResponse::Capability(list) = item {
                caps = Some(list);
                break;
            }
        }
    }
    tracing::info!(mechanism = %mechanism, "authenticated");
    Ok(caps)
}

/// The native LOGIN command. Refused fail-closed when the server
/// advertises LOGINDISABLED.
async fn login(
    link: &mut Link,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
    credentials: &Credentials,
    capabilities: &[Capability],
) -> Result<CommandOutcome> {
    if capabilities.contains(&Capability::LoginDisabled) {
        return Err(Error::Auth(
            "server has disabled LOGIN on this transport".to_string(),
        ));
    }
    let command = Command::Login {
        username: credentials.user.clone(),
        password: credentials.secret.clone(),
    };
    link.run(&command, pending, cancel)
        .await
        .and_then(CommandOutcome::into_result)
        .map_err(as_auth_failure)
}

/// Client-first SASL mechanisms (PLAIN, the bearer pair, EXTERNAL):
/// the assertion goes inline when the server accepts initial responses,
/// otherwise after one continuation round trip. A continuation arriving
/// *after* the assertion is a bearer error blob; acknowledge it with an
/// empty line so the tagged NO can arrive.
async fn client_first(
    link: &mut Link,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
    mechanism: Mechanism,
    initial: String,
    capabilities: &[Capability],
) -> Result<CommandOutcome> {
    require_mechanism(capabilities, mechanism)?;
    let sasl_ir = capabilities.contains(&Capability::SaslIr);

    let command = Command::Authenticate {
        mechanism: mechanism.name().to_string(),
        initial_response: sasl_ir.then(|| Secret::new(initial.clone())),
    };
    let tag = link.send(&command).await?;

    let mut data = Vec::new();
    let mut assertion_sent = sasl_ir;
    loop {
        match link.step(&tag, pending, &mut data, cancel).await? {
            Step::Done(outcome) => {
                return outcome.into_result().map_err(as_auth_failure);
            }
            Step::Continuation(_) if !assertion_sent => {
                // An empty assertion goes out as a bare line here; the
                // "=" form exists only in the inline position.
                link.reply_continuation(&initial).await?;
                assertion_sent = true;
            }
            Step::Continuation(blob) => {
                // Bearer-style rejection: the blob describes the
                // failure, the empty reply lets the NO through.
                if let Some(details) = blob.as_deref().and_then(decode_bearer_error) {
                    tracing::debug!(
                        status = %details.status,
                        schemes = %details.schemes,
                        "bearer assertion rejected"
                    );
                }
                link.reply_continuation("").await?;
            }
        }
    }
}

/// CRAM-MD5: one challenge, one keyed-digest reply.
async fn cram_md5(
    link: &mut Link,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
    credentials: &Credentials,
    capabilities: &[Capability],
) -> Result<CommandOutcome> {
    require_mechanism(capabilities, Mechanism::CramMd5)?;
    let command = Command::Authenticate {
        mechanism: Mechanism::CramMd5.name().to_string(),
        initial_response: None,
    };
    let tag = link.send(&command).await?;

    let mut data = Vec::new();
    let mut replied = false;
    loop {
        match link.step(&tag, pending, &mut data, cancel).await? {
            Step::Done(outcome) => {
                return outcome.into_result().map_err(as_auth_failure);
            }
            Step::Continuation(Some(challenge)) if !replied => {
                let reply = cram_md5_response(
                    &credentials.user,
                    credentials.secret.reveal(),
                    &challenge,
                )?;
                link.reply_continuation(&reply).await?;
                replied = true;
            }
            Step::Continuation(_) => {
                let reason = if replied {
                    "server continued past the CRAM-MD5 digest"
                } else {
                    "empty CRAM-MD5 challenge"
                };
                return Err(abort_exchange(link, &tag, pending, cancel, reason).await);
            }
        }
    }
}

/// GSSAPI (RFC 4752): establishment rounds against the opaque context,
/// then the wrapped security-layer negotiation.
async fn gssapi(
    link: &mut Link,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
    context: &mut dyn GssExchange,
    capabilities: &[Capability],
) -> Result<CommandOutcome> {
    require_mechanism(capabilities, Mechanism::Gssapi)?;
    let command = Command::Authenticate {
        mechanism: Mechanism::Gssapi.name().to_string(),
        initial_response: None,
    };
    let tag = link.send(&command).await?;

    let mut data = Vec::new();
    let mut established = false;
    loop {
        match link.step(&tag, pending, &mut data, cancel).await? {
            Step::Done(outcome) => {
                return outcome.into_result().map_err(as_auth_failure);
            }
            Step::Continuation(challenge) => {
                match gss_round(context, challenge.as_deref(), &mut established) {
                    Ok(reply) => link.reply_continuation(&reply).await?,
                    Err(err) => {
                        return Err(
                            abort_exchange(link, &tag, pending, cancel, &err.to_string()).await
                        );
                    }
                }
            }
        }
    }
}

/// One GSSAPI round: establishment tokens until the context completes,
/// then the wrapped security-layer offer, which this client answers
/// with "no layer".
fn gss_round(
    context: &mut dyn GssExchange,
    challenge: Option<&str>,
    established: &mut bool,
) -> Result<String> {
    let token = decode_challenge(challenge)?;
    let reply = if *established {
        let plain = context.unwrap(&token)?;
        SecurityOffer::parse(&plain)?;
        context.wrap(&security_reply(""))?
    } else {
        match context.step(&token)? {
            GssStep::Continue(next) => next,
            GssStep::Complete(finish) => {
                *established = true;
                finish
            }
        }
    };
    Ok(BASE64.encode(reply))
}

fn require_mechanism(capabilities: &[Capability], mechanism: Mechanism) -> Result<()> {
    let offered = capabilities
        .iter()
        .any(|c| matches!(c, Capability::Auth(m) if m == mechanism.name()));
    if offered {
        Ok(())
    } else {
        Err(Error::Auth(format!("server does not offer AUTH={mechanism}")))
    }
}

fn decode_challenge(challenge: Option<&str>) -> Result<Vec<u8>> {
    let text = challenge.unwrap_or("");
    BASE64
        .decode(text.trim())
        .map_err(|err| Error::Auth(format!("challenge is not base64: {err}")))
}

fn decode_bearer_error(blob: &str) -> Option<postrider_sasl::OAuthErrorBlob> {
    let decoded = BASE64.decode(blob.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    parse_oauth_error(&text).ok()
}

/// Cancels an in-progress SASL exchange with the `*` abort line and
/// consumes the server's completion, so the connection is back at a
/// command boundary when the auth error is reported.
async fn abort_exchange(
    link: &mut Link,
    tag: &Tag,
    pending: &mut PendingChanges,
    cancel: &CancelToken,
    reason: &str,
) -> Error {
    if link.reply_continuation("*").await.is_err() {
        return Error::Auth(reason.to_string());
    }
    let mut data = Vec::new();
    loop {
        match link.step(tag, pending, &mut data, cancel).await {
            Ok(Step::Done(_)) => break,
            Ok(Step::Continuation(_)) => {
                if link.reply_continuation("*").await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    Error::Auth(reason.to_string())
}

/// NO/BAD during authentication is a credential failure, not a dead
/// transport.
fn as_auth_failure(err: Error) -> Error {
    match err {
        Error::No(text) | Error::Bad(text) => Error::Auth(text),
        other => other,
    }
}

//! End-to-end tests against a scripted server.
//!
//! Each test binds a loopback listener and walks a script that
//! interleaves expected client lines with canned replies, so command
//! wire forms, tag sequencing, and reconciliation are all checked
//! without a real server. Tags are deterministic: capabilities ride
//! the greeting and the LOGIN completion, so no CAPABILITY round
//! trips shift the numbering.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use postrider_imap::{
    CancelToken, CollectingObserver, Credentials, Error, Flag, Flags, Mailbox, MailboxChange,
    Mechanism, MemoryCache, MemoryMirror, MessageCache, MessagePart, NoopObserver, SearchCriteria,
    Secret, Security, SeqNum, Session, SessionConfig, StatusAttribute, StatusItem, Uid,
    UidValidity,
};

/// Routes engine tracing into the test harness, once per binary.
/// `RUST_LOG` narrows it the usual way.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("postrider_imap=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// One step of a server script.
enum Step {
    /// Read one line and assert it contains the needle.
    Expect(&'static str),
    /// Read exactly this many raw bytes (literal payloads).
    ExpectBytes(usize),
    /// Write raw bytes to the client.
    Reply(&'static str),
    /// Hold the socket open without answering.
    Stall(Duration),
}

/// Runs a script against the first connection, returning everything
/// the client sent. Await the handle at the end of the test so script
/// assertion panics propagate.
async fn script_server(script: Vec<Step>) -> (u16, JoinHandle<Vec<String>>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut received = Vec::new();
        for step in script {
            match step {
                Step::Expect(needle) => {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    let line = line.trim_end().to_string();
                    assert!(
                        line.contains(needle),
                        "expected {needle:?} on the wire, got {line:?}"
                    );
                    received.push(line);
                }
                Step::ExpectBytes(count) => {
                    let mut buf = vec![0u8; count];
                    reader.read_exact(&mut buf).await.unwrap();
                    received.push(String::from_utf8_lossy(&buf).into_owned());
                }
                Step::Reply(text) => write.write_all(text.as_bytes()).await.unwrap(),
                Step::Stall(pause) => tokio::time::sleep(pause).await,
            }
        }
        received
    });
    (port, handle)
}

const GREETING: &str =
    "* OK [CAPABILITY IMAP4rev1 LITERAL+ UIDPLUS MOVE] scripted server ready\r\n";
const LOGIN_OK: &str = "T1 OK [CAPABILITY IMAP4rev1 LITERAL+ UIDPLUS MOVE] LOGIN completed\r\n";

fn config(port: u16) -> SessionConfig {
    SessionConfig::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .connect_timeout(Duration::from_secs(5))
        .command_timeout(Duration::from_secs(5))
        .build()
}

/// The scripts run over plaintext loopback; [`Credentials::login`]
/// would refuse to send there.
fn plaintext_login() -> Credentials {
    Credentials {
        user: "ada".to_string(),
        secret: Secret::from("sesame"),
        mechanism: Mechanism::Login,
        require_tls: false,
    }
}

async fn login_session(
    session_config: SessionConfig,
) -> (Session<MemoryCache, MemoryMirror>, CancelToken) {
    let cancel = CancelToken::new();
    let mut session = Session::connect(
        session_config,
        MemoryCache::new(),
        MemoryMirror::new(),
        &cancel,
    )
    .await
    .unwrap();
    session
        .authenticate(&plaintext_login(), &cancel)
        .await
        .unwrap();
    (session, cancel)
}

fn seq(n: u32) -> SeqNum {
    SeqNum::new(n).unwrap()
}

fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

#[tokio::test]
async fn select_reports_status_and_warms_the_cache() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN ada sesame"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 2 EXISTS\r\n",
            "* 0 RECENT\r\n",
            "* FLAGS (\\Answered \\Seen)\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "* OK [UIDNEXT 12] predicted\r\n",
            "* OK [UNSEEN 2] first unseen\r\n",
            "* OK [PERMANENTFLAGS (\\Seen)] limited\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:2 (FLAGS UID)"),
        Step::Reply(concat!(
            "* 1 FETCH (FLAGS (\\Seen) UID 3)\r\n",
            "* 2 FETCH (FLAGS () UID 9)\r\n",
            "T3 OK FETCH completed\r\n",
        )),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    assert!(session.is_authenticated());

    let status = session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();
    assert_eq!(status.exists, 2);
    assert_eq!(status.recent, 0);
    assert_eq!(status.unseen, SeqNum::new(2));
    assert_eq!(status.uid_next, Uid::new(12));
    assert_eq!(status.uid_validity, UidValidity::new(7));
    assert!(!status.read_only);
    assert!(status.flags.contains(&Flag::Answered));
    assert!(status.permanent_flags.is_seen());

    assert_eq!(session.current_folder().map(Mailbox::as_str), Some("INBOX"));
    assert_eq!(session.message_count(), Some(2));
    assert!(session.message_flags(seq(1)).unwrap().is_seen());
    assert!(!session.message_flags(seq(2)).unwrap().is_seen());

    // The flags refresh warmed one cache row per message.
    let known = session.cache().known("INBOX").await.unwrap();
    let uids: Vec<u32> = known.iter().map(|s| s.uid.get()).collect();
    assert_eq!(uids, vec![3, 9]);
    assert_eq!(
        session.cache().uid_validity("INBOX").await.unwrap(),
        UidValidity::new(7)
    );

    server.await.unwrap();
}

#[tokio::test]
async fn refresh_reconciles_expunges_and_new_arrivals() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 10 EXISTS\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:10 (FLAGS UID)"),
        Step::Reply(concat!(
            "* 1 FETCH (FLAGS () UID 101)\r\n",
            "* 2 FETCH (FLAGS () UID 102)\r\n",
            "* 3 FETCH (FLAGS () UID 103)\r\n",
            "* 4 FETCH (FLAGS () UID 104)\r\n",
            "* 5 FETCH (FLAGS () UID 105)\r\n",
            "* 6 FETCH (FLAGS () UID 106)\r\n",
            "* 7 FETCH (FLAGS () UID 107)\r\n",
            "* 8 FETCH (FLAGS () UID 108)\r\n",
            "* 9 FETCH (FLAGS () UID 109)\r\n",
            "* 10 FETCH (FLAGS () UID 110)\r\n",
            "T3 OK FETCH completed\r\n",
        )),
        Step::Expect("T4 NOOP"),
        Step::Reply(concat!(
            "* 12 EXISTS\r\n",
            "* 5 EXPUNGE\r\n",
            "* 5 EXPUNGE\r\n",
            "T4 OK NOOP completed\r\n",
        )),
        // Two arrivals net of two expunges: the tail re-fetch covers
        // exactly the new ordinals.
        Step::Expect("T5 FETCH 9:10 (FLAGS UID)"),
        Step::Reply(concat!(
            "* 9 FETCH (FLAGS () UID 111)\r\n",
            "* 10 FETCH (FLAGS () UID 112)\r\n",
            "T5 OK FETCH completed\r\n",
        )),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();

    let mut observer = CollectingObserver::new();
    session.refresh(&cancel, &mut observer).await.unwrap();

    assert_eq!(session.message_count(), Some(10));
    let changes = observer.take();
    assert_eq!(
        changes
            .iter()
            .filter(|c| matches!(c, MailboxChange::Expunged(_)))
            .count(),
        2
    );
    assert!(changes.contains(&MailboxChange::Expunged(seq(5))));
    assert!(changes.contains(&MailboxChange::NewMessages {
        first_ordinal: 9,
        count: 2
    }));

    // Expunged rows dropped, arrivals warmed.
    let uids: Vec<u32> = session
        .cache()
        .known("INBOX")
        .await
        .unwrap()
        .iter()
        .map(|s| s.uid.get())
        .collect();
    assert_eq!(
        uids,
        vec![101, 102, 103, 104, 107, 108, 109, 110, 111, 112]
    );

    server.await.unwrap();
}

#[tokio::test]
async fn fetched_text_is_cached_and_mirrored() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 1 EXISTS\r\n",
            "* OK [UIDVALIDITY 3] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:1 (FLAGS UID)"),
        Step::Reply("* 1 FETCH (FLAGS (\\Seen) UID 42)\r\nT3 OK FETCH completed\r\n"),
        Step::Expect("T4 FETCH 1 (UID RFC822.HEADER)"),
        Step::Reply(concat!(
            "* 1 FETCH (UID 42 RFC822.HEADER {15}\r\n",
            "Subject: hi\r\n\r\n",
            ")\r\n",
            "T4 OK FETCH completed\r\n",
        )),
        // The header is already held, so only the text goes over the
        // wire.
        Step::Expect("T5 FETCH 1 (UID BODY.PEEK[TEXT])"),
        Step::Reply(concat!(
            "* 1 FETCH (UID 42 BODY[TEXT] {10}\r\n",
            "the body\r\n",
            ")\r\n",
            "T5 OK FETCH completed\r\n",
        )),
        Step::Expect("T6 NOOP"),
        Step::Reply("T6 OK NOOP completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();

    let header = session.fetch_header(seq(1), &cancel).await.unwrap();
    assert_eq!(header, b"Subject: hi\n\n");

    // Second read answers from the cache; the T6 needle below proves
    // no extra FETCH went out.
    let again = session.fetch_header(seq(1), &cancel).await.unwrap();
    assert_eq!(again, header);

    let full = session.fetch_body(seq(1), &cancel).await.unwrap();
    assert_eq!(full, b"Subject: hi\n\nthe body\n");

    session.noop(&cancel).await.unwrap();

    let body = session
        .cache()
        .get("INBOX", uid(42), MessagePart::Body)
        .await
        .unwrap();
    assert_eq!(body.as_deref(), Some(b"the body\n".as_slice()));

    // Mirror: the header landed once (13 bytes), then the grown span
    // re-appended the whole message (22 bytes).
    assert_eq!(session.mirror().bytes.len(), 13 + 22);

    server.await.unwrap();
}

#[tokio::test]
async fn pending_events_block_reads_until_refresh() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 1 EXISTS\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:1 (FLAGS UID)"),
        Step::Reply("* 1 FETCH (FLAGS () UID 51)\r\nT3 OK FETCH completed\r\n"),
        Step::Expect("T4 NOOP"),
        Step::Reply("* 2 EXISTS\r\nT4 OK NOOP completed\r\n"),
        // The blocked fetch sends nothing; the next line is refresh's
        // tail re-fetch.
        Step::Expect("T5 FETCH 2:2 (FLAGS UID)"),
        Step::Reply("* 2 FETCH (FLAGS () UID 55)\r\nT5 OK FETCH completed\r\n"),
        Step::Expect("T6 FETCH 1 (UID RFC822.HEADER)"),
        Step::Reply(concat!(
            "* 1 FETCH (UID 51 RFC822.HEADER {15}\r\n",
            "Subject: hi\r\n\r\n",
            ")\r\n",
            "T6 OK FETCH completed\r\n",
        )),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();
    session.noop(&cancel).await.unwrap();

    // An EXISTS is queued: ordinals are suspect until reconciled.
    let err = session.fetch_header(seq(1), &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Pending));

    let mut observer = CollectingObserver::new();
    session.refresh(&cancel, &mut observer).await.unwrap();
    assert!(observer.take().contains(&MailboxChange::NewMessages {
        first_ordinal: 2,
        count: 1
    }));
    assert_eq!(session.message_count(), Some(2));

    let header = session.fetch_header(seq(1), &cancel).await.unwrap();
    assert_eq!(header, b"Subject: hi\n\n");

    server.await.unwrap();
}

#[tokio::test]
async fn silent_stores_batch_until_the_drain_interval() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 3 EXISTS\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:3 (FLAGS UID)"),
        Step::Reply(concat!(
            "* 1 FETCH (FLAGS () UID 31)\r\n",
            "* 2 FETCH (FLAGS () UID 32)\r\n",
            "* 3 FETCH (FLAGS () UID 33)\r\n",
            "T3 OK FETCH completed\r\n",
        )),
        Step::Expect("T4 STORE 1 +FLAGS.SILENT (\\Seen)"),
        Step::Reply("T4 OK STORE completed\r\n"),
        Step::Expect("T5 STORE 2 +FLAGS.SILENT (\\Seen)"),
        Step::Reply("T5 OK STORE completed\r\n"),
        Step::Expect("T6 NOOP"),
        Step::Reply("T6 OK NOOP completed\r\n"),
    ])
    .await;

    let session_config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .store_drain_interval(2)
        .build();
    let (mut session, cancel) = login_session(session_config).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();

    let mark = Flags::from_vec(vec![Flag::Seen]);
    // First store is fire-and-continue; the second reaches the
    // interval and collects both completions.
    session.set_flags(seq(1), &mark, &cancel).await.unwrap();
    assert!(session.message_flags(seq(1)).unwrap().is_seen());
    session.set_flags(seq(2), &mark, &cancel).await.unwrap();
    session.noop(&cancel).await.unwrap();

    let known = session.cache().known("INBOX").await.unwrap();
    assert!(known.iter().find(|s| s.uid.get() == 31).unwrap().flags.is_seen());
    assert!(known.iter().find(|s| s.uid.get() == 32).unwrap().flags.is_seen());
    assert!(!known.iter().find(|s| s.uid.get() == 33).unwrap().flags.is_seen());

    server.await.unwrap();
}

#[tokio::test]
async fn batched_store_failure_surfaces_without_killing_the_session() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 1 EXISTS\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:1 (FLAGS UID)"),
        Step::Reply("* 1 FETCH (FLAGS () UID 31)\r\nT3 OK FETCH completed\r\n"),
        Step::Expect("T4 STORE 1 +FLAGS.SILENT (\\Seen)"),
        Step::Reply("T4 NO over quota\r\n"),
        Step::Expect("T5 NOOP"),
        Step::Reply("T5 OK NOOP completed\r\n"),
    ])
    .await;

    let session_config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .store_drain_interval(1)
        .build();
    let (mut session, cancel) = login_session(session_config).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();

    let mark = Flags::from_vec(vec![Flag::Seen]);
    let err = session.set_flags(seq(1), &mark, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::No(_)));

    // NO refuses the store; it does not kill the connection.
    assert!(session.is_connected());
    session.noop(&cancel).await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn append_without_uidplus_yields_no_uid() {
    let (port, server) = script_server(vec![
        Step::Reply("* OK [CAPABILITY IMAP4rev1] scripted server ready\r\n"),
        Step::Expect("T1 LOGIN"),
        Step::Reply("T1 OK [CAPABILITY IMAP4rev1] LOGIN completed\r\n"),
        // No LITERAL+: the payload waits for the continuation.
        Step::Expect("T2 APPEND Drafts {17}"),
        Step::Reply("+ go ahead\r\n"),
        Step::ExpectBytes(19),
        Step::Reply("T2 OK APPEND completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    let stored = session
        .append(&Mailbox::new("Drafts"), b"Subject: d\n\nx\n", None, &cancel)
        .await
        .unwrap();

    // Without APPENDUID the new UID stays unknown, never guessed, and
    // nothing is cached for the destination.
    assert_eq!(stored, None);
    assert!(session.cache().known("Drafts").await.unwrap().is_empty());

    let lines = server.await.unwrap();
    assert!(lines.iter().any(|l| l.contains("Subject: d")));
}

#[tokio::test]
async fn append_creates_the_folder_and_caches_under_appenduid() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        // LITERAL+: command line and payload arrive in one flush.
        Step::Expect("T2 APPEND Archive/2026 (\\Draft) {17+}"),
        Step::ExpectBytes(19),
        Step::Reply("T2 NO [TRYCREATE] no such mailbox\r\n"),
        Step::Expect("T3 CREATE Archive/2026"),
        Step::Reply("T3 OK CREATE completed\r\n"),
        Step::Expect("T4 APPEND Archive/2026 (\\Draft) {17+}"),
        Step::ExpectBytes(19),
        Step::Reply("T4 OK [APPENDUID 9 443] APPEND completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    let draft = Flags::from_vec(vec![Flag::Draft]);
    let stored = session
        .append(
            &Mailbox::new("Archive/2026"),
            b"Subject: d\n\nx\n",
            Some(&draft),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(stored, Uid::new(443));
    assert_eq!(
        session.cache().uid_validity("Archive/2026").await.unwrap(),
        UidValidity::new(9)
    );
    let header = session
        .cache()
        .get("Archive/2026", uid(443), MessagePart::Header)
        .await
        .unwrap();
    assert_eq!(header.as_deref(), Some(b"Subject: d\n\n".as_slice()));
    let body = session
        .cache()
        .get("Archive/2026", uid(443), MessagePart::Body)
        .await
        .unwrap();
    assert_eq!(body.as_deref(), Some(b"x\n".as_slice()));

    server.await.unwrap();
}

#[tokio::test]
async fn move_without_the_capability_copies_then_flags_deleted() {
    let (port, server) = script_server(vec![
        Step::Reply("* OK [CAPABILITY IMAP4rev1 UIDPLUS] scripted server ready\r\n"),
        Step::Expect("T1 LOGIN"),
        Step::Reply("T1 OK [CAPABILITY IMAP4rev1 UIDPLUS] LOGIN completed\r\n"),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 2 EXISTS\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:2 (FLAGS UID)"),
        Step::Reply(concat!(
            "* 1 FETCH (FLAGS () UID 5)\r\n",
            "* 2 FETCH (FLAGS () UID 6)\r\n",
            "T3 OK FETCH completed\r\n",
        )),
        Step::Expect("T4 COPY 1 Trash"),
        Step::Reply("T4 OK [COPYUID 77 5 81] COPY completed\r\n"),
        Step::Expect("T5 STORE 1 +FLAGS.SILENT (\\Deleted)"),
        Step::Reply("T5 OK STORE completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();
    session
        .move_messages(&[seq(1)], &Mailbox::new("Trash"), &cancel, &mut NoopObserver)
        .await
        .unwrap();

    // The fallback never expunges: other deleted messages would go
    // with it.
    assert_eq!(session.message_count(), Some(2));
    assert!(session.message_flags(seq(1)).unwrap().is_deleted());

    let trash: Vec<u32> = session
        .cache()
        .known("Trash")
        .await
        .unwrap()
        .iter()
        .map(|s| s.uid.get())
        .collect();
    assert_eq!(trash, vec![81]);
    let inbox = session.cache().known("INBOX").await.unwrap();
    let moved = inbox.iter().find(|s| s.uid.get() == 5).unwrap();
    assert!(moved.flags.is_deleted());

    server.await.unwrap();
}

#[tokio::test]
async fn list_descends_to_the_configured_depth() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect(r#"T2 LIST "" "%""#),
        Step::Reply(concat!(
            "* LIST (\\HasChildren) \"/\" Projects\r\n",
            "* LIST (\\Noinferiors) \"/\" INBOX\r\n",
            "T2 OK LIST completed\r\n",
        )),
        Step::Expect(r#"T3 LIST "" "Projects/%""#),
        Step::Reply(concat!(
            "* LIST (\\HasNoChildren) \"/\" Projects/alpha\r\n",
            "T3 OK LIST completed\r\n",
        )),
    ])
    .await;

    let session_config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .list_depth(1)
        .build();
    let (mut session, cancel) = login_session(session_config).await;

    let entries = session.list_folders("", &cancel).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    // Breadth-first: parents land before their children.
    assert_eq!(names, vec!["Projects", "INBOX", "Projects/alpha"]);

    server.await.unwrap();
}

#[tokio::test]
async fn search_returns_current_ordinals() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT INBOX"),
        Step::Reply(concat!(
            "* 4 EXISTS\r\n",
            "* OK [UIDVALIDITY 7] epoch\r\n",
            "T2 OK [READ-WRITE] SELECT completed\r\n",
        )),
        Step::Expect("T3 FETCH 1:4 (FLAGS UID)"),
        Step::Reply(concat!(
            "* 1 FETCH (FLAGS (\\Seen) UID 21)\r\n",
            "* 2 FETCH (FLAGS () UID 22)\r\n",
            "* 3 FETCH (FLAGS (\\Seen) UID 23)\r\n",
            "* 4 FETCH (FLAGS () UID 24)\r\n",
            "T3 OK FETCH completed\r\n",
        )),
        Step::Expect("T4 SEARCH UNSEEN"),
        Step::Reply("* SEARCH 2 4\r\nT4 OK SEARCH completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session
        .open_folder(&Mailbox::inbox(), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();

    let hits = session
        .search(&SearchCriteria::Unseen, &cancel)
        .await
        .unwrap();
    assert_eq!(hits, vec![seq(2), seq(4)]);

    server.await.unwrap();
}

#[tokio::test]
async fn status_reports_the_counters() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 STATUS blurdybloop (MESSAGES UNSEEN)"),
        Step::Reply(concat!(
            "* STATUS blurdybloop (MESSAGES 231 UNSEEN 4)\r\n",
            "T2 OK STATUS completed\r\n",
        )),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    let items = session
        .status(
            &Mailbox::new("blurdybloop"),
            &[StatusAttribute::Messages, StatusAttribute::Unseen],
            &cancel,
        )
        .await
        .unwrap();

    assert!(items.contains(&StatusItem::Messages(231)));
    assert!(items.contains(&StatusItem::Unseen(4)));

    server.await.unwrap();
}

#[tokio::test]
async fn starttls_mode_fails_closed_without_the_capability() {
    let (port, server) = script_server(vec![Step::Reply(
        "* OK [CAPABILITY IMAP4rev1] plaintext only\r\n",
    )])
    .await;

    let cancel = CancelToken::new();
    let session_config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .security(Security::StartTls)
        .connect_timeout(Duration::from_secs(5))
        .command_timeout(Duration::from_secs(5))
        .build();
    let result = Session::connect(
        session_config,
        MemoryCache::new(),
        MemoryMirror::new(),
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(Error::Protocol(_))));
    server.await.unwrap();
}

#[tokio::test]
async fn cancel_before_send_leaves_the_session_usable() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 SELECT Empty"),
        Step::Reply("* 0 EXISTS\r\nT2 OK [READ-WRITE] SELECT completed\r\n"),
        // The aborted NOOP sent nothing; the tag picks up where it
        // left off.
        Step::Expect("T3 NOOP"),
        Step::Reply("T3 OK NOOP completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session
        .open_folder(&Mailbox::new("Empty"), false, &cancel, &mut NoopObserver)
        .await
        .unwrap();

    cancel.cancel();
    let err = session.noop(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Aborted));
    assert!(session.is_connected());

    let fresh = CancelToken::new();
    session.noop(&fresh).await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn cancel_mid_command_tears_the_link_down() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 NOOP"),
        Step::Stall(Duration::from_secs(30)),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    // The command is on the wire when the abort lands: the reply can
    // no longer be matched to anything, so the link goes down.
    let err = session.noop(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Aborted));
    assert!(!session.is_connected());

    server.abort();
}

#[tokio::test]
async fn stale_completions_never_end_the_drain() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 NOOP"),
        // An overdue completion for the long-settled LOGIN tag arrives
        // first; the drain drops it and finishes on its own tag.
        Step::Reply("T1 OK overdue completion\r\nT2 OK NOOP completed\r\n"),
        Step::Expect("T3 NOOP"),
        Step::Reply("T3 OK NOOP completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session.noop(&cancel).await.unwrap();
    assert!(session.is_connected());
    session.noop(&cancel).await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn a_completion_for_an_unissued_tag_poisons_the_link() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 NOOP"),
        Step::Reply("T9 OK completion from the future\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    let err = session.noop(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(!session.is_connected());

    server.await.unwrap();
}

#[tokio::test]
async fn disconnect_sends_logout_and_goes_offline() {
    let (port, server) = script_server(vec![
        Step::Reply(GREETING),
        Step::Expect("T1 LOGIN"),
        Step::Reply(LOGIN_OK),
        Step::Expect("T2 LOGOUT"),
        Step::Reply("* BYE logging out\r\nT2 OK LOGOUT completed\r\n"),
    ])
    .await;

    let (mut session, cancel) = login_session(config(port)).await;
    session.disconnect(&cancel).await.unwrap();

    assert!(!session.is_connected());
    assert!(!session.is_authenticated());
    assert!(session.current_folder().is_none());

    server.await.unwrap();
}

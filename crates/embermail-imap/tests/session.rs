//! Session round-trip tests over a scripted transport.

use embermail_core::ScriptedTransport;
use embermail_imap::{
    Error, FetchOptions, Flag, Flags, ImapConfig, ImapSession, ImapState, MemorySink, MessageId,
    PollingKind,
};

const GREETING: &str =
    "* OK [CAPABILITY IMAP4rev1 IDLE LITERAL+ AUTH=PLAIN MULTIAPPEND] server ready\r\n";

fn config() -> ImapConfig {
    ImapConfig::new("imap.example.com", 993).credentials("amy@example.com", "secret")
}

/// Scripts the connect handshake: greeting with capabilities, then the
/// AUTHENTICATE PLAIN exchange as tag A0001.
fn connected_transport() -> ScriptedTransport {
    let mut transport = ScriptedTransport::new();
    transport.push_read(GREETING);
    transport.push_read("+ \r\n");
    transport.push_read("A0001 OK authenticated\r\n");
    transport
}

/// Adds the SELECT exchange as tag A0002.
fn push_select(transport: &mut ScriptedTransport) {
    transport.push_read(
        "* 5 EXISTS\r\n\
         * 1 RECENT\r\n\
         * FLAGS (\\Seen \\Answered \\Deleted)\r\n\
         * OK [UIDNEXT 100] predicted\r\n\
         * OK [UNSEEN 2] first unseen\r\n\
         * OK [UIDVALIDITY 9] ok\r\n\
         A0002 OK [READ-WRITE] SELECT completed\r\n",
    );
}

#[tokio::test]
async fn test_connect_reads_greeting_capabilities() {
    let transport = connected_transport();
    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();

    assert_eq!(session.state(), ImapState::Authenticated);
    assert!(session.capabilities().idle);
    assert!(session.capabilities().literal_plus);
    assert!(session.capabilities().multi_append);

    let written = session.transport().written_text();
    assert!(written.contains("A0001 AUTHENTICATE PLAIN\r\n"));
    // No CAPABILITY round trip: the greeting already carried the set.
    assert!(!written.contains("CAPABILITY\r\n"));
}

#[tokio::test]
async fn test_auth_failure() {
    let mut transport = ScriptedTransport::new();
    transport.push_read(GREETING);
    transport.push_read("+ \r\n");
    transport.push_read("A0001 NO [AUTHENTICATIONFAILED] bad credentials\r\n");

    let mut session = ImapSession::new(transport, config());
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::AuthFailed(_)));
    assert!(session.error_reason().is_some());
}

#[tokio::test]
async fn test_select_parses_snapshot() {
    let mut transport = connected_transport();
    push_select(&mut transport);

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    let snapshot = session.select_folder("INBOX", false).await.unwrap();

    assert_eq!(session.state(), ImapState::Selected);
    assert_eq!(snapshot.msg_count, 5);
    assert_eq!(snapshot.recent_count, 1);
    assert_eq!(snapshot.next_uid, Some(100));
    assert_eq!(snapshot.unseen_index, Some(2));
    assert_eq!(snapshot.uid_validity, Some(9));
    assert!(snapshot.flags.contains(&Flag::Seen));
    assert!(!snapshot.read_only);
}

#[tokio::test]
async fn test_reselect_within_debounce_issues_one_select() {
    let mut transport = connected_transport();
    push_select(&mut transport);

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();

    let first = session.select_folder("INBOX", false).await.unwrap();
    let second = session.select_folder("INBOX", false).await.unwrap();
    assert_eq!(first.msg_count, second.msg_count);

    let written = session.transport().written_text();
    assert_eq!(written.matches("SELECT INBOX").count(), 1);
}

#[tokio::test]
async fn test_reselect_other_mode_reissues() {
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read("* 5 EXISTS\r\nA0003 OK [READ-ONLY] EXAMINE completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();

    session.select_folder("INBOX", false).await.unwrap();
    let examined = session.select_folder("INBOX", true).await.unwrap();
    assert!(examined.read_only);

    let written = session.transport().written_text();
    assert!(written.contains("A0003 EXAMINE INBOX"));
}

#[tokio::test]
async fn test_list_folders() {
    let mut transport = connected_transport();
    transport.push_read(
        "* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n\
         * LIST (\\HasChildren \\Noselect) \"/\" \"Archive\"\r\n\
         A0002 OK LIST completed\r\n",
    );

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    let folders = session.list_folders("", "*").await.unwrap();

    assert_eq!(folders.len(), 2);
    assert_eq!(folders[0].name, "INBOX");
    assert_eq!(folders[1].attributes, vec!["\\HasChildren", "\\Noselect"]);
}

#[tokio::test]
async fn test_search_most_recent_first_with_limit() {
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read("* SEARCH 2 8 4 1\r\nA0003 OK SEARCH completed\r\n");

    let mut session = ImapSession::new(
        transport,
        config().search_limit(3),
    );
    session.connect().await.unwrap();
    session.select_folder("INBOX", true).await.unwrap();

    let hits = session.search("UNSEEN", false).await.unwrap();
    assert_eq!(hits, vec![8, 4, 2]);
    assert_eq!(session.selected_folder().search_count, 4);
    assert!(session.transport().written_text().contains("A0003 SEARCH UNSEEN"));
}

#[tokio::test]
async fn test_store_flag_round_trip() {
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read("A0003 OK STORE completed\r\n");
    transport.push_read("A0004 OK STORE completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", false).await.unwrap();

    let mut flags = Flags::new();
    flags.insert(Flag::Seen);
    session.add_flags(42, &flags).await.unwrap();
    session.remove_flags(42, &flags).await.unwrap();

    let written = session.transport().written_text();
    assert!(written.contains("A0003 UID STORE 42 +FLAGS (\\Seen)\r\n"));
    assert!(written.contains("A0004 UID STORE 42 -FLAGS (\\Seen)\r\n"));
}

#[tokio::test]
async fn test_store_rejected_in_readonly_folder() {
    let mut transport = connected_transport();
    transport.push_read("* 5 EXISTS\r\nA0002 OK [READ-ONLY] EXAMINE completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", true).await.unwrap();

    let mut flags = Flags::new();
    flags.insert(Flag::Seen);
    let err = session.add_flags(42, &flags).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(!session.transport().written_text().contains("STORE"));
}

#[tokio::test]
async fn test_fetch_header_only_streams_nothing() {
    let header = "From: Amy <amy@example.com>\r\n\
                  Subject: =?UTF-8?B?SMOpbGxv?=\r\n\
                  Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n";
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read(format!(
        "* 1 FETCH (UID 42 FLAGS (\\Seen) BODY[HEADER] {{{}}}\r\n",
        header.len()
    ));
    transport.push_read(header);
    transport.push_read(")\r\nA0003 OK FETCH completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", true).await.unwrap();

    let mut sink = MemorySink::new();
    let fetched = session
        .fetch_message(MessageId::Seq(1), &FetchOptions::headers(), &mut sink)
        .await
        .unwrap();

    assert_eq!(fetched.uid, Some(42));
    assert!(fetched.flags.contains(&Flag::Seen));
    assert_eq!(fetched.header.subject, "Héllo");
    assert_eq!(fetched.header.from, "Amy <amy@example.com>");
    // Header-only: no body octets reached the sink.
    assert!(sink.parts.is_empty());
    assert_eq!(session.state(), ImapState::Selected);
}

#[tokio::test]
async fn test_fetch_single_part_content() {
    let header = "From: Amy <amy@example.com>\r\n\
                  Subject: hi\r\n\
                  Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n";
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read(format!(
        "* 1 FETCH (UID 42 FLAGS () BODY[HEADER] {{{}}}\r\n",
        header.len()
    ));
    transport.push_read(header);
    transport.push_read(")\r\nA0003 OK FETCH completed\r\n");
    transport.push_read("* 1 FETCH (UID 42 BODY[1] {5}\r\nhello)\r\nA0004 OK FETCH completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", true).await.unwrap();

    let mut sink = MemorySink::new();
    let fetched = session
        .fetch_message(MessageId::Seq(1), &FetchOptions::default(), &mut sink)
        .await
        .unwrap();

    assert_eq!(fetched.parts.len(), 1);
    assert_eq!(sink.content("1"), Some(b"hello".as_slice()));
}

#[tokio::test]
async fn test_fetch_multipart_walks_and_decodes() {
    let header = "From: Amy <amy@example.com>\r\n\
                  Subject: report\r\n\
                  Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n";
    let text_mime = "Content-Type: text/plain; charset=\"utf-8\"\r\n\
                     Content-Transfer-Encoding: 7bit\r\n\r\n";
    let pdf_mime = "Content-Type: application/pdf; name=\"r.pdf\"\r\n\
                    Content-Disposition: attachment; filename=\"r.pdf\"\r\n\
                    Content-Transfer-Encoding: base64\r\n\r\n";

    let mut transport = connected_transport();
    push_select(&mut transport);
    // Header fetch (A0003).
    transport.push_read(format!(
        "* 1 FETCH (UID 7 FLAGS () BODY[HEADER] {{{}}}\r\n",
        header.len()
    ));
    transport.push_read(header);
    transport.push_read(")\r\nA0003 OK FETCH completed\r\n");
    // Structure probes (A0004..A0006).
    transport.push_read(format!(
        "* 1 FETCH (BODY[1.MIME] {{{}}}\r\n",
        text_mime.len()
    ));
    transport.push_read(text_mime);
    transport.push_read(")\r\nA0004 OK FETCH completed\r\n");
    transport.push_read(format!(
        "* 1 FETCH (BODY[2.MIME] {{{}}}\r\n",
        pdf_mime.len()
    ));
    transport.push_read(pdf_mime);
    transport.push_read(")\r\nA0005 OK FETCH completed\r\n");
    transport.push_read("A0006 OK FETCH completed\r\n");
    // Content streams (A0007, A0008).
    transport.push_read("* 1 FETCH (BODY[1] {5}\r\nbody!)\r\nA0007 OK FETCH completed\r\n");
    transport.push_read("* 1 FETCH (BODY[2] {4}\r\nQUJD)\r\nA0008 OK FETCH completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", true).await.unwrap();

    let mut sink = MemorySink::new();
    let fetched = session
        .fetch_message(MessageId::Seq(1), &FetchOptions::default(), &mut sink)
        .await
        .unwrap();

    assert_eq!(fetched.parts.len(), 2);
    assert_eq!(fetched.parts[0].number.as_str(), "1");
    assert_eq!(fetched.parts[1].number.as_str(), "2");
    assert_eq!(fetched.parts[1].filename.as_deref(), Some("r.pdf"));

    assert_eq!(sink.content("1"), Some(b"body!".as_slice()));
    // Base64 transfer encoding undone during streaming.
    assert_eq!(sink.content("2"), Some(b"ABC".as_slice()));

    let written = session.transport().written_text();
    assert!(written.contains("BODY.PEEK[1.MIME]"));
    assert!(written.contains("BODY.PEEK[3.MIME]"));
    assert!(written.contains("BODY.PEEK[2]"));
}

#[tokio::test]
async fn test_idle_poll_and_stop() {
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read("+ idling\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", false).await.unwrap();

    session.listen().await.unwrap();
    assert_eq!(session.state(), ImapState::Idling);

    session.transport_mut().push_read("* 6 EXISTS\r\n* 2 RECENT\r\n");
    let events = session.poll().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, PollingKind::New);
    assert_eq!(events[0].message_number, 6);
    assert_eq!(session.selected_folder().msg_count, 6);
    assert_eq!(session.selected_folder().recent_count, 2);

    session.transport_mut().push_read("A0003 OK IDLE terminated\r\n");
    session.stop_listen().await.unwrap();
    assert_eq!(session.state(), ImapState::Selected);
    assert!(session.transport().written_text().contains("DONE\r\n"));
}

#[tokio::test]
async fn test_noop_poll_reports_expunge() {
    let mut transport = connected_transport();
    push_select(&mut transport);
    transport.push_read("* 3 EXPUNGE\r\nA0003 OK NOOP completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.select_folder("INBOX", false).await.unwrap();

    let events = session.poll().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, PollingKind::Removed);
    assert_eq!(events[0].message_number, 3);
    assert_eq!(session.selected_folder().msg_count, 4);
}

#[tokio::test]
async fn test_append_literal_plus() {
    use embermail_mime::{Mailbox, Message, TextBody};

    let mut transport = connected_transport();
    transport.push_read("A0002 OK APPEND completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();

    let mut msg = Message::new(Mailbox::new("Amy", "amy@example.com"));
    msg.subject = "draft".to_string();
    msg.text = Some(TextBody::plain("draft body"));
    msg.add_recipient(Mailbox::address("bob@example.com"));

    let mut flags = Flags::new();
    flags.insert(Flag::Draft);
    session
        .append(&msg, "Drafts", Some(&flags), None, true)
        .await
        .unwrap();

    let written = session.transport().written_text();
    assert!(written.contains("A0002 APPEND Drafts (\\Draft) {"));
    assert!(written.contains("+}\r\n"));
    assert!(written.contains("Subject: draft"));
    assert!(written.contains("draft body"));
}

#[tokio::test]
async fn test_custom_command_mirrors_lines() {
    let mut transport = connected_transport();
    transport.push_read("* STATUS INBOX (MESSAGES 5)\r\nA0002 OK STATUS done\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();

    let text = session
        .send_custom_command("STATUS INBOX (MESSAGES)")
        .await
        .unwrap();
    assert_eq!(text, "STATUS done");
    assert!(
        session
            .transport()
            .written_text()
            .contains("A0002 STATUS INBOX (MESSAGES)\r\n")
    );
}

#[tokio::test]
async fn test_logout_closes() {
    let mut transport = connected_transport();
    transport.push_read("* BYE logging out\r\nA0002 OK LOGOUT completed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    session.logout().await.unwrap();

    assert_eq!(session.state(), ImapState::Closed);
    assert!(!session.is_connected());
    assert!(session.transport().written_text().contains("A0002 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_error_reason_idempotent() {
    let mut transport = connected_transport();
    transport.push_read("A0002 NO LIST failed\r\n");

    let mut session = ImapSession::new(transport, config());
    session.connect().await.unwrap();
    let _ = session.list_folders("", "*").await.unwrap_err();

    let first = session.error_reason().map(ToString::to_string);
    assert!(first.is_some());
    assert_eq!(session.error_reason(), first.as_deref());
    assert_eq!(session.error_reason(), first.as_deref());
}

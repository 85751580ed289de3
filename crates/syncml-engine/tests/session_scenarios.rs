//! End-to-end session scenarios driven through `SessionHandler`, with an
//! in-memory storage and persistence stack.

mod common;

use common::*;

use syncml_engine::auth::encode_md5_auth_b64;
use syncml_engine::session::SessionStep;
use syncml_engine::types::{AuthType, ConflictPolicy, Role, SyncState};
use syncml_wire::{codes, Fragment, ParsedMessage};

const URI: &str = "./contacts";

fn client_session(
    config: syncml_engine::SyncConfig,
    storage: &SharedStorage,
    store: &SharedStore,
    clock: i64,
) -> syncml_engine::SessionHandler {
    make_session(
        config,
        Role::Client,
        vec![storage.clone()],
        store.clone(),
        SharedObserver::default(),
        clock,
    )
}

fn server_session(
    config: syncml_engine::SyncConfig,
    storage: &SharedStorage,
    store: &SharedStore,
    clock: i64,
) -> syncml_engine::SessionHandler {
    make_session(
        config,
        Role::Server,
        vec![storage.clone()],
        store.clone(),
        SharedObserver::default(),
        clock,
    )
}

fn statuses(parsed: &ParsedMessage) -> Vec<&syncml_wire::StatusParams> {
    parsed
        .fragments
        .iter()
        .filter_map(|f| match f {
            Fragment::Status(status) => Some(status),
            _ => None,
        })
        .collect()
}

fn header(parsed: &ParsedMessage) -> &syncml_wire::HeaderParams {
    match &parsed.fragments[0] {
        Fragment::Header(header) => header,
        other => panic!("first fragment is {other:?}, not a header"),
    }
}

// ----------------------------------------------------------------------
// Scenario: basic MD5 authentication in client role
// ----------------------------------------------------------------------

#[test]
fn md5_challenge_and_retry() {
    let storage = SharedStorage::new(URI, VCARD);
    let store = SharedStore::new();

    let mut config = client_config(URI);
    config.auth_type = AuthType::Md5;
    config.username = "alice".into();
    config.password = "s3cret".into();

    let mut client = client_session(config, &storage, &store, 1_700_000_000);
    client.start_client().unwrap();

    // Without a nonce no credentials are attempted.
    let first = client.generate_message().unwrap();
    let parsed = parse(&first);
    assert!(header(&parsed).cred.data.is_empty());
    let session_id = header(&parsed).session_id.clone();

    // Server replies 407 with an MD5 challenge carrying nonce "Nonce".
    let challenge = format!(
        r#"<SyncML><SyncHdr>
<VerDTD>1.2</VerDTD><VerProto>SyncML/1.2</VerProto>
<SessionID>{session_id}</SessionID><MsgID>1</MsgID>
<Target><LocURI>IMEI:000000</LocURI></Target>
<Source><LocURI>PC Suite</LocURI></Source>
</SyncHdr><SyncBody>
<Status><CmdID>1</CmdID><MsgRef>1</MsgRef><CmdRef>0</CmdRef><Cmd>SyncHdr</Cmd>
<TargetRef>PC Suite</TargetRef><SourceRef>IMEI:000000</SourceRef><Data>407</Data>
<Chal><Meta>
<Type xmlns="syncml:metinf">syncml:auth-md5</Type>
<Format xmlns="syncml:metinf">b64</Format>
<NextNonce xmlns="syncml:metinf">Tm9uY2U=</NextNonce>
</Meta></Chal></Status>
<Final/></SyncBody></SyncML>"#
    );

    let step = client.handle_message(challenge.as_bytes()).unwrap();
    assert_eq!(step, SessionStep::Respond);

    // The nonce was persisted under (remote, local).
    assert_eq!(store.nonce("PC Suite", "IMEI:000000").unwrap(), b"Nonce");

    // The resent init carries Cred = MD5( B64(MD5("alice:s3cret")) ":" "Nonce" ).
    let second = client.generate_message().unwrap();
    let parsed = parse(&second);
    let cred = &header(&parsed).cred;
    assert_eq!(cred.meta.mime_type, "syncml:auth-md5");
    assert_eq!(cred.data, encode_md5_auth_b64("alice", "s3cret", b"Nonce"));

    // The retried message also acknowledges the server's header.
    let hdr_status = statuses(&parsed)
        .into_iter()
        .find(|s| s.cmd == "SyncHdr")
        .expect("header status present");
    assert_eq!(hdr_status.msg_ref, 1);

    // Server accepts; session continues with the server's init alerts.
    let accepted = format!(
        r#"<SyncML><SyncHdr>
<VerDTD>1.2</VerDTD><VerProto>SyncML/1.2</VerProto>
<SessionID>{session_id}</SessionID><MsgID>2</MsgID>
<Target><LocURI>IMEI:000000</LocURI></Target>
<Source><LocURI>PC Suite</LocURI></Source>
</SyncHdr><SyncBody>
<Status><CmdID>1</CmdID><MsgRef>2</MsgRef><CmdRef>0</CmdRef><Cmd>SyncHdr</Cmd>
<TargetRef>PC Suite</TargetRef><SourceRef>IMEI:000000</SourceRef><Data>212</Data></Status>
<Alert><CmdID>2</CmdID><Data>201</Data>
<Item><Target><LocURI>./contacts</LocURI></Target><Source><LocURI>./contacts</LocURI></Source>
<Meta><Anchor xmlns="syncml:metinf"><Next>999</Next></Anchor></Meta></Item></Alert>
<Final/></SyncBody></SyncML>"#
    );

    let step = client.handle_message(accepted.as_bytes()).unwrap();
    assert_eq!(step, SessionStep::Respond);
    assert!(client.authenticated());
    assert_eq!(client.state(), SyncState::SendingItems);

    // Consumed on successful authentication.
    assert!(store.nonce("PC Suite", "IMEI:000000").is_none());
}

// ----------------------------------------------------------------------
// Scenario: anchor mismatch forces slow sync
// ----------------------------------------------------------------------

#[test]
fn anchor_mismatch_forces_slow_sync() {
    let client_storage = SharedStorage::new(URI, VCARD);
    let server_storage = SharedStorage::new(URI, VCARD);
    let client_store = SharedStore::new();
    let server_store = SharedStore::new();

    // Client remembers anchor 100, server remembers 99.
    client_store.seed_changelog(
        "PC Suite",
        URI,
        syncml_engine::persist::ChangeLogRecord {
            local_last_anchor: "100".into(),
            remote_last_anchor: "50".into(),
            ..Default::default()
        },
    );
    server_store.seed_changelog(
        "IMEI:000000",
        URI,
        syncml_engine::persist::ChangeLogRecord {
            local_last_anchor: "98".into(),
            remote_last_anchor: "99".into(),
            ..Default::default()
        },
    );

    let mut client =
        client_session(client_config(URI), &client_storage, &client_store, 1_700_000_200);
    let mut server =
        server_session(server_config(URI), &server_storage, &server_store, 1_700_000_300);

    let transcript = loopback(&mut client, &mut server);

    assert_eq!(client.state(), SyncState::SyncFinished);
    assert_eq!(server.state(), SyncState::SyncFinished);

    // The server answered the fast-sync alert with 508.
    let refresh_seen = transcript
        .iter()
        .filter(|(role, _)| *role == Role::Server)
        .flat_map(|(_, bytes)| {
            let parsed = parse(bytes);
            statuses(&parsed)
                .into_iter()
                .map(|s| (s.cmd.clone(), s.data))
                .collect::<Vec<_>>()
        })
        .any(|(cmd, code)| cmd == "Alert" && code == codes::REFRESH_REQUIRED);
    assert!(refresh_seen, "server must answer the mismatching alert with 508");

    // The server's own init alert proposes slow sync.
    let slow_alert = transcript.iter().filter(|(role, _)| *role == Role::Server).any(
        |(_, bytes)| {
            parse(bytes).fragments.iter().any(|f| {
                matches!(f, Fragment::Command(c)
                    if c.command == syncml_wire::CommandType::Alert
                        && c.alert_code() == Some(codes::ALERT_SLOW_SYNC))
            })
        },
    );
    assert!(slow_alert, "server init must revert to slow sync");

    // Both sides committed the session's next anchors.
    let client_log = client_store.changelog("PC Suite", URI).unwrap();
    assert_eq!(client_log.local_last_anchor, "1700000200");
    let server_log = server_store.changelog("IMEI:000000", URI).unwrap();
    assert_eq!(server_log.local_last_anchor, "1700000300");
    assert_eq!(server_log.remote_last_anchor, "1700000200");
}

// ----------------------------------------------------------------------
// Scenario: chunked add in server role
// ----------------------------------------------------------------------

#[test]
fn chunked_add_assembles_large_object() {
    let storage = SharedStorage::new(URI, VCARD);
    let store = SharedStore::new();
    let mut server = server_session(server_config(URI), &storage, &store, 1_700_000_400);
    server.serve();

    let hdr = |msg_id: u32| {
        format!(
            r#"<SyncHdr><VerDTD>1.2</VerDTD><VerProto>SyncML/1.2</VerProto>
<SessionID>77</SessionID><MsgID>{msg_id}</MsgID>
<Target><LocURI>PC Suite</LocURI></Target>
<Source><LocURI>IMEI:000000</LocURI></Source></SyncHdr>"#
        )
    };

    // Init: slow sync alert.
    let init = format!(
        r#"<SyncML>{}<SyncBody>
<Alert><CmdID>1</CmdID><Data>201</Data>
<Item><Target><LocURI>./contacts</LocURI></Target><Source><LocURI>./contacts</LocURI></Source>
<Meta><Anchor xmlns="syncml:metinf"><Next>200</Next></Anchor></Meta></Item></Alert>
<Final/></SyncBody></SyncML>"#,
        hdr(1)
    );
    assert_eq!(server.handle_message(init.as_bytes()).unwrap(), SessionStep::Respond);
    let _ = server.generate_message().unwrap();

    // First chunk: 3500 of 5000 bytes.
    let chunk1 = format!(
        r#"<SyncML>{}<SyncBody>
<Sync><CmdID>1</CmdID>
<Target><LocURI>./contacts</LocURI></Target><Source><LocURI>./contacts</LocURI></Source>
<Add><CmdID>2</CmdID>
<Meta><Type xmlns="syncml:metinf">text/x-vcard</Type></Meta>
<Item><Source><LocURI>rk1</LocURI></Source>
<Meta><Size xmlns="syncml:metinf">5000</Size></Meta>
<Data>{}</Data><MoreData/></Item></Add>
</Sync></SyncBody></SyncML>"#,
        hdr(2),
        "a".repeat(3500)
    );
    assert_eq!(server.handle_message(chunk1.as_bytes()).unwrap(), SessionStep::Respond);
    let response = parse(&server.generate_message().unwrap());

    let add_status = statuses(&response).into_iter().find(|s| s.cmd == "Add").unwrap();
    assert_eq!(add_status.data, codes::CHUNKED_ITEM_ACCEPTED);
    let next_alert = response.fragments.iter().any(|f| {
        matches!(f, Fragment::Command(c) if c.alert_code() == Some(codes::ALERT_NEXT_MESSAGE))
    });
    assert!(next_alert, "server must request the next chunk with a 222 alert");

    // Second chunk: remaining 1500 bytes, still more data to come.
    let chunk2 = format!(
        r#"<SyncML>{}<SyncBody>
<Sync><CmdID>1</CmdID>
<Target><LocURI>./contacts</LocURI></Target><Source><LocURI>./contacts</LocURI></Source>
<Add><CmdID>2</CmdID>
<Meta><Type xmlns="syncml:metinf">text/x-vcard</Type></Meta>
<Item><Source><LocURI>rk1</LocURI></Source><Data>{}</Data><MoreData/></Item></Add>
</Sync></SyncBody></SyncML>"#,
        hdr(3),
        "b".repeat(1500)
    );
    assert_eq!(server.handle_message(chunk2.as_bytes()).unwrap(), SessionStep::Respond);
    let response = parse(&server.generate_message().unwrap());
    let add_status = statuses(&response).into_iter().find(|s| s.cmd == "Add").unwrap();
    assert_eq!(add_status.data, codes::CHUNKED_ITEM_ACCEPTED);

    // Final chunk closes the object with no trailing data.
    let final_chunk = format!(
        r#"<SyncML>{}<SyncBody>
<Sync><CmdID>1</CmdID>
<Target><LocURI>./contacts</LocURI></Target><Source><LocURI>./contacts</LocURI></Source>
<Add><CmdID>2</CmdID>
<Meta><Type xmlns="syncml:metinf">text/x-vcard</Type></Meta>
<Item><Source><LocURI>rk1</LocURI></Source><Data></Data></Item></Add>
</Sync><Final/></SyncBody></SyncML>"#,
        hdr(4)
    );
    assert_eq!(server.handle_message(final_chunk.as_bytes()).unwrap(), SessionStep::Respond);
    let response = parse(&server.generate_message().unwrap());
    let add_status = statuses(&response).into_iter().find(|s| s.cmd == "Add").unwrap();
    assert_eq!(add_status.data, codes::ITEM_ADDED);

    // The assembled 5000-byte item landed in storage.
    assert_eq!(storage.len(), 1);
    let data = storage.all_data().remove(0);
    assert_eq!(data.len(), 5000);
    assert!(data.starts_with(b"aaaa"));
    assert!(data.ends_with(b"bbbb"));
}

// ----------------------------------------------------------------------
// Scenario: conflict with prefer-remote policy in server role
// ----------------------------------------------------------------------

#[test]
fn conflict_prefer_remote_resolves_with_server_data() {
    let client_storage = SharedStorage::new(URI, VCARD);
    let server_storage = SharedStorage::new(URI, VCARD);
    let client_store = SharedStore::new();
    let server_store = SharedStore::new();

    // Matching anchors so the fast sync goes through.
    client_store.seed_changelog(
        "PC Suite",
        URI,
        syncml_engine::persist::ChangeLogRecord {
            local_last_anchor: "100".into(),
            remote_last_anchor: "55".into(),
            ..Default::default()
        },
    );
    server_store.seed_changelog(
        "IMEI:000000",
        URI,
        syncml_engine::persist::ChangeLogRecord {
            local_last_anchor: "55".into(),
            remote_last_anchor: "100".into(),
            mappings: vec![syncml_engine::target::UidMapping {
                remote_uid: "C5".into(),
                local_uid: "L1".into(),
            }],
            ..Default::default()
        },
    );

    // The same logical item changed on both sides.
    client_storage.seed("C5", b"new-from-client");
    client_storage.set_modifications(&[], &["C5"], &[]);
    server_storage.seed("L1", b"local-edit");
    server_storage.set_modifications(&[], &["L1"], &[]);

    let mut server_cfg = server_config(URI);
    server_cfg.properties.conflict_resolution_policy = ConflictPolicy::PreferRemote;

    let mut client =
        client_session(client_config(URI), &client_storage, &client_store, 1_700_000_500);
    let mut server = server_session(server_cfg, &server_storage, &server_store, 1_700_000_600);

    let transcript = loopback(&mut client, &mut server);

    assert_eq!(client.state(), SyncState::SyncFinished);
    assert_eq!(server.state(), SyncState::SyncFinished);

    // The replace was resolved with the client's (remote) data...
    assert_eq!(server_storage.item_data("L1").unwrap(), b"new-from-client");

    // ...reported as 208 RESOLVED_WITH_SERVER_DATA per the status table.
    let resolved = transcript
        .iter()
        .filter(|(role, _)| *role == Role::Server)
        .flat_map(|(_, bytes)| {
            let parsed = parse(bytes);
            statuses(&parsed)
                .into_iter()
                .map(|s| (s.cmd.clone(), s.data))
                .collect::<Vec<_>>()
        })
        .any(|(cmd, code)| cmd == "Replace" && code == codes::RESOLVED_WITH_SERVER_DATA);
    assert!(resolved);

    // The losing local change was dropped, so the server sent nothing.
    let server_sent_changes = transcript
        .iter()
        .filter(|(role, _)| *role == Role::Server)
        .flat_map(|(_, bytes)| parse(bytes).fragments)
        .any(|f| matches!(f, Fragment::Sync(sync) if !sync.commands.is_empty()));
    assert!(!server_sent_changes);
}

// ----------------------------------------------------------------------
// Scenario: fast-maps-send
// ----------------------------------------------------------------------

#[test]
fn fast_maps_ride_with_status_acknowledgements() {
    let client_storage = SharedStorage::new(URI, VCARD);
    let server_storage = SharedStorage::new(URI, VCARD);
    server_storage.seed("S1", b"from-server");

    let mut config = client_config(URI);
    config.properties.fast_maps_send = true;

    let mut client =
        client_session(config, &client_storage, &SharedStore::new(), 1_700_000_700);
    let mut server = server_session(
        server_config(URI),
        &server_storage,
        &SharedStore::new(),
        1_700_000_800,
    );

    let transcript = loopback(&mut client, &mut server);
    assert_eq!(client.state(), SyncState::SyncFinished);

    // Exactly one client message carries Map, and it also carries the
    // item status acknowledgements; no separate map-only message exists.
    let map_messages: Vec<ParsedMessage> = transcript
        .iter()
        .filter(|(role, _)| *role == Role::Client)
        .map(|(_, bytes)| parse(bytes))
        .filter(|parsed| parsed.fragments.iter().any(|f| matches!(f, Fragment::Map(_))))
        .collect();

    assert_eq!(map_messages.len(), 1, "mappings must go out in exactly one message");
    let with_map = &map_messages[0];
    assert!(
        statuses(with_map).iter().any(|s| s.cmd == "Add"),
        "the Map shares its message with the Add acknowledgements"
    );

    // The item itself arrived.
    assert_eq!(client_storage.len(), 1);
    assert_eq!(client_storage.all_data().remove(0), b"from-server");
}

// ----------------------------------------------------------------------
// Slow sync loopback: bidirectional convergence and invariants
// ----------------------------------------------------------------------

#[test]
fn slow_sync_converges_both_directions() {
    let client_storage = SharedStorage::new(URI, VCARD);
    let server_storage = SharedStorage::new(URI, VCARD);
    client_storage.seed("c1", b"client-item-1");
    client_storage.seed("c2", b"client-item-2");
    server_storage.seed("s1", b"server-item-1");

    let client_store = SharedStore::new();
    let server_store = SharedStore::new();

    let mut client =
        client_session(client_config(URI), &client_storage, &client_store, 1_700_001_000);
    let mut server =
        server_session(server_config(URI), &server_storage, &server_store, 1_700_002_000);

    let transcript = loopback(&mut client, &mut server);

    assert_eq!(client.state(), SyncState::SyncFinished);
    assert_eq!(server.state(), SyncState::SyncFinished);

    // Both stores hold all three items afterwards.
    assert_eq!(client_storage.len(), 3);
    assert_eq!(server_storage.len(), 3);
    let mut server_data = server_storage.all_data();
    server_data.sort();
    assert!(server_data.contains(&b"client-item-1".to_vec()));
    assert!(server_data.contains(&b"client-item-2".to_vec()));

    // Message ids increase from 1 per direction.
    for role in [Role::Client, Role::Server] {
        let ids: Vec<u32> = transcript
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, bytes)| header(&parse(bytes)).msg_id)
            .collect();
        let expected: Vec<u32> = (1..=ids.len() as u32).collect();
        assert_eq!(ids, expected, "{role:?} message ids");
    }

    // Every status's msgRef points at a message id the peer actually sent.
    for (role, bytes) in &transcript {
        let parsed = parse(bytes);
        let peer_ids: Vec<u32> = transcript
            .iter()
            .filter(|(r, _)| r != role)
            .map(|(_, b)| header(&parse(b)).msg_id)
            .collect();
        for status in statuses(&parsed) {
            assert!(
                peer_ids.contains(&status.msg_ref),
                "{role:?} status references unknown msg {}",
                status.msg_ref
            );
        }
    }

    // The server recorded mappings for the client's two items plus the
    // map the client sent back for the server's own item.
    let server_log = server_store.changelog("IMEI:000000", URI).unwrap();
    assert_eq!(server_log.mappings.len(), 3);
    // The client mapped the item the server pushed.
    let client_log = client_store.changelog("PC Suite", URI).unwrap();
    assert_eq!(client_log.mappings.len(), 1);
    assert_eq!(client_log.mappings[0].remote_uid, "s1");
}

#[test]
fn second_fast_sync_with_no_changes_is_stable() {
    let client_storage = SharedStorage::new(URI, VCARD);
    let server_storage = SharedStorage::new(URI, VCARD);
    client_storage.seed("c1", b"client-item-1");

    let client_store = SharedStore::new();
    let server_store = SharedStore::new();

    // First run: slow sync establishes anchors and mappings.
    let mut client =
        client_session(client_config(URI), &client_storage, &client_store, 1_700_003_000);
    let mut server =
        server_session(server_config(URI), &server_storage, &server_store, 1_700_004_000);
    loopback(&mut client, &mut server);
    assert_eq!(client.state(), SyncState::SyncFinished);

    let first_client_log = client_store.changelog("PC Suite", URI).unwrap();
    let first_server_log = server_store.changelog("IMEI:000000", URI).unwrap();
    assert_eq!(first_server_log.mappings.len(), 1);

    // Second run: no changes anywhere, fresh sessions over the same
    // persistence. Anchors line up, so this stays a fast sync.
    client_storage.set_modifications(&[], &[], &[]);
    server_storage.set_modifications(&[], &[], &[]);

    let mut client =
        client_session(client_config(URI), &client_storage, &client_store, 1_700_005_000);
    let mut server =
        server_session(server_config(URI), &server_storage, &server_store, 1_700_006_000);
    let transcript = loopback(&mut client, &mut server);

    assert_eq!(client.state(), SyncState::SyncFinished);
    assert_eq!(server.state(), SyncState::SyncFinished);

    // No refresh was required on the second run.
    let any_refresh = transcript.iter().any(|(_, bytes)| {
        let parsed = parse(bytes);
        statuses(&parsed).iter().any(|s| s.data == codes::REFRESH_REQUIRED)
    });
    assert!(!any_refresh, "anchors matched, no slow-sync fallback");

    // Item counts unchanged, mappings carried over, anchors advanced.
    assert_eq!(client_storage.len(), 1);
    assert_eq!(server_storage.len(), 1);

    let second_server_log = server_store.changelog("IMEI:000000", URI).unwrap();
    assert_eq!(second_server_log.mappings, first_server_log.mappings);
    assert_eq!(second_server_log.remote_last_anchor, "1700005000");
    assert_ne!(second_server_log.local_last_anchor, first_server_log.local_last_anchor);

    let second_client_log = client_store.changelog("PC Suite", URI).unwrap();
    assert_eq!(second_client_log.local_last_anchor, "1700005000");
    assert_ne!(second_client_log, first_client_log);
}

// ----------------------------------------------------------------------
// Rejections
// ----------------------------------------------------------------------

#[test]
fn sync_before_authentication_is_rejected() {
    let storage = SharedStorage::new(URI, VCARD);
    let store = SharedStore::new();

    let mut config = server_config(URI);
    config.auth_type = AuthType::Basic;
    config.username = "alice".into();
    config.password = "s3cret".into();

    let mut server = server_session(config, &storage, &store, 1_700_007_000);
    server.serve();

    let message = r#"<SyncML><SyncHdr>
<VerDTD>1.2</VerDTD><VerProto>SyncML/1.2</VerProto>
<SessionID>5</SessionID><MsgID>1</MsgID>
<Target><LocURI>PC Suite</LocURI></Target>
<Source><LocURI>IMEI:000000</LocURI></Source>
</SyncHdr><SyncBody>
<Sync><CmdID>1</CmdID>
<Target><LocURI>./contacts</LocURI></Target><Source><LocURI>./contacts</LocURI></Source>
<Add><CmdID>2</CmdID><Item><Source><LocURI>rk1</LocURI></Source><Data>x</Data></Item></Add>
</Sync><Final/></SyncBody></SyncML>"#;

    assert_eq!(server.handle_message(message.as_bytes()).unwrap(), SessionStep::Respond);
    let response = parse(&server.generate_message().unwrap());

    // Header gets the challenge, the sync and its command are rejected.
    let all = statuses(&response);
    let hdr_status = all.iter().find(|s| s.cmd == "SyncHdr").unwrap();
    assert_eq!(hdr_status.data, codes::MISSING_CRED);
    assert!(hdr_status.chal.is_some());
    assert!(all
        .iter()
        .any(|s| s.cmd == "Sync" && s.data == codes::INVALID_CRED));
    assert!(all
        .iter()
        .any(|s| s.cmd == "Add" && s.data == codes::INVALID_CRED));

    assert_eq!(storage.len(), 0, "nothing committed before authentication");
}

#[test]
fn garbage_message_aborts_with_invalid_syncml() {
    let storage = SharedStorage::new(URI, VCARD);
    let mut server =
        server_session(server_config(URI), &storage, &SharedStore::new(), 1_700_008_000);
    server.serve();

    let step = server.handle_message(b"this is not syncml").unwrap();
    assert_eq!(step, SessionStep::Finished);
    assert_eq!(server.state(), SyncState::InvalidSyncMlMessage);
    assert!(server.is_finished());
}

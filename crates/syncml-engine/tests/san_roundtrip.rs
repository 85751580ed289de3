//! SAN 1.2 round trip (the "PC Suite Data Sync" seed) and the client
//! session it starts.

mod common;

use common::*;

use syncml_engine::types::{Role, SyncState};
use syncml_wire::{san, ProtocolVersion, SanData, SanInitiator, SanSyncInfo, SanUiMode};

#[test]
fn san_12_round_trip_with_digest() {
    let data = SanData {
        version: ProtocolVersion::Ds12,
        ui_mode: SanUiMode::Background,
        initiator: SanInitiator::Server,
        session_id: 0,
        server_identifier: "PC Suite Data Sync".into(),
        sync_info: vec![SanSyncInfo {
            sync_type: 206,
            content_type: "text/x-vcard".into(),
            server_uri: "Contacts".into(),
        }],
    };

    let bytes = san::generate(&data, "", "").unwrap();

    let reparsed = san::parse(&bytes).unwrap();
    assert_eq!(reparsed, data);
    assert!(san::check_digest(&bytes, "PC Suite Data Sync", "", ""));
}

#[test]
fn san_starts_a_client_session() {
    let storage = SharedStorage::new("./Contacts", VCARD);
    let store = SharedStore::new();

    // SAN-started sessions route storages by MIME type; the config needs
    // no datastore list.
    let mut config = client_config("./Contacts");
    config.datastores.clear();

    let mut client = make_session(
        config,
        Role::Client,
        vec![storage],
        store,
        SharedObserver::default(),
        1_700_020_000,
    );

    let data = SanData {
        version: ProtocolVersion::Ds12,
        ui_mode: SanUiMode::Background,
        initiator: SanInitiator::Server,
        session_id: 4242,
        server_identifier: "PC Suite Data Sync".into(),
        sync_info: vec![SanSyncInfo {
            sync_type: 206,
            content_type: "text/x-vcard".into(),
            server_uri: "Contacts".into(),
        }],
    };
    let bytes = san::generate(&data, "", "").unwrap();

    client.handle_san(&bytes).unwrap();
    assert!(!client.is_finished());
    assert_eq!(client.state(), SyncState::LocalInit);
    assert_eq!(client.session_id(), "4242");
    assert_eq!(client.remote_device(), "PC Suite Data Sync");

    // The init message alerts for the advertised store, client-initiated.
    let init = parse(&client.generate_message().unwrap());
    let alert = init
        .fragments
        .iter()
        .find_map(|f| match f {
            syncml_wire::Fragment::Command(c)
                if c.command == syncml_wire::CommandType::Alert =>
            {
                Some(c)
            }
            _ => None,
        })
        .expect("init alert present");
    // No previous anchor exists, so the session starts as a slow sync.
    assert_eq!(alert.alert_code(), Some(201));
    assert_eq!(alert.items[0].target, "./Contacts");
    assert_eq!(alert.items[0].source, "./Contacts");
    assert!(init.final_seen);
}

#[test]
fn san_with_unknown_store_aborts() {
    let mut config = client_config("./Contacts");
    config.datastores.clear();

    let mut client = make_session(
        config,
        Role::Client,
        vec![], // no storage available for the advertised MIME
        SharedStore::new(),
        SharedObserver::default(),
        1_700_021_000,
    );

    let data = SanData {
        version: ProtocolVersion::Ds12,
        ui_mode: SanUiMode::Background,
        initiator: SanInitiator::Server,
        session_id: 1,
        server_identifier: "PC Suite Data Sync".into(),
        sync_info: vec![SanSyncInfo {
            sync_type: 206,
            content_type: "text/x-vcard".into(),
            server_uri: "Contacts".into(),
        }],
    };
    let bytes = san::generate(&data, "", "").unwrap();

    client.handle_san(&bytes).unwrap();
    assert!(client.is_finished());
    assert_eq!(client.state(), SyncState::DatabaseFailure);
}

#[test]
fn truncated_san_aborts_session() {
    let mut client = make_session(
        client_config("./Contacts"),
        Role::Client,
        vec![SharedStorage::new("./Contacts", VCARD)],
        SharedStore::new(),
        SharedObserver::default(),
        1_700_022_000,
    );

    client.handle_san(&[0u8; 10]).unwrap();
    assert!(client.is_finished());
    assert_eq!(client.state(), SyncState::InvalidSyncMlMessage);
}

#[test]
fn server_generates_san_for_alerted_sync() {
    let storage = SharedStorage::new("Contacts", VCARD);
    let mut server = make_session(
        server_config("Contacts"),
        Role::Server,
        vec![storage],
        SharedStore::new(),
        SharedObserver::default(),
        1_700_023_000,
    );

    let start = server.start_server_alerted().unwrap();
    let syncml_engine::session::ServerAlertedStart::San(bytes) = start else {
        panic!("DS 1.2 must start with a SAN push");
    };

    let parsed = san::parse(&bytes).unwrap();
    assert_eq!(parsed.server_identifier, "PC Suite");
    assert_eq!(parsed.sync_info.len(), 1);
    assert_eq!(parsed.sync_info[0].server_uri, "Contacts");
    assert_eq!(parsed.sync_info[0].content_type, "text/x-vcard");
    assert!(san::check_digest(&bytes, "PC Suite", "", ""));
    assert_eq!(server.state(), SyncState::Prepared);
}

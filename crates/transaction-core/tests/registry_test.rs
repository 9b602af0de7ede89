// Inbound dispatch, rejection and cleanup through the transaction registry.


use std::sync::Arc;

use tokio::sync::mpsc;

use sipmesh_transaction_core::prelude::*;
use test_utils::*;

fn registry(
    transport: &Arc<MockTransport>,
) -> (Arc<TransactionRegistry>, mpsc::UnboundedReceiver<TransactionEvent>) {
    registry_with(transport, TransactionConfig::default())
}

fn registry_with(
    transport: &Arc<MockTransport>,
    config: TransactionConfig,
) -> (Arc<TransactionRegistry>, mpsc::UnboundedReceiver<TransactionEvent>) {
    TransactionRegistry::new(transport.clone(), config.with_user_agent("sipmesh-test"))
}

fn with_to_tag(mut lines: Vec<String>, tag: &str) -> Vec<String> {
    for line in lines.iter_mut() {
        if line.starts_with("To:") {
            line.push_str(&format!(";tag={}", tag));
        }
    }
    lines
}

fn response_lines(branch: &str, method: &str, to_tag: Option<&str>) -> Vec<String> {
    let lines = header_lines(method, branch);
    match to_tag {
        Some(tag) => with_to_tag(lines, tag),
        None => lines,
    }
}

async fn receive(registry: &TransactionRegistry, start_line: &str, lines: &[String], transport: TransportType) {
    registry.on_packet_received(start_line, lines, source(), transport).await;
    settle().await;
}

fn new_request_key(events: &[TransactionEvent]) -> Option<TransactionKey> {
    events.iter().find_map(|event| match event {
        TransactionEvent::NewRequest { key, .. } => key.clone(),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_new_invite_creates_server_transaction() {
    init_tracing();
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    let lines = header_lines("INVITE", "z9hG4bKnew1");
    receive(&registry, "INVITE sip:bob@biloxi.com SIP/2.0", &lines, TransportType::Udp).await;

    assert_eq!(transport.status_codes(), vec![100]);
    assert_eq!(registry.transaction_count(), 1);
    let drained = drain_registry(&mut events);
    let key = new_request_key(&drained).expect("NewRequest with a key");
    assert_eq!(key, TransactionKey::server("z9hG4bKnew1", &Method::Invite));

    // The request retransmission is absorbed by the transaction, not reported again.
    receive(&registry, "INVITE sip:bob@biloxi.com SIP/2.0", &lines, TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![100, 100]);
    assert!(new_request_key(&drain_registry(&mut events)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_version_scheme_and_method_are_rejected_independently() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    let lines = header_lines("FOO", "z9hG4bKbad1");
    receive(&registry, "FOO tel:+15555550100 SIP/3.0", &lines, TransportType::Udp).await;

    assert_eq!(transport.status_codes(), vec![505, 416, 405]);
    let responses = transport.responses();
    let allow = responses[2].headers.get("Allow").unwrap();
    assert!(allow.contains("INVITE"));
    assert!(allow.contains("OPTIONS"));
    assert!(responses.iter().all(|r| r.headers.get("Server") == Some("sipmesh-test")));
    assert!(responses.iter().all(|r| r.to_tag().is_some()));

    assert_eq!(registry.transaction_count(), 0);
    assert!(drain_registry(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_failing_check() {
    let transport = MockTransport::new();
    let (registry, _events) = registry(&transport);

    let lines = header_lines("OPTIONS", "z9hG4bKbad2");
    receive(&registry, "OPTIONS mailto:bob@biloxi.com SIP/2.0", &lines, TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![416]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_start_lines() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    let lines = header_lines("INVITE", "z9hG4bKbad3");
    receive(&registry, "INVITE sip:bob@biloxi.com", &lines, TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![400]);
    assert_eq!(transport.responses()[0].branch(), Some("z9hG4bKbad3"));

    // Nothing to route a reply with.
    receive(&registry, "INVITE sip:bob@biloxi.com", &["Call-ID: x".to_string()], TransportType::Udp).await;
    // Malformed responses are dropped.
    receive(&registry, "SIP/2.0 99 Odd", &lines, TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![400]);
    assert!(drain_registry(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_non_ascii_start_line_is_rejected() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    let lines = header_lines("INVITE", "z9hG4bKutf8");
    receive(&registry, "INV\u{e9}TE sip:a@b SIP/2.0", &lines, TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![400]);

    receive(&registry, "SI\u{e9}", &["Call-ID: x".to_string()], TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![400]);
    assert!(drain_registry(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_branch_is_rejected() {
    let transport = MockTransport::new();
    let (registry, _events) = registry(&transport);

    let mut lines = header_lines("OPTIONS", "unused");
    lines[0] = "Via: SIP/2.0/UDP pc33.atlanta.com".to_string();
    receive(&registry, "OPTIONS sip:bob@biloxi.com SIP/2.0", &lines, TransportType::Udp).await;
    assert_eq!(transport.status_codes(), vec![400]);
    assert_eq!(registry.transaction_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_method_mismatch_on_existing_transaction() {
    let transport = MockTransport::new();
    let (registry, _events) = registry(&transport);

    let branch = "z9hG4bKshared";
    receive(&registry, "INVITE sip:bob@biloxi.com SIP/2.0", &header_lines("INVITE", branch), TransportType::Udp).await;
    receive(&registry, "BYE sip:bob@biloxi.com SIP/2.0", &header_lines("BYE", branch), TransportType::Udp).await;

    assert_eq!(transport.status_codes(), vec![100, 400]);
    assert_eq!(registry.transaction_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ack_without_transaction_is_reported_not_answered() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    receive(&registry, "ACK sip:bob@biloxi.com SIP/2.0", &header_lines("ACK", "z9hG4bKack1"), TransportType::Udp).await;
    assert!(transport.sent().is_empty());
    assert_eq!(registry.transaction_count(), 0);

    let events = drain_registry(&mut events);
    assert!(matches!(
        events.as_slice(),
        [TransactionEvent::NewRequest { key: None, request, .. }] if request.method == Method::Ack
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dialog_takes_priority() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    receive(&registry, "INVITE sip:bob@biloxi.com SIP/2.0", &header_lines("INVITE", "z9hG4bKinv"), TransportType::Udp).await;
    let key = new_request_key(&drain_registry(&mut events)).unwrap();
    let request = registry.server_transaction(&key).unwrap().original_request().await.unwrap();
    registry
        .send_response(&key, Response::from_request(&request, StatusCode::OK).with_to_tag("bob-tag"))
        .await
        .unwrap();
    assert_eq!(registry.dialog_count(), 1);
    let dialog_id = DialogId::new("a84b4c76e66710@pc33.atlanta.com", "bob-tag", ALICE_TAG);
    assert_eq!(registry.dialog(&dialog_id).unwrap().state(), DialogState::Confirmed);
    let ok = transport.responses().last().cloned().unwrap();
    assert_eq!(ok.headers.get("Server"), Some("sipmesh-test"));

    // The ACK for the 2xx belongs to the dialog and has no transaction.
    let ack = with_to_tag(header_lines("ACK", "z9hG4bKack2"), "bob-tag");
    receive(&registry, "ACK sip:bob@biloxi.com SIP/2.0", &ack, TransportType::Udp).await;
    let bye = with_to_tag(header_lines("BYE", "z9hG4bKbye"), "bob-tag");
    receive(&registry, "BYE sip:bob@biloxi.com SIP/2.0", &bye, TransportType::Udp).await;

    let dialog_requests: Vec<(Method, Option<TransactionKey>)> = drain_registry(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            TransactionEvent::DialogRequest { dialog, key, request, .. } => {
                assert_eq!(dialog, dialog_id);
                Some((request.method, key))
            }
            TransactionEvent::NewRequest { .. } => panic!("in-dialog request reported as new"),
            _ => None,
        })
        .collect();
    let bye_key = TransactionKey::server("z9hG4bKbye", &Method::Bye);
    assert_eq!(
        dialog_requests,
        vec![(Method::Ack, None), (Method::Bye, Some(bye_key.clone()))]
    );
    let dialog = registry.dialog(&dialog_id).unwrap();
    assert!(dialog.transaction(&bye_key).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stray_response() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    let lines = response_lines("z9hG4bKunknown", "INVITE", Some("t"));
    receive(&registry, "SIP/2.0 200 OK", &lines, TransportType::Udp).await;

    let events = drain_registry(&mut events);
    assert!(matches!(
        events.as_slice(),
        [TransactionEvent::StrayResponse { response, .. }] if response.code() == 200
    ));
}

#[tokio::test(start_paused = true)]
async fn test_client_invite_tracks_early_dialog() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    let branch = "z9hG4bKout1";
    let mut invite = invite(branch);
    invite.headers.cseq = Some(CSeq::new(314159, Method::Invite));
    let tx = registry.send_request(invite.clone(), TransportType::Udp).await.unwrap();
    assert!(tx.is_invite());
    assert!(matches!(
        registry.send_request(invite, TransportType::Udp).await,
        Err(Error::TransactionExists(_))
    ));

    let ringing = response_lines(branch, "INVITE", Some("bob-tag"));
    receive(&registry, "SIP/2.0 180 Ringing", &ringing, TransportType::Udp).await;
    let dialog_id = DialogId::new("a84b4c76e66710@pc33.atlanta.com", ALICE_TAG, "bob-tag");
    assert_eq!(registry.dialog(&dialog_id).unwrap().state(), DialogState::Early);

    let busy = response_lines(branch, "INVITE", Some("bob-tag"));
    receive(&registry, "SIP/2.0 486 Busy Here", &busy, TransportType::Udp).await;
    assert_eq!(registry.dialog_count(), 0);
    assert_eq!(transport.requests().last().map(|r| r.method.clone()), Some(Method::Ack));

    let received: Vec<u16> = drain_registry(&mut events)
        .iter()
        .filter_map(|event| match event {
            TransactionEvent::ResponseReceived { response, .. } => Some(response.code()),
            _ => None,
        })
        .collect();
    assert_eq!(received, vec![180, 486]);
}

#[tokio::test(start_paused = true)]
async fn test_ack_is_not_a_client_transaction() {
    let transport = MockTransport::new();
    let (registry, _events) = registry(&transport);

    assert!(registry.send_request(request(Method::Ack, "z9hG4bKa"), TransportType::Udp).await.is_err());
    assert_eq!(registry.transaction_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminated_transactions_are_removed() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    receive(&registry, "OPTIONS sip:bob@biloxi.com SIP/2.0", &header_lines("OPTIONS", "z9hG4bKopt"), TransportType::Tcp).await;
    let key = new_request_key(&drain_registry(&mut events)).unwrap();
    let request = registry.server_transaction(&key).unwrap().original_request().await.unwrap();

    registry
        .send_response(&key, Response::from_request(&request, StatusCode::OK).with_to_tag("t"))
        .await
        .unwrap();
    // Timer J is zero over TCP.
    advance_ms(1).await;

    assert_eq!(registry.transaction_count(), 0);
    assert!(matches!(
        registry.send_response(&key, Response::from_request(&request, StatusCode::OK)).await,
        Err(Error::TransactionNotFound(_))
    ));
    assert!(has_terminated(&drain_registry(&mut events), &key));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_sweeps_terminated_entries() {
    let transport = MockTransport::new();
    let (registry, _events) = registry(&transport);

    let key = TransactionKey::server("z9hG4bKmanual", &Method::Register);
    let tx = registry.create_server_transaction(key.clone(), &Method::Register, TransportType::Udp).unwrap();
    assert!(registry
        .create_server_transaction(key.clone(), &Method::Register, TransportType::Udp)
        .is_err());
    // Disposing marks it terminated without any event reaching the forwarder.
    tx.dispose();

    let dialog = registry.register_dialog(Dialog::new(DialogId::new("c", "l", "r"), DialogState::Early));
    dialog.terminate();

    assert_eq!(registry.cleanup(), 2);
    assert_eq!(registry.transaction_count(), 0);
    assert_eq!(registry.dialog_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_answered_invite_is_removed() {
    let transport = MockTransport::new();
    let (registry, mut events) = registry(&transport);

    receive(&registry, "INVITE sip:bob@biloxi.com SIP/2.0", &header_lines("INVITE", "z9hG4bKans"), TransportType::Udp).await;
    let key = new_request_key(&drain_registry(&mut events)).unwrap();
    let request = registry.server_transaction(&key).unwrap().original_request().await.unwrap();
    assert_eq!(registry.transaction_count(), 1);

    registry
        .send_response(&key, Response::from_request(&request, StatusCode::OK).with_to_tag("bob-tag"))
        .await
        .unwrap();
    settle().await;

    assert_eq!(transport.status_codes(), vec![100, 200]);
    assert_eq!(registry.transaction_count(), 0);
    assert_eq!(registry.dialog_count(), 1);
    assert!(has_terminated(&drain_registry(&mut events), &key));
}

#[tokio::test(start_paused = true)]
async fn test_undrained_events_do_not_stall_processing() {
    let transport = MockTransport::new();
    let config = TransactionConfig::default().with_event_channel_capacity(1);
    let (registry, mut events) = registry_with(&transport, config);

    // The receiver is not read while requests keep arriving.
    for i in 0..20 {
        let branch = format!("z9hG4bKburst{}", i);
        receive(&registry, "INVITE sip:bob@biloxi.com SIP/2.0", &header_lines("INVITE", &branch), TransportType::Udp).await;
    }
    assert_eq!(transport.status_codes().len(), 20);
    assert_eq!(registry.transaction_count(), 20);

    let new_requests = drain_registry(&mut events)
        .iter()
        .filter(|event| matches!(event, TransactionEvent::NewRequest { .. }))
        .count();
    assert_eq!(new_requests, 20);
}

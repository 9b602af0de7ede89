// Client transaction flows of RFC 3261 Section 17.1 (and the RFC 6026 Accepted
// state) driven on a paused clock.


use tokio::sync::mpsc;

use sipmesh_transaction_core::prelude::*;
use test_utils::*;

const BRANCH: &str = "z9hG4bKnashds8";

fn client(
    transport: std::sync::Arc<MockTransport>,
    request: Request,
    transport_type: TransportType,
) -> (ClientTransaction, mpsc::Receiver<TransactionEvent>) {
    let (events_tx, events_rx) = mpsc::channel(64);
    let key = TransactionKey::for_outgoing_request(&request).unwrap();
    let tx = ClientTransaction::new(
        key,
        request,
        transport,
        transport_type,
        TimerSettings::default(),
        events_tx,
    );
    (tx, events_rx)
}

fn invite_client(tx: &ClientTransaction) -> &InviteClientTransaction {
    match tx {
        ClientTransaction::Invite(tx) => tx,
        ClientTransaction::NonInvite(_) => panic!("expected an INVITE client transaction"),
    }
}

fn responses_received(events: &[TransactionEvent]) -> Vec<u16> {
    events
        .iter()
        .filter_map(|event| match event {
            TransactionEvent::ResponseReceived { response, .. } => Some(response.code()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_invite_client_timer_a_and_b() {
    init_tracing();
    let transport = MockTransport::new();
    let (tx, mut events) = client(transport.clone(), invite(BRANCH), TransportType::Udp);
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::WaitingToStart));

    tx.start().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Calling));
    assert_eq!(transport.requests().len(), 1);
    assert!(tx.start().await.is_err());

    // Timer A doubles without a cap: 0.5, 1.5, 3.5, 7.5, 15.5, 31.5 seconds.
    advance_ms(501).await;
    assert_eq!(transport.requests().len(), 2);
    advance_ms(31_500).await;
    assert_eq!(transport.requests().len(), 7);
    assert!(tx.is_terminated());

    let events = drain(&mut events);
    assert!(timed_out_with(&events, TimerType::B));
    assert!(has_terminated(&events, tx.key()));
}

#[tokio::test(start_paused = true)]
async fn test_invite_client_failure_sends_ack() {
    let transport = MockTransport::new();
    let invite = invite(BRANCH);
    let (tx, mut events) = client(transport.clone(), invite.clone(), TransportType::Udp);
    tx.start().await.unwrap();

    let ringing = Response::from_request(&invite, StatusCode::RINGING).with_to_tag("bob-tag");
    tx.process_response(ringing).await.unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Proceeding));
    assert!(!invite_client(&tx).is_timer_armed(TimerType::A));
    assert!(!invite_client(&tx).is_timer_armed(TimerType::B));

    let busy = Response::from_request(&invite, StatusCode::BUSY_HERE).with_to_tag("bob-tag");
    tx.process_response(busy.clone()).await.unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Completed));
    assert!(invite_client(&tx).is_timer_armed(TimerType::D));

    let ack = transport.requests().last().cloned().unwrap();
    assert_eq!(ack.method, Method::Ack);
    assert_eq!(ack.branch(), Some(BRANCH));
    assert_eq!(ack.to_tag(), Some("bob-tag"));
    assert_eq!(ack.cseq(), Some(&CSeq::new(1, Method::Ack)));
    assert_eq!(invite_client(&tx).ack().await, Some(ack));

    // A retransmitted final response is answered with the same ACK and not reported.
    tx.process_response(busy).await.unwrap();
    let acks = transport.requests().iter().filter(|r| r.method == Method::Ack).count();
    assert_eq!(acks, 2);

    advance_ms(32_001).await;
    assert!(tx.is_terminated());

    let events = drain(&mut events);
    assert_eq!(responses_received(&events), vec![180, 486]);
    assert!(has_terminated(&events, tx.key()));
}

#[tokio::test(start_paused = true)]
async fn test_invite_client_accepted_state() {
    let transport = MockTransport::new();
    let invite = invite(BRANCH);
    let (tx, mut events) = client(transport.clone(), invite.clone(), TransportType::Udp);
    tx.start().await.unwrap();

    let ok = Response::from_request(&invite, StatusCode::OK).with_to_tag("bob-tag");
    tx.process_response(ok.clone()).await.unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Confirmed));
    assert!(invite_client(&tx).is_timer_armed(TimerType::M));

    // 2xx retransmissions go up to the TU, which owns the ACK for a 2xx.
    tx.process_response(ok).await.unwrap();
    assert!(transport.requests().iter().all(|r| r.method != Method::Ack));

    advance_ms(32_001).await;
    assert!(tx.is_terminated());

    let events = drain(&mut events);
    assert_eq!(responses_received(&events), vec![200, 200]);
}

#[tokio::test(start_paused = true)]
async fn test_non_invite_client_timer_e_and_k() {
    let transport = MockTransport::new();
    let (tx, mut events) = client(transport.clone(), request(Method::Options, BRANCH), TransportType::Udp);
    tx.start().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Trying));

    // E: 0.5, 1.5, 3.5, 7.5 seconds, then every T2.
    advance_ms(7_501).await;
    assert_eq!(transport.requests().len(), 5);
    advance_ms(4_000).await;
    assert_eq!(transport.requests().len(), 6);

    let options = request(Method::Options, BRANCH);
    tx.process_response(Response::from_request(&options, StatusCode::TRYING))
        .await
        .unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Proceeding));
    advance_ms(4_000).await;
    assert_eq!(transport.requests().len(), 7);

    tx.process_response(Response::from_request(&options, StatusCode::OK))
        .await
        .unwrap();
    assert_eq!(tx.state(), TransactionState::Client(ClientTransactionState::Completed));
    // Retransmissions stop, late responses are absorbed.
    tx.process_response(Response::from_request(&options, StatusCode::OK))
        .await
        .unwrap();
    advance_ms(4_000).await;
    assert_eq!(transport.requests().len(), 7);

    advance_ms(1_001).await;
    assert!(tx.is_terminated());

    let events = drain(&mut events);
    assert_eq!(responses_received(&events), vec![100, 200]);
}

#[tokio::test(start_paused = true)]
async fn test_non_invite_client_timer_f_over_tcp() {
    let transport = MockTransport::new();
    let (tx, mut events) = client(transport.clone(), request(Method::Register, BRANCH), TransportType::Tcp);
    tx.start().await.unwrap();

    advance_ms(32_001).await;
    // No retransmissions on a reliable transport.
    assert_eq!(transport.requests().len(), 1);
    assert!(tx.is_terminated());

    let events = drain(&mut events);
    assert!(timed_out_with(&events, TimerType::F));
}

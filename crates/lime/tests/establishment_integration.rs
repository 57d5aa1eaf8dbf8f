//! End-to-end establishment and channel scenarios over the in-process
//! pair transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use lime::channel::{Channel, ChannelError};
use lime::mux::EnvelopeMux;
use lime::protocol::{
    Command, CommandMethod, CommandStatus, Document, Envelope, LimeUri, MediaType, Node, Reason,
    Session, SessionCompression, SessionEncryption, SessionState,
};
use lime::session::{ClientEstablishment, SessionError};
use lime::transport::{PairTransport, Transport, TransportError};

use common::{client_identity, established_pair, server_node};

fn scripted_pair() -> (Arc<Channel>, Arc<PairTransport>) {
    let (client_transport, server_transport) = PairTransport::pair(16);
    (
        Arc::new(Channel::new(Arc::new(client_transport))),
        Arc::new(server_transport),
    )
}

async fn receive_session_envelope(transport: &PairTransport) -> Session {
    match transport.receive().await.unwrap() {
        Envelope::Session(session) => session,
        other => panic!("expected a session envelope, got {other:?}"),
    }
}

#[tokio::test]
async fn test_guest_establishment_with_immediate_accept() {
    // The server replies to `new` directly with `established`
    let (channel, server) = scripted_pair();
    let establishment = ClientEstablishment::new(client_identity(), "home");

    let server_task = tokio::spawn(async move {
        let new_session = receive_session_envelope(&server).await;
        assert_eq!(new_session.state, SessionState::New);
        assert_eq!(
            new_session.header.from.as_ref().map(|n| n.to_string()),
            Some("golang@limeprotocol.org/home".to_string())
        );

        let mut reply =
            Session::new(SessionState::Established).with_id("52e59849-19a8-4b2d-86b7-3fa563cdb616");
        reply.header.from = Some(server_node());
        reply.header.to = new_session.header.from.clone();
        server.send(&Envelope::Session(reply)).await.unwrap();
        server
    });

    let session = establishment.establish(&channel).await.unwrap();
    assert_eq!(session.state, SessionState::Established);

    assert_eq!(channel.state().await, SessionState::Established);
    assert_eq!(
        channel.session_id().await,
        "52e59849-19a8-4b2d-86b7-3fa563cdb616"
    );
    assert_eq!(
        channel.remote_node().await.map(|n| n.to_string()),
        Some("postmaster@limeprotocol.org/server1".to_string())
    );
    assert_eq!(
        channel.local_node().await.map(|n| n.to_string()),
        Some("golang@limeprotocol.org/home".to_string())
    );
    server_task.await.unwrap();
}

#[tokio::test]
async fn test_failed_session_surfaces_reason() {
    // A server-announced failure is returned to the caller, not raised
    let (channel, server) = scripted_pair();
    let establishment = ClientEstablishment::new(client_identity(), "home");

    let server_task = tokio::spawn(async move {
        let _new_session = receive_session_envelope(&server).await;
        let mut reply = Session::failed(Reason::new(1, "Session failed")).with_id("s1");
        reply.header.from = Some(server_node());
        server.send(&Envelope::Session(reply)).await.unwrap();
        server
    });

    let session = establishment.establish(&channel).await.unwrap();
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.reason, Some(Reason::new(1, "Session failed")));

    assert_eq!(channel.state().await, SessionState::Failed);

    // The client closed its transport; the scripted server observes EOF
    let server = server_task.await.unwrap();
    assert!(matches!(
        server.receive().await.unwrap_err(),
        TransportError::Closed
    ));
}

#[tokio::test]
async fn test_negotiation_and_authentication_rounds() {
    // Full multi-step handshake: option lists, confirmation, credentials
    let (channel, server) = scripted_pair();
    let establishment = ClientEstablishment::new(client_identity(), "home");

    let server_task = tokio::spawn(async move {
        let new_session = receive_session_envelope(&server).await;
        assert_eq!(new_session.state, SessionState::New);

        let mut negotiating = Session::new(SessionState::Negotiating).with_id("s1");
        negotiating.compression_options =
            Some(vec![SessionCompression::None, SessionCompression::Gzip]);
        negotiating.encryption_options =
            Some(vec![SessionEncryption::None, SessionEncryption::Tls]);
        server.send(&Envelope::Session(negotiating)).await.unwrap();

        let choice = receive_session_envelope(&server).await;
        assert_eq!(choice.state, SessionState::Negotiating);
        assert_eq!(choice.compression, Some(SessionCompression::None));
        assert_eq!(choice.encryption, Some(SessionEncryption::None));

        let mut confirmation = Session::new(SessionState::Negotiating).with_id("s1");
        confirmation.compression = Some(SessionCompression::None);
        confirmation.encryption = Some(SessionEncryption::None);
        server.send(&Envelope::Session(confirmation)).await.unwrap();

        let mut authenticating = Session::new(SessionState::Authenticating).with_id("s1");
        authenticating.scheme_options =
            Some(vec![lime::authentication::AuthenticationScheme::Guest]);
        server
            .send(&Envelope::Session(authenticating))
            .await
            .unwrap();

        let credentials = receive_session_envelope(&server).await;
        assert_eq!(credentials.state, SessionState::Authenticating);
        assert_eq!(
            credentials.authentication,
            Some(lime::authentication::Authentication::Guest)
        );

        let mut reply = Session::new(SessionState::Established).with_id("s1");
        reply.header.from = Some(server_node());
        reply.header.to = credentials.header.from.clone();
        server.send(&Envelope::Session(reply)).await.unwrap();
    });

    let session = establishment.establish(&channel).await.unwrap();
    assert_eq!(session.state, SessionState::Established);
    assert_eq!(channel.state().await, SessionState::Established);
    server_task.await.unwrap();
}

#[tokio::test]
async fn test_protocol_violation_fails_the_session() {
    let (channel, server) = scripted_pair();
    let establishment = ClientEstablishment::new(client_identity(), "home");

    let server_task = tokio::spawn(async move {
        let _new_session = receive_session_envelope(&server).await;
        // `finishing` is never a valid reply during establishment
        let reply = Session::new(SessionState::Finishing).with_id("s1");
        server.send(&Envelope::Session(reply)).await.unwrap();
        server
    });

    let error = establishment.establish(&channel).await.unwrap_err();
    assert!(matches!(
        error,
        SessionError::ProtocolViolation {
            state: SessionState::Finishing
        }
    ));
    assert_eq!(channel.state().await, SessionState::Failed);

    // The client announced the failure before closing
    let server = server_task.await.unwrap();
    let failed = receive_session_envelope(&server).await;
    assert_eq!(failed.state, SessionState::Failed);
    assert!(matches!(
        server.receive().await.unwrap_err(),
        TransportError::Closed
    ));
}

#[tokio::test]
async fn test_ping_request_response() {
    // Request/response correlation across a fully established pair
    let (client_channel, server_channel) = established_pair().await;

    let server_task = tokio::spawn(async move {
        let mut mux = EnvelopeMux::new();
        mux.register_ping_handler();
        mux.listen(Arc::clone(&server_channel)).await;
        server_channel
    });

    let request = Command::new_request(CommandMethod::Get, LimeUri::ping())
        .with_id("4609d0a3-00eb-4e16-9d44-27d115c6eb31")
        .with_to("postmaster@limeprotocol.org".parse::<Node>().unwrap());
    let response = client_channel.process_command(request).await.unwrap();

    assert_eq!(response.header.id, "4609d0a3-00eb-4e16-9d44-27d115c6eb31");
    assert_eq!(response.status, Some(CommandStatus::Success));
    assert_eq!(
        response.resource.as_ref().map(|d| d.media_type.clone()),
        Some(MediaType::ping())
    );

    client_channel.finish_session().await.unwrap();
    server_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_response_routed_to_response_queue() {
    // A response with a foreign id never resolves the pending request
    let (client_channel, server_channel) = established_pair().await;

    let responder = Arc::clone(&server_channel);
    let server_task = tokio::spawn(async move {
        let request = responder.receive_command().await.unwrap();
        assert_eq!(request.header.id, "A");
        let mut response = request.success_response();
        response.header.id = "B".to_string();
        responder.send_command(response).await.unwrap();
    });

    let request = Command::new_request(CommandMethod::Get, LimeUri::ping()).with_id("A");
    let result =
        tokio::time::timeout(Duration::from_millis(250), client_channel.process_command(request))
            .await;
    assert!(result.is_err(), "the deadline must fire, got {result:?}");

    // The mismatched response is observable on the response queue
    let unmatched = client_channel.receive_response().await.unwrap();
    assert_eq!(unmatched.header.id, "B");

    // The abandoned registration was released; the id is free again
    let request = Command::new_request(CommandMethod::Get, LimeUri::ping()).with_id("A");
    let result =
        tokio::time::timeout(Duration::from_millis(50), client_channel.process_command(request))
            .await;
    assert!(
        !matches!(
            result,
            Ok(Err(ChannelError::DuplicateCommandId { .. }))
        ),
        "registration must have been released, got {result:?}"
    );

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_duplicate_command_id_rejected() {
    let (client_channel, _server_channel) = established_pair().await;

    let first = Arc::clone(&client_channel);
    let in_flight = tokio::spawn(async move {
        let request = Command::new_request(CommandMethod::Get, LimeUri::ping()).with_id("dup");
        first.process_command(request).await
    });
    tokio::task::yield_now().await;

    let request = Command::new_request(CommandMethod::Get, LimeUri::ping()).with_id("dup");
    let error = client_channel.process_command(request).await.unwrap_err();
    assert!(matches!(error, ChannelError::DuplicateCommandId { .. }));

    in_flight.abort();
}

#[tokio::test]
async fn test_graceful_finish_observed_by_peer() {
    // The peer observes `finished`, then EOF
    let (client_channel, server_channel) = established_pair().await;

    client_channel.finish_session().await.unwrap();
    assert_eq!(client_channel.state().await, SessionState::Finished);

    let finished = server_channel.receive_session().await.unwrap();
    assert_eq!(finished.state, SessionState::Finished);

    // The transport EOF surfaces on the error queue, then queues close
    let error = server_channel.receive_error().await.unwrap();
    assert!(matches!(
        error,
        ChannelError::Transport(TransportError::Closed)
    ));
    assert!(matches!(
        server_channel.receive_message().await.unwrap_err(),
        ChannelError::Closed
    ));
}

#[tokio::test]
async fn test_send_after_finish_fails_wrong_state() {
    let (client_channel, _server_channel) = established_pair().await;
    client_channel.finish_session().await.unwrap();

    let message = lime::protocol::Message::new(Document::text_plain("late"));
    assert!(matches!(
        client_channel.send_message(message).await.unwrap_err(),
        ChannelError::WrongState { .. } | ChannelError::TransportNotConnected
    ));

    let request = Command::new_request(CommandMethod::Get, LimeUri::ping());
    assert!(client_channel.process_command(request).await.is_err());
}

#[tokio::test]
async fn test_message_order_preserved() {
    // Egress order equals the order of successful send calls
    let (client_channel, server_channel) = established_pair().await;

    for index in 0..10 {
        let message =
            lime::protocol::Message::new(Document::text_plain(format!("message-{index}")));
        client_channel.send_message(message).await.unwrap();
    }
    for index in 0..10 {
        let message = server_channel.receive_message().await.unwrap();
        assert_eq!(
            message.content.content,
            lime::protocol::DocumentContent::Text(format!("message-{index}"))
        );
    }
}

#[tokio::test]
async fn test_notification_round_trip_between_peers() {
    let (client_channel, server_channel) = established_pair().await;

    let message = lime::protocol::Message::new(Document::text_plain("hello"))
        .with_id("m1")
        .with_to("postmaster@limeprotocol.org".parse::<Node>().unwrap());
    client_channel.send_message(message).await.unwrap();

    let received = server_channel.receive_message().await.unwrap();
    let notification = lime::protocol::Notification::for_message(
        &received,
        lime::protocol::NotificationEvent::Received,
    );
    server_channel.send_notification(notification).await.unwrap();

    let observed = client_channel.receive_notification().await.unwrap();
    assert_eq!(observed.header.id, "m1");
    assert_eq!(
        observed.event,
        lime::protocol::NotificationEvent::Received
    );
}

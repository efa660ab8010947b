//! In-process suite driving the gateway router through `axum-test`.

use http::StatusCode;
use wsgw_test_utils::{AppCall, BAD_CREDENTIAL};
use wsgw_types::{ConnectAck, ConnectionId};


#[tokio::test]
async fn test_health() -> eyre::Result<()> {
    let (server, _app) = setup::test_server().await?;
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("healthy");
    Ok(())
}

#[tokio::test]
async fn test_version() -> eyre::Result<()> {
    let (server, _app) = setup::test_server().await?;
    let response = server.get("/version").await;
    response.assert_status_ok();
    assert!(response.text().contains("wsgw-service"));
    Ok(())
}

#[tokio::test]
async fn test_connect_ack_matches_announced_id() -> eyre::Result<()> {
    let (server, app) = setup::test_server().await?;
    let mut websocket = server
        .get_websocket("/connect")
        .add_header("authorization", "Bearer some-credential")
        .await
        .into_websocket()
        .await;

    let ack_text = websocket.receive_text().await;
    let ack: ConnectAck = serde_json::from_str(&ack_text)?;
    let id = ack.connection_id.as_str();

    assert_eq!(app.calls(id), vec![AppCall::Connect]);
    Ok(())
}

#[tokio::test]
async fn test_connecting_with_invalid_credentials() -> eyre::Result<()> {
    let (server, app) = setup::test_server().await?;
    let response = server
        .get_websocket("/connect")
        .add_header("authorization", BAD_CREDENTIAL)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(app.known_connections().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_client_message_is_relayed_with_id_header() -> eyre::Result<()> {
    let (server, app) = setup::test_server().await?;
    let mut websocket = server
        .get_websocket("/connect")
        .await
        .into_websocket()
        .await;
    let ack: ConnectAck = serde_json::from_str(&websocket.receive_text().await)?;
    let id = ack.connection_id;

    websocket.send_text("{\"message\":\"hi\"}").await;
    app.wait_for_messages(id.as_str(), 1, setup::TEST_TIMEOUT)
        .await?;

    assert_eq!(
        app.calls(id.as_str()),
        vec![
            AppCall::Connect,
            AppCall::Message("{\"message\":\"hi\"}".to_owned())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_push_to_unknown_connection_answers_404() -> eyre::Result<()> {
    let (server, _app) = setup::test_server().await?;
    let response = server
        .post(&format!("/message/{}", ConnectionId::generate()))
        .text("hello")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

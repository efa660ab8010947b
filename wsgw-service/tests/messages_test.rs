//! Fan-in/fan-out suite: several clients exchanging messages concurrently
//! in both directions, each direction strictly FIFO per connection.

use std::time::Duration;

use tokio::task::JoinSet;
use wsgw_client::GatewaySession;
use wsgw_test_utils::AppCall;
use wsgw_types::ConnectionId;

use crate::setup::{GatewayOptions, TEST_TIMEOUT, TestGateway};


const CLIENTS: usize = 7;
const MESSAGES_PER_DIRECTION: usize = 50;

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_clients_exchange_messages_in_order() -> eyre::Result<()> {
    let gateway = TestGateway::start_with(GatewayOptions {
        // keep the suite fast; the production default replenishes one push
        // per 100ms
        push_rate_period: Some(Duration::from_millis(2)),
        ..GatewayOptions::default()
    })
    .await?;

    let mut clients = JoinSet::new();
    for client_index in 0..CLIENTS {
        let addr = gateway.addr.clone();
        let http = gateway.http.clone();
        clients.spawn(async move {
            let mut session = GatewaySession::connect(&addr, None).await?;
            let id = session.connection_id().clone();

            let pusher = tokio::spawn({
                let addr = addr.clone();
                let id = id.clone();
                async move {
                    for message_index in 0..MESSAGES_PER_DIRECTION {
                        let response = http
                            .post(format!("{addr}/message/{id}"))
                            .body(format!("push-{client_index}-{message_index}"))
                            .send()
                            .await?;
                        eyre::ensure!(
                            response.status().as_u16() == 204,
                            "push answered {}",
                            response.status()
                        );
                    }
                    eyre::Ok(())
                }
            });

            for message_index in 0..MESSAGES_PER_DIRECTION {
                session
                    .send(&format!("send-{client_index}-{message_index}"))
                    .await?;
                let received = session.receive().await?;
                eyre::ensure!(
                    received == format!("push-{client_index}-{message_index}"),
                    "client {client_index} received out of order: {received}"
                );
            }

            pusher.await??;
            session.close().await?;
            eyre::Ok((client_index, id))
        });
    }

    let mut sessions: Vec<(usize, ConnectionId)> = Vec::with_capacity(CLIENTS);
    while let Some(result) = clients.join_next().await {
        sessions.push(result??);
    }
    assert_eq!(sessions.len(), CLIENTS);

    for (client_index, id) in sessions {
        gateway
            .app
            .wait_for_messages(id.as_str(), MESSAGES_PER_DIRECTION, TEST_TIMEOUT)
            .await?;
        let relayed: Vec<String> = gateway
            .app
            .calls(id.as_str())
            .into_iter()
            .filter_map(|call| match call {
                AppCall::Message(body) => Some(body),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..MESSAGES_PER_DIRECTION)
            .map(|message_index| format!("send-{client_index}-{message_index}"))
            .collect();
        assert_eq!(relayed, expected, "relay order broken for {client_index}");
    }
    Ok(())
}

//! Cluster-mode suite: ownership bookkeeping and push forwarding between
//! two gateway instances sharing one directory.

use std::{sync::Arc, time::Duration};

use wsgw_client::GatewaySession;
use wsgw_test_utils::InMemoryDirectory;
use wsgw_types::ConnectionId;

use crate::setup::{GatewayOptions, TEST_TIMEOUT, TestGateway};


#[tokio::test]
async fn test_sessions_maintain_the_directory() -> eyre::Result<()> {
    let directory = InMemoryDirectory::new();
    let gateway = TestGateway::start_with(GatewayOptions {
        directory: Some(Arc::new(directory.clone())),
        instance_ip_address: Some("127.0.0.1".to_owned()),
        instance_port: Some(0),
        ..GatewayOptions::default()
    })
    .await?;

    let session = GatewaySession::connect(&gateway.addr, None).await?;
    let id = session.connection_id().clone();
    assert_eq!(directory.owner(&id).as_deref(), Some("127.0.0.1"));

    session.close().await?;
    gateway
        .app
        .wait_for_disconnect(id.as_str(), TEST_TIMEOUT)
        .await?;

    // deregistration follows the disconnect notification in the teardown
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while directory.owner(&id).is_some() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "ownership record was not deleted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(directory.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_push_is_forwarded_to_the_owning_peer() -> eyre::Result<()> {
    let directory = InMemoryDirectory::new();

    // the owner registers itself under a loopback address
    let owner = TestGateway::start_with(GatewayOptions {
        directory: Some(Arc::new(directory.clone())),
        instance_ip_address: Some("127.0.0.1".to_owned()),
        instance_port: Some(0),
        ..GatewayOptions::default()
    })
    .await?;

    // the other instance forwards using its own configured peer port, so
    // point it at the owner's listener
    let other = TestGateway::start_with(GatewayOptions {
        directory: Some(Arc::new(directory.clone())),
        instance_ip_address: Some("10.0.0.1".to_owned()),
        instance_port: Some(owner.port),
        ..GatewayOptions::default()
    })
    .await?;

    let mut session = GatewaySession::connect(&owner.addr, None).await?;
    let id = session.connection_id().clone();

    assert_eq!(other.push(&id, "from-the-other-side").await?.as_u16(), 204);
    assert_eq!(session.receive().await?, "from-the-other-side");

    session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_local_delivery_short_circuits_the_directory() -> eyre::Result<()> {
    let directory = InMemoryDirectory::new();
    let gateway = TestGateway::start_with(GatewayOptions {
        directory: Some(Arc::new(directory.clone())),
        instance_ip_address: Some("127.0.0.1".to_owned()),
        instance_port: Some(0),
        ..GatewayOptions::default()
    })
    .await?;

    let mut session = GatewaySession::connect(&gateway.addr, None).await?;
    let id = session.connection_id().clone();

    // even with the record pointing at an unreachable peer, a locally owned
    // connection is served without consulting the directory
    directory.insert(&id, "192.0.2.1");
    assert_eq!(gateway.push(&id, "hello").await?.as_u16(), 204);
    assert_eq!(session.receive().await?, "hello");

    session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_stale_self_record_answers_404() -> eyre::Result<()> {
    let directory = InMemoryDirectory::new();
    let gateway = TestGateway::start_with(GatewayOptions {
        directory: Some(Arc::new(directory.clone())),
        instance_ip_address: Some("127.0.0.1".to_owned()),
        instance_port: Some(0),
        ..GatewayOptions::default()
    })
    .await?;

    // a record left behind by a crashed predecessor of this very instance
    let id = ConnectionId::generate();
    directory.insert(&id, "127.0.0.1");

    assert_eq!(gateway.push(&id, "hello").await?.as_u16(), 404);
    Ok(())
}

#[tokio::test]
async fn test_push_for_unknown_connection_answers_404_in_cluster_mode() -> eyre::Result<()> {
    let directory = InMemoryDirectory::new();
    let gateway = TestGateway::start_with(GatewayOptions {
        directory: Some(Arc::new(directory.clone())),
        instance_ip_address: Some("127.0.0.1".to_owned()),
        instance_port: Some(0),
        ..GatewayOptions::default()
    })
    .await?;

    let id = ConnectionId::generate();
    assert_eq!(gateway.push(&id, "hello").await?.as_u16(), 404);
    Ok(())
}

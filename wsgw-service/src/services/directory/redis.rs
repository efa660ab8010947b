//! Redis-backed ownership directory.
//!
//! Records live in a single hash under [`CONNECTIONS_HASH`], manipulated
//! with `HSET`/`HDEL`/`HGET`. Records carry no TTL, so an instance that dies
//! without tearing its sessions down leaks its entries until the same ids
//! are written again.

use async_trait::async_trait;
use eyre::Context as _;
use redis::AsyncCommands as _;
use wsgw_types::ConnectionId;

use crate::services::directory::{CONNECTIONS_HASH, Directory};

/// Ownership directory on a shared Redis instance.
#[derive(Clone)]
pub struct RedisDirectory {
    manager: redis::aio::ConnectionManager,
}

impl RedisDirectory {
    /// Connects to the Redis instance at `host:port`.
    ///
    /// The underlying connection manager reconnects on its own, so a
    /// directory handle stays usable across Redis restarts.
    pub async fn connect(host: &str, port: u16) -> eyre::Result<Self> {
        let client = redis::Client::open(format!("redis://{host}:{port}"))
            .context("while parsing redis url")?;
        let manager = client
            .get_connection_manager()
            .await
            .context("while connecting to redis")?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Directory for RedisDirectory {
    async fn register(&self, id: &ConnectionId, owner: &str) -> eyre::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .hset(CONNECTIONS_HASH, id.as_str(), owner)
            .await
            .context("while registering connection")?;
        Ok(())
    }

    async fn deregister(&self, id: &ConnectionId) -> eyre::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .hdel(CONNECTIONS_HASH, id.as_str())
            .await
            .context("while deregistering connection")?;
        Ok(())
    }

    async fn lookup(&self, id: &ConnectionId) -> eyre::Result<Option<String>> {
        let mut conn = self.manager.clone();
        let owner: Option<String> = conn
            .hget(CONNECTIONS_HASH, id.as_str())
            .await
            .context("while looking up connection owner")?;
        Ok(owner)
    }
}

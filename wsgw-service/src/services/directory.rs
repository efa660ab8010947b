//! Ownership directory interface for clustered deployments.
//!
//! This module defines the [`Directory`] trait, which maps every live
//! connection id to the address of the gateway instance owning it. The
//! directory is the only cross-process shared state of the system; the two
//! writers for one id (register on accept, deregister on close) are never
//! concurrent because a connection is owned by exactly one session loop.
//!
//! Current `Directory` implementations:
//! - Redis (shared hash, see [`redis`])

use std::sync::Arc;

use async_trait::async_trait;
use wsgw_types::ConnectionId;

pub mod redis;

/// Name of the hash holding the `connection id -> owner address` records.
pub const CONNECTIONS_HASH: &str = "connections";

/// Dynamic trait object for the directory service.
///
/// Must be `Send + Sync` to work with async contexts (e.g., Axum).
pub type DirectoryService = Arc<dyn Directory + Send + Sync>;

/// Contract on the shared key/value store tracking connection ownership.
#[async_trait]
pub trait Directory {
    /// Records `owner` as the instance owning `id`. Idempotent upsert.
    async fn register(&self, id: &ConnectionId, owner: &str) -> eyre::Result<()>;

    /// Deletes the ownership record of `id`. Idempotent.
    async fn deregister(&self, id: &ConnectionId) -> eyre::Result<()>;

    /// Looks up the address of the instance owning `id`, if any.
    async fn lookup(&self, id: &ConnectionId) -> eyre::Result<Option<String>>;
}

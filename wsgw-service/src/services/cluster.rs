//! Cluster support: ownership registration and push forwarding.
//!
//! When several gateway instances run behind a load balancer, a push may
//! arrive at an instance that does not own the target connection.
//! [`ClusterSupport`] keeps the shared directory in sync with the local
//! session lifecycle and re-issues such pushes to the owning peer over HTTP.

use std::time::Duration;

use http::StatusCode;
use wsgw_types::ConnectionId;

use crate::services::directory::DirectoryService;

/// Errors of the cluster-side push path.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ClusterError {
    #[error("no owner registered for connection")]
    UnknownConnection,
    #[error("peer answered with unexpected status: {0}")]
    PeerStatus(StatusCode),
    #[error(transparent)]
    PeerTransport(#[from] reqwest::Error),
    #[error("directory error: {0}")]
    Directory(eyre::Report),
}

impl From<eyre::Report> for ClusterError {
    fn from(err: eyre::Report) -> Self {
        Self::Directory(err)
    }
}

/// Directory bookkeeping plus peer forwarding for one gateway instance.
pub(crate) struct ClusterSupport {
    directory: DirectoryService,
    http: reqwest::Client,
    own_address: String,
    peer_port: u16,
    peer_protocol: String,
}

impl ClusterSupport {
    pub(crate) fn new(
        directory: DirectoryService,
        own_address: String,
        peer_port: u16,
        peer_protocol: String,
        timeout: Duration,
    ) -> eyre::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            directory,
            http,
            own_address,
            peer_port,
            peer_protocol,
        })
    }

    /// Records this instance as the owner of `id`.
    pub(crate) async fn register(&self, id: &ConnectionId) -> eyre::Result<()> {
        self.directory.register(id, &self.own_address).await
    }

    /// Deletes the ownership record of `id`.
    pub(crate) async fn deregister(&self, id: &ConnectionId) -> eyre::Result<()> {
        self.directory.deregister(id).await
    }

    /// Re-issues a push to the instance owning `id`.
    ///
    /// A record pointing back at this instance is stale (the session is
    /// already past its teardown locally) and reported as unknown rather
    /// than forwarded, which would bounce between the push handler and this
    /// method forever.
    pub(crate) async fn forward(
        &self,
        id: &ConnectionId,
        payload: &str,
    ) -> Result<(), ClusterError> {
        let owner = self
            .directory
            .lookup(id)
            .await?
            .ok_or(ClusterError::UnknownConnection)?;
        if owner == self.own_address {
            tracing::debug!("stale ownership record for {id} points at ourselves");
            return Err(ClusterError::UnknownConnection);
        }

        let url = format!(
            "{}://{}:{}/message/{}",
            self.peer_protocol, owner, self.peer_port, id
        );
        tracing::debug!("forwarding push for {id} to {url}");
        let response = self
            .http
            .post(url)
            .body(payload.to_owned())
            .send()
            .await?;
        let status = response.status();
        // consume the body so the pooled connection can be reused
        let _ = response.bytes().await;
        if status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(ClusterError::PeerStatus(status))
        }
    }
}

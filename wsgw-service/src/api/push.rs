//! The push endpoint applications address connected clients through.
//!
//! `POST /message/{connectionId}` delivers the request body to the client
//! socket owning the id. Delivery is tried locally first; on a local miss in
//! cluster mode the shared directory names the owning instance and the push
//! is re-issued there. Delivery is at-most-once from this endpoint's
//! perspective: a 204 means the payload was accepted into the owning
//! session's buffer, not that the client read it.

use std::sync::Arc;

use axum::{
    Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::instrument;
use wsgw_types::ConnectionId;

use crate::{
    metrics::{
        METRICS_ID_PUSH_DELIVERED_LOCAL, METRICS_ID_PUSH_FORWARDED, METRICS_ID_PUSH_UNKNOWN,
    },
    services::{
        cluster::{ClusterError, ClusterSupport},
        connections::{ConnectionRegistry, RegistryError},
    },
};

pub(crate) struct PushArgs {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) cluster: Option<Arc<ClusterSupport>>,
}

/// Creates a `Router` with the single `/message/{connectionId}` route.
pub(crate) fn routes(args: PushArgs) -> Router {
    let PushArgs { registry, cluster } = args;
    Router::new().route(
        "/message/{connectionId}",
        post(move |path: Path<ConnectionId>, body: String| {
            let Path(id) = path;
            push(registry.clone(), cluster.clone(), id, body)
        }),
    )
}

/// Routes one push: local delivery first, then the owning peer.
///
/// Status mapping: 204 once the payload is accepted, 404 when nobody owns
/// the id, 500 for everything else.
#[instrument(level = "debug", skip_all, fields(connection_id = %id))]
async fn push(
    registry: ConnectionRegistry,
    cluster: Option<Arc<ClusterSupport>>,
    id: ConnectionId,
    body: String,
) -> Response {
    match registry.push_local(&id, &body).await {
        Ok(()) => {
            ::metrics::counter!(METRICS_ID_PUSH_DELIVERED_LOCAL).increment(1);
            tracing::debug!("message delivered locally");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(RegistryError::ConnectionNotFound) => match &cluster {
            None => {
                ::metrics::counter!(METRICS_ID_PUSH_UNKNOWN).increment(1);
                tracing::info!("connection doesn't exist: {id}");
                StatusCode::NOT_FOUND.into_response()
            }
            Some(cluster) => match cluster.forward(&id, &body).await {
                Ok(()) => {
                    ::metrics::counter!(METRICS_ID_PUSH_FORWARDED).increment(1);
                    tracing::debug!("message forwarded to owning peer");
                    StatusCode::NO_CONTENT.into_response()
                }
                Err(ClusterError::UnknownConnection) => {
                    ::metrics::counter!(METRICS_ID_PUSH_UNKNOWN).increment(1);
                    tracing::info!("connection doesn't exist anywhere: {id}");
                    StatusCode::NOT_FOUND.into_response()
                }
                Err(err) => {
                    tracing::error!("failed to forward push for {id}: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            },
        },
        Err(err) => {
            tracing::error!("failed to push to connection {id}: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#![deny(missing_docs)]
//! This crate provides the core functionality of a wsgw gateway instance.
//!
//! The gateway bridges long-lived, bidirectional WebSocket sessions held
//! with browser-like clients to a conventional stateless HTTP application.
//! Clients upgrade on `GET /connect`; the gateway lets the application
//! decide the upgrade via `GET {app}/ws/connect` (propagating the client's
//! `Authorization` header), then relays client text frames to
//! `POST {app}/ws/message` and delivers application pushes arriving on
//! `POST /message/{connectionId}` out over the owning client socket.
//!
//! The main entry point is the [`GatewayBuilder`]. [`GatewayBuilder::init`]
//! wires the internal services (live-connection registry, application
//! client, and — when an ownership directory is provided — cluster support),
//! and [`GatewayBuilder::build`] returns an `axum::Router` that should be
//! served by the hosting application, typically with `axum::serve`.
//!
//! Cancelling the provided `CancellationToken` drains every open session
//! through its regular teardown, so hosting applications should cancel the
//! token first and only then shut the HTTP server down.
//!
//! When several identical gateway instances run behind a load balancer, pass
//! a [`services::directory::DirectoryService`] to `init`: every accepted
//! session is then registered in the shared directory, and pushes arriving
//! at a non-owning instance are transparently forwarded to the owner.

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use wsgw_types::ConnectionId;

use crate::{
    api::{connect::ConnectArgs, push::PushArgs},
    config::GatewayConfig,
    services::{
        app_client::AppClient,
        cluster::ClusterSupport,
        connections::{ConnectionLimits, ConnectionRegistry},
        directory::DirectoryService,
    },
};

pub(crate) mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod services;

/// Factory producing a fresh [`ConnectionId`] per accepted client.
///
/// The default factory is [`ConnectionId::generate`]; tests replace it via
/// [`GatewayBuilder::with_id_factory`] to make session ids predictable.
pub type IdFactory = Arc<dyn Fn() -> ConnectionId + Send + Sync>;

/// Returns the package name, package version and the git revision of the
/// build.
pub fn version_info() -> String {
    format!(
        "{} {} (git: {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        git_version::git_version!(args = ["--abbrev=12", "--always"], fallback = "unknown"),
    )
}

/// [`GatewayBuilder`] to initialize a gateway instance.
pub struct GatewayBuilder {
    config: GatewayConfig,
    registry: ConnectionRegistry,
    app_client: AppClient,
    cluster: Option<Arc<ClusterSupport>>,
    id_factory: IdFactory,
    cancellation_token: CancellationToken,
    root: Router,
}

impl GatewayBuilder {
    /// Initializes the gateway service.
    ///
    /// This function sets up the components required for one gateway
    /// instance:
    ///
    /// 1. Creates the pooled HTTP client toward the application.
    /// 2. When `directory` is provided, enables cluster mode: the instance
    ///    identity (`MY_INSTANCE_IPADDRESS`, `MY_INSTANCE_PORT`) must be
    ///    configured so peers can reach this instance.
    /// 3. Sets up the ambient REST routes (`/health`, `/version`).
    ///
    /// Without a directory the gateway runs single-instance: pushes for
    /// connections it does not own answer 404.
    pub fn init(
        config: GatewayConfig,
        directory: Option<DirectoryService>,
        cancellation_token: CancellationToken,
    ) -> eyre::Result<Self> {
        ::metrics::gauge!(metrics::METRICS_ID_CONNECTIONS_OPEN).set(0);
        eyre::ensure!(
            !config.push_rate_period.is_zero(),
            "push rate period must be non-zero"
        );
        eyre::ensure!(
            config.message_buffer_size > 0,
            "message buffer size must be non-zero"
        );

        tracing::info!("init application client for {}..", config.app_base_url);
        let app_client = AppClient::new(config.app_base_url.clone(), config.app_timeout)?;

        let cluster = match directory {
            Some(directory) => {
                let own_address = config
                    .instance_ip_address
                    .clone()
                    .ok_or_else(|| eyre::eyre!("MY_INSTANCE_IPADDRESS is not set"))?;
                let peer_port = config
                    .instance_port
                    .ok_or_else(|| eyre::eyre!("MY_INSTANCE_PORT is not set"))?;
                tracing::info!("clustering enabled, registering connections as {own_address}");
                Some(Arc::new(ClusterSupport::new(
                    directory,
                    own_address,
                    peer_port,
                    config.instance_protocol.clone(),
                    config.app_timeout,
                )?))
            }
            None => {
                tracing::info!("no ownership directory configured, running single-instance");
                None
            }
        };

        let root = Router::new()
            .merge(api::health::routes())
            .merge(api::info::routes());

        Ok(Self {
            config,
            registry: ConnectionRegistry::default(),
            app_client,
            cluster,
            id_factory: Arc::new(ConnectionId::generate),
            cancellation_token,
            root,
        })
    }

    /// Replaces the connection id factory.
    ///
    /// Exists as a test seam; the default factory generates time-ordered
    /// unique ids and is the right choice everywhere else.
    pub fn with_id_factory(mut self, id_factory: IdFactory) -> Self {
        self.id_factory = id_factory;
        self
    }

    /// Build the `axum` [`Router`] with all gateway routes.
    ///
    /// Every request runs inside a span carrying a fresh request id; method,
    /// path, status and elapsed time are recorded once the response is
    /// produced.
    pub fn build(self) -> Router {
        let limits = ConnectionLimits {
            message_buffer_size: self.config.message_buffer_size,
            push_rate_period: self.config.push_rate_period,
            push_rate_burst: self.config.push_rate_burst,
        };
        self.root
            .merge(api::connect::routes(ConnectArgs {
                registry: self.registry.clone(),
                app_client: self.app_client,
                cluster: self.cluster.clone(),
                id_factory: self.id_factory,
                accepted_origin: self.config.load_balancer_address.clone(),
                limits,
                write_timeout: self.config.write_timeout,
                cancellation_token: self.cancellation_token,
            }))
            .merge(api::push::routes(PushArgs {
                registry: self.registry,
                cluster: self.cluster,
            }))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &axum::extract::Request| {
                        tracing::info_span!(
                            "request",
                            request_id = %Uuid::now_v7(),
                            method = %request.method(),
                            path = %request.uri().path(),
                        )
                    })
                    .on_response(
                        |response: &axum::response::Response,
                         elapsed: std::time::Duration,
                         _span: &tracing::Span| {
                            tracing::info!(
                                status_code = response.status().as_u16(),
                                elapsed_ms = elapsed.as_millis() as u64,
                                "incoming request",
                            );
                        },
                    ),
            )
    }
}

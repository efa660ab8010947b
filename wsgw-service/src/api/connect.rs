//! The WebSocket endpoint clients connect to, and the session loop driving
//! every accepted connection.
//!
//! A session is accepted only after the application approved it via
//! `GET {app}/ws/connect`. The first frame toward the client is the connect
//! ack carrying the session's [`ConnectionId`]; afterwards the session loop
//! multiplexes three sources until the session ends: messages queued for
//! delivery to the client, frames read from the client (relayed to the
//! application), and the reader task's terminal signal.

use std::{
    io::ErrorKind,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    extract::{
        WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::{IntoResponse, Response},
    routing::any,
};
use futures::{
    SinkExt as _, StreamExt as _,
    stream::{SplitSink, SplitStream},
};
use http::{HeaderMap, StatusCode, Uri, header};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, instrument};
use tungstenite::error::ProtocolError;
use wsgw_types::{CONNECT_PATH, ConnectAck, ConnectionId};

use crate::{
    IdFactory,
    api::errors::{SessionError, close_frame_for},
    metrics::{
        METRICS_ID_RELAY_DURATION, METRICS_ID_RELAY_ERRORS, METRICS_ID_SESSIONS_CLOSED_ABNORMAL,
    },
    services::{
        app_client::{AppClient, AppClientError},
        cluster::ClusterSupport,
        connections::{
            CloseInfo, Connection, ConnectionLimits, ConnectionRegistry, ReaderEnd, ReaderSignal,
        },
    },
};

pub(crate) struct ConnectArgs {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) app_client: AppClient,
    pub(crate) cluster: Option<Arc<ClusterSupport>>,
    pub(crate) id_factory: IdFactory,
    pub(crate) accepted_origin: Option<String>,
    pub(crate) limits: ConnectionLimits,
    pub(crate) write_timeout: Duration,
    pub(crate) cancellation_token: CancellationToken,
}

/// Everything one accepted session operates on.
struct SessionContext {
    id: ConnectionId,
    registry: ConnectionRegistry,
    app_client: AppClient,
    cluster: Option<Arc<ClusterSupport>>,
    limits: ConnectionLimits,
    write_timeout: Duration,
    cancellation_token: CancellationToken,
}

/// Creates a `Router` with the single `/connect` route.
///
/// Clients upgrade their connection via the WebSocket upgrade protocol. Axum
/// supports both HTTP/1.1 and HTTP/2.0 WebSocket connections, therefore we
/// accept connections with `any`.
pub(crate) fn routes(args: ConnectArgs) -> Router {
    let ConnectArgs {
        registry,
        app_client,
        cluster,
        id_factory,
        accepted_origin,
        limits,
        write_timeout,
        cancellation_token,
    } = args;
    Router::new().route(
        CONNECT_PATH,
        any(move |ws: WebSocketUpgrade, headers: HeaderMap| {
            connect(
                SessionContext {
                    id: (id_factory)(),
                    registry: registry.clone(),
                    app_client: app_client.clone(),
                    cluster: cluster.clone(),
                    limits: limits.clone(),
                    write_timeout,
                    cancellation_token: cancellation_token.child_token(),
                },
                accepted_origin.clone(),
                ws,
                headers,
            )
        }),
    )
}

/// WebSocket upgrade handler.
///
/// Lets the application decide the fate of the upgrade first: a 200 from
/// `GET {app}/ws/connect` accepts the socket, a 401 refuses it with 401,
/// anything else refuses it with 500. The client's request headers (notably
/// `Authorization`) are propagated on that call, so authentication stays
/// entirely with the application.
///
/// Adds a `failed_upgrade` handler that logs the error.
#[instrument(level = "debug", skip_all, name = "session", fields(connection_id = %ctx.id))]
async fn connect(
    ctx: SessionContext,
    accepted_origin: Option<String>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    if !origin_allowed(accepted_origin.as_deref(), &headers) {
        tracing::info!("refusing upgrade: origin not accepted");
        return StatusCode::FORBIDDEN.into_response();
    }

    match ctx.app_client.connecting(&ctx.id, &headers).await {
        Ok(()) => {}
        Err(AppClientError::Unauthorized) => {
            tracing::info!("authentication failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            tracing::error!("could not announce connection to application: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    tracing::debug!("application accepted connection: {}", ctx.id);

    let parent_span = tracing::Span::current();
    ws.on_failed_upgrade(|err| {
        tracing::warn!("could not establish websocket connection: {err:?}");
    })
    .on_upgrade(move |socket| handle_session(ctx, socket).instrument(parent_span))
}

/// Runs one accepted session from registration to teardown.
///
/// The teardown runs on every exit path of the session loop: a best-effort
/// close frame, the `disconnected` notification toward the application,
/// deletion of the ownership record, and removal from the registry (via the
/// guard drop).
async fn handle_session(ctx: SessionContext, socket: WebSocket) {
    let (mut sink, stream) = socket.split();
    let (connection, reader_end, handle) = Connection::open(ctx.id.clone(), &ctx.limits);
    let guard = match ctx.registry.insert(ctx.id.clone(), handle) {
        Ok(guard) => guard,
        Err(err) => {
            tracing::error!("cannot register connection: {err}");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "unexpected error".into(),
                })))
                .await;
            return;
        }
    };
    if let Some(cluster) = &ctx.cluster
        && let Err(err) = cluster.register(&ctx.id).await
    {
        tracing::error!("cannot record connection ownership: {err:?}");
    }

    let reader = tokio::spawn(read_frames(stream, reader_end).in_current_span());
    let result = process_messages(&ctx, connection, &mut sink).await;
    tracing::debug!("message processing finished with {result:?}");

    if let Some(frame) = close_frame_for(&result) {
        // axum just sends the frame and ignores the error afterwards and
        // also doesn't wait for the peer's close frame, so we do the same
        let _ = sink.send(Message::Close(Some(frame))).await;
    }
    reader.abort();

    if let Err(err) = ctx.app_client.disconnected(&ctx.id).await {
        tracing::warn!("could not notify application of disconnect: {err}");
    }
    if let Some(cluster) = &ctx.cluster
        && let Err(err) = cluster.deregister(&ctx.id).await
    {
        tracing::error!("cannot delete connection ownership: {err:?}");
    }
    drop(guard);

    match result {
        Ok(()) => tracing::debug!("session finished"),
        Err(err) if err.is_quiet() => tracing::debug!("session finished: {err}"),
        Err(err) => {
            ::metrics::counter!(METRICS_ID_SESSIONS_CLOSED_ABNORMAL).increment(1);
            tracing::error!("session finished abnormally: {err}");
        }
    }
}

/// The session loop.
///
/// Sends the connect ack, then multiplexes until a terminal event: messages
/// queued for the client are written to the wire under the write timeout,
/// frames from the client are relayed to the application, and the reader
/// signal decides how the session ends. Per-connection FIFO holds in both
/// directions because each direction flows through a single bounded channel.
async fn process_messages(
    ctx: &SessionContext,
    mut connection: Connection,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Result<(), SessionError> {
    let ack = serde_json::to_string(&ConnectAck {
        connection_id: connection.id.clone(),
    })
    .expect("Can serialize ack");
    sink.send(Message::text(ack))
        .await
        .map_err(SessionError::AckFailed)?;

    let mut inbound_open = true;
    loop {
        tokio::select! {
            message = connection.outbound.recv() => {
                let Some(message) = message else {
                    return Err(SessionError::ReadFailed("outbound channel closed unexpectedly".to_owned()));
                };
                tracing::debug!("delivering message to client");
                match tokio::time::timeout(ctx.write_timeout, sink.send(Message::text(message))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => return Err(SessionError::WriteFailed(err)),
                    Err(_) => return Err(SessionError::SlowConsumer),
                }
            }
            message = connection.inbound.recv(), if inbound_open => {
                match message {
                    Some(message) => relay_to_app(ctx, &connection, message).await,
                    None => inbound_open = false,
                }
            }
            signal = connection.reader_signals.recv() => {
                return match signal {
                    Some(ReaderSignal::Closed(close)) if close.code == close_code::NORMAL => Ok(()),
                    Some(ReaderSignal::Closed(close)) => Err(SessionError::AbnormalClose(close)),
                    Some(ReaderSignal::ProtocolViolation) => Err(SessionError::ProtocolViolation),
                    Some(ReaderSignal::ReadFailed(reason)) => Err(SessionError::ReadFailed(reason)),
                    None => Err(SessionError::ReadFailed("reader task terminated".to_owned())),
                };
            }
            _ = ctx.cancellation_token.cancelled() => return Err(SessionError::Cancelled),
        }
    }
}

/// Relays one client frame to the application.
///
/// A failed relay does not end the session; the error text is queued toward
/// the client instead so it learns its message went nowhere.
async fn relay_to_app(ctx: &SessionContext, connection: &Connection, message: String) {
    let start = Instant::now();
    let result = ctx.app_client.message(&connection.id, &message).await;
    ::metrics::histogram!(METRICS_ID_RELAY_DURATION).record(start.elapsed().as_millis() as f64);
    if let Err(err) = result {
        ::metrics::counter!(METRICS_ID_RELAY_ERRORS).increment(1);
        tracing::warn!("could not relay message to application: {err}");
        if connection.error_replies.try_send(err.to_string()).is_err() {
            tracing::warn!("outbound buffer full, dropping error reply");
        }
    }
}

/// Drains the read half of the socket.
///
/// Exclusive sender of the inbound and signal channels; sends exactly one
/// [`ReaderSignal`] as its last act.
async fn read_frames(mut stream: SplitStream<WebSocket>, reader: ReaderEnd) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // a closed inbound channel means the loop is past its teardown
                if reader.inbound.send(text.to_string()).await.is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                let close = frame
                    .map(|frame| CloseInfo {
                        code: frame.code,
                        reason: frame.reason.to_string(),
                    })
                    .unwrap_or(CloseInfo {
                        code: close_code::STATUS,
                        reason: String::new(),
                    });
                tracing::debug!("client closed connection (code {})", close.code);
                let _ = reader.signals.send(ReaderSignal::Closed(close)).await;
                return;
            }
            Ok(Message::Binary(_)) => {
                let _ = reader.signals.send(ReaderSignal::ProtocolViolation).await;
                return;
            }
            // ping/pong, answered by the library
            Ok(_) => {}
            Err(err) => {
                let _ = reader.signals.send(classify_read_error(err)).await;
                return;
            }
        }
    }
    let _ = reader
        .signals
        .send(ReaderSignal::Closed(CloseInfo {
            code: close_code::ABNORMAL,
            reason: "connection dropped without close frame".to_owned(),
        }))
        .await;
}

/// Distinguishes a peer that vanished from a genuinely broken transport.
fn classify_read_error(err: axum::Error) -> ReaderSignal {
    let inner = err.into_inner();
    if let Some(tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)) =
        inner.downcast_ref()
    {
        ReaderSignal::Closed(CloseInfo {
            code: close_code::ABNORMAL,
            reason: "reset without closing handshake".to_owned(),
        })
    } else if let Some(io_err) = inner.downcast_ref::<std::io::Error>()
        && io_err.kind() == ErrorKind::ConnectionReset
    {
        ReaderSignal::Closed(CloseInfo {
            code: close_code::ABNORMAL,
            reason: "connection reset".to_owned(),
        })
    } else {
        ReaderSignal::ReadFailed(inner.to_string())
    }
}

/// Whether the request's `Origin` is acceptable for an upgrade.
///
/// Requests without an `Origin` header (non-browser clients) are accepted.
fn origin_allowed(accepted: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(accepted) = accepted else { return true };
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    origin
        .to_str()
        .ok()
        .and_then(|origin| origin.parse::<Uri>().ok())
        .and_then(|origin| origin.host().map(|host| host == accepted))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, origin.parse().expect("valid header"));
        headers
    }

    #[test]
    fn origin_is_unconstrained_without_configuration() {
        assert!(origin_allowed(None, &headers_with_origin("http://evil.example")));
    }

    #[test]
    fn missing_origin_is_accepted() {
        assert!(origin_allowed(Some("lb.example"), &HeaderMap::new()));
    }

    #[test]
    fn origin_host_must_match_the_configured_address() {
        assert!(origin_allowed(
            Some("lb.example"),
            &headers_with_origin("https://lb.example")
        ));
        assert!(!origin_allowed(
            Some("lb.example"),
            &headers_with_origin("https://other.example")
        ));
    }
}

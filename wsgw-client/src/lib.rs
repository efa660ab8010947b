#![deny(missing_docs, clippy::unwrap_used)]
//! Client library for the wsgw gateway.
//!
//! This crate handles a single WebSocket session with a gateway instance
//! using tungstenite. A session is very thin and handles errors very
//! conservatively: anything unexpected terminates it. The closing handshake
//! is implemented at a best-effort basis — if sending the `Close` frame
//! fails, the error is ignored and the connection is simply dropped.
//!
//! The gateway speaks opaque text messages; the only structured frame is the
//! connect ack which [`GatewaySession::connect`] consumes to learn the
//! session's [`ConnectionId`].

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        self, ClientRequestBuilder,
        http::{StatusCode, uri::InvalidUri},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use wsgw_types::{CONNECT_PATH, ConnectAck, ConnectionId};

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors returned by a gateway session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The gateway sent a frame that is not `Text`/`Close`.
    #[error("Unexpected msg")]
    UnexpectedMsg,
    /// The gateway refused the upgrade (e.g. the application answered 401).
    #[error("gateway refused the connection with status {0}")]
    Rejected(StatusCode),
    /// The gateway sent a close frame with an error code.
    #[error("gateway closed the connection: {0}")]
    ServerClosed(String),
    /// The gateway closed the connection.
    #[error("Endpoint closed connection")]
    Eof,
    /// The connect ack could not be parsed.
    #[error("malformed connect ack: {0}")]
    MalformedAck(#[from] serde_json::Error),
    /// The used service is not a valid URI.
    #[error(transparent)]
    InvalidUri(#[from] InvalidUri),
    /// Wrapping inner tungstenite error.
    #[error(transparent)]
    WsError(tungstenite::Error),
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => Error::Rejected(response.status()),
            other => Error::WsError(other),
        }
    }
}

/// An open session with a gateway instance.
///
/// Created by [`GatewaySession::connect`], which performs the upgrade and
/// consumes the connect ack. Afterwards the session exchanges opaque text
/// messages until either side closes.
#[derive(Debug)]
pub struct GatewaySession {
    connection_id: ConnectionId,
    inner: WebSocket,
}

impl GatewaySession {
    /// Opens a session at the provided service. Replaces `http` and `https`
    /// protocol prefixes with `ws` or `wss` respectively.
    ///
    /// The service string should only contain how to connect to the host,
    /// the implementation will append `/connect`. The `authorization` value,
    /// when provided, is sent as the `Authorization` header so the
    /// application behind the gateway can evaluate it.
    pub async fn connect(service: &str, authorization: Option<&str>) -> Result<Self, Error> {
        let endpoint = format!("{service}{CONNECT_PATH}")
            .replace("https", "wss")
            .replace("http", "ws");
        tracing::trace!("> connecting to {endpoint}..");
        let mut request = ClientRequestBuilder::new(endpoint.parse()?);
        if let Some(authorization) = authorization {
            request = request.with_header("Authorization", authorization);
        }
        let (mut ws, _) = tokio_tungstenite::connect_async(request).await?;

        // the first frame of a session is always the connect ack
        let ack = loop {
            match ws.next().await.ok_or(Error::Eof)?? {
                tungstenite::Message::Text(text) => {
                    break serde_json::from_str::<ConnectAck>(text.as_str())?;
                }
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
                tungstenite::Message::Close(frame) => return Err(close_error(frame)),
                _ => return Err(Error::UnexpectedMsg),
            }
        };
        tracing::debug!("session open as {}", ack.connection_id);
        Ok(Self {
            connection_id: ack.connection_id,
            inner: ws,
        })
    }

    /// The id the gateway assigned to this session.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Sends one text message to the gateway.
    pub async fn send(&mut self, message: &str) -> Result<(), Error> {
        self.inner.send(tungstenite::Message::text(message)).await?;
        Ok(())
    }

    /// Waits for the next text message from the gateway.
    ///
    /// A close frame with a non-normal code surfaces as
    /// [`Error::ServerClosed`], a normal closure as [`Error::Eof`].
    pub async fn receive(&mut self) -> Result<String, Error> {
        loop {
            match self.inner.next().await.ok_or(Error::Eof)?? {
                tungstenite::Message::Text(text) => return Ok(text.to_string()),
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
                tungstenite::Message::Close(frame) => return Err(close_error(frame)),
                _ => return Err(Error::UnexpectedMsg),
            }
        }
    }

    /// Closes the session with a normal-closure frame and waits for the
    /// handshake to finish.
    pub async fn close(mut self) -> Result<(), Error> {
        let result = self
            .inner
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            }))
            .await;
        match result {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => {}
            Err(err) => return Err(err.into()),
        }
        // drain until the peer finishes the handshake or drops
        while let Some(frame) = self.inner.next().await {
            if frame.is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn close_error(frame: Option<CloseFrame>) -> Error {
    match frame {
        Some(frame) if frame.code != CloseCode::Normal => {
            Error::ServerClosed(format!("{}: {}", frame.code, frame.reason))
        }
        _ => Error::Eof,
    }
}

//! Outbound HTTP calls toward the application the gateway bridges to.
//!
//! Three exchanges exist: `connecting` (the application decides whether the
//! socket may be accepted), `message` (a client frame is relayed) and
//! `disconnected` (the session ended). Every call carries the connection id
//! in the `X-WSGW-CONNECTION-ID` header and runs under the configured client
//! timeout on a single pooled [`reqwest::Client`].

use std::time::Duration;

use http::{HeaderMap, HeaderValue, StatusCode};
use wsgw_types::{
    APP_CONNECT_PATH, APP_DISCONNECTED_PATH, APP_MESSAGE_PATH, CONNECTION_ID_HEADER, ConnectionId,
};

/// Headers never copied toward the application: hop-by-hop headers and the
/// WebSocket handshake headers of the upgrade request.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "sec-websocket-extensions",
    "sec-websocket-key",
    "sec-websocket-protocol",
    "sec-websocket-version",
];

/// Errors of outbound application calls.
#[derive(Debug, thiserror::Error)]
pub(crate) enum AppClientError {
    #[error("application refused the connection")]
    Unauthorized,
    #[error("application answered with unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// HTTP client toward the application.
#[derive(Clone)]
pub(crate) struct AppClient {
    http: reqwest::Client,
    base_url: String,
}

impl AppClient {
    pub(crate) fn new(base_url: String, timeout: Duration) -> eyre::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Asks the application whether a connecting client may be accepted.
    ///
    /// The client's request headers are propagated (minus handshake and
    /// hop-by-hop headers) so the application can evaluate `Authorization`
    /// itself. A 200 accepts the socket, a 401 refuses it as unauthorized,
    /// anything else refuses it as an application failure.
    pub(crate) async fn connecting(
        &self,
        id: &ConnectionId,
        client_headers: &HeaderMap,
    ) -> Result<(), AppClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in client_headers {
            if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers.insert(CONNECTION_ID_HEADER.clone(), id_header_value(id));

        let response = self
            .http
            .get(format!("{}{}", self.base_url, APP_CONNECT_PATH))
            .headers(headers)
            .send()
            .await?;
        let status = response.status();
        drain(response).await;
        match status {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(AppClientError::Unauthorized),
            other => Err(AppClientError::UnexpectedStatus(other)),
        }
    }

    /// Relays one client text frame to the application.
    pub(crate) async fn message(
        &self,
        id: &ConnectionId,
        message: &str,
    ) -> Result<(), AppClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, APP_MESSAGE_PATH))
            .header(CONNECTION_ID_HEADER.clone(), id_header_value(id))
            .body(message.to_owned())
            .send()
            .await?;
        let status = response.status();
        drain(response).await;
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(AppClientError::UnexpectedStatus(status))
        }
    }

    /// Tells the application that a session ended.
    pub(crate) async fn disconnected(&self, id: &ConnectionId) -> Result<(), AppClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, APP_DISCONNECTED_PATH))
            .header(CONNECTION_ID_HEADER.clone(), id_header_value(id))
            .send()
            .await?;
        let status = response.status();
        drain(response).await;
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(AppClientError::UnexpectedStatus(status))
        }
    }
}

fn id_header_value(id: &ConnectionId) -> HeaderValue {
    HeaderValue::from_str(id.as_str()).expect("connection ids are valid header values")
}

/// Consumes the response body so the pooled connection can be reused.
async fn drain(response: reqwest::Response) {
    let _ = response.bytes().await;
}

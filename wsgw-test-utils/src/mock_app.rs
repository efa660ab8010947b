//! Mock application for the gateway test-suites.
//!
//! Serves the three endpoints the gateway calls (`/ws/connect`,
//! `/ws/message`, `/ws/disconnected`) on an ephemeral port and records every
//! call keyed by the `X-WSGW-CONNECTION-ID` header, in arrival order per
//! connection.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use parking_lot::Mutex;
use wsgw_types::{APP_CONNECT_PATH, APP_DISCONNECTED_PATH, APP_MESSAGE_PATH, CONNECTION_ID_HEADER};

/// The credential the mock application refuses with 401.
pub const BAD_CREDENTIAL: &str = "Bearer bad-credential";

/// One call the gateway made toward the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCall {
    /// `GET /ws/connect` — a client is connecting.
    Connect,
    /// `POST /ws/message` — a client frame was relayed, with its body.
    Message(String),
    /// `POST /ws/disconnected` — a session ended.
    Disconnected,
}

#[derive(Default, Clone)]
struct CallLog(Arc<Mutex<HashMap<String, Vec<AppCall>>>>);

impl CallLog {
    fn record(&self, connection_id: String, call: AppCall) {
        self.0.lock().entry(connection_id).or_default().push(call);
    }
}

/// The mock application the gateway bridges to in tests.
pub struct MockApplication {
    /// Base URL the gateway should use as its `app_base_url`.
    pub base_url: String,
    calls: CallLog,
    fail_messages: Arc<AtomicBool>,
}

impl MockApplication {
    /// Binds the application to an ephemeral port and starts serving.
    pub async fn start() -> eyre::Result<Self> {
        let calls = CallLog::default();
        let fail_messages = Arc::new(AtomicBool::new(false));
        let router = routes(calls.clone(), Arc::clone(&fail_messages));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!("mock application failed: {err:?}");
            }
        });
        Ok(Self {
            base_url: format!("http://{addr}"),
            calls,
            fail_messages,
        })
    }

    /// Makes every `/ws/message` call answer 500 until reset.
    pub fn fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::Relaxed);
    }

    /// The calls observed for `connection_id`, in arrival order.
    pub fn calls(&self, connection_id: &str) -> Vec<AppCall> {
        self.calls
            .0
            .lock()
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All connection ids the application has seen so far.
    pub fn known_connections(&self) -> Vec<String> {
        self.calls.0.lock().keys().cloned().collect()
    }

    /// Waits until the application observed the disconnect of
    /// `connection_id`.
    pub async fn wait_for_disconnect(
        &self,
        connection_id: &str,
        max_wait_time: Duration,
    ) -> eyre::Result<()> {
        self.wait_for(connection_id, max_wait_time, |calls| {
            calls.iter().any(|call| matches!(call, AppCall::Disconnected))
        })
        .await
    }

    /// Waits until the application observed `count` relayed messages for
    /// `connection_id`.
    pub async fn wait_for_messages(
        &self,
        connection_id: &str,
        count: usize,
        max_wait_time: Duration,
    ) -> eyre::Result<()> {
        self.wait_for(connection_id, max_wait_time, |calls| {
            calls
                .iter()
                .filter(|call| matches!(call, AppCall::Message(_)))
                .count()
                >= count
        })
        .await
    }

    async fn wait_for(
        &self,
        connection_id: &str,
        max_wait_time: Duration,
        condition: impl Fn(&[AppCall]) -> bool,
    ) -> eyre::Result<()> {
        let deadline = tokio::time::Instant::now() + max_wait_time;
        loop {
            if condition(&self.calls(connection_id)) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                eyre::bail!(
                    "condition not observed for {connection_id} within {max_wait_time:?}; \
                     calls so far: {:?}",
                    self.calls(connection_id)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn routes(calls: CallLog, fail_messages: Arc<AtomicBool>) -> Router {
    let connect_calls = calls.clone();
    let message_calls = calls.clone();
    let disconnect_calls = calls;
    Router::new()
        .route(
            APP_CONNECT_PATH,
            get(move |headers: HeaderMap| connecting(connect_calls.clone(), headers)),
        )
        .route(
            APP_MESSAGE_PATH,
            post(move |headers: HeaderMap, body: String| {
                message(
                    message_calls.clone(),
                    Arc::clone(&fail_messages),
                    headers,
                    body,
                )
            }),
        )
        .route(
            APP_DISCONNECTED_PATH,
            post(move |headers: HeaderMap| disconnected(disconnect_calls.clone(), headers)),
        )
}

async fn connecting(calls: CallLog, headers: HeaderMap) -> StatusCode {
    let Some(id) = connection_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value.as_bytes() == BAD_CREDENTIAL.as_bytes())
    {
        return StatusCode::UNAUTHORIZED;
    }
    calls.record(id, AppCall::Connect);
    StatusCode::OK
}

async fn message(
    calls: CallLog,
    fail_messages: Arc<AtomicBool>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let Some(id) = connection_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if fail_messages.load(Ordering::Relaxed) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    calls.record(id, AppCall::Message(body));
    StatusCode::OK
}

async fn disconnected(calls: CallLog, headers: HeaderMap) -> StatusCode {
    let Some(id) = connection_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    calls.record(id, AppCall::Disconnected);
    StatusCode::OK
}

fn connection_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&CONNECTION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

#![deny(missing_docs)]
//! Core type definitions shared by the wsgw gateway, its client library and
//! the test tooling.
//!
//! This crate groups together the strongly-typed values and wire constants
//! used across the gateway:
//!
//! * [`ConnectionId`] — the cluster-unique identifier of one client session.
//! * [`ConnectAck`] — the first frame the gateway sends to a freshly
//!   connected client.
//! * The `X-WSGW-CONNECTION-ID` header and the endpoint paths spoken between
//!   gateway and application.

use std::fmt;

use http::HeaderName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The name of the header carrying the connection id on every HTTP exchange
/// between the gateway and the application.
pub static CONNECTION_ID_HEADER: HeaderName = HeaderName::from_static("x-wsgw-connection-id");

/// Gateway endpoint clients upgrade their WebSocket connection on.
pub const CONNECT_PATH: &str = "/connect";

/// Application endpoint notified when a client is connecting.
pub const APP_CONNECT_PATH: &str = "/ws/connect";
/// Application endpoint receiving relayed client messages.
pub const APP_MESSAGE_PATH: &str = "/ws/message";
/// Application endpoint notified after a client disconnected.
pub const APP_DISCONNECTED_PATH: &str = "/ws/disconnected";

/// Identifier of one client session, unique within a gateway cluster.
///
/// Generated without coordination from a UUID v7, so ids sort
/// lexicographically by creation time in their canonical encoding. The id is
/// created once per accepted socket and lives for the whole session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a fresh connection id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The first text frame the gateway sends to a client after a successful
/// upgrade, carrying the id under which the session is addressable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAck {
    /// The id assigned to the freshly accepted session.
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_serializes_as_plain_string() {
        let id = ConnectionId::from("0190e347-bd57-7b22-b291-01766e9ee17a");
        let json = serde_json::to_string(&id).expect("Can serialize id");
        assert_eq!(json, "\"0190e347-bd57-7b22-b291-01766e9ee17a\"");
    }

    #[test]
    fn ack_frame_uses_camel_case_key() {
        let ack = ConnectAck {
            connection_id: ConnectionId::from("some-id"),
        };
        let json = serde_json::to_string(&ack).expect("Can serialize ack");
        assert_eq!(json, "{\"connectionId\":\"some-id\"}");
    }
}

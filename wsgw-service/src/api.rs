//! API module for the gateway.
//!
//! This module defines all HTTP endpoints the gateway serves and organizes
//! them into submodules:
//!
//! - [`connect`] – The WebSocket endpoint `/connect` and the session loop.
//! - [`errors`] – The session error taxonomy and close-frame mapping.
//! - [`health`] – Provides health endpoints (`/health`).
//! - [`info`] – Info about the service (`/version`).
//! - [`push`] – The push endpoint `/message/{connectionId}`.

pub(crate) mod connect;
pub(crate) mod errors;
pub(crate) mod health;
pub(crate) mod info;
pub(crate) mod push;

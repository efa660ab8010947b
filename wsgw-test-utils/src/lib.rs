//! Test utilities for the wsgw gateway.
//!
//! - [`mock_app`] – an HTTP application the gateway can be pointed at; it
//!   records every call the gateway makes and can simulate authentication
//!   rejections and relay failures.
//! - [`directory`] – an in-memory ownership directory for cluster-mode
//!   suites that should not require a running Redis.

pub mod directory;
pub mod mock_app;

pub use directory::InMemoryDirectory;
pub use mock_app::{AppCall, BAD_CREDENTIAL, MockApplication};

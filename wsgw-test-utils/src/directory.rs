//! In-memory ownership directory for cluster-mode test-suites.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use wsgw_service::services::directory::Directory;
use wsgw_types::ConnectionId;

/// Ownership directory backed by a plain map.
///
/// Shared between gateway instances of one test by cloning; supports
/// planting records directly so forwarding scenarios don't need a second
/// live session.
#[derive(Default, Clone)]
pub struct InMemoryDirectory(Arc<Mutex<HashMap<String, String>>>);

impl InMemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plants an ownership record.
    pub fn insert(&self, id: &ConnectionId, owner: &str) {
        self.0.lock().insert(id.to_string(), owner.to_owned());
    }

    /// Returns the recorded owner of `id`, if any.
    pub fn owner(&self, id: &ConnectionId) -> Option<String> {
        self.0.lock().get(id.as_str()).cloned()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether the directory holds no records.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn register(&self, id: &ConnectionId, owner: &str) -> eyre::Result<()> {
        self.0.lock().insert(id.to_string(), owner.to_owned());
        Ok(())
    }

    async fn deregister(&self, id: &ConnectionId) -> eyre::Result<()> {
        self.0.lock().remove(id.as_str());
        Ok(())
    }

    async fn lookup(&self, id: &ConnectionId) -> eyre::Result<Option<String>> {
        Ok(self.0.lock().get(id.as_str()).cloned())
    }
}

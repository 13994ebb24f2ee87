//! Collaborator traits for the remote notification queue and resource API.
//!
//! The subscription engine never talks HTTP itself. It consumes these two
//! traits, so any transport (REST client, message bus, in-process queue)
//! can be plugged in as long as it is `Send + Sync`.

use async_trait::async_trait;

use crate::error::FetchError;

use super::RawNotification;

/// Page size used when a caller does not ask for an explicit limit
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Largest page a source is expected to return in one fetch
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Remote queue of change notifications.
///
/// Implementations return notifications in queue order. `limit = None`
/// means "use the source's default page size"; `last_processed_id`
/// acknowledges everything up to and including that id.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn fetch(
        &self,
        limit: Option<u32>,
        last_processed_id: Option<&str>,
    ) -> Result<Vec<RawNotification>, FetchError>;
}

/// A resource representation at an explicit schema version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedResource {
    /// Version the server reports it actually returned
    pub declared_version: Option<String>,
    /// Content type the server reports for `body`
    pub declared_content_type: Option<String>,
    pub body: serde_json::Value,
}

impl VersionedResource {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            declared_version: None,
            declared_content_type: None,
            body,
        }
    }

    pub fn with_declared_version(mut self, version: impl Into<String>) -> Self {
        self.declared_version = Some(version.into());
        self
    }

    pub fn with_declared_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.declared_content_type = Some(content_type.into());
        self
    }
}

/// Fetches one resource by name and id at a requested version
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn get_versioned_resource(
        &self,
        resource_name: &str,
        resource_id: &str,
        version: &str,
    ) -> Result<VersionedResource, FetchError>;
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::OverrideConfig;
use crate::error::{FetchError, Result};
use crate::metrics::PollMetrics;

use super::{ChangeNotification, NotificationSource, OverrideResolver, ResourceFetcher};

/// Fetches pages of change notifications and applies version overrides.
///
/// The service keeps a queue cursor: the id of the last notification of
/// the last page that was fully resolved. It is handed back to the source
/// on the next fetch, so a page whose override resolution fails is
/// requested again instead of being lost.
///
/// Fetches are serialized: subscriptions sharing one service take turns, so
/// each page starts from the cursor the previous page left behind.
pub struct NotificationService {
    source: Arc<dyn NotificationSource>,
    resolver: OverrideResolver,
    last_processed_id: Mutex<Option<String>>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl NotificationService {
    pub fn new(source: Arc<dyn NotificationSource>, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_resolver(source, OverrideResolver::new(fetcher))
    }

    pub fn with_resolver(source: Arc<dyn NotificationSource>, resolver: OverrideResolver) -> Self {
        Self {
            source,
            resolver,
            last_processed_id: Mutex::new(None),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a service whose override map is seeded from configuration
    pub fn from_settings(
        source: Arc<dyn NotificationSource>,
        fetcher: Arc<dyn ResourceFetcher>,
        settings: &OverrideConfig,
    ) -> Result<Self> {
        let resolver = OverrideResolver::with_media_type_prefix(
            fetcher,
            settings.media_type_prefix.clone(),
        );
        for (name, version) in &settings.full {
            resolver.add_override(name, version)?;
        }
        for (name, version) in &settings.abbreviated {
            resolver.add_abbreviated_override(name, version)?;
        }

        tracing::info!(
            overrides = resolver.list_overrides().len(),
            "Notification service configured"
        );

        Ok(Self::with_resolver(source, resolver))
    }

    /// Builder-style override registration
    pub fn with_override(self, resource_name: &str, version: &str) -> Result<Self> {
        self.add_override(resource_name, version)?;
        Ok(self)
    }

    /// Builder-style abbreviated override registration
    pub fn with_abbreviated_override(self, resource_name: &str, version: &str) -> Result<Self> {
        self.add_abbreviated_override(resource_name, version)?;
        Ok(self)
    }

    /// Fetch one page at the source's default page size
    pub async fn fetch_default(&self) -> std::result::Result<Vec<ChangeNotification>, FetchError> {
        self.fetch_page(None).await
    }

    /// Fetch up to `limit` notifications
    pub async fn fetch(&self, limit: u32) -> std::result::Result<Vec<ChangeNotification>, FetchError> {
        self.fetch_page(Some(limit)).await
    }

    /// Fetch using a subscriber demand: negative means default page size
    pub async fn fetch_demand(
        &self,
        demand: i64,
    ) -> std::result::Result<Vec<ChangeNotification>, FetchError> {
        if demand < 0 {
            self.fetch_default().await
        } else {
            self.fetch(u32::try_from(demand).unwrap_or(u32::MAX)).await
        }
    }

    async fn fetch_page(
        &self,
        limit: Option<u32>,
    ) -> std::result::Result<Vec<ChangeNotification>, FetchError> {
        // Held until the cursor is advanced
        let _turn = self.fetch_lock.lock().await;
        let cursor = self.last_processed_id.lock().clone();

        let start = Instant::now();
        let raw = self.source.fetch(limit, cursor.as_deref()).await;
        PollMetrics::observe_fetch(start.elapsed());
        let raw = raw?;

        let mut notifications = Vec::with_capacity(raw.len());
        for item in &raw {
            let notification = item.parse()?;
            notifications.push(self.resolver.resolve(notification).await?);
        }

        if let Some(last) = notifications.last() {
            *self.last_processed_id.lock() = Some(last.id.clone());
        }

        tracing::debug!(
            limit = ?limit,
            count = notifications.len(),
            cursor = ?cursor,
            "Fetched notifications"
        );

        Ok(notifications)
    }

    pub fn last_processed_id(&self) -> Option<String> {
        self.last_processed_id.lock().clone()
    }

    /// Forget the queue cursor so the next fetch starts from the source's head
    pub fn reset_cursor(&self) {
        *self.last_processed_id.lock() = None;
    }

    pub fn add_override(&self, resource_name: &str, version: &str) -> Result<()> {
        self.resolver.add_override(resource_name, version)
    }

    pub fn add_abbreviated_override(&self, resource_name: &str, version: &str) -> Result<()> {
        self.resolver.add_abbreviated_override(resource_name, version)
    }

    pub fn remove_override(&self, resource_name: &str) -> Option<String> {
        self.resolver.remove_override(resource_name)
    }

    pub fn list_overrides(&self) -> BTreeMap<String, String> {
        self.resolver.list_overrides()
    }

    pub fn get_override(&self, resource_name: &str) -> Option<String> {
        self.resolver.get_override(resource_name)
    }

    pub async fn resolve_override(
        &self,
        notification: ChangeNotification,
    ) -> std::result::Result<ChangeNotification, FetchError> {
        self.resolver.resolve(notification).await
    }
}

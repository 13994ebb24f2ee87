//! Resource version overrides.
//!
//! An override forces notifications for a resource name to carry the
//! representation of a specific schema version. The map is shared between
//! every poll task backed by the same service, so it lives in a `DashMap`
//! keyed by the lower-cased resource name.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{FetchError, NotificationError, Result};
use crate::metrics::OverrideMetrics;

use super::{ChangeNotification, ResourceFetcher};

/// Content type used when the fetcher does not declare one
pub const RESOURCE_REPRESENTATION: &str = "resource-representation";

/// Prefix of the canonical versioned media type
pub const DEFAULT_MEDIA_TYPE_PREFIX: &str = "application/vnd.hedtech.integration";

/// Normalize an abbreviated version (`v16`, `16`, `V16.1`, `v16.0.0`) into
/// the canonical media type `{prefix}.v{major}.{minor}.{patch}+json`.
pub fn normalize_version(prefix: &str, abbreviated: &str) -> Result<String> {
    let trimmed = abbreviated.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if bare.is_empty() {
        return Err(NotificationError::validation("version must not be blank"));
    }

    let parts: Vec<&str> = bare.split('.').collect();
    if parts.len() > 3 {
        return Err(NotificationError::validation(format!(
            "version '{}' has more than three components",
            abbreviated
        )));
    }

    let mut numbers = [0u32; 3];
    for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
        *slot = part.parse().map_err(|_| {
            NotificationError::validation(format!("version '{}' is not numeric", abbreviated))
        })?;
    }

    Ok(format!(
        "{}.v{}.{}.{}+json",
        prefix.trim_end_matches('.'),
        numbers[0],
        numbers[1],
        numbers[2]
    ))
}

fn require(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(NotificationError::validation(format!("{} must not be blank", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Holds resource-name → version overrides and rewrites notifications
/// that need a different version.
pub struct OverrideResolver {
    /// lower-cased resource name -> version
    overrides: DashMap<String, String>,
    fetcher: Arc<dyn ResourceFetcher>,
    media_type_prefix: String,
}

impl OverrideResolver {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_media_type_prefix(fetcher, DEFAULT_MEDIA_TYPE_PREFIX)
    }

    pub fn with_media_type_prefix(
        fetcher: Arc<dyn ResourceFetcher>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            overrides: DashMap::new(),
            fetcher,
            media_type_prefix: prefix.into(),
        }
    }

    /// Register a full version for a resource. Last write wins.
    pub fn add_override(&self, resource_name: &str, version: &str) -> Result<()> {
        let name = require(resource_name, "resource name")?;
        let version = require(version, "version")?;

        tracing::debug!(resource = %name, version = %version, "Override registered");
        self.overrides.insert(name.to_lowercase(), version);
        Ok(())
    }

    /// Register an abbreviated version, stored in canonical form
    pub fn add_abbreviated_override(&self, resource_name: &str, version: &str) -> Result<()> {
        let name = require(resource_name, "resource name")?;
        let version = require(version, "version")?;
        let canonical = normalize_version(&self.media_type_prefix, &version)?;
        self.add_override(&name, &canonical)
    }

    /// Remove the override for a resource, returning the version it had
    pub fn remove_override(&self, resource_name: &str) -> Option<String> {
        self.overrides
            .remove(&resource_name.trim().to_lowercase())
            .map(|(_, version)| version)
    }

    pub fn get_override(&self, resource_name: &str) -> Option<String> {
        let key = resource_name.trim();
        if key.is_empty() {
            return None;
        }
        self.overrides.get(&key.to_lowercase()).map(|v| v.clone())
    }

    /// Point-in-time copy of every override, sorted by resource name
    pub fn list_overrides(&self) -> BTreeMap<String, String> {
        self.overrides
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn media_type_prefix(&self) -> &str {
        &self.media_type_prefix
    }

    /// Return the notification with its content swapped for the overridden
    /// version, or unchanged when no rewrite applies.
    pub async fn resolve(
        &self,
        notification: ChangeNotification,
    ) -> std::result::Result<ChangeNotification, FetchError> {
        let Some(version) = self.get_override(&notification.resource.name) else {
            return Ok(notification);
        };

        // Deleted resources cannot be fetched again
        if notification.is_deleted() {
            OverrideMetrics::record("skipped_deleted");
            return Ok(notification);
        }

        if version.eq_ignore_ascii_case(notification.resource.version.trim()) {
            OverrideMetrics::record("unchanged");
            return Ok(notification);
        }

        let fetched = match self
            .fetcher
            .get_versioned_resource(
                &notification.resource.name,
                &notification.resource.id,
                &version,
            )
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                OverrideMetrics::record("failed");
                tracing::warn!(
                    notification_id = %notification.id,
                    resource = %notification.resource.name,
                    resource_id = %notification.resource.id,
                    version = %version,
                    error = %e,
                    "Failed to fetch overridden resource version"
                );
                return Err(e);
            }
        };

        let mut resolved = notification;
        resolved.content_type = fetched
            .declared_content_type
            .unwrap_or_else(|| RESOURCE_REPRESENTATION.to_string());
        resolved.content = fetched.body;
        resolved.resource.version = fetched.declared_version.unwrap_or(version);

        OverrideMetrics::record("applied");
        tracing::debug!(
            notification_id = %resolved.id,
            resource = %resolved.resource.name,
            version = %resolved.resource.version,
            "Applied version override"
        );

        Ok(resolved)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FetchError;

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    /// Queue-assigned identifier
    pub id: String,
    /// When the change was published
    #[serde(alias = "published")]
    pub published_at: DateTime<Utc>,
    /// Application and tenant that published the change
    pub publisher: PublisherInfo,
    /// Resource the change refers to
    pub resource: ResourceRef,
    pub operation: Operation,
    /// Media type describing `content`
    pub content_type: String,
    /// Resource representation; schema depends on resource name and version
    #[serde(default)]
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherInfo {
    pub id: String,
    pub application_name: String,
    #[serde(default)]
    pub tenant: TenantInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Kind of change that happened to the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Created,
    Updated,
    Deleted,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unparsed notification as returned by a [`NotificationSource`](super::NotificationSource)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawNotification(pub serde_json::Value);

impl RawNotification {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The `id` field, if the payload carries one
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(|v| v.as_str())
    }

    pub fn parse(&self) -> Result<ChangeNotification, FetchError> {
        Ok(ChangeNotification::deserialize(&self.0)?)
    }
}

impl From<&ChangeNotification> for RawNotification {
    fn from(notification: &ChangeNotification) -> Self {
        Self(serde_json::to_value(notification).unwrap_or(serde_json::Value::Null))
    }
}

/// Builder for change notifications
#[derive(Debug, Clone)]
pub struct ChangeNotificationBuilder {
    id: Option<String>,
    published_at: Option<DateTime<Utc>>,
    publisher: PublisherInfo,
    resource: ResourceRef,
    operation: Operation,
    content_type: String,
    content: serde_json::Value,
}

impl ChangeNotificationBuilder {
    pub fn new(
        resource_name: impl Into<String>,
        resource_id: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            id: None,
            published_at: None,
            publisher: PublisherInfo {
                id: String::new(),
                application_name: String::new(),
                tenant: TenantInfo::default(),
            },
            resource: ResourceRef {
                id: resource_id.into(),
                name: resource_name.into(),
                version: String::new(),
                domain: None,
            },
            operation,
            content_type: "application/json".to_string(),
            content: serde_json::Value::Null,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn publisher(mut self, id: impl Into<String>, application_name: impl Into<String>) -> Self {
        self.publisher.id = id.into();
        self.publisher.application_name = application_name.into();
        self
    }

    pub fn tenant(mut self, tenant: TenantInfo) -> Self {
        self.publisher.tenant = tenant;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.resource.version = version.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.resource.domain = Some(domain.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn build(self) -> ChangeNotification {
        ChangeNotification {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            published_at: self.published_at.unwrap_or_else(Utc::now),
            publisher: self.publisher,
            resource: self.resource,
            operation: self.operation,
            content_type: self.content_type,
            content: self.content,
        }
    }
}

impl ChangeNotification {
    pub fn builder(
        resource_name: impl Into<String>,
        resource_id: impl Into<String>,
        operation: Operation,
    ) -> ChangeNotificationBuilder {
        ChangeNotificationBuilder::new(resource_name, resource_id, operation)
    }

    pub fn is_deleted(&self) -> bool {
        self.operation == Operation::Deleted
    }
}

//! Change notifications, their collaborators, and version overrides.
//!
//! - `types`: the notification data model
//! - `source`: traits for the remote queue and the versioned resource API
//! - `overrides`: resource-name → version overrides and payload rewriting
//! - `service`: page fetching with overrides applied
//! - `memory_source`: in-process queue implementing `NotificationSource`

mod memory_source;
mod overrides;
mod service;
mod source;
mod types;

pub use memory_source::MemoryNotificationSource;
pub use overrides::{
    normalize_version, OverrideResolver, DEFAULT_MEDIA_TYPE_PREFIX, RESOURCE_REPRESENTATION,
};
pub use service::NotificationService;
pub use source::{
    NotificationSource, ResourceFetcher, VersionedResource, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use types::{
    ChangeNotification, ChangeNotificationBuilder, Operation, PublisherInfo, RawNotification,
    ResourceRef, TenantInfo,
};
